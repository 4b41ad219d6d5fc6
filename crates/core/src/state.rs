//! The per-request state record threaded through a plan execution.
//!
//! Stages are copy-on-write: a handler receives a [`PipelineState`], builds a
//! new one (usually via [`PipelineState::with_extension`]), and returns it.
//! The previous record is superseded, never mutated in place. Concurrent
//! stages in a parallel group each receive the same input snapshot and their
//! outputs are merged shallowly, later-declared stages overwriting earlier
//! ones on key conflicts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::IntentResult;
use crate::invoker::GenerationOutput;
use crate::limiter::RateLimitVerdict;
use crate::loader::ContextSelection;
use crate::message::ChatRequest;

/// Conventional extension keys used by the bundled stages.
///
/// The extension namespace is open; these are the slots the bundled stages
/// own. Unknown keys propagate through plans verbatim.
pub mod keys {
    pub const CONTENT_MODERATION: &str = "contentModeration";
    pub const RATE_LIMIT: &str = "rateLimit";
    pub const INTENT: &str = "intent";
    pub const PROMPT_CONTEXT: &str = "promptContext";
    pub const AI_RESPONSE: &str = "aiResponse";
}

/// A failure descriptor. Present on the state iff a stage failed; its
/// presence is terminal for the plan.
///
/// `message` is a stable, generic string safe for end-user display.
/// Verbose fault text lives in `details` and is omitted in production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// User-safe description of what went wrong.
    pub message: String,

    /// HTTP-style status code (400 validation, 429 rate, 499 cancelled,
    /// 500 upstream/unexpected).
    pub status_code: u16,

    /// Seconds until the caller may retry (rate limiting only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// The stage that produced this failure. Filled in by the executor
    /// when the failing stage left it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Raw fault text for operators. Never shown to end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Failure {
    /// A 400 validation failure (content moderation and friends).
    pub fn validation(message: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: 400,
            retry_after: None,
            step: Some(step.into()),
            details: None,
        }
    }

    /// A 429 rate-limit failure with an optional retry hint.
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self {
            message: "Too many requests. Please try again later.".into(),
            status_code: 429,
            retry_after,
            step: Some(keys::RATE_LIMIT.into()),
            details: None,
        }
    }

    /// The distinguished cancellation failure (statusCode 499).
    pub fn cancelled() -> Self {
        Self {
            message: "The request was cancelled.".into(),
            status_code: 499,
            retry_after: None,
            step: Some("cancelled".into()),
            details: None,
        }
    }

    /// A 500 upstream/unexpected failure. `details` carries the raw fault
    /// text only when `include_details` is set.
    pub fn internal(step: impl Into<String>, details: &str, include_details: bool) -> Self {
        Self {
            message: "Something went wrong processing your request.".into(),
            status_code: 500,
            retry_after: None,
            step: Some(step.into()),
            details: include_details.then(|| details.to_string()),
        }
    }

    /// Builder-style override of the user-visible message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// The outcome of the moderation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    /// Whether the message was allowed through.
    pub passed: bool,

    /// Why the message was blocked, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Internal moderation error detail. A moderation error allows the
    /// message through; this field records that it happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModerationVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            error: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            error: None,
        }
    }

    pub fn pass_with_error(error: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: None,
            error: Some(error.into()),
        }
    }
}

/// A value stored in the state's extension map.
///
/// Bundled stages use the typed variants; callers attach anything else
/// through the `Custom` escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ExtensionValue {
    Moderation(ModerationVerdict),
    RateLimit(RateLimitVerdict),
    Intent(IntentResult),
    PromptContext(ContextSelection),
    ModelResponse(GenerationOutput),
    Custom(serde_json::Value),
}

/// The open extension map: string keys to tagged values.
///
/// Backed by a BTreeMap so iteration (and serialization) order is stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extensions(BTreeMap<String, ExtensionValue>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ExtensionValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ExtensionValue) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtensionValue)> {
        self.0.iter()
    }

    /// Shallow merge: every entry of `other` is inserted over this map,
    /// overwriting on key conflicts.
    pub fn merge_from(&mut self, other: &Extensions) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// The per-request state record.
///
/// Lives for one plan execution and is discarded once the engine returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// The request being processed.
    pub request: ChatRequest,

    /// Set iff a stage failed. Terminal for the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    /// The open extension map.
    #[serde(default)]
    pub extensions: Extensions,
}

impl PipelineState {
    /// Create a fresh state for a request.
    pub fn new(request: ChatRequest) -> Self {
        Self {
            request,
            failure: None,
            extensions: Extensions::new(),
        }
    }

    /// Whether a failure descriptor is present.
    pub fn has_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Copy-on-write: a new state with one extension added.
    pub fn with_extension(mut self, key: impl Into<String>, value: ExtensionValue) -> Self {
        self.extensions.insert(key, value);
        self
    }

    /// Copy-on-write: a new state carrying an opaque custom extension.
    pub fn with_custom(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.with_extension(key, ExtensionValue::Custom(value))
    }

    /// Copy-on-write: a new state carrying a failure descriptor.
    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    // ── Typed accessors for the conventional slots ────────────────────────

    pub fn moderation(&self) -> Option<&ModerationVerdict> {
        match self.extensions.get(keys::CONTENT_MODERATION) {
            Some(ExtensionValue::Moderation(v)) => Some(v),
            _ => None,
        }
    }

    pub fn rate_limit(&self) -> Option<&RateLimitVerdict> {
        match self.extensions.get(keys::RATE_LIMIT) {
            Some(ExtensionValue::RateLimit(v)) => Some(v),
            _ => None,
        }
    }

    pub fn intent(&self) -> Option<&IntentResult> {
        match self.extensions.get(keys::INTENT) {
            Some(ExtensionValue::Intent(v)) => Some(v),
            _ => None,
        }
    }

    pub fn prompt_context(&self) -> Option<&ContextSelection> {
        match self.extensions.get(keys::PROMPT_CONTEXT) {
            Some(ExtensionValue::PromptContext(v)) => Some(v),
            _ => None,
        }
    }

    pub fn model_response(&self) -> Option<&GenerationOutput> {
        match self.extensions.get(keys::AI_RESPONSE) {
            Some(ExtensionValue::ModelResponse(v)) => Some(v),
            _ => None,
        }
    }

    /// An opaque custom extension, if present.
    pub fn custom(&self, key: &str) -> Option<&serde_json::Value> {
        match self.extensions.get(key) {
            Some(ExtensionValue::Custom(v)) => Some(v),
            _ => None,
        }
    }
}
