//! Intent classification value objects and the LLM tier capability.
//!
//! The keyword tier and the hybrid resolver live in the intent crate; the
//! types they exchange are defined here so stages and conditions can consume
//! classification results without depending on the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::ClassifyError;
use crate::invoker::Usage;

/// A keyword pattern: a category plus the (lowercased) keywords that
/// indicate it. Multi-word keywords intentionally score higher than
/// single-word ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPattern {
    pub category: String,
    pub keywords: Vec<String>,
}

impl IntentPattern {
    pub fn new(
        category: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            category: category.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-category presentation metadata attached to classification results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    /// Tone key consumed by the context optimizer's tone map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    /// In-product deep link to surface alongside the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,

    /// Whether acting on this intent requires an authenticated caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_auth: Option<bool>,

    /// Which tier produced the final result ("llm" when the fallback ran).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_method: Option<String>,

    /// The LLM tier's reasoning, when it supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Which tier produced a classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    Keyword,
    Llm,
}

/// The outcome of intent classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    /// The winning category, or "general" when nothing matched.
    pub intent: String,

    /// Calibrated confidence in [0, 1].
    pub confidence: f64,

    /// Keywords that matched for the winning category (keyword tier only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_keywords: Vec<String>,

    /// Which tier produced this result.
    pub method: ClassificationMethod,

    /// Presentation metadata for the winning intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IntentMetadata>,
}

impl IntentResult {
    /// The distinguished catch-all result.
    pub fn general(method: ClassificationMethod) -> Self {
        Self {
            intent: "general".into(),
            confidence: 0.0,
            matched_keywords: Vec::new(),
            method,
            metadata: None,
        }
    }
}

/// What the LLM tier returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmIntent {
    /// One of the configured categories, or "general".
    pub intent: String,

    /// Confidence in [0, 1].
    pub confidence: f64,

    /// Free-form reasoning, when the model supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Token usage of the classification call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Observation payload fired on every LLM fallback, regardless of whether
/// the two tiers agreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEvent {
    /// The message that was classified.
    pub message: String,

    /// What the keyword tier concluded.
    pub keyword_intent: String,
    pub keyword_confidence: f64,

    /// What the LLM tier concluded, when it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_reasoning: Option<String>,
}

/// The LLM classification capability.
///
/// Implementations must return an intent within the configured categories
/// (coercing anything else to "general") and a confidence clamped to [0, 1].
#[async_trait]
pub trait IntentTier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        cancel: &CancelToken,
    ) -> Result<LlmIntent, ClassifyError>;
}
