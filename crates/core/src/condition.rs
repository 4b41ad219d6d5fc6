//! Condition predicates — pure, possibly-async gates over the state record.
//!
//! Plans attach a condition to a stage to decide at run time whether the
//! stage executes. Conditions never mutate state and never fail; they
//! answer yes or no. Combinators compose them with short-circuit
//! evaluation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::state::{ExtensionValue, PipelineState};

/// A predicate over the state record. Evaluated (and awaited) by the
/// executor immediately before a stage would run.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(&self, state: &PipelineState) -> bool;
}

// ── Primitives ────────────────────────────────────────────────────────────

struct Predicate<F>(F);

#[async_trait]
impl<F> Condition for Predicate<F>
where
    F: Fn(&PipelineState) -> bool + Send + Sync,
{
    async fn evaluate(&self, state: &PipelineState) -> bool {
        (self.0)(state)
    }
}

/// Wrap a synchronous closure as a condition.
pub fn predicate<F>(f: F) -> Arc<dyn Condition>
where
    F: Fn(&PipelineState) -> bool + Send + Sync + 'static,
{
    Arc::new(Predicate(f))
}

/// True when the classified intent equals `category`.
pub fn has_intent(category: impl Into<String>) -> Arc<dyn Condition> {
    let category = category.into();
    predicate(move |state| {
        state
            .intent()
            .map(|i| i.intent == category)
            .unwrap_or(false)
    })
}

/// True when request metadata contains `key` (any value).
pub fn has_metadata(key: impl Into<String>) -> Arc<dyn Condition> {
    let key = key.into();
    predicate(move |state| state.request.metadata.contains_key(&key))
}

/// True when request metadata contains `key` with exactly `value`.
pub fn has_metadata_value(
    key: impl Into<String>,
    value: serde_json::Value,
) -> Arc<dyn Condition> {
    let key = key.into();
    predicate(move |state| state.request.metadata.get(&key) == Some(&value))
}

/// True when the state carries extension `key` (any value).
pub fn has_extension(key: impl Into<String>) -> Arc<dyn Condition> {
    let key = key.into();
    predicate(move |state| state.extensions.contains_key(&key))
}

/// True when extension `key` is present and its payload equals `value`.
///
/// Typed extension variants compare by their serialized payload; custom
/// extensions compare directly.
pub fn has_extension_value(
    key: impl Into<String>,
    value: serde_json::Value,
) -> Arc<dyn Condition> {
    let key = key.into();
    predicate(move |state| {
        state
            .extensions
            .get(&key)
            .map(|ext| extension_payload(ext) == value)
            .unwrap_or(false)
    })
}

fn extension_payload(ext: &ExtensionValue) -> serde_json::Value {
    match ext {
        ExtensionValue::Custom(v) => v.clone(),
        other => serde_json::to_value(other)
            .ok()
            .and_then(|mut j| j.get_mut("value").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null),
    }
}

/// True on the opening exchange of a conversation.
pub fn is_first_message() -> Arc<dyn Condition> {
    predicate(|state| state.request.is_first_message())
}

/// True when the caller is authenticated: metadata carries a `userId`, or
/// `authenticated` is exactly `true`.
pub fn is_authenticated() -> Arc<dyn Condition> {
    predicate(|state| {
        state.request.metadata.contains_key("userId")
            || state.request.metadata.get("authenticated") == Some(&serde_json::Value::Bool(true))
    })
}

/// True when the last message's text content matches `pattern`.
///
/// The pattern is compiled once, at construction.
pub fn matches_pattern(pattern: &str) -> Result<Arc<dyn Condition>, regex::Error> {
    let re = regex::Regex::new(pattern)?;
    Ok(predicate(move |state| {
        state
            .request
            .last_message()
            .map(|m| re.is_match(&m.text()))
            .unwrap_or(false)
    }))
}

// ── Combinators ───────────────────────────────────────────────────────────

struct All(Vec<Arc<dyn Condition>>);

#[async_trait]
impl Condition for All {
    async fn evaluate(&self, state: &PipelineState) -> bool {
        for c in &self.0 {
            if !c.evaluate(state).await {
                return false;
            }
        }
        true
    }
}

struct Any(Vec<Arc<dyn Condition>>);

#[async_trait]
impl Condition for Any {
    async fn evaluate(&self, state: &PipelineState) -> bool {
        for c in &self.0 {
            if c.evaluate(state).await {
                return true;
            }
        }
        false
    }
}

struct Not(Arc<dyn Condition>);

#[async_trait]
impl Condition for Not {
    async fn evaluate(&self, state: &PipelineState) -> bool {
        !self.0.evaluate(state).await
    }
}

/// True when every condition holds. Short-circuits on the first false.
pub fn all(conditions: Vec<Arc<dyn Condition>>) -> Arc<dyn Condition> {
    Arc::new(All(conditions))
}

/// True when at least one condition holds. Short-circuits on the first true.
pub fn any(conditions: Vec<Arc<dyn Condition>>) -> Arc<dyn Condition> {
    Arc::new(Any(conditions))
}

/// Negate a condition.
pub fn not(condition: Arc<dyn Condition>) -> Arc<dyn Condition> {
    Arc::new(Not(condition))
}
