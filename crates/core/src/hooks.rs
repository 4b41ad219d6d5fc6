//! Observability callback types and their supervised invocation.
//!
//! Callbacks run on the executor's task; they must be fast and must never
//! propagate a fault into the plan. Every invocation goes through
//! [`supervised`], which catches panics and logs them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::classifier::FallbackEvent;
use crate::loader::VariantEvent;
use crate::state::Failure;

/// Fired after each stage completes, with its name and wall duration.
pub type OnStepComplete = dyn Fn(&str, u64) + Send + Sync;

/// Fired when a stage surfaces a failure descriptor.
pub type OnError = dyn Fn(&Failure) + Send + Sync;

/// Fired by the hybrid resolver on every LLM fallback.
pub type OnIntentFallback = dyn Fn(&FallbackEvent) + Send + Sync;

/// Fired by the dynamic context engine when a catalog variant is used.
pub type OnVariantUsed = dyn Fn(&VariantEvent) + Send + Sync;

/// Invoke a callback in a supervised context: a panicking callback is
/// logged and swallowed, never fatal to the plan.
pub fn supervised(name: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let detail = panic_message(&payload);
        warn!(callback = name, detail = %detail, "Observability callback panicked; ignoring");
    }
}

/// Best-effort extraction of a panic payload's message.
pub fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
