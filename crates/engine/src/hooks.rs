//! Executor-level observability hooks.

use std::sync::Arc;

use stagehand_core::hooks::{supervised, OnError, OnStepComplete};
use stagehand_core::state::Failure;

/// The executor's callback surface. All hooks are optional; every
/// invocation is supervised, so a panicking hook never fails the plan.
#[derive(Clone, Default)]
pub struct ExecutorHooks {
    pub on_step_complete: Option<Arc<OnStepComplete>>,
    pub on_error: Option<Arc<OnError>>,
}

impl ExecutorHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an `on_step_complete(name, duration_ms)` callback.
    pub fn with_step_complete(mut self, f: impl Fn(&str, u64) + Send + Sync + 'static) -> Self {
        self.on_step_complete = Some(Arc::new(f));
        self
    }

    /// Register an `on_error(failure)` callback.
    pub fn with_error(mut self, f: impl Fn(&Failure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn step_complete(&self, name: &str, duration_ms: u64) {
        if let Some(hook) = &self.on_step_complete {
            supervised("on_step_complete", || hook(name, duration_ms));
        }
    }

    pub(crate) fn error(&self, failure: &Failure) {
        if let Some(hook) = &self.on_error {
            supervised("on_error", || hook(failure));
        }
    }
}

impl std::fmt::Debug for ExecutorHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHooks")
            .field("on_step_complete", &self.on_step_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn step_complete_invokes_registered_hook() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hooks = ExecutorHooks::new()
            .with_step_complete(move |name, _ms| sink.lock().unwrap().push(name.to_string()));

        hooks.step_complete("moderation", 3);
        assert_eq!(seen.lock().unwrap().as_slice(), ["moderation"]);
    }

    #[test]
    fn panicking_hook_is_contained() {
        let hooks = ExecutorHooks::new().with_step_complete(|_, _| panic!("bad hook"));
        // Must not propagate.
        hooks.step_complete("anything", 1);
    }

    #[test]
    fn missing_hooks_are_noops() {
        let hooks = ExecutorHooks::new();
        hooks.step_complete("x", 0);
        hooks.error(&Failure::cancelled());
    }
}
