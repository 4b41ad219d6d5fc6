//! The step executor: drives a plan to completion over a state record.
//!
//! # Failure semantics
//!
//! No retry at this layer. The first stage (or the first-declared stage
//! inside a parallel group) to surface a failure descriptor ends the
//! execution; transient retry, if desired, is the handler's own
//! responsibility. Runtime faults (an `Err` from a handler, or a panicking
//! handler future) are caught at the executor boundary and converted into
//! 500-class failures with a stable generic user message.
//!
//! # Cancellation
//!
//! The caller's token is checked before every plan entry and raced against
//! each in-flight entry. Dropping the entry future stops single stages and
//! whole parallel groups at their next suspension point; the outcome is the
//! distinguished `{ statusCode: 499, step: "cancelled" }` failure.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::hooks::panic_message;
use stagehand_core::state::{Failure, PipelineState};

use crate::hooks::ExecutorHooks;
use crate::plan::{Plan, PlanEntry, Stage};

/// Executor configuration, shared across executions.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// When set, converted runtime faults carry the raw fault text in
    /// `failure.details`. Leave unset in production so internals never
    /// reach end users.
    pub include_error_details: bool,

    /// Observability callbacks.
    pub hooks: ExecutorHooks,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            include_error_details: true,
            hooks: ExecutorHooks::default(),
        }
    }
}

/// The result of one plan execution.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// True iff every enabled, gated-in stage completed without a failure.
    pub ok: bool,

    /// The accumulated state (carries the failure descriptor on error).
    pub state: PipelineState,

    /// The failure that ended the execution, if any.
    pub failure: Option<Failure>,
}

/// Drives plans. Stateless between executions; create one and share it.
#[derive(Debug, Default)]
pub struct StepExecutor {
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute `plan` over `initial`, observing `cancel`.
    pub async fn execute(
        &self,
        initial: PipelineState,
        plan: &Plan,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        debug!(entries = plan.entries().len(), "Executing plan");
        let mut current = initial;

        for entry in plan.entries() {
            if cancel.is_cancelled() {
                return self.cancelled_outcome(current);
            }

            match entry {
                PlanEntry::Stage(stage) => {
                    match self.run_single(stage, current, cancel).await {
                        StepOutcome::Advanced(next) => current = next,
                        StepOutcome::Skipped(unchanged) => current = unchanged,
                        StepOutcome::Finished(outcome) => return outcome,
                    }
                }
                PlanEntry::Parallel(group) => {
                    match self.run_group(group, current, cancel).await {
                        StepOutcome::Advanced(next) => current = next,
                        StepOutcome::Skipped(unchanged) => current = unchanged,
                        StepOutcome::Finished(outcome) => return outcome,
                    }
                }
            }
        }

        ExecutionOutcome {
            ok: true,
            state: current,
            failure: None,
        }
    }

    // ── Single stage ──────────────────────────────────────────────────────

    async fn run_single(
        &self,
        stage: &Stage,
        current: PipelineState,
        cancel: &CancelToken,
    ) -> StepOutcome {
        if !stage.enabled {
            debug!(stage = %stage.name, "Stage skipped (disabled)");
            return StepOutcome::Skipped(current);
        }
        if let Some(condition) = &stage.condition {
            if !condition.evaluate(&current).await {
                debug!(stage = %stage.name, "Stage skipped (condition false)");
                return StepOutcome::Skipped(current);
            }
        }

        let started = Instant::now();
        let run = run_handler(stage, current.clone(), cancel);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepOutcome::Finished(self.cancelled_outcome(current)),
            r = run => r,
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.config.hooks.step_complete(&stage.name, duration_ms);

        match result {
            Ok(next) => {
                if next.failure.is_some() {
                    StepOutcome::Finished(self.failed_outcome(next, &stage.name))
                } else {
                    StepOutcome::Advanced(next)
                }
            }
            Err(fault) => {
                let failure =
                    Failure::internal(&stage.name, &fault, self.config.include_error_details);
                warn!(stage = %stage.name, fault = %fault, "Stage raised a runtime fault");
                StepOutcome::Finished(self.failed_outcome(current.with_failure(failure), &stage.name))
            }
        }
    }

    // ── Parallel group ────────────────────────────────────────────────────

    async fn run_group(
        &self,
        group: &[Stage],
        current: PipelineState,
        cancel: &CancelToken,
    ) -> StepOutcome {
        // Enablement and conditions are evaluated against the group's
        // input snapshot, before anything runs.
        let snapshot = current;
        let mut active: Vec<&Stage> = Vec::new();
        for stage in group {
            if !stage.enabled {
                debug!(stage = %stage.name, "Group member skipped (disabled)");
                continue;
            }
            if let Some(condition) = &stage.condition {
                if !condition.evaluate(&snapshot).await {
                    debug!(stage = %stage.name, "Group member skipped (condition false)");
                    continue;
                }
            }
            active.push(stage);
        }

        if active.is_empty() {
            return StepOutcome::Skipped(snapshot);
        }

        let runs = active.iter().map(|stage| {
            let input = snapshot.clone();
            async move {
                let started = Instant::now();
                let result = run_handler(stage, input, cancel).await;
                (started.elapsed().as_millis() as u64, result)
            }
        });

        let joined = join_all(runs);
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepOutcome::Finished(self.cancelled_outcome(snapshot)),
            r = joined => r,
        };

        // join_all preserves input order, so results line up with `active`
        // in declaration order.
        for (stage, (duration_ms, _)) in active.iter().zip(&results) {
            self.config.hooks.step_complete(&stage.name, *duration_ms);
        }

        // First failure by declaration order wins; later members' side
        // effects are ignored on the state.
        for (stage, (_, result)) in active.iter().zip(&results) {
            match result {
                Ok(state) if state.failure.is_some() => {
                    return StepOutcome::Finished(self.failed_outcome(state.clone(), &stage.name));
                }
                Err(fault) => {
                    let failure =
                        Failure::internal(&stage.name, fault, self.config.include_error_details);
                    warn!(stage = %stage.name, fault = %fault, "Group member raised a runtime fault");
                    return StepOutcome::Finished(
                        self.failed_outcome(snapshot.clone().with_failure(failure), &stage.name),
                    );
                }
                Ok(_) => {}
            }
        }

        // All succeeded: fold extensions into the snapshot in declaration
        // order, later members overwriting earlier on key conflicts.
        // `request` and `failure` are never taken from a group member.
        let mut merged = snapshot;
        for (_, result) in &results {
            if let Ok(state) = result {
                merged.extensions.merge_from(&state.extensions);
            }
        }
        StepOutcome::Advanced(merged)
    }

    // ── Terminal outcomes ─────────────────────────────────────────────────

    fn failed_outcome(&self, mut state: PipelineState, step: &str) -> ExecutionOutcome {
        let failure = match state.failure.as_mut() {
            Some(f) => {
                if f.step.is_none() {
                    f.step = Some(step.to_string());
                }
                f.clone()
            }
            // Unreachable by construction; keep the invariant visible
            // instead of panicking.
            None => {
                let f = Failure::internal(step, "missing failure descriptor", false);
                state.failure = Some(f.clone());
                f
            }
        };
        warn!(
            step = %failure.step.as_deref().unwrap_or("?"),
            status = failure.status_code,
            "Plan execution failed"
        );
        self.config.hooks.error(&failure);
        ExecutionOutcome {
            ok: false,
            state,
            failure: Some(failure),
        }
    }

    fn cancelled_outcome(&self, current: PipelineState) -> ExecutionOutcome {
        let failure = Failure::cancelled();
        info!("Plan execution cancelled");
        self.config.hooks.error(&failure);
        ExecutionOutcome {
            ok: false,
            state: current.with_failure(failure.clone()),
            failure: Some(failure),
        }
    }
}

enum StepOutcome {
    /// The stage ran and produced a successor state.
    Advanced(PipelineState),
    /// The stage was skipped; the state passes through unchanged.
    Skipped(PipelineState),
    /// The execution is over (failure or cancellation).
    Finished(ExecutionOutcome),
}

/// Run one handler, converting both `Err` results and panicking futures
/// into a fault string.
async fn run_handler(
    stage: &Stage,
    input: PipelineState,
    cancel: &CancelToken,
) -> Result<PipelineState, String> {
    match AssertUnwindSafe(stage.handler.handle(input, cancel))
        .catch_unwind()
        .await
    {
        Ok(Ok(state)) => Ok(state),
        Ok(Err(error)) => Err(error.to_string()),
        Err(payload) => Err(panic_message(&payload)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
