//! The step executor — the orchestrating top of the Stagehand pipeline.
//!
//! A caller assembles a [`Plan`] of named stages and parallel groups, then
//! asks a [`StepExecutor`] to drive it over an initial state record:
//!
//! 1. Entries run in strict plan order; a parallel group's members run
//!    concurrently and join before the next entry.
//! 2. Each stage may be disabled outright or gated by a condition.
//! 3. The first failure (or the first-declared failure inside a group)
//!    ends the execution; nothing retries at this layer.
//! 4. Cancellation stops new entries, tears down in-flight ones, and
//!    surfaces as a distinguished 499 failure.

pub mod executor;
pub mod hooks;
pub mod plan;

pub use executor::{ExecutionOutcome, ExecutorConfig, StepExecutor};
pub use hooks::ExecutorHooks;
pub use plan::{Plan, PlanBuilder, PlanEntry, PlanError, Stage};
