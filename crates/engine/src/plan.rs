//! Plan model: stages, parallel groups, and build-time validation.
//!
//! Plans are long-lived configuration, assembled once and shared across
//! executions. Validation happens at build time so a malformed plan can
//! never reach the executor.

use std::sync::Arc;
use thiserror::Error;

use stagehand_core::condition::Condition;
use stagehand_core::handler::StageHandler;

/// A named processing stage.
pub struct Stage {
    /// Unique name within the plan. Used for failure attribution and the
    /// `on_step_complete` hook.
    pub name: String,

    /// The handler capability.
    pub handler: Arc<dyn StageHandler>,

    /// Disabled stages are skipped without evaluating their condition.
    pub enabled: bool,

    /// Optional runtime gate, evaluated against the stage's input state.
    pub condition: Option<Arc<dyn Condition>>,
}

impl Stage {
    /// Create an enabled, unconditional stage.
    pub fn new(name: impl Into<String>, handler: Arc<dyn StageHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            enabled: true,
            condition: None,
        }
    }

    /// Gate this stage behind a condition.
    pub fn when(mut self, condition: Arc<dyn Condition>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Mark this stage disabled. Disabled stages never run.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// One entry in a plan: a single stage or an unordered group scheduled
/// together.
#[derive(Debug)]
pub enum PlanEntry {
    Stage(Stage),
    Parallel(Vec<Stage>),
}

/// An ordered, validated sequence of plan entries.
#[derive(Debug)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    /// Start building a plan.
    pub fn builder() -> PlanBuilder {
        PlanBuilder::new()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Total number of stages across all entries.
    pub fn stage_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| match e {
                PlanEntry::Stage(_) => 1,
                PlanEntry::Parallel(group) => group.len(),
            })
            .sum()
    }
}

/// Plan validation errors, raised at build time.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan has no entries")]
    Empty,

    #[error("Duplicate stage name in plan: {0}")]
    DuplicateStageName(String),

    #[error("Parallel group at entry {0} is empty")]
    EmptyGroup(usize),
}

/// Builder for [`Plan`]. Validates on `build()`.
#[derive(Default)]
pub struct PlanBuilder {
    entries: Vec<PlanEntry>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.entries.push(PlanEntry::Stage(stage));
        self
    }

    /// Append a named stage from a handler (shorthand).
    pub fn step(self, name: impl Into<String>, handler: Arc<dyn StageHandler>) -> Self {
        self.stage(Stage::new(name, handler))
    }

    /// Append a parallel group.
    pub fn parallel(mut self, stages: Vec<Stage>) -> Self {
        self.entries.push(PlanEntry::Parallel(stages));
        self
    }

    /// Validate and produce the plan.
    pub fn build(self) -> Result<Plan, PlanError> {
        if self.entries.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            match entry {
                PlanEntry::Stage(s) => {
                    if !seen.insert(s.name.clone()) {
                        return Err(PlanError::DuplicateStageName(s.name.clone()));
                    }
                }
                PlanEntry::Parallel(group) => {
                    if group.is_empty() {
                        return Err(PlanError::EmptyGroup(idx));
                    }
                    for s in group {
                        if !seen.insert(s.name.clone()) {
                            return Err(PlanError::DuplicateStageName(s.name.clone()));
                        }
                    }
                }
            }
        }

        Ok(Plan {
            entries: self.entries,
        })
    }
}
