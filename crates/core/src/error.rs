//! Error types for the Stagehand domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type.
//!
//! These are *Rust* errors: transport faults, misuse, broken invariants.
//! Domain-level request failures (moderation verdicts, rate limits,
//! cancellation) travel on the state record as a [`crate::state::Failure`]
//! descriptor instead, so they can be rendered to the end user.

use thiserror::Error;

/// A runtime fault raised by a stage handler.
///
/// The step executor catches these at its boundary and converts them into a
/// 500-class failure descriptor; they never escape a plan execution.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Model invocation failed: {0}")]
    Invoker(#[from] InvokerError),

    #[error("Context load failed: {0}")]
    Loader(#[from] LoaderError),

    #[error("Rate limiter failed: {0}")]
    Limiter(#[from] LimiterError),

    #[error("Intent classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// Shorthand for an ad-hoc fault message.
    pub fn other(message: impl Into<String>) -> Self {
        StageError::Other(message.into())
    }
}

/// Errors from a model invoker implementation.
#[derive(Debug, Clone, Error)]
pub enum InvokerError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invoker not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from a context loader implementation.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),
}

/// Errors from a rate limiter implementation.
#[derive(Debug, Clone, Error)]
pub enum LimiterError {
    #[error("Limiter store unavailable: {0}")]
    Unavailable(String),

    #[error("Limiter query failed: {0}")]
    QueryFailed(String),
}

/// Errors from the LLM intent tier.
///
/// These never fail a plan: the hybrid resolver degrades to a safe default
/// when the tier errors.
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error("Classifier transport failed: {0}")]
    Transport(String),

    #[error("Classifier response unusable: {0}")]
    Unparseable(String),
}

impl From<InvokerError> for ClassifyError {
    fn from(e: InvokerError) -> Self {
        ClassifyError::Transport(e.to_string())
    }
}
