//! StageHandler trait — the abstraction over processing stages.
//!
//! A stage is a function from state to state. Returning a state whose
//! `failure` field is set terminates the plan; returning `Err` is a runtime
//! fault the executor converts to a 500-class failure.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::StageError;
use crate::state::PipelineState;

/// The stage capability. Implementations must not mutate the input record
/// in place; they publish a new record (copy-on-write).
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Process the state and return its successor.
    async fn handle(
        &self,
        state: PipelineState,
        cancel: &CancelToken,
    ) -> Result<PipelineState, StageError>;
}

/// A handler built from an async closure, for plans assembled inline.
struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> StageHandler for FnHandler<F>
where
    F: Fn(PipelineState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PipelineState, StageError>> + Send,
{
    async fn handle(
        &self,
        state: PipelineState,
        _cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        (self.f)(state).await
    }
}

/// Wrap an async closure as a [`StageHandler`].
///
/// The closure does not receive the cancel token; handlers that need it
/// implement the trait directly.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn StageHandler>
where
    F: Fn(PipelineState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PipelineState, StageError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
