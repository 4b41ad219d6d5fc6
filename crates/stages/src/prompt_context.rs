//! Prompt context stage.
//!
//! Delegates to the dynamic context engine and records the selection in
//! the `promptContext` extension slot. An engine failure (loader down, no
//! fallback) becomes the state's failure descriptor.

use std::sync::Arc;
use async_trait::async_trait;

use stagehand_core::cancel::CancelToken;
use stagehand_core::error::StageError;
use stagehand_core::handler::StageHandler;
use stagehand_core::state::{keys, ExtensionValue, PipelineState};
use stagehand_context::DynamicContextEngine;

pub struct PromptContextStage {
    engine: Arc<DynamicContextEngine>,
}

impl PromptContextStage {
    pub fn new(engine: Arc<DynamicContextEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl StageHandler for PromptContextStage {
    async fn handle(
        &self,
        state: PipelineState,
        cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        match self.engine.build(&state, cancel).await {
            Ok(selection) => Ok(state.with_extension(
                keys::PROMPT_CONTEXT,
                ExtensionValue::PromptContext(selection),
            )),
            Err(failure) => Ok(state.with_failure(failure)),
        }
    }
}
