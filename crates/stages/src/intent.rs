//! Intent classification stage.
//!
//! Runs the hybrid resolver over the most recent user message and records
//! the result in the `intent` extension slot. A request with no user text
//! classifies as "general" without consulting either tier.

use std::sync::Arc;
use async_trait::async_trait;

use stagehand_core::cancel::CancelToken;
use stagehand_core::classifier::{ClassificationMethod, IntentResult};
use stagehand_core::error::StageError;
use stagehand_core::handler::StageHandler;
use stagehand_core::state::{keys, ExtensionValue, PipelineState};
use stagehand_intent::HybridIntentResolver;

pub struct IntentStage {
    resolver: Arc<HybridIntentResolver>,
}

impl IntentStage {
    pub fn new(resolver: Arc<HybridIntentResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl StageHandler for IntentStage {
    async fn handle(
        &self,
        state: PipelineState,
        cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        let text = state
            .request
            .last_user_message()
            .map(|m| m.text())
            .unwrap_or_default();

        let result = if text.trim().is_empty() {
            IntentResult::general(ClassificationMethod::Keyword)
        } else {
            self.resolver.classify(&text, cancel).await
        };

        Ok(state.with_extension(keys::INTENT, ExtensionValue::Intent(result)))
    }
}
