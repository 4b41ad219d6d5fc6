//! Model generation stage.
//!
//! Builds a generation request from the assembled prompt context (when a
//! prior stage produced one) and the conversation, invokes the model, and
//! records the output in the `aiResponse` extension slot. Invoker errors
//! surface as a 500-class failure with a stable user message.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::error::StageError;
use stagehand_core::handler::StageHandler;
use stagehand_core::invoker::{GenerationRequest, ModelInvoker};
use stagehand_core::state::{keys, ExtensionValue, Failure, PipelineState};

pub struct GenerationStage {
    invoker: Arc<dyn ModelInvoker>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    include_error_details: bool,
}

impl GenerationStage {
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            invoker,
            max_tokens: None,
            temperature: None,
            include_error_details: true,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn include_error_details(mut self, include: bool) -> Self {
        self.include_error_details = include;
        self
    }
}

#[async_trait]
impl StageHandler for GenerationStage {
    async fn handle(
        &self,
        state: PipelineState,
        cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        let request = GenerationRequest {
            system: state.prompt_context().map(|c| c.system_prompt.clone()),
            messages: state.request.messages.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.invoker.generate(request, cancel).await {
            Ok(output) => {
                debug!(
                    invoker = self.invoker.name(),
                    finish_reason = %output.finish_reason,
                    "Model generation complete"
                );
                Ok(state.with_extension(keys::AI_RESPONSE, ExtensionValue::ModelResponse(output)))
            }
            Err(error) => {
                warn!(invoker = self.invoker.name(), error = %error, "Model generation failed");
                Ok(state.with_failure(
                    Failure::internal(
                        keys::AI_RESPONSE,
                        &error.to_string(),
                        self.include_error_details,
                    )
                    .with_message("Something went wrong generating a response."),
                ))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
