//! ModelInvoker trait — the abstraction over text-generation backends.
//!
//! An invoker knows how to send a prepared prompt to a model and get a
//! response back, either as a complete output or as a stream of chunks.
//! The engine specifies neither protocol nor provider; implementations
//! shape the transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::InvokerError;
use crate::message::Message;

/// A prepared generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// System prompt, when the plan assembled one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages.
    pub messages: Vec<Message>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Token usage statistics reported by an invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    /// The generated text.
    pub text: String,

    /// Why generation stopped ("stop", "length", "content_filter", ...).
    pub finish_reason: String,

    /// Token usage, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    /// Partial content delta.
    #[serde(default)]
    pub delta: Option<String>,

    /// Whether this is the final chunk.
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The model invocation capability.
///
/// The generation stage calls `generate()` or `stream()` without knowing
/// which backend is behind it — pure polymorphism.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// A human-readable name for this invoker (e.g. "anthropic", "mock").
    fn name(&self) -> &str;

    /// Send a request and get a complete response. Implementations should
    /// observe `cancel` and return promptly once it fires.
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationOutput, InvokerError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `generate()` and wraps the result as a
    /// single final chunk.
    async fn stream(
        &self,
        request: GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, InvokerError>>, InvokerError> {
        let output = self.generate(request, cancel).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                delta: Some(output.text),
                done: true,
                usage: output.usage,
            }))
            .await;
        Ok(rx)
    }
}
