//! # Stagehand Core
//!
//! Domain types, traits, and error definitions for the Stagehand request
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a capability trait here: the
//! model invoker, the rate limiter, the context loader, the LLM intent tier,
//! and the stage handler itself. Implementations live in their respective
//! crates (or in the caller's code). This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod cancel;
pub mod classifier;
pub mod condition;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod invoker;
pub mod limiter;
pub mod loader;
pub mod message;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use cancel::CancelToken;
pub use classifier::{
    FallbackEvent, IntentMetadata, IntentPattern, IntentResult, IntentTier, LlmIntent,
};
pub use condition::Condition;
pub use error::{ClassifyError, InvokerError, LimiterError, LoaderError, StageError};
pub use handler::StageHandler;
pub use invoker::{GenerationOutput, GenerationRequest, ModelInvoker, StreamChunk, Usage};
pub use limiter::{RateDecision, RateLimitVerdict, RateLimiter};
pub use loader::{ContextLoader, ContextSection, ContextSelection, LoadRequest, VariantEvent};
pub use message::{ChatRequest, ContentPart, Message, MessageContent, Role};
pub use state::{ExtensionValue, Extensions, Failure, ModerationVerdict, PipelineState};
