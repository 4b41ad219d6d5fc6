//! Two-tier intent classification for the Stagehand pipeline.
//!
//! The keyword tier scores a message against configured patterns and emits
//! a margin-based confidence. When that confidence falls below the
//! threshold, the hybrid resolver consults an LLM tier and re-attaches
//! metadata for whichever intent the LLM chose. The LLM tier never fails a
//! plan: any error there degrades to the catch-all "general" intent.

pub mod hybrid;
pub mod keyword;
pub mod llm;

pub use hybrid::HybridIntentResolver;
pub use keyword::KeywordClassifier;
pub use llm::{StructuredLlmTier, TextLlmTier};
