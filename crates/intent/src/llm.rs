//! LLM tier adapters over a [`ModelInvoker`] transport.
//!
//! Two conforming styles of the same capability:
//! - [`StructuredLlmTier`] expects a JSON object
//!   `{ "intent": ..., "confidence": ..., "reasoning": ... }`.
//! - [`TextLlmTier`] expects labelled lines
//!   (`INTENT: ... / CONFIDENCE: ... / REASONING: ...`) and parses them
//!   tolerantly: case-insensitive labels, surrounding whitespace, missing
//!   fields, clamped ranges. The textual parser itself never errors.
//!
//! Both coerce intents outside the configured categories to "general" and
//! clamp confidence to [0, 1].

use serde::Deserialize;
use std::sync::Arc;
use async_trait::async_trait;

use stagehand_core::cancel::CancelToken;
use stagehand_core::classifier::{IntentTier, LlmIntent};
use stagehand_core::error::ClassifyError;
use stagehand_core::invoker::{GenerationRequest, ModelInvoker};
use stagehand_core::message::Message;

/// Default confidence when a textual response carries none.
const DEFAULT_CONFIDENCE: f64 = 0.5;

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return DEFAULT_CONFIDENCE;
    }
    confidence.clamp(0.0, 1.0)
}

fn coerce_intent(raw: &str, categories: &[String]) -> String {
    let lowered = raw.trim().to_lowercase();
    if lowered == "general" || categories.iter().any(|c| c.to_lowercase() == lowered) {
        lowered
    } else {
        "general".to_string()
    }
}

fn classification_request(system: String, message: &str) -> GenerationRequest {
    GenerationRequest {
        system: Some(system),
        messages: vec![Message::user(message)],
        max_tokens: Some(256),
        temperature: Some(0.0),
    }
}

// ── Structured tier ───────────────────────────────────────────────────────

/// Classifies via a JSON contract.
pub struct StructuredLlmTier {
    invoker: Arc<dyn ModelInvoker>,
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct RawStructuredIntent {
    intent: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

impl StructuredLlmTier {
    pub fn new(invoker: Arc<dyn ModelInvoker>, categories: Vec<String>) -> Self {
        Self { invoker, categories }
    }

    fn prompt(&self) -> String {
        format!(
            "Classify the user's message into exactly one intent category.\n\
             Categories: {}, general\n\n\
             Respond with a single JSON object and nothing else:\n\
             {{\"intent\": \"<category>\", \"confidence\": <0..1>, \"reasoning\": \"<short>\"}}",
            self.categories.join(", ")
        )
    }

    fn parse(&self, text: &str) -> Result<LlmIntent, ClassifyError> {
        let body = extract_json_object(text)
            .ok_or_else(|| ClassifyError::Unparseable("no JSON object in response".into()))?;
        let raw: RawStructuredIntent = serde_json::from_str(body)
            .map_err(|e| ClassifyError::Unparseable(e.to_string()))?;

        Ok(LlmIntent {
            intent: coerce_intent(&raw.intent, &self.categories),
            confidence: clamp_confidence(raw.confidence),
            reasoning: raw.reasoning,
            usage: None,
        })
    }
}

#[async_trait]
impl IntentTier for StructuredLlmTier {
    async fn classify(
        &self,
        message: &str,
        cancel: &CancelToken,
    ) -> Result<LlmIntent, ClassifyError> {
        let output = self
            .invoker
            .generate(classification_request(self.prompt(), message), cancel)
            .await?;
        let mut intent = self.parse(&output.text)?;
        intent.usage = output.usage;
        Ok(intent)
    }
}

/// The first top-level JSON object in `text`, tolerating fenced code
/// blocks and prose around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ── Textual tier ──────────────────────────────────────────────────────────

/// Classifies via labelled lines.
pub struct TextLlmTier {
    invoker: Arc<dyn ModelInvoker>,
    categories: Vec<String>,
}

impl TextLlmTier {
    pub fn new(invoker: Arc<dyn ModelInvoker>, categories: Vec<String>) -> Self {
        Self { invoker, categories }
    }

    fn prompt(&self) -> String {
        format!(
            "Classify the user's message into exactly one intent category.\n\
             Categories: {}, general\n\n\
             Respond with exactly three lines:\n\
             INTENT: <category>\n\
             CONFIDENCE: <number between 0 and 1>\n\
             REASONING: <one short sentence>",
            self.categories.join(", ")
        )
    }

    /// Parse a labelled-line response. Never errors: anything missing or
    /// malformed falls back to defaults.
    pub fn parse_labelled(&self, text: &str) -> LlmIntent {
        let mut intent: Option<String> = None;
        let mut confidence: Option<f64> = None;
        let mut reasoning: Option<String> = None;

        for line in text.lines() {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match label.trim().to_lowercase().as_str() {
                "intent" => {
                    // Take the first word; models sometimes append prose.
                    if let Some(word) = value.split_whitespace().next() {
                        intent = Some(word.to_string());
                    }
                }
                "confidence" => {
                    confidence = value.parse::<f64>().ok();
                }
                "reasoning" => {
                    if !value.is_empty() {
                        reasoning = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }

        LlmIntent {
            intent: coerce_intent(intent.as_deref().unwrap_or("general"), &self.categories),
            confidence: clamp_confidence(confidence.unwrap_or(DEFAULT_CONFIDENCE)),
            reasoning,
            usage: None,
        }
    }
}

#[async_trait]
impl IntentTier for TextLlmTier {
    async fn classify(
        &self,
        message: &str,
        cancel: &CancelToken,
    ) -> Result<LlmIntent, ClassifyError> {
        let output = self
            .invoker
            .generate(classification_request(self.prompt(), message), cancel)
            .await?;
        let mut intent = self.parse_labelled(&output.text);
        intent.usage = output.usage;
        Ok(intent)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
