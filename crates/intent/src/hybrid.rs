//! Hybrid resolver: keyword tier first, LLM tier below the threshold.
//!
//! The LLM tier is consulted only when the keyword confidence is strictly
//! below the threshold, fallback is enabled, and a tier is configured.
//! When it answers, presentation metadata is looked up fresh for the
//! LLM-chosen intent rather than carried over from the keyword result, so
//! tone and deep links always match the intent that actually won. When it
//! fails, classification degrades to the catch-all; the plan never fails
//! because the LLM tier did.

use std::sync::Arc;
use tracing::{debug, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::classifier::{
    ClassificationMethod, FallbackEvent, IntentResult, IntentTier,
};
use stagehand_core::hooks::{supervised, OnIntentFallback};

use crate::keyword::KeywordClassifier;

/// Default keyword-confidence threshold below which the LLM tier runs.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// The two-tier resolver. Long-lived; share one across executions.
pub struct HybridIntentResolver {
    keyword: KeywordClassifier,
    llm: Option<Arc<dyn IntentTier>>,
    threshold: f64,
    llm_fallback_enabled: bool,
    on_fallback: Option<Arc<OnIntentFallback>>,
}

impl HybridIntentResolver {
    pub fn new(keyword: KeywordClassifier) -> Self {
        Self {
            keyword,
            llm: None,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            llm_fallback_enabled: true,
            on_fallback: None,
        }
    }

    /// Configure the LLM tier.
    pub fn with_llm_tier(mut self, tier: Arc<dyn IntentTier>) -> Self {
        self.llm = Some(tier);
        self
    }

    /// Override the keyword-confidence threshold (default 0.5). Results at
    /// or above the threshold bypass the LLM tier.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Enable or disable the LLM fallback outright.
    pub fn with_llm_fallback(mut self, enabled: bool) -> Self {
        self.llm_fallback_enabled = enabled;
        self
    }

    /// Observe every fallback, regardless of whether the tiers agreed.
    pub fn on_fallback(mut self, hook: impl Fn(&FallbackEvent) + Send + Sync + 'static) -> Self {
        self.on_fallback = Some(Arc::new(hook));
        self
    }

    /// The keyword tier's metadata table, exposed for stages that need a
    /// lookup without classification.
    pub fn keyword_classifier(&self) -> &KeywordClassifier {
        &self.keyword
    }

    /// Classify a message through both tiers.
    pub async fn classify(&self, message: &str, cancel: &CancelToken) -> IntentResult {
        let kw = self.keyword.classify(message);

        let tier = match &self.llm {
            Some(tier) if self.llm_fallback_enabled && kw.confidence < self.threshold => tier,
            _ => return kw,
        };

        debug!(
            keyword_intent = %kw.intent,
            keyword_confidence = kw.confidence,
            threshold = self.threshold,
            "Keyword confidence below threshold; consulting LLM tier"
        );

        let outcome = tier.classify(message, cancel).await;

        let event = FallbackEvent {
            message: message.to_string(),
            keyword_intent: kw.intent.clone(),
            keyword_confidence: kw.confidence,
            llm_intent: outcome.as_ref().ok().map(|o| o.intent.clone()),
            llm_confidence: outcome.as_ref().ok().map(|o| o.confidence),
            llm_reasoning: outcome
                .as_ref()
                .ok()
                .and_then(|o| o.reasoning.clone()),
        };
        if let Some(hook) = &self.on_fallback {
            supervised("on_intent_fallback", || hook(&event));
        }

        match outcome {
            Ok(llm) => {
                // Metadata must follow the LLM-chosen intent, not the
                // keyword result, or tone/deep links would be wrong for
                // the intent that actually won.
                let mut metadata = self.keyword.metadata_for(&llm.intent).unwrap_or_default();
                metadata.classification_method = Some("llm".into());
                metadata.reasoning = llm.reasoning;

                IntentResult {
                    intent: llm.intent,
                    confidence: llm.confidence,
                    matched_keywords: Vec::new(),
                    method: ClassificationMethod::Llm,
                    metadata: Some(metadata),
                }
            }
            Err(error) => {
                warn!(error = %error, "LLM intent tier failed; degrading to general");
                IntentResult::general(ClassificationMethod::Llm)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
