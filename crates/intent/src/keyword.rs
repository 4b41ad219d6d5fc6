//! Keyword tier: substring scoring with a margin-ratio confidence.
//!
//! Each keyword hit adds its word count to the category's score, so
//! multi-word keywords ("reset my password") outweigh single words
//! ("password"). Confidence is the margin between the two best categories
//! relative to the winner: a unique hit against silence scores 1.0, a
//! dead tie scores 0.

use std::collections::HashMap;

use stagehand_core::classifier::{
    ClassificationMethod, IntentMetadata, IntentPattern, IntentResult,
};

/// The keyword classifier. Configuration is immutable after construction;
/// share one instance across executions.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    patterns: Vec<IntentPattern>,
    metadata: HashMap<String, IntentMetadata>,
}

impl KeywordClassifier {
    pub fn new(patterns: Vec<IntentPattern>) -> Self {
        Self {
            patterns,
            metadata: HashMap::new(),
        }
    }

    /// Attach the per-category metadata table.
    pub fn with_metadata(mut self, metadata: HashMap<String, IntentMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The configured categories, in declaration order.
    pub fn categories(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.category.clone()).collect()
    }

    /// The metadata payload for a category, without running classification.
    pub fn metadata_for(&self, category: &str) -> Option<IntentMetadata> {
        self.metadata.get(category).cloned()
    }

    /// Score `message` against every pattern and return the winner.
    pub fn classify(&self, message: &str) -> IntentResult {
        let lower = message.to_lowercase();

        let mut scored: Vec<CategoryScore<'_>> = self
            .patterns
            .iter()
            .map(|pattern| {
                let mut score = 0usize;
                let mut matched = Vec::new();
                for keyword in &pattern.keywords {
                    if !keyword.is_empty() && lower.contains(keyword.as_str()) {
                        score += keyword.split_whitespace().count();
                        matched.push(keyword.clone());
                    }
                }
                CategoryScore {
                    category: &pattern.category,
                    score,
                    matched,
                }
            })
            .collect();

        // Stable sort: equal scores keep pattern declaration order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));

        let Some(winner) = scored.first() else {
            return IntentResult::general(ClassificationMethod::Keyword);
        };
        if winner.score == 0 {
            return IntentResult::general(ClassificationMethod::Keyword);
        }

        let best = winner.score;
        let second = scored.get(1).map(|s| s.score).unwrap_or(0);
        // Margin ratio: a unique winner against nothing yields 1.0, a tie 0.
        let confidence = ((best - second) as f64 / best.max(1) as f64).min(1.0);

        IntentResult {
            intent: winner.category.to_string(),
            confidence,
            matched_keywords: winner.matched.clone(),
            method: ClassificationMethod::Keyword,
            metadata: self.metadata.get(winner.category).cloned(),
        }
    }
}

struct CategoryScore<'a> {
    category: &'a str,
    score: usize,
    matched: Vec<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────
