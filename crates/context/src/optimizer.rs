//! The context optimizer: deterministic section selection and ordering.
//!
//! Given a catalog of sections and a selection query, the optimizer decides
//! between full and selective inclusion, orders the survivors, appends the
//! tone instruction, and reports token estimates against the
//! everything-included baseline.

use std::collections::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use stagehand_core::loader::{ContextSection, ContextSelection};

use crate::token::estimate_tokens;

/// How much of the catalog a selection takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// The whole catalog, in its configured order.
    Full,
    /// Only always-include sections plus topic matches.
    Selective,
}

/// The first-message vs follow-up inclusion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPolicy {
    pub first_message: SelectionMode,
    pub follow_up: SelectionMode,
}

impl Default for ContextPolicy {
    /// Full context to open a conversation, selective afterwards.
    fn default() -> Self {
        Self {
            first_message: SelectionMode::Full,
            follow_up: SelectionMode::Selective,
        }
    }
}

/// One selection request.
#[derive(Debug, Clone, Default)]
pub struct SelectionQuery {
    /// Topics derived from the request (intent categories, metadata tags).
    pub topics: Vec<String>,

    /// Whether this is the opening exchange of a conversation.
    pub is_first_message: bool,

    /// Tone key resolved against the optimizer's tone map.
    pub tone: Option<String>,
}

/// Selects and orders context sections. Stateless; create one and share it.
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    sections: Vec<ContextSection>,
    policy: ContextPolicy,
    tone_map: HashMap<String, String>,
}

impl ContextOptimizer {
    pub fn new(sections: Vec<ContextSection>, policy: ContextPolicy) -> Self {
        Self {
            sections,
            policy,
            tone_map: HashMap::new(),
        }
    }

    /// Attach a tone map: tone key to instruction text appended to the
    /// assembled prompt.
    pub fn with_tone_map(mut self, tone_map: HashMap<String, String>) -> Self {
        self.tone_map = tone_map;
        self
    }

    /// The configured catalog, in order.
    pub fn sections(&self) -> &[ContextSection] {
        &self.sections
    }

    pub fn tone_map(&self) -> &HashMap<String, String> {
        &self.tone_map
    }

    /// Run the selection algorithm over the configured catalog.
    pub fn select(&self, query: &SelectionQuery) -> ContextSelection {
        self.select_from(&self.sections, query, None)
    }

    /// Run the selection algorithm over an externally loaded catalog.
    ///
    /// The dynamic context engine uses this entry point so cached catalogs
    /// and the static fallback share one implementation.
    pub fn select_from(
        &self,
        catalog: &[ContextSection],
        query: &SelectionQuery,
        variant: Option<String>,
    ) -> ContextSelection {
        let use_full = (query.is_first_message
            && self.policy.first_message != SelectionMode::Selective)
            || (!query.is_first_message && self.policy.follow_up == SelectionMode::Full);

        let mut selected: Vec<&ContextSection> = if use_full {
            catalog.iter().collect()
        } else {
            let mut hits: Vec<&ContextSection> = catalog
                .iter()
                .filter(|s| {
                    s.always_include || s.topics.iter().any(|t| query.topics.contains(t))
                })
                .collect();
            // Stable sort: equal priorities keep their configured order.
            hits.sort_by_key(|s| std::cmp::Reverse(s.priority));
            hits
        };

        // Identity is the section id: first occurrence wins.
        let mut seen: HashSet<&str> = HashSet::new();
        selected.retain(|s| seen.insert(s.id.as_str()));

        let mut system_prompt = selected
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if let Some(tone) = &query.tone {
            if let Some(instruction) = self.tone_map.get(tone) {
                system_prompt.push_str("\n\n");
                system_prompt.push_str(instruction);
            }
        }

        // The "if we had included everything" baseline, pre-tone, used to
        // report savings.
        let full_prompt = catalog
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        ContextSelection {
            token_estimate: estimate_tokens(&system_prompt),
            max_token_estimate: estimate_tokens(&full_prompt),
            sections_included: selected.iter().map(|s| s.id.clone()).collect(),
            total_sections: catalog.len(),
            system_prompt,
            variant,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
