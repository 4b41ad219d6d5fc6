//! Configuration loading and validation for Stagehand pipelines.
//!
//! Loads a [`PipelineSettings`] tree from TOML with serde defaults
//! throughout, then validates it in one pass so a malformed configuration
//! is rejected at startup rather than mid-request. The settings reuse the
//! core domain types (patterns, metadata, sections, policy) directly, so
//! no translation layer sits between the file and the components.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use stagehand_context::optimizer::ContextPolicy;
use stagehand_core::classifier::{IntentMetadata, IntentPattern};
use stagehand_core::loader::ContextSection;

/// The root settings structure for one pipeline deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub intent: IntentSettings,

    #[serde(default)]
    pub context: ContextSettings,

    #[serde(default)]
    pub moderation: ModerationSettings,

    #[serde(default)]
    pub runtime: RuntimeSettings,
}

/// Intent classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSettings {
    /// Keyword-confidence threshold below which the LLM tier runs.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Whether the LLM tier may run at all.
    #[serde(default = "default_true")]
    pub llm_fallback: bool,

    /// Keyword patterns, in priority (declaration) order.
    #[serde(default)]
    pub patterns: Vec<IntentPattern>,

    /// Per-category presentation metadata.
    #[serde(default)]
    pub metadata: HashMap<String, IntentMetadata>,
}

impl Default for IntentSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            llm_fallback: true,
            patterns: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Context selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// First-message vs follow-up inclusion policy.
    #[serde(default)]
    pub policy: ContextPolicy,

    /// The static section catalog (also the dynamic engine's fallback).
    #[serde(default)]
    pub sections: Vec<ContextSection>,

    /// Tone key to instruction text.
    #[serde(default)]
    pub tone_map: HashMap<String, String>,

    /// TTL for dynamically loaded catalogs, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            policy: ContextPolicy::default(),
            sections: Vec::new(),
            tone_map: HashMap::new(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// A caller-defined moderation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRuleSetting {
    pub pattern: String,
    pub reason: String,
}

/// Moderation settings. Patterns compile case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationSettings {
    #[serde(default)]
    pub spam_patterns: Vec<String>,

    #[serde(default)]
    pub profanity_words: Vec<String>,

    #[serde(default)]
    pub custom_rules: Vec<CustomRuleSetting>,
}

/// Runtime behavior flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Production deployments hide fault details from failure descriptors.
    #[serde(default)]
    pub production: bool,

    /// Explicit override; defaults to the opposite of `production`.
    #[serde(default)]
    pub include_error_details: Option<bool>,
}

impl RuntimeSettings {
    /// Whether failure descriptors should carry raw fault text.
    pub fn include_error_details(&self) -> bool {
        self.include_error_details.unwrap_or(!self.production)
    }
}

fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    300
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("confidence_threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("cache_ttl_secs must be greater than zero")]
    InvalidCacheTtl,

    #[error("Intent pattern {0} has an empty category name")]
    EmptyCategory(usize),

    #[error("Context section {0} has an empty id")]
    EmptySectionId(usize),

    #[error("Duplicate context section id: {0}")]
    DuplicateSectionId(String),

    #[error("Invalid moderation pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },
}

impl PipelineSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every cross-field invariant in one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.intent.confidence_threshold) {
            return Err(ConfigError::InvalidThreshold(
                self.intent.confidence_threshold,
            ));
        }
        if self.context.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }

        for (idx, pattern) in self.intent.patterns.iter().enumerate() {
            if pattern.category.trim().is_empty() {
                return Err(ConfigError::EmptyCategory(idx));
            }
        }

        let mut seen = HashSet::new();
        for (idx, section) in self.context.sections.iter().enumerate() {
            if section.id.trim().is_empty() {
                return Err(ConfigError::EmptySectionId(idx));
            }
            if !seen.insert(section.id.as_str()) {
                return Err(ConfigError::DuplicateSectionId(section.id.clone()));
            }
        }

        let rule_patterns = self.moderation.custom_rules.iter().map(|r| &r.pattern);
        for pattern in self.moderation.spam_patterns.iter().chain(rule_patterns) {
            if let Err(error) = regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
                return Err(ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    error: error.to_string(),
                });
            }
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = PipelineSettings::from_toml_str("").unwrap();
        assert_eq!(settings.intent.confidence_threshold, 0.5);
        assert!(settings.intent.llm_fallback);
        assert_eq!(settings.context.cache_ttl_secs, 300);
        assert!(!settings.runtime.production);
        assert!(settings.runtime.include_error_details());
    }

    #[test]
    fn full_document_parses() {
        let settings = PipelineSettings::from_toml_str(
            r#"
            [runtime]
            production = true

            [intent]
            confidence_threshold = 0.6
            llm_fallback = false

            [[intent.patterns]]
            category = "greeting"
            keywords = ["hello", "hi"]

            [intent.metadata.greeting]
            tone = "friendly"
            deepLink = "/welcome"

            [context]
            cache_ttl_secs = 120
            policy = { firstMessage = "full", followUp = "selective" }
            tone_map = { friendly = "Keep it warm." }

            [[context.sections]]
            id = "core"
            content = "Core rules."
            alwaysInclude = true
            priority = 10

            [[context.sections]]
            id = "billing"
            content = "Billing help."
            topics = ["billing"]

            [moderation]
            spam_patterns = ["buy now"]
            profanity_words = ["dang"]

            [[moderation.custom_rules]]
            pattern = '\d{16}'
            reason = "Possible card number"
            "#,
        )
        .unwrap();

        assert_eq!(settings.intent.confidence_threshold, 0.6);
        assert!(!settings.intent.llm_fallback);
        assert_eq!(settings.intent.patterns.len(), 1);
        assert_eq!(
            settings.intent.metadata["greeting"].deep_link.as_deref(),
            Some("/welcome")
        );
        assert_eq!(settings.context.sections.len(), 2);
        assert!(settings.context.sections[0].always_include);
        assert_eq!(settings.context.cache_ttl_secs, 120);
        assert_eq!(settings.moderation.custom_rules.len(), 1);
        // Production flips the details default.
        assert!(!settings.runtime.include_error_details());
    }

    #[test]
    fn explicit_details_override_wins_over_production() {
        let settings = PipelineSettings::from_toml_str(
            r#"
            [runtime]
            production = true
            include_error_details = true
            "#,
        )
        .unwrap();
        assert!(settings.runtime.include_error_details());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = PipelineSettings::from_toml_str("[intent]\nconfidence_threshold = 1.5")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold(t) if t == 1.5));
    }

    #[test]
    fn rejects_zero_ttl() {
        let err =
            PipelineSettings::from_toml_str("[context]\ncache_ttl_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCacheTtl));
    }

    #[test]
    fn rejects_duplicate_section_ids() {
        let err = PipelineSettings::from_toml_str(
            r#"
            [[context.sections]]
            id = "core"
            content = "A"

            [[context.sections]]
            id = "core"
            content = "B"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSectionId(id) if id == "core"));
    }

    #[test]
    fn rejects_empty_category() {
        let err = PipelineSettings::from_toml_str(
            r#"
            [[intent.patterns]]
            category = "  "
            keywords = ["x"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCategory(0)));
    }

    #[test]
    fn rejects_invalid_moderation_pattern() {
        let err = PipelineSettings::from_toml_str(
            r#"
            [moderation]
            spam_patterns = ["(unclosed"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn parse_error_is_reported() {
        let err = PipelineSettings::from_toml_str("not valid toml [[").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
