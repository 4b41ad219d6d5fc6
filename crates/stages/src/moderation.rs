//! Content moderation stage.
//!
//! Screens the last user message against spam patterns, a profanity word
//! list, and custom rules. Only user-role messages are screened; anything
//! else passes unconditionally. An internal moderation error never blocks
//! the request: it is logged and the message passes with the error noted
//! on the verdict.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::error::StageError;
use stagehand_core::handler::StageHandler;
use stagehand_core::message::Role;
use stagehand_core::state::{keys, ExtensionValue, Failure, ModerationVerdict, PipelineState};

/// A caller-defined moderation rule.
#[derive(Debug, Clone)]
pub struct CustomRule {
    /// Pattern compiled case-insensitively.
    pub pattern: String,
    /// Recorded on the verdict when the rule matches.
    pub reason: String,
}

/// Moderation configuration. All patterns compile case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ModerationConfig {
    pub spam_patterns: Vec<String>,
    pub profanity_words: Vec<String>,
    pub custom_rules: Vec<CustomRule>,
}

/// The moderation stage. Construction compiles every pattern; an invalid
/// pattern is a configuration error, not a runtime one.
pub struct ModerationStage {
    spam: Vec<Regex>,
    profanity: Vec<String>,
    custom: Vec<(Regex, String)>,
}

enum Screen {
    Pass,
    Blocked {
        reason: String,
        user_message: &'static str,
    },
}

impl ModerationConfig {
    /// Build a moderation config from deployment settings.
    pub fn from_settings(settings: &stagehand_config::ModerationSettings) -> Self {
        Self {
            spam_patterns: settings.spam_patterns.clone(),
            profanity_words: settings.profanity_words.clone(),
            custom_rules: settings
                .custom_rules
                .iter()
                .map(|r| CustomRule {
                    pattern: r.pattern.clone(),
                    reason: r.reason.clone(),
                })
                .collect(),
        }
    }
}

impl ModerationStage {
    pub fn new(config: ModerationConfig) -> Result<Self, regex::Error> {
        let spam = config
            .spam_patterns
            .iter()
            .map(|p| case_insensitive(p))
            .collect::<Result<Vec<_>, _>>()?;
        let custom = config
            .custom_rules
            .iter()
            .map(|r| case_insensitive(&r.pattern).map(|re| (re, r.reason.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let profanity = config
            .profanity_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();

        Ok(Self {
            spam,
            profanity,
            custom,
        })
    }

    fn screen(&self, state: &PipelineState) -> Result<Screen, StageError> {
        let Some(message) = state.request.last_message() else {
            return Ok(Screen::Pass);
        };
        if message.role != Role::User {
            return Ok(Screen::Pass);
        }

        let text = message.text();
        let lower = text.to_lowercase();

        for pattern in &self.spam {
            if pattern.is_match(&text) {
                return Ok(Screen::Blocked {
                    reason: format!("Matched spam pattern: {}", pattern.as_str()),
                    user_message: "Your message was flagged as inappropriate.",
                });
            }
        }

        for word in &self.profanity {
            if lower.contains(word.as_str()) {
                return Ok(Screen::Blocked {
                    reason: "Contains inappropriate language".into(),
                    user_message: "Your message contains inappropriate language.",
                });
            }
        }

        for (pattern, reason) in &self.custom {
            if pattern.is_match(&text) {
                return Ok(Screen::Blocked {
                    reason: reason.clone(),
                    user_message: "Your message was flagged as inappropriate.",
                });
            }
        }

        Ok(Screen::Pass)
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

#[async_trait]
impl StageHandler for ModerationStage {
    async fn handle(
        &self,
        state: PipelineState,
        _cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        match self.screen(&state) {
            Ok(Screen::Pass) => Ok(state.with_extension(
                keys::CONTENT_MODERATION,
                ExtensionValue::Moderation(ModerationVerdict::pass()),
            )),
            Ok(Screen::Blocked {
                reason,
                user_message,
            }) => {
                debug!(reason = %reason, "Message blocked by moderation");
                Ok(state
                    .with_extension(
                        keys::CONTENT_MODERATION,
                        ExtensionValue::Moderation(ModerationVerdict::blocked(reason)),
                    )
                    .with_failure(Failure::validation(
                        user_message,
                        keys::CONTENT_MODERATION,
                    )))
            }
            // A moderation error never blocks the request.
            Err(error) => {
                warn!(error = %error, "Moderation errored; allowing message through");
                Ok(state.with_extension(
                    keys::CONTENT_MODERATION,
                    ExtensionValue::Moderation(ModerationVerdict::pass_with_error(
                        error.to_string(),
                    )),
                ))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
