//! Rate limit stage.
//!
//! Resolves an identifier for the request (metadata `userId`, then
//! `sessionId`, then `"anonymous"`), asks the configured limiter, and
//! fails the plan with a 429 when blocked. A broken limiter store fails
//! open: availability of the limit degrades, not the product.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::error::StageError;
use stagehand_core::handler::StageHandler;
use stagehand_core::limiter::{RateLimitVerdict, RateLimiter};
use stagehand_core::state::{keys, ExtensionValue, Failure, PipelineState};

type IdentifyFn = dyn Fn(&PipelineState) -> String + Send + Sync;

pub struct RateLimitStage {
    limiter: Arc<dyn RateLimiter>,
    identify: Arc<IdentifyFn>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            identify: Arc::new(default_identifier),
        }
    }

    /// Override how the rate-limit identifier is derived from the state.
    pub fn with_identifier(
        mut self,
        identify: impl Fn(&PipelineState) -> String + Send + Sync + 'static,
    ) -> Self {
        self.identify = Arc::new(identify);
        self
    }
}

fn default_identifier(state: &PipelineState) -> String {
    state
        .request
        .metadata_str("userId")
        .or_else(|| state.request.metadata_str("sessionId"))
        .unwrap_or("anonymous")
        .to_string()
}

#[async_trait]
impl StageHandler for RateLimitStage {
    async fn handle(
        &self,
        state: PipelineState,
        _cancel: &CancelToken,
    ) -> Result<PipelineState, StageError> {
        let identifier = (self.identify)(&state);

        match self.limiter.check(&identifier).await {
            Ok(decision) if decision.allowed => Ok(state.with_extension(
                keys::RATE_LIMIT,
                ExtensionValue::RateLimit(RateLimitVerdict {
                    identifier,
                    allowed: true,
                    retry_after: None,
                }),
            )),
            Ok(decision) => {
                debug!(identifier = %identifier, retry_after = ?decision.retry_after, "Rate limit exceeded");
                Ok(state
                    .with_extension(
                        keys::RATE_LIMIT,
                        ExtensionValue::RateLimit(RateLimitVerdict {
                            identifier,
                            allowed: false,
                            retry_after: decision.retry_after,
                        }),
                    )
                    .with_failure(Failure::rate_limited(decision.retry_after)))
            }
            // Fail open: a broken limiter store must not take the product down.
            Err(error) => {
                warn!(identifier = %identifier, error = %error, "Rate limiter errored; allowing request");
                Ok(state.with_extension(
                    keys::RATE_LIMIT,
                    ExtensionValue::RateLimit(RateLimitVerdict {
                        identifier,
                        allowed: true,
                        retry_after: None,
                    }),
                ))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
