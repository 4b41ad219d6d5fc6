//! RateLimiter trait — the abstraction over rate-limit state stores.
//!
//! The engine never counts requests itself; it asks an external limiter
//! whether an identifier may proceed. Implementations back this with
//! whatever store they like (in-process counters, Redis, a gateway).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LimiterError;

/// The limiter's answer for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Seconds until the identifier may retry, when blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    pub fn block(retry_after: Option<u64>) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// What the rate-limit stage records on the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitVerdict {
    /// The identifier that was checked.
    pub identifier: String,

    /// Whether the request was allowed through.
    pub allowed: bool,

    /// Retry hint carried over from the limiter, when blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// The rate limiting capability.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check whether `identifier` may proceed.
    async fn check(&self, identifier: &str) -> Result<RateDecision, LimiterError>;
}
