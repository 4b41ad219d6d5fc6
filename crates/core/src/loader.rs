//! ContextLoader trait and the context value objects.
//!
//! Context sections are named chunks of prompt text with topic tags and a
//! priority. A loader sources them from wherever they live (a database, a
//! CMS, a file); the context crate selects, orders, and budgets them into
//! a system prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::LoaderError;

/// One named chunk of prompt text. Identity is `id`: two sections with the
/// same id in one selection are deduplicated (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSection {
    /// Stable identifier.
    pub id: String,

    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The prompt text.
    pub content: String,

    /// Topic tags used for selective inclusion. Possibly empty.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Include this section in every selective selection.
    #[serde(default)]
    pub always_include: bool,

    /// Ordering weight: higher priority sorts earlier in selective mode.
    #[serde(default)]
    pub priority: i32,
}

impl ContextSection {
    /// A minimal section with just an id and content.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            content: content.into(),
            topics: Vec::new(),
            always_include: false,
            priority: 0,
        }
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn always_included(mut self) -> Self {
        self.always_include = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// What a loader receives when asked for a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    /// Topics derived from the request, for loaders that pre-filter.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Catalog variant to load, for experimentation/versioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Whether this is the opening exchange of a conversation.
    #[serde(default)]
    pub is_first_message: bool,

    /// Caller identity, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Pass-through request metadata.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The outcome of context selection: an assembled system prompt plus the
/// bookkeeping callers use to report savings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSelection {
    /// The assembled system prompt (sections joined, tone appended).
    pub system_prompt: String,

    /// Ids of the sections included, in prompt order.
    pub sections_included: Vec<String>,

    /// Size of the full catalog the selection drew from.
    pub total_sections: usize,

    /// Rough token count of the assembled prompt (~4 chars per token).
    pub token_estimate: usize,

    /// Rough token count had every catalog section been included,
    /// pre-tone. The baseline used to report savings.
    pub max_token_estimate: usize,

    /// Catalog variant the sections came from, when one was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Fired when a request resolves to a catalog variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantEvent {
    pub variant: String,
}

/// The context sourcing capability.
#[async_trait]
pub trait ContextLoader: Send + Sync {
    /// Load the section catalog for a request. Implementations should
    /// observe `cancel` during external I/O.
    async fn load(
        &self,
        request: LoadRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<ContextSection>, LoaderError>;
}
