//! Message and ChatRequest domain types.
//!
//! These are the value objects that flow through the entire pipeline:
//! a caller submits a ChatRequest → the executor threads it through the
//! plan → bundled stages read the conversation and attach their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// Message content: plain text, or an ordered list of parts.
///
/// Most messages are plain text. Multi-part content carries typed payloads
/// (images, attachments, structured data) alongside text fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A single text body.
    Text(String),
    /// An ordered list of text or typed parts.
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// A text fragment.
    Text { text: String },
    /// A typed, opaque payload (image reference, attachment, ...).
    Typed {
        kind: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl MessageContent {
    /// The concatenated text of this content, ignoring typed parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Typed { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Whether the content carries no text at all.
    pub fn is_empty_text(&self) -> bool {
        self.text().trim().is_empty()
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// A single message in a conversation. Immutable within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The content (text or parts)
    pub content: MessageContent,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (channel info, client info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// The text body of this message (typed parts ignored).
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// The request a caller submits for one plan execution: an ordered
/// conversation plus arbitrary metadata consumed by stages (user id,
/// session id, experiment variant, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Ordered conversation history, oldest first. Non-empty in normal paths.
    pub messages: Vec<Message>,

    /// Opaque request metadata, keyed by string.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChatRequest {
    /// Create a request from messages with empty metadata.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The last message in the conversation, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Whether this request is the opening exchange of a conversation:
    /// no assistant message has been produced yet.
    pub fn is_first_message(&self) -> bool {
        !self.messages.iter().any(|m| m.role == Role::Assistant)
    }

    /// A metadata value as a string, if present and a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
