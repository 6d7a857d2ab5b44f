use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a conversation lives: the channel name plus the platform-specific
/// target used to route replies (e.g. a Telegram chat_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatContext {
    /// Channel name (e.g. "telegram", "console").
    pub channel: String,
    /// Platform-specific reply target.
    pub reply_target: String,
}

impl ChatContext {
    pub fn new(channel: &str, reply_target: &str) -> Self {
        Self {
            channel: channel.to_string(),
            reply_target: reply_target.to_string(),
        }
    }
}

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "telegram", "console").
    pub channel: String,
    /// Platform-specific user ID.
    pub sender_id: String,
    /// Human-readable sender name.
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Platform-specific target for routing the response (e.g. Telegram chat_id).
    #[serde(default)]
    pub reply_target: Option<String>,
}

impl IncomingMessage {
    /// The chat this message came from. Falls back to the sender when the
    /// channel does not distinguish chats from users.
    pub fn chat_context(&self) -> ChatContext {
        ChatContext {
            channel: self.channel.clone(),
            reply_target: self
                .reply_target
                .clone()
                .unwrap_or_else(|| self.sender_id.clone()),
        }
    }
}

/// An outgoing message to send back through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub metadata: MessageMetadata,
    /// Platform-specific target for routing (e.g. Telegram chat_id).
    #[serde(default)]
    pub reply_target: Option<String>,
}

impl OutgoingMessage {
    /// A plain text notification addressed to a chat.
    pub fn notification(chat: &ChatContext, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: MessageMetadata::default(),
            reply_target: Some(chat.reply_target.clone()),
        }
    }
}

/// Metadata about how a message was generated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    /// Which provider produced this response.
    pub provider_used: String,
    /// Token count (if available from the provider).
    pub tokens_used: Option<u64>,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Model identifier (if applicable).
    pub model: Option<String>,
}

/// The synchronous answer to one inbound text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Main response shown to the user.
    pub text: String,
    /// Extra messages to send right after the main response.
    pub followups: Vec<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            followups: Vec::new(),
        }
    }
}
