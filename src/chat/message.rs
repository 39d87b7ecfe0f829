//! Chat envelope and its typed payloads.
//!
//! Wire shape (camelCase):
//!
//! ```json
//! {
//!   "type": "message",
//!   "data": { "content": "สวัสดีครับ", "conversationId": "conv-1" },
//!   "timestamp": "2026-01-18T00:00:00.000Z",
//!   "senderId": "user-1",
//!   "conversationId": "conv-1"
//! }
//! ```
//!
//! `timestamp` and `senderId` belong to the sender; [`ChatEnvelope::stamp`]
//! and [`crate::chat::ChatClient`] fill them, callers never do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{iso_timestamp, WireMessage};

/// Chat event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// A chat message.
    Message,
    /// Typing indicator.
    Typing,
    /// Read receipt for a message.
    ReadReceipt,
    /// Online/away/offline status.
    Presence,
    /// Server-side error report.
    Error,
    /// Frame that did not decode as a chat envelope.
    Raw,
}

impl ChatKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Typing => "typing",
            Self::ReadReceipt => "read_receipt",
            Self::Presence => "presence",
            Self::Error => "error",
            Self::Raw => "raw",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat-specific envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ChatKind,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
    /// ISO-8601 send time, set by the sender.
    #[serde(default)]
    pub timestamp: String,
    /// Sending user, set by the sender.
    #[serde(default)]
    pub sender_id: String,
    /// Conversation the event belongs to. Empty for presence.
    #[serde(default)]
    pub conversation_id: String,
}

impl ChatEnvelope {
    pub(crate) fn outgoing(
        kind: ChatKind,
        sender_id: &str,
        conversation_id: &str,
        data: Value,
    ) -> Self {
        Self {
            kind,
            data,
            timestamp: String::new(),
            sender_id: sender_id.to_string(),
            conversation_id: conversation_id.to_string(),
        }
    }

    /// Whether the envelope belongs to `conversation_id`.
    #[must_use]
    pub fn is_for(&self, conversation_id: &str) -> bool {
        self.conversation_id == conversation_id
    }
}

impl WireMessage for ChatEnvelope {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.timestamp = iso_timestamp(now);
    }

    fn raw(text: String, received_at: DateTime<Utc>) -> Self {
        Self {
            kind: ChatKind::Raw,
            data: Value::String(text),
            timestamp: iso_timestamp(received_at),
            sender_id: String::new(),
            conversation_id: String::new(),
        }
    }
}

/// File or image attached to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment id.
    pub id: String,
    /// File name.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Payload of a `message` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    /// Message id, when the sender assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Conversation id echoed in the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Avatar URL of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    /// Attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Payload of a `typing` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    /// Whether the sender is currently typing.
    pub is_typing: bool,
}

/// Payload of a `read_receipt` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptData {
    /// The message that was read.
    pub message_id: String,
}

/// Presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Active.
    Online,
    /// Idle.
    Away,
    /// Gone.
    Offline,
}

/// Payload of a `presence` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceData {
    /// Reported status.
    pub status: PresenceStatus,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorData {
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
}

/// Incoming chat envelope decoded by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// New message.
    Message {
        /// Conversation id.
        conversation_id: String,
        /// Sender id.
        sender_id: String,
        /// Send time.
        timestamp: String,
        /// Message payload.
        data: MessageData,
    },
    /// Typing started or stopped.
    Typing {
        /// Conversation id.
        conversation_id: String,
        /// Who is typing.
        sender_id: String,
        /// Whether they are typing.
        is_typing: bool,
    },
    /// A message was read.
    ReadReceipt {
        /// Conversation id.
        conversation_id: String,
        /// Reader.
        sender_id: String,
        /// The message that was read.
        message_id: String,
    },
    /// A user's presence changed.
    Presence {
        /// Whose presence.
        sender_id: String,
        /// New status.
        status: PresenceStatus,
    },
    /// Server reported an error.
    Error(ErrorData),
    /// Frame that could not be interpreted; carries the original text.
    Raw(String),
}

impl ChatEvent {
    /// Interpret an envelope.
    ///
    /// A known kind whose `data` has the wrong shape becomes [`ChatEvent::Raw`]
    /// holding the re-encoded envelope, so nothing is silently discarded.
    #[must_use]
    pub fn from_envelope(envelope: ChatEnvelope) -> Self {
        let decoded = match envelope.kind {
            ChatKind::Message => serde_json::from_value::<MessageData>(envelope.data.clone())
                .ok()
                .map(|data| Self::Message {
                    conversation_id: envelope.conversation_id.clone(),
                    sender_id: envelope.sender_id.clone(),
                    timestamp: envelope.timestamp.clone(),
                    data,
                }),
            ChatKind::Typing => serde_json::from_value::<TypingData>(envelope.data.clone())
                .ok()
                .map(|data| Self::Typing {
                    conversation_id: envelope.conversation_id.clone(),
                    sender_id: envelope.sender_id.clone(),
                    is_typing: data.is_typing,
                }),
            ChatKind::ReadReceipt => {
                serde_json::from_value::<ReadReceiptData>(envelope.data.clone())
                    .ok()
                    .map(|data| Self::ReadReceipt {
                        conversation_id: envelope.conversation_id.clone(),
                        sender_id: envelope.sender_id.clone(),
                        message_id: data.message_id,
                    })
            }
            ChatKind::Presence => serde_json::from_value::<PresenceData>(envelope.data.clone())
                .ok()
                .map(|data| Self::Presence {
                    sender_id: envelope.sender_id.clone(),
                    status: data.status,
                }),
            ChatKind::Error => serde_json::from_value::<ErrorData>(envelope.data.clone())
                .ok()
                .map(Self::Error),
            ChatKind::Raw => match &envelope.data {
                Value::String(text) => Some(Self::Raw(text.clone())),
                other => Some(Self::Raw(other.to_string())),
            },
        };

        decoded.unwrap_or_else(|| {
            log::debug!(
                "[Chat] '{}' event with unexpected data shape, passing through raw",
                envelope.kind
            );
            Self::Raw(serde_json::to_string(&envelope).unwrap_or_default())
        })
    }
}
