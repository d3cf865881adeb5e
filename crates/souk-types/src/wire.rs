//! JSON frames exchanged over the realtime channel.
//!
//! Every frame is a text message whose `type` field selects the variant.
//! Payload fields use camelCase to match the storefront frontend.

use crate::{ErrorCode, MessageStatus, ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters of message content carried in a
/// notification preview.
pub const NOTIFICATION_PREVIEW_CHARS: usize = 100;

/// Delivery payload for a persisted message, with ids normalised to strings
/// and the participants' display names denormalised alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: ObjectId,
    pub sender: ObjectId,
    pub receiver: ObjectId,
    pub sender_name: String,
    pub receiver_name: String,
    pub content: String,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
}

impl MessagePayload {
    /// Returns `true` if this message belongs to the conversation between
    /// `me` and `other`, in either direction.
    pub fn is_between(&self, me: &ObjectId, other: &ObjectId) -> bool {
        (&self.sender == me && &self.receiver == other)
            || (&self.sender == other && &self.receiver == me)
    }
}

/// One page of a conversation, oldest message first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub messages: Vec<MessagePayload>,
    pub page: u32,
    /// `false` once a page comes back shorter than the requested limit.
    pub has_more: bool,
}

/// Someone the user has exchanged at least one message with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: ObjectId,
    pub display_name: String,
    pub last_message_at: DateTime<Utc>,
}

/// Presence-gated notification for a receiver with a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub sender_id: ObjectId,
    pub sender_username: String,
    /// Human-readable headline, e.g. `New message from alice`.
    pub message: String,
    /// Content preview.
    pub text: String,
}

impl Notification {
    /// Builds the notification for a freshly relayed message.
    pub fn for_message(payload: &MessagePayload) -> Self {
        Self {
            sender_id: payload.sender.clone(),
            sender_username: payload.sender_name.clone(),
            message: format!("New message from {}", payload.sender_name),
            text: preview(&payload.content),
        }
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(NOTIFICATION_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Outcome of a `sendMessage` request, delivered once to the originating
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Success { message: MessagePayload },
    Error { error: String, code: ErrorCode },
}

impl Ack {
    pub fn error(code: ErrorCode, error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "sendMessage")]
    SendMessage {
        #[serde(rename = "requestId")]
        request_id: u64,
        /// Kept as a raw string so a malformed id reaches the relay and is
        /// answered with `INVALID_ID` instead of a parse error.
        #[serde(rename = "receiverId")]
        receiver_id: String,
        content: String,
    },
    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "counterpartId")]
        counterpart_id: String,
    },
    #[serde(rename = "stopTyping")]
    StopTyping {
        #[serde(rename = "counterpartId")]
        counterpart_id: String,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Delivered to the receiver's room.
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(MessagePayload),
    /// Echoed to the sender's room so every tab stays in sync.
    #[serde(rename = "messageSent")]
    MessageSent(MessagePayload),
    #[serde(rename = "ack")]
    Ack {
        #[serde(rename = "requestId")]
        request_id: u64,
        ack: Ack,
    },
    #[serde(rename = "receive_notification")]
    Notification(Notification),
    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "userId")]
        user_id: ObjectId,
    },
    #[serde(rename = "stopTyping")]
    StopTyping {
        #[serde(rename = "userId")]
        user_id: ObjectId,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
