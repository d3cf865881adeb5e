//! Shared types, error codes, and wire events for the souk messaging core.
//!
//! This crate provides the foundational types used by both the server and
//! the client session: store identifiers ([`ObjectId`]), the message status
//! enum, the error taxonomy reported in send acknowledgements, and the JSON
//! frames exchanged over the realtime channel.
//!
//! Nothing here performs I/O. Keeping the wire definitions in one crate means
//! the gateway and the client session cannot drift apart on field names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use thiserror::Error;

mod wire;

pub use wire::{
    Ack, ClientEvent, ConversationPage, Counterpart, MessagePayload, Notification, ServerEvent,
    NOTIFICATION_PREVIEW_CHARS,
};

/// Number of hexadecimal characters in an [`ObjectId`].
pub const OBJECT_ID_LEN: usize = 24;

/// Error returned when a string is not a well-formed [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object id: {0:?}")]
pub struct InvalidObjectId(pub String);

/// Primary-key identifier for users and messages.
///
/// Always 24 lowercase hex characters (12 bytes): a 4-byte big-endian unix
/// timestamp, 5 bytes of per-process randomness, and a 3-byte counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parses and normalises an identifier. Upper-case hex is accepted and
    /// lowered; anything else is rejected.
    pub fn parse(value: &str) -> Result<Self, InvalidObjectId> {
        if value.len() == OBJECT_ID_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(InvalidObjectId(value.to_string()))
        }
    }

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let unique = PROCESS_UNIQUE.get_or_init(rand::random::<[u8; 5]>);
        let secs = chrono::Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidObjectId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Delivery status of a persisted message.
///
/// Only `Sent` is ever assigned by the relay. `Delivered` and `Read` exist in
/// the schema so stored rows from other writers still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Returns the string stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Machine-readable failure codes carried in error acknowledgements and
/// REST error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, malformed, or expired credential.
    AuthFailure,
    /// Counterpart or receiver id is not a well-formed [`ObjectId`].
    InvalidId,
    /// Well-formed receiver id with no matching user.
    ReceiverNotFound,
    /// The store (or the relay's own checks) rejected the message content.
    ValidationError,
    /// Anything else, including store unavailability.
    ServerError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailure => "AUTH_FAILURE",
            Self::InvalidId => "INVALID_ID",
            Self::ReceiverNotFound => "RECEIVER_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ServerError => "SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
