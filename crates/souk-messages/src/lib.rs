//! Message persistence and conversation queries for the souk messaging core.
//!
//! Implements the store collaborator used by the relay and the history
//! endpoints: user lookups (id and display name only), immutable message
//! inserts, paginated bidirectional conversation retrieval, and the derived
//! counterpart list.
//!
//! There is no conversation entity. A conversation is the set of messages
//! whose sender/receiver pair matches two users in either direction, and the
//! counterpart list is computed by scanning the messages touching a user.

use rusqlite::Row;
use souk_types::ObjectId;
use thiserror::Error;

mod conversation;
mod messages;
mod users;

pub use conversation::{list_conversation, list_counterparts};
pub use souk_types::{ConversationPage, Counterpart};
pub use messages::{create_message, Message, NewMessage};
pub use users::{find_user, get_user, insert_user, NewUser, User};

/// Errors that can occur during message store operations.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    /// The store rejected the record (constraint violation or empty content).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl MessageError {
    /// Converts constraint violations into [`MessageError::Validation`],
    /// leaving every other SQLite failure as a database error.
    fn from_write(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, ref msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Validation(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            other => Self::Database(other),
        }
    }
}

/// Reads an [`ObjectId`] column, surfacing malformed values as a conversion
/// failure rather than panicking.
fn object_id_at(row: &Row, idx: usize) -> rusqlite::Result<ObjectId> {
    let raw: String = row.get(idx)?;
    ObjectId::parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Reads a millisecond unix timestamp column.
fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let ms: i64 = row.get(idx)?;
    chrono::DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}
