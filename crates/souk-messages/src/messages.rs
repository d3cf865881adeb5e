//! Immutable direct messages.

use crate::{object_id_at, timestamp_at, MessageError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use souk_types::{MessagePayload, MessageStatus, ObjectId};

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Insertion sequence; breaks ties between equal timestamps.
    pub seq: i64,
    pub id: ObjectId,
    pub sender: ObjectId,
    pub receiver: ObjectId,
    pub content: String,
    pub status: MessageStatus,
    /// Server-assigned creation time, millisecond precision.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Builds the delivery payload, attaching the participants' display names.
    pub fn into_payload(self, sender_name: String, receiver_name: String) -> MessagePayload {
        MessagePayload {
            id: self.id,
            sender: self.sender,
            receiver: self.receiver,
            sender_name,
            receiver_name,
            content: self.content,
            status: self.status,
            timestamp: self.timestamp,
        }
    }
}

/// Parameters for creating a new message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: ObjectId,
    pub receiver: ObjectId,
    pub content: String,
}

/// Persists a new message with status `sent` and the current time.
///
/// Empty content and dangling participant ids are reported as
/// [`MessageError::Validation`].
pub fn create_message(conn: &Connection, new_message: &NewMessage) -> Result<Message, MessageError> {
    if new_message.content.is_empty() {
        return Err(MessageError::Validation("content is required".to_string()));
    }

    let id = ObjectId::generate();
    let now_ms = Utc::now().timestamp_millis();

    conn.query_row(
        "INSERT INTO messages (message_id, sender_id, receiver_id, content, status, timestamp_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING seq, message_id, sender_id, receiver_id, content, status, timestamp_ms",
        params![
            id.as_str(),
            new_message.sender.as_str(),
            new_message.receiver.as_str(),
            new_message.content,
            MessageStatus::Sent.as_str(),
            now_ms,
        ],
        map_row_to_message,
    )
    .map_err(MessageError::from_write)
}

pub(crate) fn map_row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let status_str: String = row.get(5)?;
    let status: MessageStatus = status_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Message {
        seq: row.get(0)?,
        id: object_id_at(row, 1)?,
        sender: object_id_at(row, 2)?,
        receiver: object_id_at(row, 3)?,
        content: row.get(4)?,
        status,
        timestamp: timestamp_at(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_db, user};

    #[test]
    fn test_message_lifecycle() {
        let conn = setup_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");

        let msg = create_message(
            &conn,
            &NewMessage {
                sender: alice.id.clone(),
                receiver: bob.id.clone(),
                content: "Hello Bob".to_string(),
            },
        )
        .expect("create message failed");
        assert_eq!(msg.content, "Hello Bob");
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.sender, alice.id);

        let stored: (String, i64) = conn
            .query_row(
                "SELECT content, timestamp_ms FROM messages WHERE message_id = ?1",
                [msg.id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("stored row");
        assert_eq!(stored.0, "Hello Bob");
        assert_eq!(stored.1, msg.timestamp.timestamp_millis());

        let payload = msg.into_payload("alice".to_string(), "bob".to_string());
        assert_eq!(payload.receiver, bob.id);
        assert_eq!(payload.receiver_name, "bob");
    }

    #[test]
    fn empty_content_is_rejected_without_insert() {
        let conn = setup_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");

        let err = create_message(
            &conn,
            &NewMessage {
                sender: alice.id,
                receiver: bob.id,
                content: String::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::Validation(_)));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn unknown_receiver_violates_foreign_key() {
        let conn = setup_db();
        let alice = user(&conn, "alice");

        let err = create_message(
            &conn,
            &NewMessage {
                sender: alice.id,
                receiver: ObjectId::generate(),
                content: "anyone there?".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::Validation(_)), "got {err:?}");
    }

    #[test]
    fn sequence_increases_with_insertion_order() {
        let conn = setup_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");

        let first = create_message(
            &conn,
            &NewMessage {
                sender: alice.id.clone(),
                receiver: bob.id.clone(),
                content: "one".to_string(),
            },
        )
        .unwrap();
        let second = create_message(
            &conn,
            &NewMessage {
                sender: bob.id,
                receiver: alice.id,
                content: "two".to_string(),
            },
        )
        .unwrap();
        assert!(second.seq > first.seq);
        assert!(second.timestamp >= first.timestamp);
    }
}
