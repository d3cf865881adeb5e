//! Paginated conversation history and the derived counterpart list.

use crate::{object_id_at, timestamp_at, MessageError};
use rusqlite::{params, Connection, Row};
use souk_types::{ConversationPage, Counterpart, MessagePayload, MessageStatus, ObjectId};

/// Returns page `page` (1-based, values below 1 read as 1) of the
/// conversation between `me` and `other`.
///
/// The query walks newest-first, ties broken by insertion order, and the
/// resulting page is reversed so callers can prepend it to a transcript.
pub fn list_conversation(
    conn: &Connection,
    me: &ObjectId,
    other: &ObjectId,
    page: u32,
    limit: u32,
) -> Result<ConversationPage, MessageError> {
    let page = page.max(1);
    let limit = limit.max(1);
    let offset = i64::from(page - 1) * i64::from(limit);

    let mut stmt = conn.prepare(
        "SELECT m.message_id, m.sender_id, m.receiver_id, m.content, m.status, m.timestamp_ms,
                s.user_name, r.user_name
         FROM messages m
         JOIN users s ON s.id = m.sender_id
         JOIN users r ON r.id = m.receiver_id
         WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
            OR (m.sender_id = ?2 AND m.receiver_id = ?1)
         ORDER BY m.timestamp_ms DESC, m.seq DESC
         LIMIT ?3 OFFSET ?4",
    )?;

    let rows = stmt.query_map(
        params![me.as_str(), other.as_str(), i64::from(limit), offset],
        map_row_to_payload,
    )?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }

    let has_more = messages.len() == limit as usize;
    messages.reverse();

    Ok(ConversationPage {
        messages,
        page,
        has_more,
    })
}

/// Lists every user `me` has exchanged messages with, most recent first.
pub fn list_counterparts(conn: &Connection, me: &ObjectId) -> Result<Vec<Counterpart>, MessageError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.user_name, MAX(t.timestamp_ms) AS last_ms
         FROM (
             SELECT receiver_id AS other_id, timestamp_ms FROM messages WHERE sender_id = ?1
             UNION ALL
             SELECT sender_id AS other_id, timestamp_ms FROM messages WHERE receiver_id = ?1
         ) t
         JOIN users u ON u.id = t.other_id
         WHERE u.id != ?1
         GROUP BY u.id, u.user_name
         ORDER BY last_ms DESC, u.id ASC",
    )?;

    let rows = stmt.query_map([me.as_str()], |row| {
        Ok(Counterpart {
            id: object_id_at(row, 0)?,
            display_name: row.get(1)?,
            last_message_at: timestamp_at(row, 2)?,
        })
    })?;

    let mut counterparts = Vec::new();
    for row in rows {
        counterparts.push(row?);
    }
    Ok(counterparts)
}

fn map_row_to_payload(row: &Row) -> rusqlite::Result<MessagePayload> {
    let status_str: String = row.get(4)?;
    let status: MessageStatus = status_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(MessagePayload {
        id: object_id_at(row, 0)?,
        sender: object_id_at(row, 1)?,
        receiver: object_id_at(row, 2)?,
        content: row.get(3)?,
        status,
        timestamp: timestamp_at(row, 5)?,
        sender_name: row.get(6)?,
        receiver_name: row.get(7)?,
    })
}
