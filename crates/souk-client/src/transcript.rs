//! Ordered, duplicate-free list of messages for the selected conversation.

use chrono::{DateTime, Utc};
use souk_types::{MessagePayload, ObjectId};

/// Delivery state as the sender sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Shown optimistically, not yet acknowledged.
    Sending,
    /// Persisted by the server.
    Sent,
}

/// A transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Server id, or a `tmp-<n>` placeholder while sending.
    pub id: String,
    pub sender: ObjectId,
    pub receiver: ObjectId,
    pub sender_name: String,
    pub content: String,
    pub status: DeliveryStatus,
    /// Server timestamp; `None` until acknowledged.
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<MessagePayload> for Entry {
    fn from(p: MessagePayload) -> Self {
        Self {
            id: p.id.to_string(),
            sender: p.sender,
            receiver: p.receiver,
            sender_name: p.sender_name,
            content: p.content,
            status: DeliveryStatus::Sent,
            timestamp: Some(p.timestamp),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Appends a message, skipping it if the id is already present.
    /// Returns `true` if it was added.
    pub fn push(&mut self, entry: Entry) -> bool {
        if self.contains(&entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Prepends an older page (oldest first), skipping ids already present.
    /// Returns the number of entries added.
    pub fn prepend(&mut self, page: Vec<MessagePayload>) -> usize {
        let older: Vec<Entry> = page
            .into_iter()
            .filter(|p| !self.contains(p.id.as_str()))
            .map(Entry::from)
            .collect();
        let added = older.len();
        self.entries.splice(0..0, older);
        added
    }

    /// Replaces the placeholder `temp_id` in place with the confirmed message.
    ///
    /// If the confirmed message already arrived through another path (the
    /// `messageSent` echo), the placeholder is dropped instead so the message
    /// appears once. Returns `false` if no such placeholder exists.
    pub fn confirm(&mut self, temp_id: &str, message: MessagePayload) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == temp_id) else {
            return false;
        };
        if self.contains(message.id.as_str()) {
            self.entries.remove(pos);
        } else {
            self.entries[pos] = Entry::from(message);
        }
        true
    }

    /// Removes the placeholder `temp_id`, returning its content.
    pub fn remove(&mut self, temp_id: &str) -> Option<String> {
        let pos = self.entries.iter().position(|e| e.id == temp_id)?;
        Some(self.entries.remove(pos).content)
    }
}
