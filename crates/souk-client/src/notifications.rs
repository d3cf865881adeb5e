//! Unread badge fed by `receive_notification`.

use souk_types::{Notification, ObjectId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NotificationBadge {
    unread: HashMap<ObjectId, u32>,
    latest: Option<Notification>,
}

impl NotificationBadge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a notification unless it comes from the conversation that is
    /// already open. Returns `true` if the badge changed.
    pub fn record(&mut self, notification: Notification, open: Option<&ObjectId>) -> bool {
        if open == Some(&notification.sender_id) {
            return false;
        }
        *self
            .unread
            .entry(notification.sender_id.clone())
            .or_default() += 1;
        self.latest = Some(notification);
        true
    }

    /// Clears the count for `sender`, typically when their conversation is
    /// selected.
    pub fn clear(&mut self, sender: &ObjectId) {
        self.unread.remove(sender);
        if self
            .latest
            .as_ref()
            .is_some_and(|n| &n.sender_id == sender)
        {
            self.latest = None;
        }
    }

    pub fn unread_from(&self, sender: &ObjectId) -> u32 {
        self.unread.get(sender).copied().unwrap_or(0)
    }

    /// Total unread count across senders, as shown on the badge.
    pub fn total(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Most recent notification, for a toast.
    pub fn latest(&self) -> Option<&Notification> {
        self.latest.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(sender: &ObjectId, name: &str) -> Notification {
        Notification {
            sender_id: sender.clone(),
            sender_username: name.to_string(),
            message: format!("New message from {name}"),
            text: "hi".to_string(),
        }
    }

    #[test]
    fn counts_per_sender_and_clears_on_select() {
        let bob = ObjectId::parse("bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let carol = ObjectId::parse("cccccccccccccccccccccccc").unwrap();
        let mut badge = NotificationBadge::new();

        badge.record(note(&bob, "bob"), None);
        badge.record(note(&bob, "bob"), None);
        badge.record(note(&carol, "carol"), None);
        assert_eq!(badge.unread_from(&bob), 2);
        assert_eq!(badge.total(), 3);
        assert_eq!(badge.latest().unwrap().sender_username, "carol");

        badge.clear(&bob);
        assert_eq!(badge.unread_from(&bob), 0);
        assert_eq!(badge.total(), 1);
        assert!(badge.latest().is_some());
    }

    #[test]
    fn open_conversation_does_not_bump_badge() {
        let bob = ObjectId::parse("bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let mut badge = NotificationBadge::new();
        assert!(!badge.record(note(&bob, "bob"), Some(&bob)));
        assert_eq!(badge.total(), 0);
    }
}
