//! State of the conversation the user currently has open.
//!
//! History pages are fetched asynchronously, so a page can come back after
//! the user has switched to someone else. Every fetch carries a
//! [`FetchTicket`] stamped with the selection generation; pages whose ticket
//! is stale are discarded instead of being merged into the wrong transcript.

use crate::transcript::{DeliveryStatus, Entry, Transcript};
use souk_types::{ConversationPage, MessagePayload, ObjectId};

/// Identifies one history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub counterpart: ObjectId,
    pub page: u32,
    generation: u64,
}

/// Where an incoming message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Appended to the open transcript.
    Appended,
    /// Already in the transcript.
    Duplicate,
    /// Belongs to a conversation that is not open.
    Elsewhere,
}

/// A message shown optimistically while its `sendMessage` is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub temp_id: String,
    pub receiver: ObjectId,
    pub content: String,
}

#[derive(Debug)]
pub struct Conversation {
    me: ObjectId,
    my_name: String,
    page_size: u32,
    selected: Option<ObjectId>,
    generation: u64,
    transcript: Transcript,
    next_page: u32,
    has_more: bool,
    loading: bool,
    counterpart_typing: bool,
    temp_seq: u64,
}

impl Conversation {
    pub fn new(me: ObjectId, my_name: impl Into<String>, page_size: u32) -> Self {
        Self {
            me,
            my_name: my_name.into(),
            page_size: page_size.max(1),
            selected: None,
            generation: 0,
            transcript: Transcript::new(),
            next_page: 1,
            has_more: false,
            loading: false,
            counterpart_typing: false,
            temp_seq: 0,
        }
    }

    pub fn me(&self) -> &ObjectId {
        &self.me
    }

    pub fn selected(&self) -> Option<&ObjectId> {
        self.selected.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn counterpart_typing(&self) -> bool {
        self.counterpart_typing
    }

    /// Opens the conversation with `counterpart`, clearing the transcript,
    /// and returns the ticket for its first page.
    pub fn select(&mut self, counterpart: ObjectId) -> FetchTicket {
        self.generation += 1;
        self.selected = Some(counterpart.clone());
        self.transcript.clear();
        self.next_page = 1;
        self.has_more = true;
        self.loading = true;
        self.counterpart_typing = false;
        FetchTicket {
            counterpart,
            page: 1,
            generation: self.generation,
        }
    }

    /// Ticket for the next older page, or `None` if there is nothing more to
    /// load or a fetch is already in flight.
    pub fn next_page_ticket(&mut self) -> Option<FetchTicket> {
        let counterpart = self.selected.clone()?;
        if !self.has_more || self.loading {
            return None;
        }
        self.loading = true;
        Some(FetchTicket {
            counterpart,
            page: self.next_page,
            generation: self.generation,
        })
    }

    /// Merges a fetched page into the transcript. Returns `false` and changes
    /// nothing if the ticket predates the current selection.
    pub fn apply_page(&mut self, ticket: &FetchTicket, page: ConversationPage) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                counterpart = %ticket.counterpart,
                page = ticket.page,
                "discarding stale history page"
            );
            return false;
        }
        self.loading = false;
        self.has_more = page.messages.len() as u32 >= self.page_size;
        self.next_page = ticket.page + 1;
        self.transcript.prepend(page.messages);
        true
    }

    /// Releases the in-flight flag after a failed fetch so it can be retried.
    pub fn fetch_failed(&mut self, ticket: &FetchTicket) {
        if ticket.generation == self.generation {
            self.loading = false;
        }
    }

    /// Routes a `receiveMessage` or `messageSent` payload.
    pub fn on_message(&mut self, message: MessagePayload) -> Routed {
        let Some(selected) = &self.selected else {
            return Routed::Elsewhere;
        };
        if !message.is_between(&self.me, selected) {
            return Routed::Elsewhere;
        }
        if message.sender == *selected {
            self.counterpart_typing = false;
        }
        if self.transcript.push(Entry::from(message)) {
            Routed::Appended
        } else {
            Routed::Duplicate
        }
    }

    /// Applies a typing indicator from `user`. Ignored unless `user` is the
    /// open counterpart.
    pub fn on_typing(&mut self, user: &ObjectId, typing: bool) {
        if self.selected.as_ref() == Some(user) {
            self.counterpart_typing = typing;
        }
    }

    /// Adds an optimistic entry for `content` to the open conversation.
    ///
    /// Returns `None` if no conversation is open or the trimmed content is
    /// empty.
    pub fn begin_send(&mut self, content: &str) -> Option<PendingSend> {
        let receiver = self.selected.clone()?;
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        self.temp_seq += 1;
        let temp_id = format!("tmp-{}", self.temp_seq);
        self.transcript.push(Entry {
            id: temp_id.clone(),
            sender: self.me.clone(),
            receiver: receiver.clone(),
            sender_name: self.my_name.clone(),
            content: content.to_string(),
            status: DeliveryStatus::Sending,
            timestamp: None,
        });
        Some(PendingSend {
            temp_id,
            receiver,
            content: content.to_string(),
        })
    }

    /// Swaps the optimistic entry for the acknowledged message.
    pub fn confirm_send(&mut self, pending: &PendingSend, message: MessagePayload) -> bool {
        self.transcript.confirm(&pending.temp_id, message)
    }

    /// Drops the optimistic entry and hands back its text so the caller can
    /// put it back in the input box.
    pub fn fail_send(&mut self, pending: &PendingSend) -> String {
        self.transcript
            .remove(&pending.temp_id)
            .unwrap_or_else(|| pending.content.clone())
    }
}
