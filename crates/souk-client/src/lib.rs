//! Client side of the storefront chat.
//!
//! [`ChatSession`] owns the WebSocket and reconnects on its own. The other
//! pieces are plain state machines the UI layer drives:
//! [`Conversation`] for the open transcript and its history paging,
//! [`TypingDebouncer`] for the typing indicator, and [`NotificationBadge`]
//! for unread counts. [`HistoryClient`] fetches pages over REST.

pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod notifications;
pub mod session;
pub mod transcript;
pub mod typing;

pub use config::ClientConfig;
pub use conversation::{Conversation, FetchTicket, PendingSend, Routed};
pub use error::ClientError;
pub use history::HistoryClient;
pub use notifications::NotificationBadge;
pub use session::{ChatSession, ConnectionState, EVENT_BUFFER};
pub use transcript::{DeliveryStatus, Entry, Transcript};
pub use typing::{TypingDebouncer, TypingSignal, TYPING_IDLE};
