//! Typing indicator debounce.

use std::time::Duration;
use tokio::time::Instant;

/// Idle time after the last keystroke before `stopTyping` is sent.
pub const TYPING_IDLE: Duration = Duration::from_secs(1);

/// Signal to forward to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Turns a stream of keystrokes into at most one `typing` per burst and one
/// `stopTyping` after the burst goes quiet.
#[derive(Debug)]
pub struct TypingDebouncer {
    idle: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_IDLE)
    }
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            deadline: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the pending `stopTyping` falls due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records a keystroke at `now`. Returns `Start` on the first keystroke
    /// of a burst; later keystrokes only push the deadline back.
    pub fn keystroke(&mut self, now: Instant) -> Option<TypingSignal> {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.idle);
        started.then_some(TypingSignal::Start)
    }

    /// Returns `Stop` once the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Ends the burst immediately, e.g. when the message is sent.
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    /// Sleeps until the deadline and returns `Stop`. Pending forever while
    /// idle, which makes it safe to use in a `select!` arm.
    pub async fn expired(&mut self) -> TypingSignal {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
                TypingSignal::Stop
            }
            None => std::future::pending().await,
        }
    }
}
