//! Client-side errors.

use souk_types::ErrorCode;
use thiserror::Error;

/// Errors surfaced by the chat session and the history client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection dropped or was closed before the request completed.
    #[error("connection closed")]
    Closed,

    /// The server rejected the credential. Never retried.
    #[error("authentication rejected")]
    Auth,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A REST endpoint answered with an error body.
    #[error("request failed with status {status}: {message}")]
    Api {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },

    /// The server acknowledged a `sendMessage` with an error.
    #[error("{code}: {message}")]
    Send { code: ErrorCode, message: String },

    /// `base_url` does not form a valid socket URL. Never retried.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Returns `true` for failures a reconnect could fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::Closed | ClientError::Timeout
        )
    }
}
