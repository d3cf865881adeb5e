//! Client configuration.

use crate::ClientError;
use reqwest::Url;
use std::time::Duration;

/// Settings for a [`ChatSession`](crate::ChatSession) and its history client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the server, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Bearer credential, sent as the `token` query parameter on the socket
    /// and in the `Authorization` header for REST calls.
    pub token: String,
    /// Reconnection attempts after a drop before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
    /// How long `send_message` waits for the server's acknowledgement.
    pub ack_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// WebSocket URL derived from `base_url`, with the credential as the
    /// percent-encoded `token` query parameter.
    pub fn socket_url(&self) -> Result<Url, ClientError> {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        let mut url = Url::parse(&format!("{base}/ws"))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }

    /// Delay before reconnection attempt `attempt` (0-based): exponential,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            max_reconnect_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
        }
    }
}
