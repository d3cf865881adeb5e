//! REST access to conversation history.

use crate::conversation::FetchTicket;
use crate::{ClientConfig, ClientError};
use reqwest::StatusCode;
use serde::Deserialize;
use souk_types::{ConversationPage, Counterpart, ErrorCode};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<ErrorCode>,
    error: String,
}

#[derive(Debug, Deserialize)]
struct CounterpartList {
    data: Vec<Counterpart>,
}

/// Fetches history pages and the counterpart list.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl HistoryClient {
    pub fn new(config: &ClientConfig, page_size: u32) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("souk-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            page_size,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches the page named by `ticket`.
    pub async fn fetch(&self, ticket: &FetchTicket) -> Result<ConversationPage, ClientError> {
        let url = format!("{}/api/messages", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("userId", ticket.counterpart.to_string()),
                ("page", ticket.page.to_string()),
                ("limit", self.page_size.to_string()),
            ])
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Lists everyone the user has exchanged messages with.
    pub async fn counterparts(&self) -> Result<Vec<Counterpart>, ClientError> {
        let url = format!("{}/api/messages/chat-history", self.base_url);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let list: CounterpartList = Self::decode(resp).await?;
        Ok(list.data)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Auth);
        }
        let (code, message) = match resp.json::<ErrorBody>().await {
            Ok(body) => (body.code, body.error),
            Err(_) => (None, status.to_string()),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}
