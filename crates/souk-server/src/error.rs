//! REST error responses.

use crate::auth::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use souk_messages::MessageError;
use souk_types::ErrorCode;
use thiserror::Error;

/// Error returned by REST handlers, rendered as
/// `{"code": <ErrorCode>, "error": <message>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    InvalidId(String),

    #[error(transparent)]
    Store(#[from] MessageError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(MessageError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Auth(_) => ErrorCode::AuthFailure,
            ApiError::InvalidId(_) => ErrorCode::InvalidId,
            ApiError::Store(MessageError::Validation(_)) => ErrorCode::ValidationError,
            ApiError::Store(_) | ApiError::Internal(_) => ErrorCode::ServerError,
        }
    }

    /// Message shown to the client. Server-side failures are not detailed.
    fn user_message(&self) -> String {
        match self {
            ApiError::Store(MessageError::Validation(msg)) => msg.clone(),
            ApiError::Store(_) | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        if status.is_server_error() {
            tracing::error!(code = %code, "request failed: {}", self);
        } else {
            tracing::warn!(code = %code, "request rejected: {}", self);
        }
        (
            status,
            Json(json!({ "code": code, "error": self.user_message() })),
        )
            .into_response()
    }
}
