//! History retrieval endpoints.

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::Json,
};
use serde::{Deserialize, Serialize};
use souk_messages::{list_conversation, list_counterparts, ConversationPage, Counterpart};
use souk_types::ObjectId;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub user_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CounterpartList {
    pub data: Vec<Counterpart>,
}

/// Clamps a requested page number to `1..`.
fn effective_page(page: Option<i64>) -> u32 {
    page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32
}

/// Resolves the requested page size against the configured default and cap.
fn effective_limit(limit: Option<i64>, default: u32, max: u32) -> u32 {
    match limit {
        Some(l) => l.clamp(1, i64::from(max)) as u32,
        None => default,
    }
}

/// GET /api/messages?userId=<id>&page=<n>&limit=<n>
///
/// One page of the conversation between the caller and `userId`, oldest
/// first within the page. Page 1 holds the most recent messages.
pub async fn get_conversation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ConversationPage>, ApiError> {
    let other = ObjectId::parse(params.user_id.as_deref().unwrap_or_default())
        .map_err(|_| ApiError::InvalidId("Invalid user ID format".to_string()))?;
    let page = effective_page(params.page);
    let limit = effective_limit(
        params.limit,
        state.messaging.history_page_size,
        state.messaging.max_history_page_size,
    );

    let pool = state.pool.clone();
    let me = user.id.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| ApiError::Internal(e.to_string()))?;
        list_conversation(&conn, &me, &other, page, limit).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    tracing::debug!(
        user_id = %user.id,
        page = result.page,
        count = result.messages.len(),
        has_more = result.has_more,
        "served conversation page"
    );
    Ok(Json(result))
}

/// GET /api/messages/chat-history
///
/// Everyone the caller has exchanged messages with, most recent first.
pub async fn get_counterparts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<CounterpartList>, ApiError> {
    let pool = state.pool.clone();
    let me = user.id.clone();
    let data = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| ApiError::Internal(e.to_string()))?;
        list_counterparts(&conn, &me).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(CounterpartList { data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_below_one_reads_as_first_page() {
        assert_eq!(effective_page(None), 1);
        assert_eq!(effective_page(Some(0)), 1);
        assert_eq!(effective_page(Some(-4)), 1);
        assert_eq!(effective_page(Some(3)), 3);
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(effective_limit(None, 20, 100), 20);
        assert_eq!(effective_limit(Some(0), 20, 100), 1);
        assert_eq!(effective_limit(Some(5), 20, 100), 5);
        assert_eq!(effective_limit(Some(10_000), 20, 100), 100);
    }
}
