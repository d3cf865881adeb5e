//! Souk server library logic: the realtime direct-messaging core of the
//! storefront.

pub mod api_messages;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod relay;
pub mod rooms;

use auth::CredentialVerifier;
use axum::{
    http::HeaderValue,
    routing::get,
    Extension, Json, Router,
};
use config::MessagingConfig;
use rooms::RoomRegistry;
use serde_json::{json, Value};
use souk_db::DbPool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers and connections.
///
/// Built once at startup and passed to [`app`]; there is no global instance.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Verifies credentials for both REST and socket handshakes.
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Live connections grouped by user.
    pub rooms: RoomRegistry,
    /// Relay and history tunables.
    pub messaging: MessagingConfig,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        verifier: Arc<dyn CredentialVerifier>,
        messaging: MessagingConfig,
    ) -> Self {
        Self {
            pool,
            verifier,
            rooms: RoomRegistry::new(),
            messaging,
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the CORS layer. An empty list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Builds the application router with all routes.
pub fn app(state: AppState, allowed_origins: &[String]) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/messages",
            get(api_messages::get_conversation_handler),
        )
        .route(
            "/api/messages/chat-history",
            get(api_messages::get_counterparts_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(gateway::ws_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .layer(Extension(Arc::new(state)))
}
