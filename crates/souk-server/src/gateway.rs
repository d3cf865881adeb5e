//! Socket gateway: authenticated handshake, room membership, frame dispatch.

use crate::auth::{authenticate, bearer_token};
use crate::error::ApiError;
use crate::relay::{deliver, relay_typing, send_message};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Extension, Query, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use souk_messages::User;
use souk_types::{ClientEvent, ServerEvent};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;

/// Query parameters for the WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// WebSocket handler: `GET /ws?token=...`.
///
/// The credential comes from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header. It is verified before the upgrade, so an
/// unauthenticated client never gets a socket and never joins a room.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));

    match authenticate(&state, token).await {
        Ok(user) => {
            tracing::info!(
                user_id = %user.id,
                remote_addr = %addr,
                "websocket auth success"
            );
            ws.on_upgrade(move |socket| handle_socket(socket, state, user))
        }
        Err(e) => {
            tracing::warn!(remote_addr = %addr, reason = %e, "websocket auth failed");
            ApiError::Auth(e).into_response()
        }
    }
}

/// Sends a JSON-serialized error message over the connection's sender channel.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    deliver(tx, &ServerEvent::Error { message });
}

/// Handles an authenticated connection until the client goes away.
///
/// Frames from one connection are processed in arrival order; a
/// `sendMessage` is fully relayed and acknowledged before the next frame is
/// read.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: User) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a slow consumer cannot grow memory without limit.
    let (tx, mut rx) = mpsc::channel::<String>(state.messaging.session_buffer);

    let session_id = state.rooms.join(user.id.clone(), tx.clone()).await;

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let incoming = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::debug!(user_id = %user.id, "unparseable frame: {}", e);
                send_ws_error(&tx, format!("Invalid message format: {}", e));
                continue;
            }
        };

        match incoming {
            ClientEvent::SendMessage {
                request_id,
                receiver_id,
                content,
            } => {
                send_message(&state, &user, request_id, &receiver_id, &content, &tx).await;
            }
            ClientEvent::Typing { counterpart_id } => {
                relay_typing(&state, &user.id, &counterpart_id, true).await;
            }
            ClientEvent::StopTyping { counterpart_id } => {
                relay_typing(&state, &user.id, &counterpart_id, false).await;
            }
        }
    }

    state.rooms.leave(&user.id, session_id).await;
    send_task.abort();
    tracing::info!(user_id = %user.id, session_id = %session_id, "websocket disconnected");
}
