//! Message relay: validate, persist, fan out, acknowledge, notify.

use crate::AppState;
use souk_messages::{create_message, get_user, MessageError, NewMessage, User};
use souk_types::{Ack, ErrorCode, MessagePayload, Notification, ObjectId, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// Reasons a `sendMessage` request fails. The `Display` text is sent back in
/// the error acknowledgement.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid receiver ID format")]
    InvalidReceiverId,

    #[error("Receiver not found")]
    ReceiverNotFound,

    #[error("{0}")]
    Validation(String),

    /// Storage or task failure. The detail is logged, never sent.
    #[error("Failed to send message")]
    Server(String),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::InvalidReceiverId => ErrorCode::InvalidId,
            RelayError::ReceiverNotFound => ErrorCode::ReceiverNotFound,
            RelayError::Validation(_) => ErrorCode::ValidationError,
            RelayError::Server(_) => ErrorCode::ServerError,
        }
    }
}

impl From<MessageError> for RelayError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Validation(msg) => RelayError::Validation(msg),
            MessageError::NotFound(_) => RelayError::ReceiverNotFound,
            other => RelayError::Server(other.to_string()),
        }
    }
}

/// Validates and persists a message from `sender`, then delivers it to the
/// receiver's room (`receiveMessage`) and the sender's room (`messageSent`).
///
/// Nothing is persisted or emitted when an error is returned.
pub async fn relay_message(
    state: &AppState,
    sender: &User,
    receiver_id: &str,
    content: &str,
) -> Result<MessagePayload, RelayError> {
    let receiver = ObjectId::parse(receiver_id).map_err(|_| RelayError::InvalidReceiverId)?;
    if receiver == sender.id {
        return Err(RelayError::Validation(
            "Cannot send a message to yourself".to_string(),
        ));
    }

    let pool = state.pool.clone();
    let max_len = state.messaging.max_content_len;
    let sender_id = sender.id.clone();
    let sender_name = sender.user_name.clone();
    let content = content.trim().to_string();

    let payload = tokio::task::spawn_blocking(move || -> Result<MessagePayload, RelayError> {
        let conn = pool
            .get()
            .map_err(|e| RelayError::Server(format!("pool error: {}", e)))?;

        let receiver_user = get_user(&conn, &receiver)?;

        if content.is_empty() {
            return Err(RelayError::Validation(
                "Message content is required".to_string(),
            ));
        }
        if content.len() > max_len {
            return Err(RelayError::Validation(format!(
                "Message content exceeds maximum length of {} bytes",
                max_len
            )));
        }

        let message = create_message(
            &conn,
            &NewMessage {
                sender: sender_id,
                receiver,
                content,
            },
        )?;
        Ok(message.into_payload(sender_name, receiver_user.user_name))
    })
    .await
    .map_err(|e| RelayError::Server(format!("task join error: {}", e)))??;

    state
        .rooms
        .emit(&payload.receiver, &ServerEvent::ReceiveMessage(payload.clone()))
        .await;
    state
        .rooms
        .emit(&payload.sender, &ServerEvent::MessageSent(payload.clone()))
        .await;

    Ok(payload)
}

/// Handles one `sendMessage` request end to end.
///
/// The acknowledgement goes only to `origin`, the connection that sent the
/// request, and precedes the receiver's notification.
pub async fn send_message(
    state: &AppState,
    sender: &User,
    request_id: u64,
    receiver_id: &str,
    content: &str,
    origin: &mpsc::Sender<String>,
) -> Ack {
    let ack = match relay_message(state, sender, receiver_id, content).await {
        Ok(payload) => Ack::Success { message: payload },
        Err(e) => {
            match &e {
                RelayError::Server(detail) => tracing::error!(
                    user_id = %sender.id,
                    receiver_id = %receiver_id,
                    code = %e.code(),
                    "send failed: {}",
                    detail
                ),
                _ => tracing::warn!(
                    user_id = %sender.id,
                    receiver_id = %receiver_id,
                    code = %e.code(),
                    "send rejected: {}",
                    e
                ),
            }
            Ack::error(e.code(), e.to_string())
        }
    };

    // Never dropped: waits for space in the origin's buffer.
    let frame = ServerEvent::Ack {
        request_id,
        ack: ack.clone(),
    };
    match serde_json::to_string(&frame) {
        Ok(json) => {
            if origin.send(json).await.is_err() {
                tracing::debug!(user_id = %sender.id, request_id, "connection closed before ack");
            }
        }
        Err(e) => tracing::error!("failed to serialize ack: {}", e),
    }

    if let Ack::Success { message } = &ack {
        notify_if_online(state, message).await;
    }
    ack
}

/// Sends `receive_notification` to the receiver only if they have a live
/// connection. Offline receivers get nothing; there is no queue.
pub async fn notify_if_online(state: &AppState, payload: &MessagePayload) {
    if !state.rooms.is_online(&payload.receiver).await {
        tracing::debug!(
            receiver_id = %payload.receiver,
            "notification skipped for offline receiver"
        );
        return;
    }
    state
        .rooms
        .emit(
            &payload.receiver,
            &ServerEvent::Notification(Notification::for_message(payload)),
        )
        .await;
}

/// Relays a typing indicator from `from` to the counterpart's room.
/// Malformed counterpart ids are dropped.
pub async fn relay_typing(state: &AppState, from: &ObjectId, counterpart_id: &str, typing: bool) {
    let Ok(counterpart) = ObjectId::parse(counterpart_id) else {
        tracing::debug!(user_id = %from, "dropping typing indicator with malformed counterpart id");
        return;
    };
    let event = if typing {
        ServerEvent::Typing {
            user_id: from.clone(),
        }
    } else {
        ServerEvent::StopTyping {
            user_id: from.clone(),
        }
    };
    state.rooms.emit(&counterpart, &event).await;
}

/// Queues `event` on a single connection.
pub(crate) fn deliver(tx: &mpsc::Sender<String>, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to queue frame for connection: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize server event: {}", e);
        }
    }
}
