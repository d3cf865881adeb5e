//! Realtime connection to the gateway.
//!
//! A background task owns the WebSocket. It forwards outbound frames,
//! matches `ack` frames to the `send_message` call waiting on them, passes
//! every other server frame to the application, and reconnects with bounded
//! exponential backoff when the connection drops.

use crate::typing::TypingSignal;
use crate::{ClientConfig, ClientError};
use futures_util::{SinkExt, StreamExt};
use souk_types::{Ack, ClientEvent, MessagePayload, ObjectId, ServerEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, http::StatusCode, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AckReply = oneshot::Sender<Result<MessagePayload, ClientError>>;

/// Server frames buffered for the application. Frames beyond this are
/// dropped with a warning; acks are never affected.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for or performing reconnection attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
}

enum Command {
    Send {
        request_id: u64,
        frame: String,
        reply: AckReply,
    },
    Frame(String),
    /// Stop waiting for an ack that timed out.
    Forget(u64),
    Close,
}

/// Handle to a live chat connection.
pub struct ChatSession {
    config: ClientConfig,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    next_request: AtomicU64,
}

impl ChatSession {
    /// Connects to the gateway and returns the session together with the
    /// stream of server frames (everything except acks).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` at once if the credential is rejected, or
    /// the last connection error once the retry budget is spent.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let stream = match open_socket(&config).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.is_retryable() => {
                tracing::warn!("initial connection failed: {}", e);
                reconnect(&config, &state_tx).await
            }
            Err(e) => Err(e),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        state_tx.send_replace(ConnectionState::Connected);

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(drive(config.clone(), stream, cmd_rx, event_tx, state_tx));

        Ok((
            Self {
                config,
                commands: cmd_tx,
                state: state_rx,
                next_request: AtomicU64::new(1),
            },
            event_rx,
        ))
    }

    /// Watch channel following the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Sends a message and waits for the server's acknowledgement.
    ///
    /// Nothing is queued while disconnected: the call fails with
    /// `ClientError::Closed` and the caller decides what to do with the text.
    pub async fn send_message(
        &self,
        receiver_id: impl AsRef<str>,
        content: &str,
    ) -> Result<MessagePayload, ClientError> {
        if self.current_state() != ConnectionState::Connected {
            return Err(ClientError::Closed);
        }
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let frame = encode(&ClientEvent::SendMessage {
            request_id,
            receiver_id: receiver_id.as_ref().to_string(),
            content: content.to_string(),
        })?;

        let (reply, wait) = oneshot::channel();
        self.commands
            .send(Command::Send {
                request_id,
                frame,
                reply,
            })
            .await
            .map_err(|_| ClientError::Closed)?;

        match tokio::time::timeout(self.config.ack_timeout, wait).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                let _ = self.commands.try_send(Command::Forget(request_id));
                Err(ClientError::Timeout)
            }
        }
    }

    /// Forwards a typing signal for the conversation with `counterpart`.
    /// Dropped silently while disconnected.
    pub async fn typing(
        &self,
        counterpart: &ObjectId,
        signal: TypingSignal,
    ) -> Result<(), ClientError> {
        if self.current_state() != ConnectionState::Connected {
            return Ok(());
        }
        let counterpart_id = counterpart.to_string();
        let event = match signal {
            TypingSignal::Start => ClientEvent::Typing { counterpart_id },
            TypingSignal::Stop => ClientEvent::StopTyping { counterpart_id },
        };
        self.commands
            .send(Command::Frame(encode(&event)?))
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Closes the connection. Pending sends fail with `ClientError::Closed`.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

fn encode(event: &ClientEvent) -> Result<String, ClientError> {
    serde_json::to_string(event).map_err(|e| ClientError::Protocol(e.to_string()))
}

async fn open_socket(config: &ClientConfig) -> Result<WsStream, ClientError> {
    let url = config.socket_url()?;
    let (stream, _) = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(|e| match e {
            tungstenite::Error::Http(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                ClientError::Auth
            }
            other => ClientError::Connect(other.to_string()),
        })?;
    tracing::info!(base_url = %config.base_url, "websocket connected");
    Ok(stream)
}

/// Retries the connection up to `max_reconnect_attempts` times.
async fn reconnect(
    config: &ClientConfig,
    state: &watch::Sender<ConnectionState>,
) -> Result<WsStream, ClientError> {
    let mut last = ClientError::Closed;
    for attempt in 0..config.max_reconnect_attempts {
        state.send_replace(ConnectionState::Reconnecting {
            attempt: attempt + 1,
        });
        let delay = config.backoff(attempt);
        tracing::info!(
            attempt = attempt + 1,
            backoff_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        tokio::time::sleep(delay).await;

        match open_socket(config).await {
            Ok(stream) => return Ok(stream),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::warn!(attempt = attempt + 1, "reconnection attempt failed: {}", e);
                last = e;
            }
        }
    }
    Err(last)
}

fn fail_pending(pending: &mut HashMap<u64, AckReply>) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(ClientError::Closed));
    }
}

/// Resolves an ack, or forwards any other frame to the application.
fn dispatch(
    text: &str,
    pending: &mut HashMap<u64, AckReply>,
    events: &mpsc::Sender<ServerEvent>,
) {
    let event = match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("ignoring unparseable server frame: {}", e);
            return;
        }
    };

    match event {
        ServerEvent::Ack { request_id, ack } => {
            let Some(reply) = pending.remove(&request_id) else {
                tracing::debug!(request_id, "ack for unknown or expired request");
                return;
            };
            let result = match ack {
                Ack::Success { message } => Ok(message),
                Ack::Error { error, code } => Err(ClientError::Send {
                    code,
                    message: error,
                }),
            };
            let _ = reply.send(result);
        }
        other => match events.try_send(other) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("event buffer full, dropping server frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("event receiver dropped, discarding server frame");
            }
        },
    }
}

async fn drive(
    config: ClientConfig,
    mut stream: WsStream,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ServerEvent>,
    state: watch::Sender<ConnectionState>,
) {
    let mut pending: HashMap<u64, AckReply> = HashMap::new();

    loop {
        let dropped = tokio::select! {
            cmd = commands.recv() => match cmd {
                None | Some(Command::Close) => {
                    let _ = stream.close(None).await;
                    break;
                }
                Some(Command::Send { request_id, frame, reply }) => {
                    if stream.send(Message::Text(frame.into())).await.is_err() {
                        let _ = reply.send(Err(ClientError::Closed));
                        true
                    } else {
                        pending.insert(request_id, reply);
                        false
                    }
                }
                Some(Command::Frame(frame)) => {
                    stream.send(Message::Text(frame.into())).await.is_err()
                }
                Some(Command::Forget(request_id)) => {
                    pending.remove(&request_id);
                    false
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    dispatch(text.as_str(), &mut pending, &events);
                    false
                }
                Some(Ok(Message::Close(_))) | None => true,
                Some(Err(e)) => {
                    tracing::warn!("websocket error: {}", e);
                    true
                }
                Some(Ok(_)) => false,
            },
        };

        if dropped {
            tracing::warn!(pending = pending.len(), "connection lost");
            fail_pending(&mut pending);
            match reconnect(&config, &state).await {
                Ok(new_stream) => {
                    stream = new_stream;
                    state.send_replace(ConnectionState::Connected);
                    tracing::info!("reconnected");
                }
                Err(e) => {
                    tracing::warn!("giving up on reconnection: {}", e);
                    break;
                }
            }
        }
    }

    fail_pending(&mut pending);
    state.send_replace(ConnectionState::Disconnected);
    tracing::info!("chat session closed");
}
