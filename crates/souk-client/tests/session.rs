//! Session behaviour against a scripted WebSocket peer.

use futures_util::{SinkExt, StreamExt};
use souk_client::{ChatSession, ClientConfig, ClientError, ConnectionState, EVENT_BUFFER};
use souk_types::{Ack, ErrorCode, MessagePayload, MessageStatus, ObjectId, ServerEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{http, Message};
use tokio_tungstenite::WebSocketStream;

fn fast_config(addr: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        max_reconnect_attempts: 2,
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(40),
        connect_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_secs(2),
        ..ClientConfig::new(format!("http://{addr}"), "token")
    }
}

/// Answers every `sendMessage` with a success ack, preceded by a typing
/// frame when `chatter` is set.
async fn serve_acks(mut ws: WebSocketStream<TcpStream>, chatter: bool) {
    while let Some(Ok(Message::Text(text))) = ws.next().await {
        let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        let request_id = frame["requestId"].as_u64().unwrap();
        let sender = ObjectId::parse("aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let message = MessagePayload {
            id: ObjectId::generate(),
            sender: sender.clone(),
            receiver: ObjectId::parse(frame["receiverId"].as_str().unwrap()).unwrap(),
            sender_name: "alice".to_string(),
            receiver_name: "bob".to_string(),
            content: frame["content"].as_str().unwrap().to_string(),
            status: MessageStatus::Sent,
            timestamp: chrono::Utc::now(),
        };

        let mut replies = Vec::new();
        if chatter {
            replies.push(ServerEvent::Typing { user_id: sender });
        }
        replies.push(ServerEvent::Ack {
            request_id,
            ack: Ack::Success { message },
        });
        for event in replies {
            let text = serde_json::to_string(&event).unwrap();
            if ws.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::test]
async fn rejected_credential_is_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));

    let counter = handshakes.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                Err(http::Response::builder()
                    .status(http::StatusCode::UNAUTHORIZED)
                    .body(None)
                    .unwrap())
            };
            let _ = tokio_tungstenite::accept_hdr_async(tcp, reject).await;
        }
    });

    let result = ChatSession::connect(fast_config(addr)).await;
    assert!(matches!(result, Err(ClientError::Auth)));
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drop_fails_pending_send_and_gives_up_after_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        // Wait for the send, then vanish without acknowledging it. The
        // listener goes first so every reconnection attempt is refused.
        let _ = ws.next().await;
        drop(listener);
        drop(ws);
    });

    let (session, _events) = ChatSession::connect(fast_config(addr)).await.unwrap();
    assert_eq!(session.current_state(), ConnectionState::Connected);

    let receiver = ObjectId::parse("bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
    let result = session.send_message(&receiver, "hello").await;
    assert!(matches!(result, Err(ClientError::Closed)), "{result:?}");

    let mut state = session.state();
    let mut attempts = Vec::new();
    loop {
        let current = *state.borrow_and_update();
        if let ConnectionState::Reconnecting { attempt } = current {
            if attempts.last() != Some(&attempt) {
                attempts.push(attempt);
            }
        }
        if current == ConnectionState::Disconnected {
            break;
        }
        tokio::time::timeout(Duration::from_secs(5), state.changed())
            .await
            .expect("state should keep moving")
            .unwrap();
    }
    assert_eq!(attempts, vec![1, 2]);

    let after = session.send_message(&receiver, "again").await;
    assert!(matches!(after, Err(ClientError::Closed)));
}

#[tokio::test]
async fn acks_resolve_sends_and_other_frames_reach_the_application() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = ObjectId::parse("cccccccccccccccccccccccc").unwrap();

    let typing_from = peer.clone();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(frame["type"], "sendMessage");
            let request_id = frame["requestId"].as_u64().unwrap();

            let typing = ServerEvent::Typing {
                user_id: typing_from.clone(),
            };
            let ack = ServerEvent::Ack {
                request_id,
                ack: Ack::error(ErrorCode::InvalidId, "Invalid receiver ID format"),
            };
            for event in [typing, ack] {
                let text = serde_json::to_string(&event).unwrap();
                ws.send(Message::Text(text.into())).await.unwrap();
            }
        }
    });

    let (session, mut events) = ChatSession::connect(fast_config(addr)).await.unwrap();

    match session.send_message("xyz", "hi").await {
        Err(ClientError::Send { code, message }) => {
            assert_eq!(code, ErrorCode::InvalidId);
            assert_eq!(message, "Invalid receiver ID format");
        }
        other => panic!("expected an error ack, got {other:?}"),
    }

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ServerEvent::Typing { user_id: peer });

    session.close().await;
    let mut state = session.state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn dropped_connection_reconnects_and_sends_again() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let first = tokio_tungstenite::accept_async(tcp).await.unwrap();
        drop(first);

        let (tcp, _) = listener.accept().await.unwrap();
        let second = tokio_tungstenite::accept_async(tcp).await.unwrap();
        serve_acks(second, false).await;
    });

    let config = ClientConfig {
        initial_backoff: Duration::from_millis(200),
        max_backoff: Duration::from_millis(400),
        ..fast_config(addr)
    };
    let (session, _events) = ChatSession::connect(config).await.unwrap();
    let mut state = session.state();

    let reconnecting = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })),
    )
    .await
    .unwrap()
    .map(|s| *s)
    .unwrap();
    assert_eq!(reconnecting, ConnectionState::Reconnecting { attempt: 1 });

    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let receiver = ObjectId::parse("bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
    let message = session.send_message(&receiver, "after reconnect").await.unwrap();
    assert_eq!(message.content, "after reconnect");
    assert_eq!(message.receiver, receiver);
}

#[tokio::test]
async fn unread_events_do_not_hold_up_acks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        serve_acks(ws, true).await;
    });

    let (session, mut events) = ChatSession::connect(fast_config(addr)).await.unwrap();
    let receiver = ObjectId::parse("bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

    let total = EVENT_BUFFER + 44;
    for n in 0..total {
        let result = session.send_message(&receiver, &format!("m{n}")).await;
        assert!(result.is_ok(), "send #{n} failed: {result:?}");
    }
    assert_eq!(session.current_state(), ConnectionState::Connected);

    let mut buffered = 0;
    while events.try_recv().is_ok() {
        buffered += 1;
    }
    assert_eq!(buffered, EVENT_BUFFER);
}
