// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for `ChatSession` against an in-process chat server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::json;

use detailer_chat::controller::{ConnectionState, Handlers};
use detailer_chat::endpoint::Endpoint;
use detailer_chat::error::ChatError;
use detailer_chat::message::ChatMessage;
use detailer_chat::reconnect::ReconnectPolicy;
use detailer_chat::session::ChatSession;
use detailer_chat::store::MessageStore;

const TIMEOUT: Duration = Duration::from_secs(5);

// -- Test server --------------------------------------------------------------

/// Channels the server has accepted, as `(booking, token)`.
#[derive(Clone, Default)]
struct ServerState {
    connections: Arc<Mutex<Vec<(String, String)>>>,
}

impl ServerState {
    fn count(&self) -> usize {
        self.connections.lock().len()
    }
}

fn chat_frame(id: &str, content: &str, sender: &str) -> String {
    json!({
        "type": "chat_message",
        "message": {
            "id": id,
            "content": content,
            "sender_type": sender,
            "message_type": "text",
            "created_at": "2026-03-01T10:00:00Z",
            "is_read": false,
        }
    })
    .to_string()
}

async fn chat_handler(
    State(state): State<ServerState>,
    Path((booking, token)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, booking, token, socket))
}

/// Greets with the same message twice, echoes sends with a server id, and
/// closes on the magic words `drop` (1011) and `bye` (1000).
async fn handle_socket(state: ServerState, booking: String, token: String, mut socket: WebSocket) {
    state.connections.lock().push((booking, token.clone()));

    if token == "bad" {
        let frame = json!({ "type": "error", "message": "Authentication failed" }).to_string();
        let _ = socket.send(Message::Text(frame.into())).await;
        let _ = socket.send(close(1000)).await;
        return;
    }

    for _ in 0..2 {
        let frame = chat_frame("m1", "Gate code is 4412", "client");
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    let mut seq = 0;
    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            let _ = socket.send(Message::Text("not json".to_owned().into())).await;
            continue;
        };
        let content = value["content"].as_str().unwrap_or_default().to_owned();
        match content.as_str() {
            "drop" => {
                let _ = socket.send(close(1011)).await;
                return;
            }
            "bye" => {
                let _ = socket.send(close(1000)).await;
                return;
            }
            _ => {
                seq += 1;
                let frame = chat_frame(&format!("srv-{seq}"), &content, "detailer");
                let _ = socket.send(Message::Text(frame.into())).await;
            }
        }
    }
}

fn close(code: u16) -> Message {
    Message::Close(Some(CloseFrame { code, reason: String::new().into() }))
}

async fn spawn_server() -> anyhow::Result<(SocketAddr, ServerState)> {
    let state = ServerState::default();
    let app = Router::new()
        .route("/ws/chat/{booking}/{token}/", get(chat_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, state))
}

// -- Client helpers -----------------------------------------------------------

#[derive(Default)]
struct Seen {
    messages: Mutex<Vec<ChatMessage>>,
    errors: Mutex<Vec<ChatError>>,
}

impl Seen {
    fn handlers(self: &Arc<Self>) -> Handlers {
        let on_message = Arc::clone(self);
        let on_error = Arc::clone(self);
        Handlers::new(
            move |m| on_message.messages.lock().push(m),
            move |e| on_error.errors.lock().push(e.clone()),
        )
    }

    fn errors(&self) -> Vec<ChatError> {
        self.errors.lock().clone()
    }

    fn contents(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.content.clone()).collect()
    }
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if check() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// -- Tests --------------------------------------------------------------------

#[tokio::test]
async fn connects_to_booking_channel_and_exchanges_messages() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    assert_eq!(session.connection_state(), None);
    assert!(session.open());
    wait_until("connected", || session.is_connected()).await?;
    assert_eq!(session.connection_state(), Some(1));
    wait_until("server accept", || server.count() == 1).await?;
    assert_eq!(server.connections.lock()[0], ("BK123".to_owned(), "tok_abc".to_owned()));

    // Both copies of the greeting reach the handler; the store keeps one.
    wait_until("greeting", || seen.contents().len() == 2).await?;
    let mut store = MessageStore::new();
    for m in seen.messages.lock().clone() {
        store.add_from_network(m);
    }
    assert_eq!(store.len(), 1);

    assert!(session.send("  on my way  ", "text"));
    wait_until("echo", || seen.contents().contains(&"on my way".to_owned())).await?;
    assert!(seen.errors().is_empty());

    session.dispose();
    assert_eq!(session.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn send_before_connect_is_rejected() -> anyhow::Result<()> {
    let (addr, _server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    assert!(!session.send("hello", "text"));
    assert_eq!(seen.errors(), vec![ChatError::NotConnected]);
    assert_eq!(session.last_error(), Some(ChatError::NotConnected));
    Ok(())
}

#[tokio::test]
async fn unexpected_server_close_reconnects() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    session.open();
    wait_until("connected", || session.is_connected()).await?;
    assert!(session.send("drop", "text"));

    wait_until("second connection", || server.count() == 2).await?;
    wait_until("reconnected", || session.is_connected()).await?;
    assert_eq!(session.attempt_count(), 0);
    Ok(())
}

#[tokio::test]
async fn graceful_server_close_does_not_reconnect() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    session.open();
    wait_until("connected", || session.is_connected()).await?;
    assert!(session.send("bye", "text"));

    wait_until("closed", || session.state() == ConnectionState::Closed).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.count(), 1);
    Ok(())
}

#[tokio::test]
async fn manual_close_does_not_reconnect() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    session.open();
    wait_until("connected", || session.is_connected()).await?;
    session.close();

    wait_until("closed", || session.state() == ConnectionState::Closed).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.count(), 1);
    assert!(!session.is_connected());
    Ok(())
}

#[tokio::test]
async fn auth_failure_frame_is_reported() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "bad");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    session.open();
    wait_until("error frame", || !seen.errors().is_empty()).await?;
    assert_eq!(seen.errors()[0], ChatError::Protocol("Authentication failed".to_owned()));

    wait_until("closed", || session.state() == ConnectionState::Closed).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.count(), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_exhausts_retries_once() -> anyhow::Result<()> {
    // Reserve a port and release it so nothing is listening.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(2), seen.handlers());

    session.open();
    wait_until("exhaustion", || seen.errors().contains(&ChatError::RetryExhausted)).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let errors = seen.errors();
    let exhausted = errors.iter().filter(|e| **e == ChatError::RetryExhausted).count();
    let transport = errors.iter().filter(|e| **e == ChatError::Transport).count();
    assert_eq!(exhausted, 1);
    assert_eq!(transport, 3, "errors: {errors:?}");
    assert_eq!(session.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn reconfigure_switches_booking() -> anyhow::Result<()> {
    let (addr, server) = spawn_server().await?;
    let seen = Arc::new(Seen::default());
    let endpoint = Endpoint::new(format!("ws://{addr}/ws/"), "BK123", "tok_abc");
    let session = ChatSession::new(endpoint, fast_policy(5), seen.handlers());

    session.open();
    wait_until("connected", || session.is_connected()).await?;
    assert!(session.reconfigure("BK456", "tok_xyz"));

    wait_until("second channel", || server.count() == 2).await?;
    wait_until("connected again", || session.is_connected()).await?;
    assert_eq!(server.connections.lock()[1], ("BK456".to_owned(), "tok_xyz".to_owned()));
    Ok(())
}
