// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tokio driver for [`Controller`]: real sockets, real timers.
//!
//! Each socket runs in its own task and reports back through one event
//! channel. A single pump task applies those events to the controller in
//! delivery order. The controller sits behind a mutex so the owner can call
//! `send`/`close` synchronously; handlers always run after the lock is
//! released.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::controller::{
    ConnId, ConnectionState, Controller, Handlers, Link, RetryToken, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use crate::endpoint::Endpoint;
use crate::error::ChatError;
use crate::reconnect::ReconnectPolicy;

/// Close frame received without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// What a socket or timer task observed.
#[derive(Debug)]
enum LinkEvent {
    Opened(ConnId),
    Frame(ConnId, String),
    Failed(ConnId, String),
    Closed(ConnId, u16),
    RetryDue(RetryToken),
}

/// Instructions for the task that owns a socket's write half.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close(u16),
}

/// [`Link`] backed by `tokio-tungstenite` and `tokio::time`.
pub struct TokioLink {
    events: mpsc::UnboundedSender<LinkEvent>,
    socket: Option<(ConnId, mpsc::UnboundedSender<Outgoing>)>,
    timer: Option<(RetryToken, CancellationToken)>,
    shutdown: CancellationToken,
}

impl TokioLink {
    fn new(events: mpsc::UnboundedSender<LinkEvent>, shutdown: CancellationToken) -> Self {
        Self { events, socket: None, timer: None, shutdown }
    }
}

impl Link for TokioLink {
    fn connect(&mut self, conn: ConnId, url: &str) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.socket = Some((conn, tx));
        tokio::spawn(run_socket(
            conn,
            url.to_owned(),
            rx,
            self.events.clone(),
            self.shutdown.clone(),
        ));
    }

    fn send(&mut self, conn: ConnId, frame: String) -> bool {
        match self.socket {
            Some((current, ref tx)) if current == conn => tx.send(Outgoing::Text(frame)).is_ok(),
            _ => false,
        }
    }

    fn close(&mut self, conn: ConnId, code: u16) {
        if let Some((current, tx)) = self.socket.take() {
            if current == conn {
                let _ = tx.send(Outgoing::Close(code));
            } else {
                self.socket = Some((current, tx));
            }
        }
    }

    fn schedule_retry(&mut self, token: RetryToken, delay: Duration) {
        let cancel = self.shutdown.child_token();
        if let Some((_, previous)) = self.timer.replace((token, cancel.clone())) {
            previous.cancel();
        }
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(LinkEvent::RetryDue(token));
                }
            }
        });
    }

    fn cancel_retry(&mut self, token: RetryToken) {
        if let Some((current, cancel)) = self.timer.take() {
            if current == token {
                cancel.cancel();
            } else {
                self.timer = Some((current, cancel));
            }
        }
    }
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame { code: CloseCode::from(code), reason: String::new().into() }))
}

/// Drive one socket from connect to close.
async fn run_socket(
    conn: ConnId,
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<LinkEvent>,
    shutdown: CancellationToken,
) {
    let connected = tokio::select! {
        _ = shutdown.cancelled() => return,
        out = outgoing.recv() => {
            // Closed before the handshake finished.
            let code = match out {
                Some(Outgoing::Close(code)) => code,
                _ => CLOSE_NORMAL,
            };
            let _ = events.send(LinkEvent::Closed(conn, code));
            return;
        }
        res = tokio_tungstenite::connect_async(url.as_str()) => res,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::debug!(conn, err = %e, "chat ws connect failed");
            let _ = events.send(LinkEvent::Failed(conn, e.to_string()));
            let _ = events.send(LinkEvent::Closed(conn, CLOSE_ABNORMAL));
            return;
        }
    };
    let _ = events.send(LinkEvent::Opened(conn));

    let (mut write, mut read) = ws_stream.split();

    let code = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(close_message(CLOSE_NORMAL)).await;
                return;
            }
            out = outgoing.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = events.send(LinkEvent::Failed(conn, e.to_string()));
                        break CLOSE_ABNORMAL;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    let _ = write.send(close_message(code)).await;
                    break code;
                }
                None => {
                    let _ = write.send(close_message(CLOSE_NORMAL)).await;
                    break CLOSE_NORMAL;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Frame(conn, text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| u16::from(f.code)).unwrap_or(CLOSE_NO_STATUS);
                }
                Some(Ok(_)) => {} // binary, ping, pong
                Some(Err(e)) => {
                    let _ = events.send(LinkEvent::Failed(conn, e.to_string()));
                    break CLOSE_ABNORMAL;
                }
                None => break CLOSE_ABNORMAL,
            },
        }
    };

    tracing::debug!(conn, code, "chat ws closed");
    let _ = events.send(LinkEvent::Closed(conn, code));
}

/// Apply socket and timer events to the controller in order.
async fn pump(
    inner: Arc<Mutex<Controller<TokioLink>>>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let dispatch = {
            let mut ctl = inner.lock();
            match event {
                LinkEvent::Opened(conn) => ctl.handle_opened(conn),
                LinkEvent::Frame(conn, text) => ctl.handle_frame(conn, &text),
                LinkEvent::Failed(conn, detail) => ctl.handle_transport_error(conn, &detail),
                LinkEvent::Closed(conn, code) => ctl.handle_closed(conn, code),
                LinkEvent::RetryDue(token) => ctl.handle_retry_due(token),
            }
            ctl.take_dispatch()
        };
        dispatch.run();
    }
}

/// One chat channel owned by a screen or terminal session.
///
/// Must be created inside a Tokio runtime. Dropping the session disposes it.
pub struct ChatSession {
    inner: Arc<Mutex<Controller<TokioLink>>>,
    shutdown: CancellationToken,
}

impl ChatSession {
    pub fn new(endpoint: Endpoint, policy: ReconnectPolicy, handlers: Handlers) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let link = TokioLink::new(tx, shutdown.clone());
        let inner = Arc::new(Mutex::new(Controller::new(endpoint, policy, link, handlers)));
        tokio::spawn(pump(Arc::clone(&inner), rx, shutdown.clone()));
        Self { inner, shutdown }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Controller<TokioLink>) -> R) -> R {
        let (result, dispatch) = {
            let mut ctl = self.inner.lock();
            let result = f(&mut ctl);
            (result, ctl.take_dispatch())
        };
        dispatch.run();
        result
    }

    /// See [`Controller::open`].
    pub fn open(&self) -> bool {
        self.with(|ctl| ctl.open())
    }

    /// Send chat text; false (and `on_error`) when not connected.
    pub fn send(&self, content: &str, message_type: &str) -> bool {
        self.with(|ctl| ctl.send(content, message_type))
    }

    pub fn close(&self) {
        self.with(|ctl| ctl.close());
    }

    pub fn reconfigure(&self, booking: &str, credential: &str) -> bool {
        self.with(|ctl| ctl.reconfigure(booking, credential))
    }

    pub fn set_handlers(&self, handlers: Handlers) {
        self.inner.lock().set_handlers(handlers);
    }

    /// Close, cancel any pending retry, and stop the event pump.
    pub fn dispose(&self) {
        self.with(|ctl| ctl.dispose());
        self.shutdown.cancel();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state()
    }

    /// WebSocket `readyState` equivalent; `None` before the first open.
    pub fn connection_state(&self) -> Option<u8> {
        self.state().ready_state()
    }

    pub fn attempt_count(&self) -> u32 {
        self.inner.lock().attempt_count()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.inner.lock().last_error().cloned()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            self.dispose();
        }
    }
}
