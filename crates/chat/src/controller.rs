// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle for one booking's chat channel.
//!
//! [`Controller`] is a plain state machine: it never touches a socket or a
//! clock itself. Side effects go out through a [`Link`], and whatever the link
//! observes comes back in through the `handle_*` methods tagged with the
//! connection id or retry token they belong to. Events for a connection or
//! timer the controller has moved past are dropped, which is what keeps a
//! retry from firing after `close()` and an old socket from clobbering a new
//! one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::{self, InboundFrame, OutboundFrame};
use crate::endpoint::Endpoint;
use crate::error::ChatError;
use crate::message::ChatMessage;
use crate::reconnect::{ReconnectPolicy, ReconnectState, RetryDecision};

/// Identifies one underlying socket.
pub type ConnId = u64;
/// Identifies one scheduled reconnect.
pub type RetryToken = u64;

/// Graceful close, used for every client-initiated close.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Socket and timer side effects requested by the controller.
pub trait Link {
    /// Start connecting `conn` to `url`. Outcome arrives as `handle_opened`
    /// or `handle_closed`.
    fn connect(&mut self, conn: ConnId, url: &str);
    /// Transmit one text frame. Returns false if the socket is gone.
    fn send(&mut self, conn: ConnId, frame: String) -> bool;
    fn close(&mut self, conn: ConnId, code: u16);
    /// Call back `handle_retry_due(token)` after `delay`.
    fn schedule_retry(&mut self, token: RetryToken, delay: Duration);
    fn cancel_retry(&mut self, token: RetryToken);
}

/// Lifecycle of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// WebSocket `readyState` equivalent. `None` before any socket exists.
    pub fn ready_state(&self) -> Option<u8> {
        match self {
            Self::Idle => None,
            Self::Connecting => Some(0),
            Self::Open => Some(1),
            Self::Closing => Some(2),
            Self::Closed => Some(3),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type MessageHandler = Arc<dyn Fn(ChatMessage) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ChatError) + Send + Sync>;

/// Callbacks the owner supplies. Replaceable at any time via
/// [`Controller::set_handlers`].
#[derive(Clone)]
pub struct Handlers {
    pub on_message: MessageHandler,
    pub on_error: ErrorHandler,
}

impl Handlers {
    pub fn new(
        on_message: impl Fn(ChatMessage) + Send + Sync + 'static,
        on_error: impl Fn(&ChatError) + Send + Sync + 'static,
    ) -> Self {
        Self { on_message: Arc::new(on_message), on_error: Arc::new(on_error) }
    }

    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers").finish_non_exhaustive()
    }
}

/// Something the owner should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Message(ChatMessage),
    Error(ChatError),
}

/// Queued notices paired with the handlers current when they were taken.
///
/// Run it after releasing any lock around the controller so handlers are free
/// to call back in.
#[must_use]
pub struct Dispatch {
    handlers: Handlers,
    notices: Vec<Notice>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn run(self) {
        for notice in self.notices {
            match notice {
                Notice::Message(message) => (self.handlers.on_message)(message),
                Notice::Error(error) => (self.handlers.on_error)(&error),
            }
        }
    }
}

/// Owns one chat channel's socket lifecycle and reconnect policy.
pub struct Controller<L: Link> {
    endpoint: Endpoint,
    link: L,
    handlers: Handlers,
    state: ConnectionState,
    conn: Option<ConnId>,
    last_conn: ConnId,
    reconnect: ReconnectState,
    retry: Option<RetryToken>,
    last_token: RetryToken,
    closed_by_user: bool,
    disposed: bool,
    last_error: Option<ChatError>,
    notices: Vec<Notice>,
}

impl<L: Link> Controller<L> {
    pub fn new(endpoint: Endpoint, policy: ReconnectPolicy, link: L, handlers: Handlers) -> Self {
        Self {
            endpoint,
            link,
            handlers,
            state: ConnectionState::Idle,
            conn: None,
            last_conn: 0,
            reconnect: ReconnectState::new(policy),
            retry: None,
            last_token: 0,
            closed_by_user: false,
            disposed: false,
            last_error: None,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn attempt_count(&self) -> u32 {
        self.reconnect.attempts()
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn set_handlers(&mut self, handlers: Handlers) {
        self.handlers = handlers;
    }

    /// Hand queued notices off for delivery.
    pub fn take_dispatch(&mut self) -> Dispatch {
        Dispatch { handlers: self.handlers.clone(), notices: std::mem::take(&mut self.notices) }
    }

    /// Open the channel, replacing any live socket.
    ///
    /// Returns false without doing anything when the booking reference or
    /// credential is missing, or after `dispose()`. An explicit open after
    /// retries ran out starts a fresh attempt budget.
    pub fn open(&mut self) -> bool {
        if self.disposed {
            debug!(booking = %self.endpoint.booking(), "open ignored after dispose");
            return false;
        }
        if !self.endpoint.is_ready() {
            debug!("open skipped: booking reference or credential missing");
            return false;
        }
        if self.reconnect.is_exhausted() {
            self.reconnect.reset();
        }
        self.connect();
        true
    }

    fn connect(&mut self) {
        self.cancel_retry();
        self.closed_by_user = false;

        if let Some(old) = self.conn.take() {
            if self.state.is_live() {
                debug!(conn = old, "closing previous socket before reconnect");
                self.link.close(old, CLOSE_NORMAL);
            }
        }

        self.last_conn += 1;
        let conn = self.last_conn;
        self.conn = Some(conn);
        self.state = ConnectionState::Connecting;

        info!(
            booking = %self.endpoint.booking(),
            conn,
            attempt = self.reconnect.attempts(),
            "chat connecting"
        );
        let url = self.endpoint.url();
        self.link.connect(conn, &url);
    }

    /// Manual close. Terminal: nothing reconnects until `open()` is called.
    pub fn close(&mut self) {
        self.closed_by_user = true;
        self.cancel_retry();

        match self.conn {
            Some(conn) if self.state.is_live() => {
                info!(booking = %self.endpoint.booking(), conn, "chat closing");
                self.state = ConnectionState::Closing;
                self.link.close(conn, CLOSE_NORMAL);
            }
            Some(_) => {}
            None => self.state = ConnectionState::Closed,
        }
    }

    /// Owner teardown. The controller never opens again.
    pub fn dispose(&mut self) {
        self.close();
        self.disposed = true;
        self.conn = None;
        self.state = ConnectionState::Closed;
    }

    /// Tear down the current channel and open one for a new booking
    /// reference and credential with a fresh attempt budget.
    pub fn reconfigure(&mut self, booking: &str, credential: &str) -> bool {
        if self.disposed {
            return false;
        }
        self.close();
        self.reconnect.reset();
        self.endpoint = self.endpoint.with_channel(booking, credential);
        self.open()
    }

    /// Send chat text. Only succeeds while the socket is open.
    pub fn send(&mut self, content: &str, message_type: &str) -> bool {
        let conn = match self.conn {
            Some(conn) if self.state == ConnectionState::Open => conn,
            _ => {
                self.report(ChatError::NotConnected);
                return false;
            }
        };

        let frame = codec::encode(&OutboundFrame::new(message_type, content));
        if self.link.send(conn, frame) {
            true
        } else {
            self.report(ChatError::NotConnected);
            false
        }
    }

    pub fn handle_opened(&mut self, conn: ConnId) {
        if !self.is_current(conn) {
            return;
        }
        info!(booking = %self.endpoint.booking(), conn, "chat connected");
        self.state = ConnectionState::Open;
        self.reconnect.on_open();
        self.cancel_retry();
    }

    pub fn handle_frame(&mut self, conn: ConnId, text: &str) {
        if !self.is_current(conn) {
            return;
        }
        match codec::decode(text) {
            Ok(InboundFrame::ChatMessage { message }) => {
                debug!(conn, id = %message.id, "chat message received");
                self.notices.push(Notice::Message(message));
            }
            Ok(InboundFrame::Error { error }) => {
                warn!(conn, error = %error, "server reported error");
                self.report(ChatError::Protocol(error));
            }
            Err(e) => self.report(e),
        }
    }

    pub fn handle_transport_error(&mut self, conn: ConnId, detail: &str) {
        if !self.is_current(conn) {
            return;
        }
        warn!(conn, err = %detail, "chat transport error");
        self.report(ChatError::Transport);
    }

    pub fn handle_closed(&mut self, conn: ConnId, code: u16) {
        if !self.is_current(conn) {
            return;
        }
        self.conn = None;
        self.state = ConnectionState::Closed;

        if self.closed_by_user || self.disposed || code == CLOSE_NORMAL {
            info!(booking = %self.endpoint.booking(), conn, code, "chat closed");
            return;
        }

        match self.reconnect.on_unexpected_close() {
            RetryDecision::Retry { attempt, delay } => {
                self.last_token += 1;
                let token = self.last_token;
                self.retry = Some(token);
                info!(
                    booking = %self.endpoint.booking(),
                    conn,
                    code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "chat closed unexpectedly, reconnecting"
                );
                self.link.schedule_retry(token, delay);
            }
            RetryDecision::AlreadyPending => {
                debug!(conn, code, "reconnect already pending");
            }
            RetryDecision::Exhausted => {
                warn!(
                    booking = %self.endpoint.booking(),
                    attempts = self.reconnect.attempts(),
                    "chat reconnect attempts exhausted"
                );
                self.report(ChatError::RetryExhausted);
            }
            RetryDecision::GaveUp => {}
        }
    }

    pub fn handle_retry_due(&mut self, token: RetryToken) {
        if self.retry != Some(token) {
            debug!(token, "stale reconnect timer ignored");
            return;
        }
        self.retry = None;
        self.reconnect.clear_pending();
        if self.closed_by_user || self.disposed {
            return;
        }
        self.connect();
    }

    fn is_current(&self, conn: ConnId) -> bool {
        let current = self.conn == Some(conn);
        if !current {
            debug!(conn, "event for stale connection ignored");
        }
        current
    }

    fn cancel_retry(&mut self) {
        if let Some(token) = self.retry.take() {
            self.link.cancel_retry(token);
        }
        self.reconnect.clear_pending();
    }

    fn report(&mut self, error: ChatError) {
        self.last_error = Some(error.clone());
        self.notices.push(Notice::Error(error));
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
