// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failures surfaced to the `on_error` handler.
///
/// None of these cross the session boundary as an `Err`; they are reported
/// through the handler and the connection keeps going where it can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Socket-level failure reported by the transport.
    Transport,
    /// The server sent an `error` frame.
    Protocol(String),
    /// An inbound frame could not be decoded.
    Decode,
    /// `send` was called while the socket was not open.
    NotConnected,
    /// Reconnection gave up after the maximum number of attempts.
    RetryExhausted,
}

impl ChatError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Protocol(_) => "PROTOCOL",
            Self::Decode => "DECODE",
            Self::NotConnected => "NOT_CONNECTED",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
        }
    }

    /// User-facing text for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport => "WebSocket connection error",
            Self::Protocol(message) => message,
            Self::Decode => "Failed to parse message",
            Self::NotConnected => "Not connected to chat",
            Self::RetryExhausted => "Connection lost. Please refresh the page.",
        }
    }

    /// Whether the connection will make no further automatic progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetryExhausted)
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ChatError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
