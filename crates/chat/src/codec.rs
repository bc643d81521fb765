// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec: JSON text frames to typed chat events and back.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::message::ChatMessage;

/// Frames the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    ChatMessage {
        message: ChatMessage,
    },
    Error {
        // The auth-failure frame uses `message` instead of `error`.
        #[serde(alias = "message")]
        error: String,
    },
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
}

impl OutboundFrame {
    /// Content is trimmed; blank content is the caller's problem.
    pub fn new(message_type: &str, content: &str) -> Self {
        Self { message_type: message_type.to_owned(), content: content.trim().to_owned() }
    }
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<InboundFrame, ChatError> {
    serde_json::from_str(text).map_err(|e| {
        tracing::debug!(err = %e, "inbound frame rejected");
        ChatError::Decode
    })
}

/// Encode one outbound frame as JSON text.
pub fn encode(frame: &OutboundFrame) -> String {
    // Two string fields cannot fail to serialize.
    serde_json::to_string(frame).unwrap_or_default()
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
