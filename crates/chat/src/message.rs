// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat message model shared by the codec and the message store.

use serde::{Deserialize, Serialize};

/// Which party authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Client,
    Detailer,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Detailer => "detailer",
        }
    }
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat entry tied to a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Stable across retransmission; used for deduplication.
    pub id: String,
    pub content: String,
    #[serde(alias = "senderType")]
    pub sender_type: SenderType,
    #[serde(alias = "messageType", default = "default_message_type")]
    pub message_type: String,
    /// ISO-8601 timestamp as sent by the server.
    #[serde(alias = "createdAt")]
    pub created_at: String,
    #[serde(alias = "isRead", default)]
    pub is_read: bool,
}

pub(crate) fn default_message_type() -> String {
    "text".to_owned()
}

impl ChatMessage {
    /// Build an optimistic local echo for text the detailer just sent.
    ///
    /// The id is client-generated and will not match a server-assigned id.
    pub fn local(content: &str, message_type: &str) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            content: content.trim().to_owned(),
            sender_type: SenderType::Detailer,
            message_type: message_type.to_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
            is_read: true,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
