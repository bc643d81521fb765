// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-scoped message list.

use std::collections::HashSet;

use crate::message::ChatMessage;

/// Messages for one chat session in arrival order.
///
/// Network messages are deduplicated by id; local echoes are appended as-is.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message received from the server unless its id is already
    /// present. Returns whether it was appended.
    pub fn add_from_network(&mut self, message: ChatMessage) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    /// Append an optimistic local echo without any dedup.
    pub fn add_local(&mut self, message: ChatMessage) {
        self.ids.insert(message.id.clone());
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
