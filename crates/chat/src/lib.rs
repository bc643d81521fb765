// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime booking chat for detailers: one reconnecting WebSocket channel
//! per booking, frame codec, and a session-scoped message store.

pub mod codec;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod reconnect;
pub mod session;
pub mod store;

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::ChatConfig;
use crate::controller::Handlers;
use crate::message::ChatMessage;
use crate::session::ChatSession;
use crate::store::MessageStore;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider used for `wss://` connections.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing/logging from config. Logs go to stderr; stdout carries
/// the conversation.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &ChatConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// How a terminal chat session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Input ended or the user interrupted.
    Finished,
    /// Reconnection gave up.
    ConnectionLost,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Finished => 0,
            Self::ConnectionLost => 1,
        }
    }
}

/// One line of terminal output for a message.
pub fn render(message: &ChatMessage) -> String {
    format!("[{}] {}", message.sender_type, message.content)
}

/// Run an interactive chat session: stdin lines are sent, incoming messages
/// are printed once each.
pub async fn run(config: ChatConfig) -> anyhow::Result<Outcome> {
    config.validate()?;
    ensure_crypto();

    let store = Arc::new(Mutex::new(MessageStore::new()));
    let lost = CancellationToken::new();

    let handlers = {
        let store = Arc::clone(&store);
        let lost = lost.clone();
        Handlers::new(
            move |message: ChatMessage| {
                let line = render(&message);
                if store.lock().add_from_network(message) {
                    println!("{line}");
                }
            },
            move |error| {
                eprintln!("error: {error}");
                if error.is_terminal() {
                    lost.cancel();
                }
            },
        )
    };

    let endpoint = config.endpoint();
    tracing::info!(booking = %endpoint.booking(), "starting chat session");
    let session = ChatSession::new(endpoint, config.reconnect_policy(), handlers);
    if !session.open() {
        anyhow::bail!("booking reference and token are required");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            _ = lost.cancelled() => break Outcome::ConnectionLost,
            _ = tokio::signal::ctrl_c() => break Outcome::Finished,
            line = lines.next_line() => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if session.send(&line, "text") {
                        store.lock().add_local(ChatMessage::local(&line, "text"));
                    }
                }
                None => break Outcome::Finished,
            },
        }
    };

    session.dispose();
    tracing::info!(?outcome, messages = store.lock().len(), "chat session ended");
    Ok(outcome)
}
