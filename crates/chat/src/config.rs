// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::endpoint::Endpoint;
use crate::reconnect::ReconnectPolicy;

/// Booking chat client for detailers.
#[derive(Debug, Clone, Parser)]
#[command(name = "detailer-chat", version, about)]
pub struct ChatConfig {
    /// WebSocket endpoint root; `http(s)://` is rewritten to `ws(s)://`.
    #[arg(long, env = "DETAILER_CHAT_WS_BASE", default_value = "ws://127.0.0.1:8000/ws/")]
    pub ws_base: String,

    /// Booking reference of the chat channel.
    #[arg(long, env = "DETAILER_CHAT_BOOKING")]
    pub booking: Option<String>,

    /// Access token identifying the detailer.
    #[arg(long, env = "DETAILER_CHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Unexpected closes tolerated before giving up.
    #[arg(long, env = "DETAILER_CHAT_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// First reconnect delay unit in milliseconds (doubled per attempt).
    #[arg(long, env = "DETAILER_CHAT_BASE_DELAY_MS", default_value_t = 1000)]
    pub base_delay_ms: u64,

    /// Reconnect delay cap in milliseconds.
    #[arg(long, env = "DETAILER_CHAT_MAX_DELAY_MS", default_value_t = 30000)]
    pub max_delay_ms: u64,

    /// Log format (json or text).
    #[arg(long, env = "DETAILER_CHAT_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DETAILER_CHAT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ChatConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.booking.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            anyhow::bail!("--booking is required");
        }
        if self.token.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            anyhow::bail!("--token is required");
        }
        if self.base_delay_ms == 0 || self.max_delay_ms == 0 {
            anyhow::bail!("reconnect delays must be positive");
        }
        if self.max_delay_ms < self.base_delay_ms {
            anyhow::bail!("--max-delay-ms must be at least --base-delay-ms");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.ws_base.clone(),
            self.booking.clone().unwrap_or_default(),
            self.token.clone().unwrap_or_default(),
        )
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
