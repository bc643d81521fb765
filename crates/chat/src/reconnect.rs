// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff after unexpected disconnects.

use std::time::Duration;

/// Retry limits and delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do about one unexpected close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule a reconnect after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// A retry is already scheduled; do nothing.
    AlreadyPending,
    /// Attempts just ran out. Report once.
    Exhausted,
    /// Attempts ran out earlier; stay quiet.
    GaveUp,
}

/// Attempt bookkeeping for one controller.
#[derive(Debug, Default)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    pending: bool,
    exhausted: bool,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0, pending: false, exhausted: false }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Decide on an unexpected close. Marks a retry pending when one is issued.
    pub fn on_unexpected_close(&mut self) -> RetryDecision {
        if self.exhausted {
            return RetryDecision::GaveUp;
        }
        if self.pending {
            return RetryDecision::AlreadyPending;
        }
        if self.attempts >= self.policy.max_attempts {
            self.exhausted = true;
            return RetryDecision::Exhausted;
        }
        self.attempts += 1;
        self.pending = true;
        RetryDecision::Retry { attempt: self.attempts, delay: self.policy.delay_for(self.attempts) }
    }

    /// The pending retry fired or was cancelled.
    pub fn clear_pending(&mut self) {
        self.pending = false;
    }

    /// A connection opened successfully.
    pub fn on_open(&mut self) {
        self.attempts = 0;
        self.pending = false;
    }

    /// Forget all history, e.g. when the channel is reconfigured.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.pending = false;
        self.exhausted = false;
    }
}

#[cfg(test)]
#[path = "reconnect_tests.rs"]
mod tests;
