// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Where one chat channel lives: base root, booking reference, credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    booking: String,
    credential: String,
}

impl Endpoint {
    pub fn new(
        base: impl Into<String>,
        booking: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self { base: base.into(), booking: booking.into(), credential: credential.into() }
    }

    pub fn booking(&self) -> &str {
        &self.booking
    }

    /// Both booking reference and credential are present.
    pub fn is_ready(&self) -> bool {
        !self.booking.trim().is_empty() && !self.credential.trim().is_empty()
    }

    /// Same base, new booking reference and credential.
    pub fn with_channel(&self, booking: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::new(self.base.clone(), booking, credential)
    }

    /// `<base>chat/<booking>/<credential>/`
    pub fn url(&self) -> String {
        format!("{}chat/{}/{}/", ws_base(&self.base), self.booking, self.credential)
    }
}

/// Convert http(s):// to ws(s):// and make sure the root ends with `/`.
fn ws_base(base: &str) -> String {
    let mut ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };
    if !ws.ends_with('/') {
        ws.push('/');
    }
    ws
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
