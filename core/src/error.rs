/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Ned, a long-form Nostr editor.
 *
 * Ned is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Ned is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Ned.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Fetch errors surfaced to callers.
//!
//! Timeouts and "not found" are not errors: a timed-out session yields whatever it collected,
//! and an addressed lookup that no relay can satisfy returns `Ok(None)`.

use thiserror::Error;

/// Errors from relay sessions, addressed lookups and configuration.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport could not be opened, or failed before the session completed.
    /// No partial results accompany this error.
    #[error("connection to {relay} failed: {reason}")]
    ConnectionFailed { relay: String, reason: String },

    /// Filter rejected before encoding; nothing was sent.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// naddr / npub / hex identifier could not be decoded.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Every candidate relay failed at transport level.
    #[error("all {attempts} relays failed")]
    AllRelaysFailed { attempts: usize },

    /// Addressed lookup was given no candidate relays.
    #[error("no relays to query")]
    NoRelays,

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FetchError {
    pub(crate) fn connection(relay: &str, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            relay: relay.to_string(),
            reason: reason.into(),
        }
    }

    /// True for transport-level failures (the relay was unreachable or dropped us).
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, FetchError::ConnectionFailed { .. })
    }
}
