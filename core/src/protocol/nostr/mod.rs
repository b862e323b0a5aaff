/*
 * mod.rs
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

//! Nostr long-form fetch engine (NIP-01 wire messages, NIP-23 articles, NIP-19 addresses).
//!
//! One transient relay connection per request: a session subscribes, collects until EOSE or
//! timeout, then unsubscribes and closes. Addressed lookups walk a relay list in order;
//! listings page backwards with an `until` cursor.

mod fallback;
mod keys;
mod message;
mod pagination;
mod session;
mod transport;
mod types;

pub use fallback::{fetch_by_address, fetch_by_naddr, relay_candidates};
pub use keys::{hex_to_npub, is_naddr, is_npub, is_valid_hex_key, npub_to_hex, public_key_to_hex};
pub use message::{decode, encode_subscribe, encode_unsubscribe, DecodeError, RelayMessage};
pub use pagination::{next_cursor, PageResult, Paginator};
pub use session::{
    fetch_events, fetch_page, new_subscription_id, RelaySession, SessionEnd, SessionOutcome, SessionState,
};
pub use transport::{Connector, MessageHandler, RelayTransport, WebSocketConnector};
pub use types::{
    project_to_article, Address, Article, Filter, Query, RawEvent, DEFAULT_PAGE_SIZE, KIND_LONG_FORM,
    MAX_PAGE_SIZE,
};
