/*
 * lib.rs
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

//! Ned core: client-side Nostr relay fetch engine for long-form (NIP-23) articles.
//!
//! Entry points take an explicit [`config::FetchConfig`] and a
//! [`protocol::nostr::Connector`]; production code uses [`protocol::nostr::WebSocketConnector`].

pub mod config;
pub mod error;
pub mod net;
pub mod protocol;

pub use config::FetchConfig;
pub use error::FetchError;
