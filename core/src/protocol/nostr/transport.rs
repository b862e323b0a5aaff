/*
 * transport.rs
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

//! Transport seam between relay sessions and the network. Sessions only see text messages;
//! the production implementation is our WebSocket client, tests use scripted transports.

use async_trait::async_trait;
use std::io;

use crate::protocol::websocket::{WebSocketClient, WebSocketConnection};

/// Receives inbound text messages from a transport's read loop.
pub trait MessageHandler: Send {
    fn text_message(&mut self, text: &str);

    /// Checked after every message; when true the read loop returns.
    fn should_stop(&self) -> bool {
        false
    }
}

/// One connection to one relay, owned exclusively by a session.
#[async_trait]
pub trait RelayTransport: Send {
    async fn send_text(&mut self, text: &str) -> io::Result<()>;

    /// Feed inbound messages to `handler` until it asks to stop (`Ok`), the peer closes (`Ok`)
    /// or the connection fails (`Err`).
    async fn run(&mut self, handler: &mut dyn MessageHandler) -> io::Result<()>;

    /// Release the connection. Sessions call this at most once.
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens transports by relay URL.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: RelayTransport + 'static;

    async fn open(&self, relay_url: &str) -> io::Result<Self::Transport>;
}

/// Connector for `ws://` and `wss://` relays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketConnection;

    async fn open(&self, relay_url: &str) -> io::Result<WebSocketConnection> {
        WebSocketClient::connect(relay_url).await
    }
}

#[async_trait]
impl RelayTransport for WebSocketConnection {
    async fn send_text(&mut self, text: &str) -> io::Result<()> {
        WebSocketConnection::send_text(self, text).await
    }

    async fn run(&mut self, handler: &mut dyn MessageHandler) -> io::Result<()> {
        while let Some(text) = self.next_message().await? {
            handler.text_message(&text);
            if handler.should_stop() {
                break;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        WebSocketConnection::close(self).await
    }
}
