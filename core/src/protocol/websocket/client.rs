/*
 * client.rs
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

//! WebSocket client: connect to a ws:// or wss:// URL, perform the handshake, return a WebSocketConnection.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::net::RelayStream;
use crate::protocol::websocket::connection::WebSocketConnection;
use crate::protocol::websocket::handshake::{
    build_handshake_request, generate_key, parse_response_head, verify_response,
};

/// Parsed components of a WebSocket URL.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct WsUrl<'a> {
    pub tls: bool,
    pub host: &'a str,
    pub port: u16,
    /// Path plus query, always starting with '/'.
    pub path: String,
}

fn invalid_input(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}

pub(crate) fn parse_ws_url(url: &str) -> io::Result<WsUrl<'_>> {
    let url = url.trim();
    let (tls, rest) = if let Some(r) = url.strip_prefix("wss://") {
        (true, r)
    } else if let Some(r) = url.strip_prefix("ws://") {
        (false, r)
    } else {
        return Err(invalid_input("URL scheme must be ws or wss"));
    };
    let default_port: u16 = if tls { 443 } else { 80 };

    let split = rest.find(|c| c == '/' || c == '?').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(split);
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
        let end = v6.find(']').ok_or_else(|| invalid_input("unterminated IPv6 bracket"))?;
        let port = match v6[end + 1..].strip_prefix(':') {
            Some(p) => p.parse::<u16>().map_err(|_| invalid_input("invalid port"))?,
            None => default_port,
        };
        (&v6[..end], port)
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().map_err(|_| invalid_input("invalid port"))?),
            None => (authority, default_port),
        }
    };
    if host.is_empty() {
        return Err(invalid_input("URL has no host"));
    }
    Ok(WsUrl { tls, host, port, path })
}

/// WebSocket client. Connect with `WebSocketClient::connect(url)`.
pub struct WebSocketClient;

impl WebSocketClient {
    /// Open TCP (and TLS for wss), send the upgrade request and wait for 101.
    /// Bytes the server sent after the handshake head are kept for the frame parser.
    pub async fn connect(url: &str) -> io::Result<WebSocketConnection> {
        let parsed = parse_ws_url(url)?;
        let mut stream = RelayStream::connect(parsed.host, parsed.port, parsed.tls).await?;

        let key = generate_key()?;
        let request = build_handshake_request(parsed.host, parsed.port, &parsed.path, &key, parsed.tls);
        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            let n = stream.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during handshake",
                ));
            }
            if let Some(response) = parse_response_head(&buf)? {
                verify_response(&response, &key)?;
                let _ = buf.split_to(response.head_len);
                return Ok(WebSocketConnection::new(stream, buf));
            }
        }
    }
}
