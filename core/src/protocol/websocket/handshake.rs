/*
 * handshake.rs
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

//! WebSocket opening handshake (RFC 6455 §4): GET with Upgrade, read the 101 head, verify Sec-WebSocket-Accept.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::io;

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Refuse response heads larger than this.
const MAX_HEAD_LEN: usize = 16 * 1024;

/// Status line and the headers we care about from the server's handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub status: u16,
    pub accept: Option<String>,
    /// Bytes consumed by the head, including the blank line. Anything after is frame data.
    pub head_len: usize,
}

/// Base64 of 16 random bytes for Sec-WebSocket-Key.
pub fn generate_key() -> io::Result<String> {
    let mut raw = [0u8; 16];
    getrandom::getrandom(&mut raw).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(STANDARD.encode(raw))
}

/// Build the HTTP GET request for the handshake. Caller writes this to the stream.
pub fn build_handshake_request(host: &str, port: u16, path: &str, key: &str, tls: bool) -> Vec<u8> {
    let default_port = if tls { 443 } else { 80 };
    let host_header = if port == default_port {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\nUser-Agent: ned/{}\r\n\r\n",
        path,
        host_header,
        key,
        env!("CARGO_PKG_VERSION")
    )
    .into_bytes()
}

/// Expected Sec-WebSocket-Accept: base64(SHA-1(key + magic)).
pub fn compute_expected_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    STANDARD.encode(hasher.finalize())
}

/// Parse the response head once it is complete. Returns None while the blank line has not arrived.
pub fn parse_response_head(buf: &[u8]) -> io::Result<Option<HandshakeResponse>> {
    let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(i) => i,
        None if buf.len() > MAX_HEAD_LEN => {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "handshake response too large"));
        }
        None => return Ok(None),
    };
    let head = std::str::from_utf8(&buf[..end])
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "handshake response not UTF-8"))?;
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not an HTTP/1.x response"));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid status line"))?;

    let mut accept = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Sec-WebSocket-Accept") {
                accept = Some(value.trim().to_string());
            }
        }
    }
    Ok(Some(HandshakeResponse {
        status,
        accept,
        head_len: end + 4,
    }))
}

/// Check status 101 and that Sec-WebSocket-Accept matches the key we sent.
pub fn verify_response(response: &HandshakeResponse, key: &str) -> io::Result<()> {
    if response.status != 101 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected 101 Switching Protocols, got {}", response.status),
        ));
    }
    match response.accept.as_deref() {
        Some(a) if a == compute_expected_accept(key) => Ok(()),
        Some(_) => Err(io::Error::new(io::ErrorKind::InvalidData, "Sec-WebSocket-Accept mismatch")),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Accept")),
    }
}
