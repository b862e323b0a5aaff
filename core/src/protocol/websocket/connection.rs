/*
 * connection.rs
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

//! WebSocket connection: owns the stream after the handshake, reassembles messages, answers pings.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::net::RelayStream;
use crate::protocol::websocket::frame::{
    encode_frame, parse_close_payload, FrameParser, MAX_FRAME_PAYLOAD, OP_BINARY, OP_CLOSE,
    OP_CONTINUATION, OP_PING, OP_PONG, OP_TEXT,
};

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket connection after a successful handshake. Pull messages with `next_message`;
/// send with `send_text`/`send_ping`; finish with `close`.
pub struct WebSocketConnection {
    stream: RelayStream,
    read_buf: BytesMut,
    frame_parser: FrameParser,
    /// Fragmented data message being reassembled.
    partial: Option<BytesMut>,
    close_sent: bool,
    peer_closed: bool,
    shut_down: bool,
    /// Set while a frame is being written; still set if that write failed or was cancelled,
    /// in which case the stream may end inside a frame and nothing more can be sent.
    write_broken: bool,
}

impl WebSocketConnection {
    pub(crate) fn new(stream: RelayStream, leftover: BytesMut) -> Self {
        let mut read_buf = BytesMut::with_capacity(8192);
        read_buf.extend_from_slice(&leftover);
        Self {
            stream,
            read_buf,
            frame_parser: FrameParser::new(),
            partial: None,
            close_sent: false,
            peer_closed: false,
            shut_down: false,
            write_broken: false,
        }
    }

    /// True once the peer sent a close frame or the stream hit EOF.
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// False once a write was interrupted part way through a frame.
    pub fn is_writable(&self) -> bool {
        !self.write_broken
    }

    /// Next complete text message. Binary messages are returned as (lossy) UTF-8.
    /// `Ok(None)` means the peer closed the connection.
    pub async fn next_message(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.peer_closed {
                return Ok(None);
            }
            while let Some(frame) = self.frame_parser.next_frame(&mut self.read_buf)? {
                match frame.opcode {
                    OP_PING => {
                        trace!(len = frame.payload.len(), "websocket ping");
                        self.send_frame(OP_PONG, &frame.payload).await?;
                    }
                    OP_PONG => {}
                    OP_CLOSE => {
                        let (code, reason) = parse_close_payload(&frame.payload);
                        debug!(?code, %reason, "websocket close from peer");
                        self.peer_closed = true;
                        if !self.close_sent {
                            self.close_sent = true;
                            // Echo the close; the peer may already be gone.
                            let payload = code.map(|c| c.to_be_bytes().to_vec()).unwrap_or_default();
                            let _ = self.send_frame(OP_CLOSE, &payload).await;
                        }
                        return Ok(None);
                    }
                    OP_TEXT | OP_BINARY => {
                        if self.partial.is_some() {
                            return Err(invalid_data("new data frame inside fragmented message"));
                        }
                        if frame.fin {
                            return Ok(Some(String::from_utf8_lossy(&frame.payload).into_owned()));
                        }
                        self.partial = Some(BytesMut::from(&frame.payload[..]));
                    }
                    OP_CONTINUATION => {
                        let mut message = self
                            .partial
                            .take()
                            .ok_or_else(|| invalid_data("continuation without initial frame"))?;
                        if (message.len() + frame.payload.len()) as u64 > MAX_FRAME_PAYLOAD {
                            return Err(invalid_data("message too large"));
                        }
                        message.extend_from_slice(&frame.payload);
                        if frame.fin {
                            return Ok(Some(String::from_utf8_lossy(&message).into_owned()));
                        }
                        self.partial = Some(message);
                    }
                    other => {
                        return Err(invalid_data(&format!("unknown opcode {}", other)));
                    }
                }
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                debug!("websocket stream EOF");
                self.peer_closed = true;
                return Ok(None);
            }
        }
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send_frame(OP_TEXT, text.as_bytes()).await
    }

    /// Send a ping frame.
    pub async fn send_ping(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() > 125 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ping payload max 125 bytes",
            ));
        }
        self.send_frame(OP_PING, data).await
    }

    /// Send a close frame once; later calls are no-ops.
    pub async fn send_close(&mut self, code: Option<u16>, reason: &str) -> io::Result<()> {
        if self.close_sent {
            return Ok(());
        }
        let mut payload = Vec::new();
        if let Some(c) = code {
            payload.extend_from_slice(&c.to_be_bytes());
        }
        payload.extend_from_slice(reason.as_bytes());
        if payload.len() > 125 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "close payload max 125 bytes",
            ));
        }
        self.close_sent = true;
        self.send_frame(OP_CLOSE, &payload).await
    }

    /// Send a normal close (if not already sent) and shut the stream down. Idempotent.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let sent = if self.peer_closed || self.write_broken {
            Ok(())
        } else {
            self.send_close(Some(CLOSE_NORMAL), "").await
        };
        let shutdown = self.stream.shutdown().await;
        sent.and(shutdown)
    }

    async fn send_frame(&mut self, opcode: u8, payload: &[u8]) -> io::Result<()> {
        if self.write_broken {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "previous frame write was interrupted",
            ));
        }
        let mut mask_key = [0u8; 4];
        getrandom::getrandom(&mut mask_key)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let mut out = BytesMut::with_capacity(14 + payload.len());
        encode_frame(opcode, payload, &mask_key, &mut out);
        self.write_broken = true;
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        self.write_broken = false;
        Ok(())
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn interrupted_write_makes_connection_unwritable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        // Accept but never read, so a large frame cannot be written in full.
        let (_server, _) = listener.accept().await.unwrap();
        let mut conn = WebSocketConnection::new(RelayStream::Plain(client), BytesMut::new());
        assert!(conn.is_writable());

        let big = "x".repeat(32 * 1024 * 1024);
        let interrupted = tokio::time::timeout(Duration::from_millis(200), conn.send_text(&big)).await;
        assert!(interrupted.is_err());
        assert!(!conn.is_writable());

        let err = conn.send_text(r#"["CLOSE","sub"]"#).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        conn.close().await.unwrap();
    }
}
