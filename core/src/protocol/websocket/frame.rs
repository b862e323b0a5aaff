/*
 * frame.rs
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

//! WebSocket frame format (RFC 6455 §5): incremental parser for server frames, masked encoder for ours.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

pub const OP_CONTINUATION: u8 = 0;
pub const OP_TEXT: u8 = 1;
pub const OP_BINARY: u8 = 2;
pub const OP_CLOSE: u8 = 8;
pub const OP_PING: u8 = 9;
pub const OP_PONG: u8 = 10;

/// Largest payload we accept in one frame. Long-form events can be large.
pub const MAX_FRAME_PAYLOAD: u64 = 16 * 1024 * 1024;

/// Control frames carry at most 125 bytes.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// One complete frame from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub fin: bool,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Header,
    ExtendedLen2,
    ExtendedLen8,
    Payload,
}

/// Pull parser for server → client frames (never masked).
pub struct FrameParser {
    state: FrameState,
    opcode: u8,
    fin: bool,
    payload_len: u64,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: FrameState::Header,
            opcode: 0,
            fin: false,
            payload_len: 0,
        }
    }

    /// Consume bytes from `buf`. Returns the next complete frame, or None when more data is needed.
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        loop {
            match self.state {
                FrameState::Header => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    let b0 = buf.get_u8();
                    let b1 = buf.get_u8();
                    if b0 & 0x70 != 0 {
                        return Err(invalid_data("reserved bits set without extension"));
                    }
                    if b1 & 0x80 != 0 {
                        return Err(invalid_data("server frame must not be masked"));
                    }
                    self.fin = b0 & 0x80 != 0;
                    self.opcode = b0 & 0x0f;
                    match b1 & 0x7f {
                        126 => self.state = FrameState::ExtendedLen2,
                        127 => self.state = FrameState::ExtendedLen8,
                        len => {
                            self.payload_len = len as u64;
                            self.state = FrameState::Payload;
                        }
                    }
                }
                FrameState::ExtendedLen2 => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    self.payload_len = buf.get_u16() as u64;
                    self.state = FrameState::Payload;
                }
                FrameState::ExtendedLen8 => {
                    if buf.len() < 8 {
                        return Ok(None);
                    }
                    self.payload_len = buf.get_u64();
                    self.state = FrameState::Payload;
                }
                FrameState::Payload => {
                    let control = self.opcode >= OP_CLOSE;
                    if control && (self.payload_len as usize > MAX_CONTROL_PAYLOAD || !self.fin) {
                        return Err(invalid_data("invalid control frame"));
                    }
                    if self.payload_len > MAX_FRAME_PAYLOAD {
                        return Err(invalid_data("frame payload too long"));
                    }
                    let need = self.payload_len as usize;
                    if buf.len() < need {
                        buf.reserve(need - buf.len());
                        return Ok(None);
                    }
                    let payload = buf.split_to(need).freeze();
                    self.state = FrameState::Header;
                    return Ok(Some(Frame {
                        opcode: self.opcode,
                        fin: self.fin,
                        payload,
                    }));
                }
            }
        }
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Encode one final frame (client → server: always masked with `mask_key`).
pub fn encode_frame(opcode: u8, payload: &[u8], mask_key: &[u8; 4], out: &mut BytesMut) {
    let len = payload.len();
    out.reserve(14 + len);
    out.put_u8(0x80 | (opcode & 0x0f));
    if len < 126 {
        out.put_u8(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        out.put_u8(0x80 | 126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(0x80 | 127);
        out.put_u64(len as u64);
    }
    out.put_slice(mask_key);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask_key[i % 4]));
}

/// Close frame payload: optional status code then UTF-8 reason.
pub fn parse_close_payload(data: &[u8]) -> (Option<u16>, String) {
    if data.len() >= 2 {
        let code = u16::from_be_bytes([data[0], data[1]]);
        (Some(code), String::from_utf8_lossy(&data[2..]).into_owned())
    } else {
        (None, String::new())
    }
}
