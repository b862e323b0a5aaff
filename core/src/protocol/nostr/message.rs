/*
 * message.rs
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

//! Relay envelope codec (NIP-01): `["REQ", id, filter]`, `["CLOSE", id]` out;
//! `["EVENT", id, event]`, `["EOSE", id]`, `["CLOSED", id, msg]`, `["NOTICE", msg]` in.
//! Any other message type decodes to `RelayMessage::Other` so new relay messages never abort a session.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{Filter, RawEvent};
use crate::error::FetchError;

/// Codec error. Dropped by the session; never surfaced to callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed relay message: {0}")]
    MalformedMessage(String),
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedMessage(reason.into())
}

/// Decoded relay → client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: RawEvent,
    },
    EndOfStoredEvents {
        subscription_id: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
    Notice {
        message: String,
    },
    /// Recognized array shape with a type we do not handle (OK, AUTH, COUNT, ...).
    Other {
        message_type: String,
    },
}

/// `["REQ", <subscription_id>, <filter>]`. The filter is validated first.
pub fn encode_subscribe(subscription_id: &str, filter: &Filter) -> Result<String, FetchError> {
    filter.validate()?;
    let filter_value = serde_json::to_value(filter)
        .map_err(|e| FetchError::InvalidFilter(e.to_string()))?;
    Ok(Value::Array(vec![
        Value::String("REQ".to_string()),
        Value::String(subscription_id.to_string()),
        filter_value,
    ])
    .to_string())
}

/// `["CLOSE", <subscription_id>]`.
pub fn encode_unsubscribe(subscription_id: &str) -> String {
    serde_json::json!(["CLOSE", subscription_id]).to_string()
}

fn string_at<'a>(arr: &'a [Value], index: usize, what: &str) -> Result<&'a str, DecodeError> {
    arr.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("{} is missing or not a string", what)))
}

/// Parse one relay text message.
pub fn decode(raw: &str) -> Result<RelayMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    let arr = value
        .as_array()
        .ok_or_else(|| malformed("message is not an array"))?;
    let message_type = arr
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("first element is not a message type"))?;

    match message_type {
        "EVENT" => {
            let subscription_id = string_at(arr, 1, "subscription id")?.to_string();
            let payload = arr.get(2).ok_or_else(|| malformed("EVENT without event"))?;
            let event = RawEvent::deserialize(payload).map_err(|e| malformed(e.to_string()))?;
            Ok(RelayMessage::Event {
                subscription_id,
                event,
            })
        }
        "EOSE" => Ok(RelayMessage::EndOfStoredEvents {
            subscription_id: string_at(arr, 1, "subscription id")?.to_string(),
        }),
        "CLOSED" => Ok(RelayMessage::Closed {
            subscription_id: string_at(arr, 1, "subscription id")?.to_string(),
            message: arr.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
        }),
        "NOTICE" => Ok(RelayMessage::Notice {
            message: arr
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("Unknown notice")
                .to_string(),
        }),
        other => Ok(RelayMessage::Other {
            message_type: other.to_string(),
        }),
    }
}
