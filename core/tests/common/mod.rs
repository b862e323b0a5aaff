/*
 * common/mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Scripted in-memory relays for session, fallback and pagination tests.
 * A ScriptedConnector maps relay URLs to behaviours and records every
 * open, sent message and close so tests can check teardown.
 */

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use ned_core::protocol::nostr::{Connector, MessageHandler, RelayTransport};

/// What the relay does once the subscription arrives.
#[derive(Debug, Clone)]
pub enum After {
    /// Never send anything else (the session times out).
    Hang,
    /// Close the connection cleanly.
    Eof,
    /// Fail the connection.
    Error,
}

#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Refuse the connection.
    Refuse,
    /// Accept the connection but never finish the handshake.
    HangOnOpen,
    /// Send `messages` (with `{sub}` replaced by the subscription id), then `after`.
    Script { messages: Vec<String>, after: After },
    /// Serve stored events honouring `until` (inclusive) and `limit`, newest first, then EOSE.
    Listing { events: Vec<(String, u64)> },
}

impl Behaviour {
    /// Events then EOSE.
    pub fn eose(events: Vec<String>) -> Self {
        let mut messages: Vec<String> = events.into_iter().map(|e| event_message(&e)).collect();
        messages.push(r#"["EOSE","{sub}"]"#.to_string());
        Behaviour::Script { messages, after: After::Hang }
    }
}

/// `["EVENT","{sub}",<event>]`.
pub fn event_message(event_json: &str) -> String {
    format!(r#"["EVENT","{{sub}}",{}]"#, event_json)
}

/// A kind 30023 event with a `d` tag.
pub fn article_json(id: &str, pubkey: &str, d: &str, created_at: u64) -> String {
    serde_json::json!({
        "id": id,
        "pubkey": pubkey,
        "created_at": created_at,
        "kind": 30023,
        "tags": [["d", d], ["title", format!("Title {}", id)]],
        "content": format!("Body of {}", id),
        "sig": ""
    })
    .to_string()
}

#[derive(Debug, Default)]
pub struct Log {
    pub opened: Vec<String>,
    pub sent: Vec<(String, String)>,
    pub closed: Vec<String>,
}

impl Log {
    /// Messages sent to `relay` whose type is `kind` (REQ, CLOSE).
    pub fn sent_of(&self, relay: &str, kind: &str) -> Vec<Value> {
        self.sent
            .iter()
            .filter(|(r, _)| r == relay)
            .filter_map(|(_, text)| serde_json::from_str::<Value>(text).ok())
            .filter(|v| v[0] == kind)
            .collect()
    }

    pub fn closes(&self, relay: &str) -> usize {
        self.closed.iter().filter(|r| *r == relay).count()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    relays: HashMap<String, Behaviour>,
    pub log: Arc<Mutex<Log>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relay(mut self, url: &str, behaviour: Behaviour) -> Self {
        self.relays.insert(url.to_string(), behaviour);
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn open(&self, relay_url: &str) -> io::Result<ScriptedTransport> {
        self.log().opened.push(relay_url.to_string());
        match self.relays.get(relay_url) {
            None | Some(Behaviour::Refuse) => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
            Some(Behaviour::HangOnOpen) => std::future::pending().await,
            Some(behaviour) => Ok(ScriptedTransport {
                relay: relay_url.to_string(),
                behaviour: behaviour.clone(),
                request: None,
                log: Arc::clone(&self.log),
            }),
        }
    }
}

pub struct ScriptedTransport {
    relay: String,
    behaviour: Behaviour,
    /// Last REQ received.
    request: Option<Value>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedTransport {
    fn responses(&self) -> (Vec<String>, After) {
        let request = match &self.request {
            Some(r) => r,
            None => return (Vec::new(), After::Hang),
        };
        let sub = request[1].as_str().unwrap_or_default().to_string();
        match &self.behaviour {
            Behaviour::Script { messages, after } => (
                messages.iter().map(|m| m.replace("{sub}", &sub)).collect(),
                after.clone(),
            ),
            Behaviour::Listing { events } => {
                let filter = &request[2];
                let until = filter["until"].as_u64().unwrap_or(u64::MAX);
                let limit = filter["limit"].as_u64().unwrap_or(u64::MAX) as usize;
                let mut matching: Vec<&(String, u64)> =
                    events.iter().filter(|(_, t)| *t <= until).collect();
                matching.sort_by(|a, b| b.1.cmp(&a.1));
                let mut out: Vec<String> = matching
                    .into_iter()
                    .take(limit)
                    .map(|(id, t)| {
                        event_message(&article_json(id, "pk", id, *t)).replace("{sub}", &sub)
                    })
                    .collect();
                out.push(format!(r#"["EOSE","{}"]"#, sub));
                (out, After::Hang)
            }
            _ => (Vec::new(), After::Hang),
        }
    }
}

#[async_trait]
impl RelayTransport for ScriptedTransport {
    async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.log
            .lock()
            .unwrap()
            .sent
            .push((self.relay.clone(), text.to_string()));
        if let Ok(v) = serde_json::from_str::<Value>(text) {
            if v[0] == "REQ" {
                self.request = Some(v);
            }
        }
        Ok(())
    }

    async fn run(&mut self, handler: &mut dyn MessageHandler) -> io::Result<()> {
        let (messages, after) = self.responses();
        for message in messages {
            handler.text_message(&message);
            if handler.should_stop() {
                return Ok(());
            }
        }
        match after {
            After::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            After::Eof => Ok(()),
            After::Error => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.log.lock().unwrap().closed.push(self.relay.clone());
        Ok(())
    }
}
