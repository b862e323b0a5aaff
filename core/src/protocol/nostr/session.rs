/*
 * session.rs
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

//! Relay session: one transient connection to one relay for the lifetime of one request.
//!
//! Connecting -> Subscribed -> Draining -> Closed, or Errored from any state. EOSE, a relay
//! CLOSED for our subscription, a full `limit` of events and the timeout all drain the same way:
//! send CLOSE, close the transport, return what was collected. A transport failure returns an error and no events.
//! Teardown runs at most once whichever path ends the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::protocol::nostr::message::{decode, encode_subscribe, encode_unsubscribe, RelayMessage};
use crate::protocol::nostr::pagination::PageResult;
use crate::protocol::nostr::transport::{Connector, MessageHandler, RelayTransport};
use crate::protocol::nostr::types::{Filter, RawEvent, KIND_LONG_FORM};

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique subscription id: `ned-<unix millis>-<counter>`.
pub fn new_subscription_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ned-{}-{}", millis, n)
}

/// First characters of an id or message, for logs.
pub(crate) fn short(s: &str) -> &str {
    match s.char_indices().nth(12) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Draining,
    Closed,
    Errored,
}

/// Why a session stopped collecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    EndOfStoredEvents,
    /// Relay sent CLOSED for our subscription.
    ClosedByRelay(String),
    /// Relay sent as many events as the filter's `limit` and kept going.
    LimitReached,
    Timeout,
}

/// Events collected by a session that terminated normally, in arrival order.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub events: Vec<RawEvent>,
    pub end: SessionEnd,
}

/// Accumulates events for one subscription id. Stops accepting input once an end signal arrives
/// or `limit` events have been collected.
struct Collector {
    relay: String,
    subscription_id: String,
    limit: Option<usize>,
    events: Vec<RawEvent>,
    end: Option<SessionEnd>,
}

impl Collector {
    fn new(relay: &str, subscription_id: &str, limit: Option<u32>) -> Self {
        Self {
            relay: relay.to_string(),
            subscription_id: subscription_id.to_string(),
            limit: limit.map(|n| n as usize),
            events: Vec::new(),
            end: None,
        }
    }
}

impl MessageHandler for Collector {
    fn text_message(&mut self, text: &str) {
        if self.end.is_some() {
            return;
        }
        let message = match decode(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(relay = %self.relay, error = %e, "dropping message");
                return;
            }
        };
        match message {
            RelayMessage::Event { subscription_id, event } => {
                if subscription_id != self.subscription_id {
                    debug!(relay = %self.relay, sub = %subscription_id, "event for other subscription");
                } else if event.kind != KIND_LONG_FORM {
                    debug!(relay = %self.relay, kind = event.kind, id = short(&event.id), "event of unexpected kind");
                } else {
                    trace!(relay = %self.relay, id = short(&event.id), created_at = event.created_at, "event");
                    self.events.push(event);
                    if self.limit.map_or(false, |n| self.events.len() >= n) {
                        debug!(relay = %self.relay, events = self.events.len(), "limit reached before EOSE");
                        self.end = Some(SessionEnd::LimitReached);
                    }
                }
            }
            RelayMessage::EndOfStoredEvents { subscription_id } => {
                if subscription_id == self.subscription_id {
                    debug!(relay = %self.relay, "EOSE");
                    self.end = Some(SessionEnd::EndOfStoredEvents);
                }
            }
            RelayMessage::Closed { subscription_id, message } => {
                if subscription_id == self.subscription_id {
                    warn!(relay = %self.relay, %message, "subscription closed by relay");
                    self.end = Some(SessionEnd::ClosedByRelay(message));
                } else {
                    debug!(relay = %self.relay, sub = %subscription_id, "CLOSED for other subscription");
                }
            }
            RelayMessage::Notice { message } => {
                info!(relay = %self.relay, notice = short(&message), "relay notice");
            }
            RelayMessage::Other { message_type } => {
                trace!(relay = %self.relay, %message_type, "ignoring message");
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.end.is_some()
    }
}

/// A subscription on one open transport.
pub struct RelaySession<T: RelayTransport> {
    relay: String,
    subscription_id: String,
    transport: T,
    state: SessionState,
    unsubscribed: bool,
    closed: bool,
}

impl<T: RelayTransport> RelaySession<T> {
    /// Open a transport to `relay` within `connect_timeout`.
    pub async fn connect<C>(connector: &C, relay: &str, connect_timeout: Duration) -> Result<Self, FetchError>
    where
        C: Connector<Transport = T>,
    {
        debug!(relay, "connecting");
        let transport = match tokio::time::timeout(connect_timeout, connector.open(relay)).await {
            Ok(Ok(t)) => t,
            Ok(Err(e)) => {
                warn!(relay, error = %e, "connect failed");
                return Err(FetchError::connection(relay, e.to_string()));
            }
            Err(_) => {
                warn!(relay, "connect timed out");
                return Err(FetchError::connection(relay, "connect timed out"));
            }
        };
        Ok(Self::with_transport(relay, transport))
    }

    /// Wrap an already open transport.
    pub fn with_transport(relay: &str, transport: T) -> Self {
        Self {
            relay: relay.to_string(),
            subscription_id: new_subscription_id(),
            transport,
            state: SessionState::Connecting,
            unsubscribed: false,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn relay(&self) -> &str {
        &self.relay
    }

    /// Send REQ and collect until EOSE, relay CLOSED, `filter.limit` events or `timeout`, then tear down.
    /// Consumes the session: it is always Closed or Errored afterwards.
    pub async fn fetch(mut self, filter: &Filter, timeout: Duration) -> Result<SessionOutcome, FetchError> {
        let req = encode_subscribe(&self.subscription_id, filter)?;
        debug!(relay = %self.relay, sub = %self.subscription_id, "REQ {}", req);
        if let Err(e) = self.transport.send_text(&req).await {
            return Err(self.fail(e.to_string()).await);
        }
        self.state = SessionState::Subscribed;

        let mut collector = Collector::new(&self.relay, &self.subscription_id, filter.limit);
        let end = match tokio::time::timeout(timeout, self.transport.run(&mut collector)).await {
            Ok(Ok(())) => match collector.end.take() {
                Some(end) => end,
                None => return Err(self.fail("connection closed before end of stored events").await),
            },
            Ok(Err(e)) => return Err(self.fail(e.to_string()).await),
            Err(_) => SessionEnd::Timeout,
        };

        self.state = SessionState::Draining;
        self.teardown(true).await;
        self.state = SessionState::Closed;
        info!(
            relay = %self.relay,
            events = collector.events.len(),
            end = ?end,
            "session complete"
        );
        Ok(SessionOutcome {
            events: collector.events,
            end,
        })
    }

    async fn fail(&mut self, reason: impl Into<String>) -> FetchError {
        let reason = reason.into();
        warn!(relay = %self.relay, %reason, "session failed");
        self.state = SessionState::Errored;
        self.teardown(false).await;
        FetchError::connection(&self.relay, reason)
    }

    /// Send CLOSE (only when the transport is still usable) and close the transport, each at most once.
    async fn teardown(&mut self, graceful: bool) {
        if graceful && !self.unsubscribed {
            self.unsubscribed = true;
            if let Err(e) = self.transport.send_text(&encode_unsubscribe(&self.subscription_id)).await {
                debug!(relay = %self.relay, error = %e, "CLOSE not sent");
            }
        }
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.transport.close().await {
                debug!(relay = %self.relay, error = %e, "close failed");
            }
        }
    }
}

/// Run one session against `relay` and return its raw events.
/// The filter is validated before any connection is opened.
pub async fn fetch_events<C: Connector>(
    connector: &C,
    relay: &str,
    filter: &Filter,
    config: &FetchConfig,
) -> Result<SessionOutcome, FetchError> {
    filter.validate()?;
    let session = RelaySession::connect(connector, relay, config.connect_timeout).await?;
    session.fetch(filter, config.timeout).await
}

/// Fetch one page of articles from `relay`: project, de-duplicate by id, compute the next cursor.
pub async fn fetch_page<C: Connector>(
    connector: &C,
    relay: &str,
    filter: &Filter,
    config: &FetchConfig,
) -> Result<PageResult, FetchError> {
    let outcome = fetch_events(connector, relay, filter, config).await?;
    Ok(PageResult::from_events(&outcome.events))
}
