/*
 * fallback.rs
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

//! Addressed lookups: locate one long-form article (author + `d` tag) by trying relays in order.
//! The first relay that returns a match wins; relays that fail or have nothing are skipped.

use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::protocol::nostr::session::fetch_events;
use crate::protocol::nostr::transport::Connector;
use crate::protocol::nostr::types::{project_to_article, Address, Article};

/// Candidate relays for an addressed lookup: the address's relay hints, then the preferred relay,
/// then the configured relays. Trimmed, blanks dropped, first occurrence kept.
pub fn relay_candidates(hints: &[String], preferred: Option<&str>, configured: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let all = hints
        .iter()
        .map(String::as_str)
        .chain(preferred)
        .chain(configured.iter().map(String::as_str));
    for url in all {
        let url = url.trim();
        if !url.is_empty() && !out.iter().any(|u| u == url) {
            out.push(url.to_string());
        }
    }
    out
}

/// Newest matching version of the addressed article among `articles`.
fn best_match(address: &Address, articles: impl IntoIterator<Item = Article>) -> Option<Article> {
    articles
        .into_iter()
        .filter(|a| a.pubkey.eq_ignore_ascii_case(&address.pubkey) && a.d_tag == address.identifier)
        .max_by_key(|a| a.created_at)
}

/// Try `candidates` in order and return the first relay's newest matching article.
///
/// `Ok(None)` means at least one relay answered and none had the article.
/// `AllRelaysFailed` means every relay failed at transport level; `NoRelays` that there were none.
pub async fn fetch_by_address<C: Connector>(
    connector: &C,
    address: &Address,
    candidates: &[String],
    config: &FetchConfig,
) -> Result<Option<Article>, FetchError> {
    if candidates.is_empty() {
        return Err(FetchError::NoRelays);
    }
    let filter = address.to_query().to_filter();
    filter.validate()?;

    let mut failures = 0usize;
    for relay in candidates {
        match fetch_events(connector, relay, &filter, config).await {
            Ok(outcome) => {
                let articles = outcome.events.iter().filter_map(project_to_article);
                if let Some(article) = best_match(address, articles) {
                    info!(relay = %relay, coordinate = %address.coordinate(), "article found");
                    return Ok(Some(article));
                }
                debug!(relay = %relay, "no match, trying next relay");
            }
            Err(e) if e.is_connection_failure() => {
                warn!(relay = %relay, error = %e, "relay failed, trying next relay");
                failures += 1;
            }
            Err(e) => return Err(e),
        }
    }
    if failures == candidates.len() {
        return Err(FetchError::AllRelaysFailed { attempts: failures });
    }
    info!(coordinate = %address.coordinate(), tried = candidates.len(), "article not found");
    Ok(None)
}

/// Decode an `naddr1...` (optionally `nostr:` prefixed) and look it up using its relay hints,
/// the preferred relay and the configured relays.
pub async fn fetch_by_naddr<C: Connector>(
    connector: &C,
    naddr: &str,
    config: &FetchConfig,
) -> Result<Option<Article>, FetchError> {
    let address = Address::from_naddr(naddr)?;
    let candidates = relay_candidates(&address.relays, config.preferred_relay.as_deref(), &config.relays);
    fetch_by_address(connector, &address, &candidates, config).await
}
