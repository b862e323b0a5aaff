/*
 * pagination.rs
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

//! Page results and the `until` cursor.
//!
//! Relays disagree on whether `until` is inclusive, so we assume it is: the paginator remembers
//! every id it has handed out and removes repeats from later pages. Items sharing the boundary
//! second are never skipped.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::protocol::nostr::session::fetch_page;
use crate::protocol::nostr::transport::Connector;
use crate::protocol::nostr::types::{project_to_article, Article, Query, RawEvent, MAX_PAGE_SIZE};

/// Pages made only of already-seen events before the paginator gives up.
const MAX_DUPLICATE_PAGES: u32 = 3;

/// One page of articles in relay arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    pub items: Vec<Article>,
    /// Minimum `created_at` of `items`; `None` when the page is empty.
    pub next_cursor: Option<u64>,
}

impl PageResult {
    /// Project events to articles, drop other kinds and repeated ids (first arrival wins).
    pub fn from_events(events: &[RawEvent]) -> Self {
        let mut seen = HashSet::new();
        let items = events
            .iter()
            .filter_map(project_to_article)
            .filter(|a| seen.insert(a.id.clone()))
            .collect::<Vec<_>>();
        Self::from_articles(items)
    }

    pub fn from_articles(items: Vec<Article>) -> Self {
        let next_cursor = next_cursor(&items);
        Self { items, next_cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cursor for the following page: the oldest `created_at` in the batch.
pub fn next_cursor(items: &[Article]) -> Option<u64> {
    items.iter().map(|a| a.created_at).min()
}

/// What the paginator does with a page it received.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Deliver(PageResult),
    Retry,
}

/// Walks an article listing backwards in time, one page per call.
///
/// A page made only of ids already delivered means the relay filled the request with items at the
/// boundary second. The paginator then asks again at the same `until` with a larger `limit`, and
/// only steps `until` back one second once the relay returns fewer events than it asked for.
#[derive(Debug, Clone)]
pub struct Paginator {
    author: Option<String>,
    limit: u32,
    /// Extra `limit` for a retry at the boundary second.
    widen: u32,
    until: Option<u64>,
    /// Delivered ids and their `created_at`.
    seen: HashMap<String, u64>,
    duplicate_pages: u32,
    exhausted: bool,
}

impl Paginator {
    /// Listing by `author` (or everyone), `limit` articles per page.
    pub fn new(author: Option<String>, limit: u32) -> Self {
        Self {
            author,
            limit,
            widen: 0,
            until: None,
            seen: HashMap::new(),
            duplicate_pages: 0,
            exhausted: false,
        }
    }

    /// Listing using the configured page size.
    pub fn with_config(author: Option<String>, config: &FetchConfig) -> Self {
        Self::new(author, config.page_size)
    }

    /// Resume a listing from a cursor the caller kept.
    pub fn starting_at(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn next_cursor(&self) -> Option<u64> {
        if self.exhausted {
            None
        } else {
            self.until
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Query for the next request.
    pub fn query(&self) -> Query {
        Query::Articles {
            author: self.author.clone(),
            until: self.until,
            limit: self.request_limit(),
        }
    }

    fn request_limit(&self) -> u32 {
        self.limit.saturating_add(self.widen).min(MAX_PAGE_SIZE)
    }

    /// Fetch the next page from `relay`. An empty page means the listing is finished;
    /// later calls return empty pages without contacting the relay.
    pub async fn next_page<C: Connector>(
        &mut self,
        connector: &C,
        relay: &str,
        config: &FetchConfig,
    ) -> Result<PageResult, FetchError> {
        loop {
            if self.exhausted {
                return Ok(PageResult::default());
            }
            let filter = self.query().to_filter();
            let page = fetch_page(connector, relay, &filter, config).await?;
            match self.accept(page) {
                Step::Deliver(page) => return Ok(page),
                Step::Retry => continue,
            }
        }
    }

    /// Handle a page returned for `self.query()`.
    fn accept(&mut self, page: PageResult) -> Step {
        if page.is_empty() {
            self.finish();
            return Step::Deliver(PageResult::default());
        }
        let requested = self.request_limit();
        let returned = u32::try_from(page.items.len()).unwrap_or(u32::MAX);
        let fresh: Vec<Article> = page
            .items
            .into_iter()
            .filter(|a| !self.seen.contains_key(&a.id))
            .collect();
        if fresh.is_empty() {
            if returned >= requested && requested < MAX_PAGE_SIZE {
                // Full page of repeats: more may share the boundary second.
                let at_boundary = self.seen_at_until();
                let widened = self
                    .limit
                    .saturating_add(at_boundary)
                    .max(requested.saturating_mul(2))
                    .min(MAX_PAGE_SIZE);
                debug!(until = ?self.until, limit = widened, "page held only seen events, widening");
                self.widen = widened.saturating_sub(self.limit);
                return Step::Retry;
            }
            if requested >= MAX_PAGE_SIZE && returned >= requested {
                warn!(until = ?self.until, "boundary second holds more events than one request can return");
            }
            self.duplicate_pages += 1;
            let stepped = self.until.and_then(|t| t.checked_sub(1));
            if self.duplicate_pages >= MAX_DUPLICATE_PAGES || stepped.is_none() {
                self.finish();
                return Step::Deliver(PageResult::default());
            }
            debug!(until = ?stepped, "boundary second drained, stepping cursor");
            self.until = stepped;
            self.widen = 0;
            return Step::Retry;
        }
        self.duplicate_pages = 0;
        self.widen = 0;
        self.seen
            .extend(fresh.iter().map(|a| (a.id.clone(), a.created_at)));
        let page = PageResult::from_articles(fresh);
        self.until = page.next_cursor;
        Step::Deliver(page)
    }

    /// Delivered ids whose `created_at` equals the current cursor.
    fn seen_at_until(&self) -> u32 {
        let n = match self.until {
            Some(until) => self.seen.values().filter(|t| **t == until).count(),
            None => 0,
        };
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.until = None;
        self.widen = 0;
    }
}
