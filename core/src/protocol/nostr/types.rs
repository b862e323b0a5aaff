/*
 * types.rs
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

//! Nostr event and filter types (NIP-01), long-form article projection (NIP-23).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// NIP-23: long-form post. The only kind this engine accepts.
pub const KIND_LONG_FORM: u32 = 30023;

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest `limit` we will put on the wire.
pub const MAX_PAGE_SIZE: u32 = 500;

/// NIP-01 event as delivered by a relay. Signatures are carried but not verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

/// Filter for a REQ subscription. Absent fields are omitted from the wire object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    /// `#d` tag constraint for addressed lookups.
    #[serde(rename = "#d", skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<String>>,
}

impl Filter {
    /// Reject filters a relay would misread. Called by the codec before anything is sent.
    pub fn validate(&self) -> Result<(), FetchError> {
        match &self.kinds {
            Some(kinds) if kinds.is_empty() => {
                return Err(FetchError::InvalidFilter("kinds must not be empty".into()));
            }
            _ => {}
        }
        if let Some(ref authors) = self.authors {
            if authors.is_empty() {
                return Err(FetchError::InvalidFilter("authors must not be empty".into()));
            }
            if authors.iter().any(|a| a.trim().is_empty()) {
                return Err(FetchError::InvalidFilter("author must not be blank".into()));
            }
        }
        if let Some(ref ids) = self.identifiers {
            if ids.is_empty() {
                return Err(FetchError::InvalidFilter("#d must not be empty".into()));
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_PAGE_SIZE {
                return Err(FetchError::InvalidFilter(format!(
                    "limit must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, limit
                )));
            }
        }
        Ok(())
    }
}

/// Logical query issued by a caller, mapped to a wire filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// List articles, newest first on most relays, optionally by one author and before `until`.
    Articles {
        author: Option<String>,
        until: Option<u64>,
        limit: u32,
    },
    /// Locate one addressable article by author and `d` tag.
    Address { author: String, identifier: String },
}

impl Query {
    /// First page of an author's articles with the default page size.
    pub fn articles_by(author: impl Into<String>) -> Self {
        Query::Articles {
            author: Some(author.into()),
            until: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn to_filter(&self) -> Filter {
        match self {
            Query::Articles { author, until, limit } => Filter {
                kinds: Some(vec![KIND_LONG_FORM]),
                authors: author.as_ref().map(|a| vec![a.clone()]),
                limit: Some(*limit),
                until: *until,
                identifiers: None,
            },
            Query::Address { author, identifier } => Filter {
                kinds: Some(vec![KIND_LONG_FORM]),
                authors: Some(vec![author.clone()]),
                limit: None,
                until: None,
                identifiers: Some(vec![identifier.clone()]),
            },
        }
    }
}

/// Addressable item coordinate: (kind, author, `d` tag), plus any relay hints that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub kind: u32,
    pub pubkey: String,
    pub identifier: String,
    pub relays: Vec<String>,
}

impl Address {
    pub fn long_form(pubkey: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind: KIND_LONG_FORM,
            pubkey: pubkey.into(),
            identifier: identifier.into(),
            relays: Vec::new(),
        }
    }

    /// `<kind>:<pubkey>:<d>` as used in `a` tags.
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }

    pub fn to_query(&self) -> Query {
        Query::Address {
            author: self.pubkey.clone(),
            identifier: self.identifier.clone(),
        }
    }
}

/// Application-level summary of a long-form post. Values are copied out of the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: String,
    pub pubkey: String,
    /// First `d` tag value; empty when the event has none.
    pub d_tag: String,
    pub title: String,
    pub summary: String,
    pub image: String,
    pub content: String,
    /// Topic (`t`) tags, first occurrence kept.
    pub tags: Vec<String>,
    pub created_at: u64,
    /// `published_at` tag, or `created_at` when absent or unparsable.
    pub published_at: u64,
}

impl Article {
    pub fn address(&self) -> Address {
        Address::long_form(self.pubkey.clone(), self.d_tag.clone())
    }

    pub fn coordinate(&self) -> String {
        self.address().coordinate()
    }

    pub fn published_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(i64::try_from(self.published_at).ok()?, 0)
    }
}

/// Value of the first `[name, value, ...]` tag.
fn first_tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.len() >= 2 && t[0] == name)
        .map(|t| t[1].as_str())
}

fn topic_tags(tags: &[Vec<String>]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if tag.len() < 2 || tag[0] != "t" {
            continue;
        }
        let value = tag[1].trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Project a raw event into an article. Returns None for any kind other than 30023.
pub fn project_to_article(event: &RawEvent) -> Option<Article> {
    if event.kind != KIND_LONG_FORM {
        return None;
    }
    let tag = |name: &str| first_tag_value(&event.tags, name).unwrap_or("").to_string();
    let published_at = first_tag_value(&event.tags, "published_at")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(event.created_at);
    Some(Article {
        id: event.id.clone(),
        pubkey: event.pubkey.clone(),
        d_tag: tag("d"),
        title: tag("title"),
        summary: tag("summary"),
        image: tag("image"),
        content: event.content.clone(),
        tags: topic_tags(&event.tags),
        created_at: event.created_at,
        published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[&[&str]]) -> Vec<Vec<String>> {
        pairs
            .iter()
            .map(|t| t.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn event(kind: u32, created_at: u64, tags: Vec<Vec<String>>) -> RawEvent {
        RawEvent {
            id: "e1".into(),
            pubkey: "pk".into(),
            created_at,
            kind,
            tags,
            content: "# Body".into(),
            sig: String::new(),
        }
    }

    #[test]
    fn projects_long_form_tags() {
        let ev = event(
            KIND_LONG_FORM,
            1700000500,
            tags(&[&["d", "abc"], &["title", "Hello"], &["published_at", "1700000000"]]),
        );
        let article = project_to_article(&ev).unwrap();
        assert_eq!(article.d_tag, "abc");
        assert_eq!(article.title, "Hello");
        assert_eq!(article.published_at, 1700000000);
        assert_eq!(article.created_at, 1700000500);
        assert_eq!(article.content, "# Body");
        assert_eq!(article.summary, "");
    }

    #[test]
    fn other_kinds_are_rejected() {
        for kind in [0, 1, 4, 30024] {
            assert!(project_to_article(&event(kind, 1, Vec::new())).is_none());
        }
    }

    #[test]
    fn missing_tags_fall_back() {
        let ev = event(KIND_LONG_FORM, 42, tags(&[&["published_at", "soon"], &["d"]]));
        let article = project_to_article(&ev).unwrap();
        assert_eq!(article.d_tag, "");
        assert_eq!(article.title, "");
        assert_eq!(article.image, "");
        assert_eq!(article.published_at, 42);
    }

    #[test]
    fn first_tag_wins() {
        let ev = event(
            KIND_LONG_FORM,
            1,
            tags(&[&["d", "first"], &["d", "second"], &["title", "A"], &["title", "B"]]),
        );
        let article = project_to_article(&ev).unwrap();
        assert_eq!(article.d_tag, "first");
        assert_eq!(article.title, "A");
    }

    #[test]
    fn topic_tags_are_collected_once() {
        let ev = event(
            KIND_LONG_FORM,
            1,
            tags(&[&["t", "rust"], &["t", "nostr"], &["t", "rust"], &["t", " "], &["p", "x"]]),
        );
        let article = project_to_article(&ev).unwrap();
        assert_eq!(article.tags, vec!["rust".to_string(), "nostr".to_string()]);
    }

    #[test]
    fn article_coordinate_and_date() {
        let ev = event(KIND_LONG_FORM, 1700000000, tags(&[&["d", "post"]]));
        let article = project_to_article(&ev).unwrap();
        assert_eq!(article.coordinate(), "30023:pk:post");
        let dt = article.published_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1700000000);
    }

    #[test]
    fn articles_query_filter() {
        let q = Query::Articles {
            author: Some("pk".into()),
            until: Some(80),
            limit: 3,
        };
        let f = q.to_filter();
        assert_eq!(f.kinds, Some(vec![KIND_LONG_FORM]));
        assert_eq!(f.authors, Some(vec!["pk".to_string()]));
        assert_eq!(f.limit, Some(3));
        assert_eq!(f.until, Some(80));
        assert!(f.identifiers.is_none());
        assert!(f.validate().is_ok());
    }

    #[test]
    fn address_query_filter() {
        let f = Address::long_form("pk", "slug").to_query().to_filter();
        assert_eq!(f.identifiers, Some(vec!["slug".to_string()]));
        assert_eq!(f.authors, Some(vec!["pk".to_string()]));
        assert!(f.limit.is_none());
    }

    #[test]
    fn validation_rejects_bad_filters() {
        let mut f = Query::articles_by("pk").to_filter();
        f.limit = Some(0);
        assert!(f.validate().is_err());
        f.limit = Some(MAX_PAGE_SIZE + 1);
        assert!(f.validate().is_err());
        f.limit = Some(10);
        f.authors = Some(vec!["  ".into()]);
        assert!(f.validate().is_err());
        f.authors = Some(Vec::new());
        assert!(f.validate().is_err());
        f.authors = None;
        f.kinds = Some(Vec::new());
        assert!(f.validate().is_err());
    }
}
