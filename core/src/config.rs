/*
 * config.rs
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

//! Fetch settings: relay list, preferred relay, timeouts and page size.
//! Loaded from ~/.ned/config.xml with quick_xml, then overridden from the environment.
//! The settings are passed into every fetch entry point; nothing here is global.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use crate::error::FetchError;
use crate::protocol::nostr::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Relays used when the user has not configured any.
pub const DEFAULT_RELAYS: [&str; 3] = ["wss://relay.damus.io", "wss://nos.lol", "wss://relay.nostr.band"];

/// Seconds a session waits for EOSE before returning what it has.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Seconds allowed for TCP connect, TLS and the WebSocket handshake together.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Environment variable holding a comma-separated relay list.
pub const ENV_RELAYS: &str = "NED_RELAYS";
/// Environment variable holding the session timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "NED_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Configured relays, in priority order, without duplicates.
    pub relays: Vec<String>,
    /// Relay the user is currently browsing; tried before the others for addressed lookups.
    pub preferred_relay: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub page_size: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            preferred_relay: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect()
}

impl FetchConfig {
    /// Add a relay at the end of the list. Returns false if blank or already present.
    pub fn add_relay(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.relays.iter().any(|r| r == url) {
            return false;
        }
        self.relays.push(url.to_string());
        true
    }

    /// Remove a relay. Returns false if it was not configured.
    pub fn remove_relay(&mut self, url: &str) -> bool {
        let url = url.trim();
        let before = self.relays.len();
        self.relays.retain(|r| r != url);
        self.relays.len() != before
    }

    /// Restore the default relay list.
    pub fn reset_relays(&mut self) {
        self.relays = default_relays();
    }

    /// Apply `NED_RELAYS` and `NED_TIMEOUT_SECS` when set.
    pub fn apply_env(&mut self) -> Result<(), FetchError> {
        self.apply_overrides(
            std::env::var(ENV_RELAYS).ok().as_deref(),
            std::env::var(ENV_TIMEOUT_SECS).ok().as_deref(),
        )
    }

    fn apply_overrides(&mut self, relays: Option<&str>, timeout_secs: Option<&str>) -> Result<(), FetchError> {
        if let Some(list) = relays {
            let mut parsed = FetchConfig { relays: Vec::new(), ..self.clone() };
            for url in list.split(',') {
                parsed.add_relay(url);
            }
            if !parsed.relays.is_empty() {
                debug!(count = parsed.relays.len(), "relay list from {}", ENV_RELAYS);
                self.relays = parsed.relays;
            }
        }
        if let Some(secs) = timeout_secs {
            self.timeout = Duration::from_secs(parse_secs(ENV_TIMEOUT_SECS, secs)?);
        }
        Ok(())
    }
}

fn parse_secs(what: &str, value: &str) -> Result<u64, FetchError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FetchError::Config(format!("{}: expected a positive number of seconds, got {:?}", what, value))),
    }
}

/// Default config directory: ~/.ned.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".ned"))
}

/// Default config path: ~/.ned/config.xml.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|d| d.join("config.xml"))
}

/// Load settings from `path` (defaults if the file does not exist), then apply environment overrides.
pub fn load_config(path: &Path) -> Result<FetchConfig, FetchError> {
    let mut config = read_config_file(path)?;
    config.apply_env()?;
    Ok(config)
}

/// Settings from `path` alone; defaults if the file does not exist.
pub fn read_config_file(path: &Path) -> Result<FetchConfig, FetchError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_config_xml(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(FetchConfig::default())
        }
        Err(e) => Err(FetchError::Config(format!("{}: {}", path.display(), e))),
    }
}

/// Parse XML settings using quick_xml. Expects
/// <ned><relays><relay>...</relay>...</relays><preferred-relay>...</preferred-relay><timeout>..</timeout><page-size>..</page-size></ned>.
/// Unknown elements are ignored; an empty or absent relay list keeps the defaults.
pub fn parse_config_xml(content: &str) -> Result<FetchConfig, FetchError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut config = FetchConfig::default();
    let mut relays: Vec<String> = Vec::new();
    let mut element_name = Vec::<u8>::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(FetchError::Config(format!("XML parse error: {}", e))),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                element_name.clear();
                element_name.extend_from_slice(e.name().as_ref());
            }
            Ok(Event::Text(e)) => {
                if element_name.is_empty() {
                    continue;
                }
                let text = e
                    .unescape()
                    .map_err(|e| FetchError::Config(e.to_string()))?
                    .trim()
                    .to_string();
                match element_name.as_slice() {
                    b"relay" => {
                        if !text.is_empty() && !relays.contains(&text) {
                            relays.push(text);
                        }
                    }
                    b"preferred-relay" => {
                        if !text.is_empty() {
                            config.preferred_relay = Some(text);
                        }
                    }
                    b"timeout" => config.timeout = Duration::from_secs(parse_secs("timeout", &text)?),
                    b"connect-timeout" => {
                        config.connect_timeout = Duration::from_secs(parse_secs("connect-timeout", &text)?)
                    }
                    b"page-size" => config.page_size = parse_page_size(&text)?,
                    _ => {}
                }
                element_name.clear();
            }
            Ok(Event::End(_)) => element_name.clear(),
            _ => {}
        }
        buf.clear();
    }
    if !relays.is_empty() {
        config.relays = relays;
    }
    Ok(config)
}

fn parse_page_size(text: &str) -> Result<u32, FetchError> {
    match text.parse::<u32>() {
        Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(n),
        _ => Err(FetchError::Config(format!(
            "page-size must be between 1 and {}, got {:?}",
            MAX_PAGE_SIZE, text
        ))),
    }
}
