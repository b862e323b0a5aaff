/*
 * lib.rs
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

//! C FFI for ned core: article pages from one relay, paginated listings, and addressed (naddr)
//! lookups across relays.
//! All string parameters are UTF-8 NUL-terminated. Fetches run on a shared tokio runtime and
//! report through callbacks on a runtime thread; the UI must marshal to its main thread.

use libc::{c_char, c_int, c_void, size_t};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use ned_core::config::{default_config_path, load_config};
use ned_core::protocol::nostr::{
    fetch_by_address, fetch_page, public_key_to_hex, relay_candidates, Address, Article, Paginator,
    Query, WebSocketConnector,
};
use ned_core::{FetchConfig, FetchError};
use tracing::warn;

/// Wrapper so *mut c_void can be moved into Send futures. C callbacks are invoked from runtime threads.
struct SendableUserData(*mut c_void);
unsafe impl Send for SendableUserData {}
unsafe impl Sync for SendableUserData {}

/// One article, borrowed for the duration of the on_article callback. Copy anything you keep.
#[repr(C)]
pub struct NedArticle {
    pub id: *const c_char,
    pub pubkey: *const c_char,
    pub d_tag: *const c_char,
    pub title: *const c_char,
    pub summary: *const c_char,
    pub image: *const c_char,
    pub content: *const c_char,
    /// naddr1... pointer to this article (empty if it cannot be encoded).
    pub naddr: *const c_char,
    pub tags: *const *const c_char,
    pub tag_count: size_t,
    pub created_at: u64,
    pub published_at: u64,
}

/// Called once per article, in relay arrival order.
type OnArticle = extern "C" fn(*const NedArticle, *mut c_void);
/// Page finished: status 0 ok, -1 failure (ned_last_error); next_cursor -1 when there is no next page.
type OnPageComplete = extern "C" fn(c_int, i64, *mut c_void);
/// Lookup finished: status 0 found, 1 not found, -1 failure (ned_last_error).
type OnLookupComplete = extern "C" fn(c_int, *mut c_void);

/// A listing walked page by page against one relay.
struct PaginatorHolder {
    relay: String,
    paginator: Paginator,
}

/// Hosts the shared tokio runtime for all relay I/O. Paginators keyed by opaque id.
struct Registry {
    runtime: tokio::runtime::Runtime,
    paginators: RwLock<HashMap<String, Arc<tokio::sync::Mutex<PaginatorHolder>>>>,
    paginator_counter: AtomicU64,
}

fn registry() -> Option<&'static Registry> {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    REGISTRY
        .get_or_try_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("ned-relay")
                .enable_all()
                .build()
                .map(|runtime| Registry {
                    runtime,
                    paginators: RwLock::new(HashMap::new()),
                    paginator_counter: AtomicU64::new(0),
                })
        })
        .ok()
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

/// NUL-free copy of `s` as a C string.
fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = std::cell::RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(c_string(msg)));
}

fn set_last_fetch_error(err: &FetchError) {
    set_last_error(&err.to_string());
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Settings for a call: ~/.ned/config.xml plus environment, or defaults if that cannot be read.
fn current_config() -> FetchConfig {
    let loaded = match default_config_path() {
        Some(path) => load_config(&path),
        None => {
            let mut config = FetchConfig::default();
            config.apply_env().map(|_| config)
        }
    };
    loaded.unwrap_or_else(|e| {
        warn!(error = %e, "using default settings");
        FetchConfig::default()
    })
}

/// Relay URL argument: trimmed, must not be blank.
fn relay_arg(relay_url: *const c_char) -> Result<String, String> {
    match ptr_to_str(relay_url) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err("relay_url is null or not valid UTF-8".to_string()),
    }
}

/// Author argument: npub or hex, NULL for all authors.
fn author_arg(author: *const c_char) -> Result<Option<String>, FetchError> {
    ptr_to_str(author).map(|a| public_key_to_hex(&a)).transpose()
}

/// Per-page limit: 0 means the configured page size.
fn page_limit(limit: u32, config: &FetchConfig) -> u32 {
    if limit == 0 {
        config.page_size
    } else {
        limit
    }
}

/// Cursor for on_complete: -1 when there is no next page.
fn cursor_arg(cursor: Option<u64>) -> i64 {
    cursor.and_then(|c| i64::try_from(c).ok()).unwrap_or(-1)
}

/// Comma-separated relay list: trimmed, blanks dropped.
fn split_relays(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Owns the C strings behind one NedArticle while the callback runs.
struct ArticleStrings {
    fields: [CString; 8],
    tags: Vec<CString>,
    tag_ptrs: Vec<*const c_char>,
}

impl ArticleStrings {
    fn new(article: &Article) -> Self {
        let naddr = article.address().to_naddr().unwrap_or_default();
        let tags: Vec<CString> = article.tags.iter().map(|t| c_string(t)).collect();
        let tag_ptrs = tags.iter().map(|t| t.as_ptr()).collect();
        Self {
            fields: [
                c_string(&article.id),
                c_string(&article.pubkey),
                c_string(&article.d_tag),
                c_string(&article.title),
                c_string(&article.summary),
                c_string(&article.image),
                c_string(&article.content),
                c_string(&naddr),
            ],
            tags,
            tag_ptrs,
        }
    }

    fn as_ffi(&self, article: &Article) -> NedArticle {
        NedArticle {
            id: self.fields[0].as_ptr(),
            pubkey: self.fields[1].as_ptr(),
            d_tag: self.fields[2].as_ptr(),
            title: self.fields[3].as_ptr(),
            summary: self.fields[4].as_ptr(),
            image: self.fields[5].as_ptr(),
            content: self.fields[6].as_ptr(),
            naddr: self.fields[7].as_ptr(),
            tags: if self.tag_ptrs.is_empty() { ptr::null() } else { self.tag_ptrs.as_ptr() },
            tag_count: self.tags.len(),
            created_at: article.created_at,
            published_at: article.published_at,
        }
    }
}

fn emit_article(on_article: OnArticle, article: &Article, user_data: *mut c_void) {
    let strings = ArticleStrings::new(article);
    let ffi = strings.as_ffi(article);
    on_article(&ffi, user_data);
}

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn ned_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message on the calling thread. Valid until the next FFI call on that thread. Do not free.
#[no_mangle]
pub extern "C" fn ned_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string returned by ned_config_relays or ned_paginator_new. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn ned_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

/// Install a log subscriber writing to stderr, filtered by NED_LOG (default "info").
/// Returns 0, or -1 if a subscriber was already installed.
#[no_mangle]
pub extern "C" fn ned_init_logging() -> c_int {
    let filter = tracing_subscriber::EnvFilter::try_from_env("NED_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Configured relays (config file and NED_RELAYS), comma separated. Caller frees with ned_free_string.
#[no_mangle]
pub extern "C" fn ned_config_relays() -> *mut c_char {
    c_string(&current_config().relays.join(",")).into_raw()
}

/// Fetch one page of long-form articles from relay_url. The cursor is inclusive on most relays, so a
/// page fetched with it may repeat articles from the previous one; use a paginator to walk a listing.
/// author: npub or hex public key, or NULL for all authors. until: cursor from a previous page, or < 0 for the newest.
/// limit: articles per page, 0 for the configured page size. Returns 0 if the fetch was started, -1 on invalid arguments
/// (see ned_last_error); callbacks are not invoked in that case.
#[no_mangle]
pub unsafe extern "C" fn ned_fetch_page(
    relay_url: *const c_char,
    author: *const c_char,
    until: i64,
    limit: u32,
    on_article: OnArticle,
    on_complete: OnPageComplete,
    user_data: *mut c_void,
) -> c_int {
    let relay = match relay_arg(relay_url) {
        Ok(r) => r,
        Err(msg) => {
            set_last_error(&msg);
            return -1;
        }
    };
    let author = match author_arg(author) {
        Ok(a) => a,
        Err(e) => {
            set_last_fetch_error(&e);
            return -1;
        }
    };
    let config = current_config();
    let query = Query::Articles {
        author,
        until: u64::try_from(until).ok(),
        limit: page_limit(limit, &config),
    };
    let filter = query.to_filter();
    if let Err(e) = filter.validate() {
        set_last_fetch_error(&e);
        return -1;
    }
    let registry = match registry() {
        Some(r) => r,
        None => {
            set_last_error("failed to create runtime");
            return -1;
        }
    };
    clear_last_error();
    let user = SendableUserData(user_data);
    registry.runtime.spawn(async move {
        let user = user;
        match fetch_page(&WebSocketConnector, &relay, &filter, &config).await {
            Ok(page) => {
                for article in &page.items {
                    emit_article(on_article, article, user.0);
                }
                clear_last_error();
                on_complete(0, cursor_arg(page.next_cursor), user.0);
            }
            Err(e) => {
                set_last_fetch_error(&e);
                on_complete(-1, -1, user.0);
            }
        }
    });
    0
}

/// Create a paginator over relay_url's long-form listing. author and limit as for ned_fetch_page;
/// until < 0 starts from the newest article. Returns the paginator id (free the string with
/// ned_free_string, release the paginator with ned_paginator_free), or NULL on invalid arguments
/// (see ned_last_error).
#[no_mangle]
pub unsafe extern "C" fn ned_paginator_new(
    relay_url: *const c_char,
    author: *const c_char,
    until: i64,
    limit: u32,
) -> *mut c_char {
    let relay = match relay_arg(relay_url) {
        Ok(r) => r,
        Err(msg) => {
            set_last_error(&msg);
            return ptr::null_mut();
        }
    };
    let author = match author_arg(author) {
        Ok(a) => a,
        Err(e) => {
            set_last_fetch_error(&e);
            return ptr::null_mut();
        }
    };
    let config = current_config();
    let mut paginator = Paginator::new(author, page_limit(limit, &config));
    if let Ok(until) = u64::try_from(until) {
        paginator = paginator.starting_at(until);
    }
    if let Err(e) = paginator.query().to_filter().validate() {
        set_last_fetch_error(&e);
        return ptr::null_mut();
    }
    let registry = match registry() {
        Some(r) => r,
        None => {
            set_last_error("failed to create runtime");
            return ptr::null_mut();
        }
    };
    let n = registry.paginator_counter.fetch_add(1, Ordering::Relaxed);
    let id = format!("paginator-{}", n);
    let holder = Arc::new(tokio::sync::Mutex::new(PaginatorHolder { relay, paginator }));
    match registry.paginators.write() {
        Ok(mut guard) => {
            guard.insert(id.clone(), holder);
        }
        Err(_) => {
            set_last_error("paginator registry unavailable");
            return ptr::null_mut();
        }
    }
    clear_last_error();
    c_string(&id).into_raw()
}

/// Fetch the next page of a paginator. Articles already delivered by this paginator are not repeated.
/// on_complete gets next_cursor -1 once the listing is finished; later calls complete with no articles.
/// Calls on one paginator run one at a time. Returns 0 if the fetch was started, -1 if the id is unknown.
#[no_mangle]
pub unsafe extern "C" fn ned_paginator_next(
    paginator_id: *const c_char,
    on_article: OnArticle,
    on_complete: OnPageComplete,
    user_data: *mut c_void,
) -> c_int {
    let id = match ptr_to_str(paginator_id) {
        Some(s) => s,
        None => {
            set_last_error("paginator_id is null or not valid UTF-8");
            return -1;
        }
    };
    let registry = match registry() {
        Some(r) => r,
        None => {
            set_last_error("failed to create runtime");
            return -1;
        }
    };
    let holder = registry
        .paginators
        .read()
        .ok()
        .and_then(|guard| guard.get(&id).cloned());
    let holder = match holder {
        Some(h) => h,
        None => {
            set_last_error(&format!("unknown paginator {}", id));
            return -1;
        }
    };
    clear_last_error();
    let user = SendableUserData(user_data);
    registry.runtime.spawn(async move {
        let user = user;
        let config = current_config();
        let mut guard = holder.lock().await;
        let PaginatorHolder { relay, paginator } = &mut *guard;
        match paginator.next_page(&WebSocketConnector, relay.as_str(), &config).await {
            Ok(page) => {
                for article in &page.items {
                    emit_article(on_article, article, user.0);
                }
                clear_last_error();
                on_complete(0, cursor_arg(paginator.next_cursor()), user.0);
            }
            Err(e) => {
                set_last_fetch_error(&e);
                on_complete(-1, -1, user.0);
            }
        }
    });
    0
}

/// Release a paginator. A fetch already in progress still completes. No-op if the id is unknown.
#[no_mangle]
pub unsafe extern "C" fn ned_paginator_free(paginator_id: *const c_char) {
    let id = match ptr_to_str(paginator_id) {
        Some(s) => s,
        None => return,
    };
    if let Some(registry) = registry() {
        let _ = registry.paginators.write().map(|mut g| g.remove(&id));
    }
}

/// Locate one article by naddr. Candidates: the naddr's relay hints, then preferred_relay (may be NULL),
/// then relays (comma separated; NULL or empty for the configured list). on_article is called once if
/// found. Returns 0 if the lookup was started, -1 on invalid arguments (see ned_last_error).
#[no_mangle]
pub unsafe extern "C" fn ned_fetch_by_address(
    naddr: *const c_char,
    preferred_relay: *const c_char,
    relays: *const c_char,
    on_article: OnArticle,
    on_complete: OnLookupComplete,
    user_data: *mut c_void,
) -> c_int {
    let naddr = match ptr_to_str(naddr) {
        Some(s) => s,
        None => {
            set_last_error("naddr is null or not valid UTF-8");
            return -1;
        }
    };
    let address = match Address::from_naddr(&naddr) {
        Ok(a) => a,
        Err(e) => {
            set_last_fetch_error(&e);
            return -1;
        }
    };
    let preferred = ptr_to_str(preferred_relay);
    let relays = ptr_to_str(relays).map(|s| split_relays(&s)).unwrap_or_default();
    let registry = match registry() {
        Some(r) => r,
        None => {
            set_last_error("failed to create runtime");
            return -1;
        }
    };
    clear_last_error();
    let user = SendableUserData(user_data);
    registry.runtime.spawn(async move {
        let user = user;
        let config = current_config();
        let configured = if relays.is_empty() { config.relays.clone() } else { relays };
        let preferred = preferred.or_else(|| config.preferred_relay.clone());
        let candidates = relay_candidates(&address.relays, preferred.as_deref(), &configured);
        match fetch_by_address(&WebSocketConnector, &address, &candidates, &config).await {
            Ok(Some(article)) => {
                emit_article(on_article, &article, user.0);
                clear_last_error();
                on_complete(0, user.0);
            }
            Ok(None) => {
                clear_last_error();
                on_complete(1, user.0);
            }
            Err(e) => {
                set_last_fetch_error(&e);
                on_complete(-1, user.0);
            }
        }
    });
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_relay_lists() {
        assert_eq!(
            split_relays(" wss://a.example ,, wss://b.example,"),
            vec!["wss://a.example", "wss://b.example"]
        );
        assert!(split_relays("").is_empty());
    }

    #[test]
    fn article_strings_survive_nul_and_tags() {
        let article = Article {
            id: "id\0x".into(),
            pubkey: "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d".into(),
            d_tag: "post".into(),
            title: "Title".into(),
            summary: String::new(),
            image: String::new(),
            content: "Body".into(),
            tags: vec!["rust".into(), "nostr".into()],
            created_at: 10,
            published_at: 5,
        };
        let strings = ArticleStrings::new(&article);
        let ffi = strings.as_ffi(&article);
        unsafe {
            assert_eq!(CStr::from_ptr(ffi.id).to_str().unwrap(), "idx");
            assert!(CStr::from_ptr(ffi.naddr).to_str().unwrap().starts_with("naddr1"));
            assert_eq!(ffi.tag_count, 2);
            assert_eq!(CStr::from_ptr(*ffi.tags.add(1)).to_str().unwrap(), "nostr");
        }
        assert_eq!(ffi.published_at, 5);
    }

    #[test]
    fn invalid_arguments_fail_synchronously() {
        extern "C" fn on_article(_: *const NedArticle, _: *mut c_void) {}
        extern "C" fn on_page(_: c_int, _: i64, _: *mut c_void) {
            panic!("must not be called");
        }
        extern "C" fn on_lookup(_: c_int, _: *mut c_void) {
            panic!("must not be called");
        }
        let bad_author = c_string("not-a-key");
        let relay = c_string("wss://relay.example");
        let status = unsafe {
            ned_fetch_page(relay.as_ptr(), bad_author.as_ptr(), -1, 0, on_article, on_page, ptr::null_mut())
        };
        assert_eq!(status, -1);
        assert!(!ned_last_error().is_null());

        let status = unsafe {
            ned_fetch_page(ptr::null(), ptr::null(), -1, 0, on_article, on_page, ptr::null_mut())
        };
        assert_eq!(status, -1);

        let bad = c_string("naddr1bogus");
        let status = unsafe {
            ned_fetch_by_address(bad.as_ptr(), ptr::null(), ptr::null(), on_article, on_lookup, ptr::null_mut())
        };
        assert_eq!(status, -1);
    }

    #[test]
    fn zero_limit_uses_configured_page_size() {
        let config = FetchConfig { page_size: 25, ..FetchConfig::default() };
        assert_eq!(page_limit(0, &config), 25);
        assert_eq!(page_limit(3, &config), 3);
        assert_eq!(cursor_arg(None), -1);
        assert_eq!(cursor_arg(Some(80)), 80);
    }

    #[test]
    fn paginator_handles() {
        extern "C" fn on_article(_: *const NedArticle, _: *mut c_void) {}
        extern "C" fn on_page(_: c_int, _: i64, _: *mut c_void) {
            panic!("must not be called");
        }
        let relay = c_string("wss://relay.example");
        let bad_author = c_string("not-a-key");
        let id = unsafe { ned_paginator_new(relay.as_ptr(), bad_author.as_ptr(), -1, 0) };
        assert!(id.is_null());
        assert!(!ned_last_error().is_null());
        let id = unsafe { ned_paginator_new(relay.as_ptr(), ptr::null(), -1, 501) };
        assert!(id.is_null());

        let first = unsafe { ned_paginator_new(relay.as_ptr(), ptr::null(), 80, 0) };
        let second = unsafe { ned_paginator_new(relay.as_ptr(), ptr::null(), -1, 5) };
        assert!(!first.is_null() && !second.is_null());
        unsafe {
            assert_ne!(CStr::from_ptr(first), CStr::from_ptr(second));
            ned_paginator_free(first);
            assert_eq!(ned_paginator_next(first, on_article, on_page, ptr::null_mut()), -1);
            ned_paginator_free(second);
            ned_free_string(first);
            ned_free_string(second);
        }
        let unknown = c_string("paginator-unknown");
        assert_eq!(
            unsafe { ned_paginator_next(unknown.as_ptr(), on_article, on_page, ptr::null_mut()) },
            -1
        );
    }
}
