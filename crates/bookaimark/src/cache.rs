//! # Response Cache
//!
//! In-process store of rendered responses with tag-based invalidation. Like the
//! rate limiter it is an explicitly constructed value shared through the server
//! state; the HTTP glue (which requests are cacheable, the `X-Cache` header)
//! lives in the server crate.
//!
//! ## Entries
//!
//! An entry is keyed by [`cache_key`] (method, URI and the headers that change
//! the response) and holds status, content type, body, tags and an expiry.
//! Bodies may be stored gzip-compressed; [`ResponseCache::get`] always returns
//! them inflated.
//!
//! ## Invalidation
//!
//! Writes call [`ResponseCache::invalidate_by_tags`] with labels such as
//! `categories` or `user:<id>`; every entry sharing one of them is dropped.
//! There is nothing finer than tags.
//!
//! A response is computed before it is stored, and a write may invalidate its
//! tags in between. Every tag therefore carries a generation that
//! `invalidate_by_tags` bumps. A fill captures [`TagGenerations`] before
//! running the handler and [`ResponseCache::insert`] drops the body if
//! any of them moved, so a pre-write body never outlives the write.
//!
//! ## Size
//!
//! At `max_entries`, expired entries are purged first; if that frees nothing
//! the entry closest to expiry is evicted.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A response as stored and served by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct Entry {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
    compressed: bool,
    tags: HashSet<String>,
    expires_at: Instant,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Generations of a fill's tags, captured before its response was computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGenerations {
    tags: Vec<String>,
    generations: Vec<u64>,
}

impl TagGenerations {
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    generations: HashMap<String, u64>,
}

impl State {
    fn generation(&self, tag: &str) -> u64 {
        self.generations.get(tag).copied().unwrap_or_default()
    }

    fn is_current(&self, since: &TagGenerations) -> bool {
        since
            .tags
            .iter()
            .zip(&since.generations)
            .all(|(tag, generation)| self.generation(tag) == *generation)
    }
}

pub struct ResponseCache {
    max_entries: usize,
    state: Mutex<State>,
}

impl ResponseCache {
    /// A cache holding at most `max_entries` responses; 0 disables storing.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            state: Mutex::new(State::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<CachedResponse> {
        let mut state = self.lock();
        let entries = &mut state.entries;
        let entry = entries.get(key)?;
        if !entry.is_fresh(now) {
            entries.remove(key);
            tracing::debug!(key, "cache entry expired");
            return None;
        }

        let body = if entry.compressed {
            inflate(&entry.body)
        } else {
            Ok(entry.body.clone())
        };
        let cached = body.map(|body| CachedResponse {
            status: entry.status,
            content_type: entry.content_type.clone(),
            body,
        });

        match cached {
            Ok(cached) => Some(cached),
            Err(err) => {
                tracing::warn!(key, error = %err, "dropping undecodable cache entry");
                entries.remove(key);
                None
            }
        }
    }

    /// Capture the current generations of `tags`; pass them to
    /// [`insert`](Self::insert) once the response is ready.
    pub fn generations(&self, tags: &[String]) -> TagGenerations {
        let state = self.lock();
        TagGenerations {
            tags: tags.to_vec(),
            generations: tags.iter().map(|tag| state.generation(tag)).collect(),
        }
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        response: CachedResponse,
        ttl: Duration,
        since: &TagGenerations,
        compress: bool,
    ) -> bool {
        self.insert_at(key, response, ttl, since, compress, Instant::now())
    }

    /// Store `response` under `key` until `now + ttl`, tagged with the tags of
    /// `since`, unless one of them was invalidated after `since` was captured.
    /// Returns whether the response was stored.
    pub fn insert_at(
        &self,
        key: impl Into<String>,
        response: CachedResponse,
        ttl: Duration,
        since: &TagGenerations,
        compress: bool,
        now: Instant,
    ) -> bool {
        if self.max_entries == 0 || ttl.is_zero() {
            return false;
        }
        let key = key.into();

        let (body, compressed) = if compress {
            match deflate(&response.body) {
                Ok(packed) => (packed, true),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "compression failed, caching raw body");
                    (response.body, false)
                }
            }
        } else {
            (response.body, false)
        };

        let entry = Entry {
            status: response.status,
            content_type: response.content_type,
            body,
            compressed,
            tags: since.tags.iter().cloned().collect(),
            expires_at: now + ttl,
        };

        let mut state = self.lock();
        if !state.is_current(since) {
            tracing::debug!(key = %key, "tags invalidated during fill, not caching");
            return false;
        }
        let entries = &mut state.entries;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            make_room(entries, now);
        }
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), compressed, "cached response");
        entries.insert(key, entry);
        true
    }

    /// Drop every entry carrying any of `tags` and bump their generations.
    /// Returns how many entries were removed.
    pub fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let mut state = self.lock();
        for tag in tags {
            *state.generations.entry(tag.as_ref().to_string()).or_default() += 1;
        }
        let entries = &mut state.entries;
        let before = entries.len();
        entries.retain(|_, entry| !tags.iter().any(|tag| entry.tags.contains(tag.as_ref())));
        let removed = before - entries.len();
        if removed > 0 {
            let tags: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
            tracing::debug!(?tags, removed, "invalidated cache entries");
        }
        removed
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let removed = purge_expired(&mut self.lock().entries, now);
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Key for a request: method, URI, and the headers the response varies on.
pub fn cache_key(method: &str, uri: &str, authorization: Option<&str>, accept: Option<&str>) -> String {
    format!(
        "{}:{}|authorization={}|accept={}",
        method.to_ascii_uppercase(),
        uri,
        authorization.unwrap_or_default(),
        accept.unwrap_or_default()
    )
}

fn purge_expired(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_fresh(now));
    before - entries.len()
}

fn make_room(entries: &mut HashMap<String, Entry>, now: Instant) {
    if purge_expired(entries, now) > 0 {
        return;
    }
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        tracing::debug!(key = %key, "evicting cache entry closest to expiry");
        entries.remove(&key);
    }
}

fn deflate(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn inflate(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    const TTL: Duration = Duration::from_secs(60);

    fn store(cache: &ResponseCache, key: &str, ttl: Duration, labels: &[&str], now: Instant) {
        let since = cache.generations(&tags(labels));
        cache.insert_at(key, response(key), ttl, &since, false, now);
    }

    #[test]
    fn test_hit_returns_stored_response() {
        let cache = ResponseCache::new(16);
        let since = cache.generations(&tags(&["categories"]));
        cache.insert("k", response("{\"a\":1}"), TTL, &since, false);

        assert_eq!(cache.get("k"), Some(response("{\"a\":1}")));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new(16);
        let now = Instant::now();
        store(&cache, "k", TTL, &[], now);

        assert!(cache.get_at("k", now + Duration::from_secs(59)).is_some());
        assert!(cache.get_at("k", now + TTL).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compressed_body_is_inflated_on_hit() {
        let cache = ResponseCache::new(16);
        let body = "{\"data\":[".to_string() + &"\"bookmark\",".repeat(200) + "null]}";
        assert!(cache.insert("k", response(&body), TTL, &cache.generations(&[]), true));

        {
            let state = cache.lock();
            let entry = &state.entries["k"];
            assert!(entry.compressed);
            assert!(entry.body.len() < body.len());
        }
        assert_eq!(cache.get("k").unwrap().body, body.as_bytes());
    }

    #[test]
    fn test_invalidate_by_tags_removes_intersecting_entries() {
        let cache = ResponseCache::new(16);
        let now = Instant::now();
        store(&cache, "a", TTL, &["categories", "user:1"], now);
        store(&cache, "b", TTL, &["goals", "user:1"], now);
        store(&cache, "c", TTL, &["goals", "user:2"], now);

        assert_eq!(cache.invalidate_by_tags(&["user:1"]), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.invalidate_by_tags(&["nothing"]), 0);
    }

    #[test]
    fn test_fill_invalidated_in_flight_is_not_stored() {
        let cache = ResponseCache::new(16);
        let now = Instant::now();
        let since = cache.generations(&tags(&["categories", "user:1"]));

        // A write lands while the response is being computed.
        cache.invalidate_by_tags(&["user:1"]);

        assert!(!cache.insert_at("k", response("stale"), TTL, &since, false, now));
        assert!(cache.get_at("k", now).is_none());

        let fresh = cache.generations(&tags(&["categories", "user:1"]));
        assert!(cache.insert_at("k", response("fresh"), TTL, &fresh, false, now));
        assert_eq!(cache.get_at("k", now), Some(response("fresh")));
    }

    #[test]
    fn test_invalidating_other_tags_keeps_the_fill() {
        let cache = ResponseCache::new(16);
        let since = cache.generations(&tags(&["categories"]));
        cache.invalidate_by_tags(&["goals", "user:2"]);

        assert!(cache.insert("k", response("x"), TTL, &since, false));
        assert_eq!(cache.get("k").unwrap().body, b"x");
        assert_eq!(since.tags(), ["categories".to_string()]);
    }

    #[test]
    fn test_purge_expired_drops_only_stale_entries() {
        let cache = ResponseCache::new(16);
        let now = Instant::now();
        store(&cache, "short", Duration::from_secs(1), &[], now);
        store(&cache, "long", TTL, &[], now);

        assert_eq!(cache.purge_expired_at(now + Duration::from_secs(2)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at("long", now + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn test_full_cache_purges_expired_before_evicting() {
        let cache = ResponseCache::new(2);
        let now = Instant::now();
        store(&cache, "short", Duration::from_secs(1), &[], now);
        store(&cache, "long", TTL, &[], now);

        let later = now + Duration::from_secs(5);
        store(&cache, "new", TTL, &[], later);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("long", later).is_some());
        assert!(cache.get_at("new", later).is_some());
    }

    #[test]
    fn test_full_cache_evicts_entry_closest_to_expiry() {
        let cache = ResponseCache::new(2);
        let now = Instant::now();
        store(&cache, "soon", Duration::from_secs(10), &[], now);
        store(&cache, "late", TTL, &[], now);
        store(&cache, "new", TTL, &[], now);

        assert!(cache.get_at("soon", now).is_none());
        assert!(cache.get_at("late", now).is_some());
        assert!(cache.get_at("new", now).is_some());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = ResponseCache::new(0);
        cache.insert("k", response("x"), TTL, &cache.generations(&[]), false);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_cache_key_varies_by_identity_and_accept() {
        let anonymous = cache_key("get", "/api/categories?user_id=1", None, None);
        let with_auth = cache_key("GET", "/api/categories?user_id=1", Some("Bearer t"), None);
        let with_accept = cache_key("GET", "/api/categories?user_id=1", None, Some("text/html"));

        assert!(anonymous.starts_with("GET:/api/categories?user_id=1"));
        assert_ne!(anonymous, with_auth);
        assert_ne!(anonymous, with_accept);
    }
}
