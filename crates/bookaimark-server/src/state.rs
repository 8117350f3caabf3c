use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use bookaimark::api::BookmarkApi;
use bookaimark::cache::ResponseCache;
use bookaimark::config::BookmarkConfig;
use bookaimark::error::{BookmarkError, Result};
use bookaimark::ratelimit::{RateLimitConfig, RateLimiter};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::{authenticate_request, AuthOptions, Identity, SessionStore};
use crate::response::ApiError;

pub type SharedState = Arc<AppState>;

/// How GET responses are cached.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub compression: bool,
}

/// Shared application state. Built once at startup; tests build their own.
pub struct AppState {
    /// Synchronous file I/O; call it through [`AppState::run`].
    pub api: Arc<BookmarkApi>,
    pub sessions: SessionStore,
    pub dev_fallback: bool,
    /// GET, HEAD and OPTIONS requests.
    pub read_limiter: RateLimiter,
    /// Every other method.
    pub write_limiter: RateLimiter,
    /// Key clients by `x-forwarded-for`/`x-real-ip` instead of the socket peer.
    pub trust_proxy_headers: bool,
    pub cache: ResponseCache,
    pub cache_policy: CachePolicy,
}

impl AppState {
    /// Open the data directory and wire every component from `config`.
    pub fn from_config(config: &BookmarkConfig) -> Result<Self> {
        let api = BookmarkApi::open(config)?;
        Ok(Self::new(api, config))
    }

    pub fn new(api: BookmarkApi, config: &BookmarkConfig) -> Self {
        let window = Duration::from_secs(config.limits.window_secs);
        let algorithm = config.limits.algorithm;
        let sessions = SessionStore::new(config.sessions());
        tracing::info!(
            sessions = sessions.len(),
            dev_fallback = config.dev_fallback,
            read_limit = config.limits.read_requests,
            write_limit = config.limits.write_requests,
            ?algorithm,
            trust_proxy_headers = config.limits.trust_proxy_headers,
            "application state ready"
        );

        Self {
            api: Arc::new(api),
            sessions,
            dev_fallback: config.dev_fallback,
            read_limiter: RateLimiter::new(
                RateLimitConfig::new(config.limits.read_requests, window).with_algorithm(algorithm),
            ),
            write_limiter: RateLimiter::new(
                RateLimitConfig::new(config.limits.write_requests, window).with_algorithm(algorithm),
            ),
            trust_proxy_headers: config.limits.trust_proxy_headers,
            cache: ResponseCache::new(config.cache.max_entries),
            cache_policy: CachePolicy {
                ttl: Duration::from_secs(config.cache.ttl_secs),
                compression: config.cache.compression,
            },
        }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<Identity, ApiError> {
        let options = AuthOptions {
            allow_dev_fallback: self.dev_fallback,
            required: true,
        };
        authenticate_request(headers, &self.sessions, options)?
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }

    /// Run a [`BookmarkApi`] call on the blocking pool so file I/O and the
    /// document locks never stall a runtime worker.
    pub async fn run<T, F>(&self, call: F) -> std::result::Result<T, ApiError>
    where
        F: FnOnce(&BookmarkApi) -> std::result::Result<T, BookmarkError> + Send + 'static,
        T: Send + 'static,
    {
        let api = Arc::clone(&self.api);
        tokio::task::spawn_blocking(move || call(&api))
            .await
            .map_err(|err| ApiError::internal(format!("storage task failed: {err}")))?
            .map_err(ApiError::from)
    }

    /// Drop expired rate-limit counters and cache entries. Returns how many
    /// of each were removed.
    pub fn sweep_expired(&self) -> (usize, usize) {
        let counters = self.read_limiter.sweep() + self.write_limiter.sweep();
        let entries = self.cache.purge_expired();
        if counters + entries > 0 {
            tracing::debug!(counters, entries, "swept expired state");
        }
        (counters, entries)
    }

    /// Call [`sweep_expired`](Self::sweep_expired) every `every` until the
    /// returned task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                state.sweep_expired();
            }
        })
    }

    /// Drop cached responses tagged with any of `resources` or with the user.
    pub fn invalidate(&self, resources: &[&str], user_id: &str) {
        let mut tags: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
        tags.push(user_tag(user_id));
        self.cache.invalidate_by_tags(&tags);
    }
}

pub fn user_tag(user_id: &str) -> String {
    format!("user:{user_id}")
}
