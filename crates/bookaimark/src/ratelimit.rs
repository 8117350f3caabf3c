//! # Rate Limiting
//!
//! In-process request counters keyed by a caller-supplied string
//! (`<method>:<ip>` in the server). A limiter is an ordinary value: the server
//! builds one per policy at startup and keeps it in its shared state, tests
//! build their own.
//!
//! ## Algorithms
//!
//! - [`Algorithm::FixedWindow`]: at most `max_requests` per window; the window
//!   starts with the first request and the count resets when it expires.
//! - [`Algorithm::SlidingWindow`]: the current window's count plus the previous
//!   window's count weighted by how much of it still overlaps the trailing
//!   window. Smooths out bursts at a window boundary.
//! - [`Algorithm::TokenBucket`]: consumed tokens drain continuously at
//!   `max_requests / window`, so capacity comes back gradually.
//!
//! All three share one counter shape (`count`, `previous`, `window_start`).
//! Counters are replaced lazily when a request arrives after they expired.
//! Every [`SWEEP_EVERY`] checks the limiter also drops every expired counter,
//! so keys that never come back do not pile up; [`RateLimiter::sweep`] does the
//! same on demand.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Tolerance for fractional counts.
const EPSILON: f64 = 1e-9;

/// Checks between opportunistic sweeps of expired counters.
pub const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window; 0 disables the limiter.
    pub max_requests: u32,
    pub window: Duration,
    pub algorithm: Algorithm,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window: window.max(Duration::from_secs(1)),
            algorithm: Algorithm::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }
}

/// Capacity left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the counter is back to full capacity.
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit of {limit} requests per {}s exceeded", .window.as_secs())]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after: Duration,
    pub window: Duration,
}

impl RateLimitExceeded {
    /// Whole seconds for a `Retry-After` header, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: f64,
    previous: f64,
    window_start: Instant,
}

impl Counter {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0.0,
            previous: 0.0,
            window_start: now,
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<HashMap<String, Counter>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn check(&self, key: &str) -> Result<RateLimitStatus, RateLimitExceeded> {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`, or reject it.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<RateLimitStatus, RateLimitExceeded> {
        if !self.config.is_enabled() {
            return Ok(RateLimitStatus {
                limit: 0,
                remaining: 0,
                reset_after: Duration::ZERO,
            });
        }

        let mut counters = self.lock();
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let before = counters.len();
            counters.retain(|_, counter| !self.is_expired(counter, now));
            tracing::debug!(removed = before - counters.len(), "swept expired counters");
        }
        let counter = counters
            .entry(key.to_string())
            .or_insert_with(|| Counter::fresh(now));

        let result = match self.config.algorithm {
            Algorithm::FixedWindow => self.fixed_window(counter, now),
            Algorithm::SlidingWindow => self.sliding_window(counter, now),
            Algorithm::TokenBucket => self.token_bucket(counter, now),
        };

        match &result {
            Ok(status) => tracing::debug!(key, remaining = status.remaining, "request admitted"),
            Err(exceeded) => tracing::debug!(
                key,
                retry_after_secs = exceeded.retry_after_secs(),
                "request rate limited"
            ),
        }
        result
    }

    /// Drop counters that would read as fresh on their next request.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut counters = self.lock();
        let before = counters.len();
        counters.retain(|_, counter| !self.is_expired(counter, now));
        before - counters.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Counter>> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn max(&self) -> f64 {
        f64::from(self.config.max_requests)
    }

    fn fixed_window(
        &self,
        counter: &mut Counter,
        now: Instant,
    ) -> Result<RateLimitStatus, RateLimitExceeded> {
        let window = self.config.window;
        if now.saturating_duration_since(counter.window_start) >= window {
            *counter = Counter::fresh(now);
        }
        let reset_after = window.saturating_sub(now.saturating_duration_since(counter.window_start));

        if counter.count + 1.0 > self.max() + EPSILON {
            return Err(self.exceeded(reset_after));
        }
        counter.count += 1.0;
        Ok(self.status(counter.count, reset_after))
    }

    fn sliding_window(
        &self,
        counter: &mut Counter,
        now: Instant,
    ) -> Result<RateLimitStatus, RateLimitExceeded> {
        let window = self.config.window;
        let elapsed = now.saturating_duration_since(counter.window_start);
        if elapsed >= window {
            let windows_passed = (elapsed.as_secs_f64() / window.as_secs_f64()).floor();
            counter.previous = if windows_passed < 2.0 { counter.count } else { 0.0 };
            counter.count = 0.0;
            counter.window_start += window.mul_f64(windows_passed);
        }

        let into_window = now.saturating_duration_since(counter.window_start);
        let window_secs = window.as_secs_f64();
        let overlap = 1.0 - into_window.as_secs_f64() / window_secs;
        let estimated = counter.count + counter.previous * overlap;
        let until_window_end = window.saturating_sub(into_window);

        if estimated + 1.0 > self.max() + EPSILON {
            let headroom = self.max() - 1.0 - counter.count;
            let retry_after = if headroom >= 0.0 && counter.previous > 0.0 {
                // Wait until the previous window's weight has decayed enough.
                let needed = window_secs * (1.0 - headroom / counter.previous);
                Duration::from_secs_f64((needed - into_window.as_secs_f64()).max(0.0))
            } else {
                until_window_end
            };
            return Err(self.exceeded(retry_after));
        }

        counter.count += 1.0;
        Ok(self.status(counter.count + counter.previous * overlap, until_window_end + window))
    }

    fn token_bucket(
        &self,
        counter: &mut Counter,
        now: Instant,
    ) -> Result<RateLimitStatus, RateLimitExceeded> {
        let rate = self.max() / self.config.window.as_secs_f64();
        let elapsed = now.saturating_duration_since(counter.window_start);
        counter.count = (counter.count - elapsed.as_secs_f64() * rate).max(0.0);
        counter.window_start = now;

        if counter.count + 1.0 > self.max() + EPSILON {
            let deficit = counter.count + 1.0 - self.max();
            return Err(self.exceeded(Duration::from_secs_f64(deficit / rate)));
        }
        counter.count += 1.0;
        Ok(self.status(counter.count, Duration::from_secs_f64(counter.count / rate)))
    }

    fn is_expired(&self, counter: &Counter, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(counter.window_start);
        let window = self.config.window;
        match self.config.algorithm {
            Algorithm::FixedWindow => elapsed >= window,
            Algorithm::SlidingWindow => elapsed >= window * 2,
            Algorithm::TokenBucket => {
                let rate = self.max() / window.as_secs_f64();
                rate <= 0.0 || elapsed.as_secs_f64() * rate >= counter.count
            }
        }
    }

    fn status(&self, used: f64, reset_after: Duration) -> RateLimitStatus {
        let remaining = (self.max() - used + EPSILON).floor().max(0.0) as u32;
        RateLimitStatus {
            limit: self.config.max_requests,
            remaining,
            reset_after,
        }
    }

    fn exceeded(&self, retry_after: Duration) -> RateLimitExceeded {
        RateLimitExceeded {
            limit: self.config.max_requests,
            retry_after,
            window: self.config.window,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64, algorithm: Algorithm) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig::new(max, Duration::from_secs(window_secs)).with_algorithm(algorithm),
        )
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_fixed_window_denies_request_over_limit() {
        let limiter = limiter(3, 60, Algorithm::FixedWindow);
        let start = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let status = limiter.check_at("GET:1.2.3.4", start).unwrap();
            assert_eq!(status.limit, 3);
            assert_eq!(status.remaining, expected_remaining);
        }

        let denied = limiter.check_at("GET:1.2.3.4", start + secs(10)).unwrap_err();
        assert_eq!(denied.limit, 3);
        assert_eq!(denied.retry_after, secs(50));
        assert_eq!(denied.retry_after_secs(), 50);
        assert_eq!(denied.window, secs(60));
    }

    #[test]
    fn test_fixed_window_admits_again_after_expiry() {
        let limiter = limiter(1, 60, Algorithm::FixedWindow);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_ok());
        assert!(limiter.check_at("k", start + secs(59)).is_err());

        let status = limiter.check_at("k", start + secs(60)).unwrap();
        assert_eq!(status.remaining, 0);
        assert_eq!(status.reset_after, secs(60));
    }

    #[test]
    fn test_keys_are_counted_independently() {
        let limiter = limiter(1, 60, Algorithm::FixedWindow);
        let now = Instant::now();

        assert!(limiter.check_at("GET:a", now).is_ok());
        assert!(limiter.check_at("GET:b", now).is_ok());
        assert!(limiter.check_at("POST:a", now).is_ok());
        assert!(limiter.check_at("GET:a", now).is_err());
    }

    #[test]
    fn test_zero_limit_disables_limiter() {
        let limiter = limiter(0, 60, Algorithm::FixedWindow);
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_at("k", now).is_ok());
        }
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_sliding_window_denies_burst_across_boundary() {
        let fixed = limiter(10, 60, Algorithm::FixedWindow);
        let sliding = limiter(10, 60, Algorithm::SlidingWindow);
        let start = Instant::now();

        for limiter in [&fixed, &sliding] {
            assert!(limiter.check_at("k", start).is_ok());
            for _ in 0..9 {
                assert!(limiter.check_at("k", start + secs(59)).is_ok());
            }
        }

        // Just past the boundary the fixed window starts over, the sliding
        // window still sees almost all of the previous burst.
        assert!(fixed.check_at("k", start + secs(61)).is_ok());
        let denied = sliding.check_at("k", start + secs(61)).unwrap_err();
        assert_eq!(denied.retry_after_secs(), 5);
    }

    #[test]
    fn test_sliding_window_recovers_as_previous_window_decays() {
        let limiter = limiter(10, 60, Algorithm::SlidingWindow);
        let start = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at("k", start).is_ok());
        }

        // Half way through the next window half of the old burst still counts.
        let mut admitted = 0;
        while limiter.check_at("k", start + secs(90)).is_ok() {
            admitted += 1;
        }
        assert_eq!(admitted, 5);

        // Two full windows later nothing is left.
        assert_eq!(limiter.check_at("k", start + secs(180)).unwrap().remaining, 9);
    }

    #[test]
    fn test_token_bucket_refills_gradually() {
        let limiter = limiter(2, 10, Algorithm::TokenBucket);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_ok());
        assert!(limiter.check_at("k", start).is_ok());

        let denied = limiter.check_at("k", start).unwrap_err();
        assert_eq!(denied.retry_after_secs(), 5);
        assert!(limiter.check_at("k", start + secs(2)).is_err());

        let status = limiter.check_at("k", start + secs(5)).unwrap();
        assert_eq!(status.remaining, 0);
        assert!(limiter.check_at("k", start + secs(5)).is_err());
    }

    #[test]
    fn test_sweep_drops_only_expired_counters() {
        let limiter = limiter(5, 60, Algorithm::FixedWindow);
        let start = Instant::now();
        limiter.check_at("old", start).unwrap();
        limiter.check_at("new", start + secs(30)).unwrap();

        assert_eq!(limiter.sweep_at(start + secs(61)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_checks_sweep_expired_counters_periodically() {
        let limiter = limiter(5, 60, Algorithm::FixedWindow);
        let start = Instant::now();
        for i in 0..SWEEP_EVERY - 1 {
            limiter.check_at(&format!("POST:10.0.0.{i}"), start).unwrap();
        }
        assert_eq!(limiter.len(), (SWEEP_EVERY - 1) as usize);

        // The next check runs after every earlier window closed.
        limiter.check_at("POST:10.0.1.1", start + secs(61)).unwrap();
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_algorithm_serde_names() {
        let parsed: Algorithm = serde_json::from_str("\"sliding_window\"").unwrap();
        assert_eq!(parsed, Algorithm::SlidingWindow);
        assert_eq!(
            serde_json::to_string(&Algorithm::TokenBucket).unwrap(),
            "\"token_bucket\""
        );
    }
}
