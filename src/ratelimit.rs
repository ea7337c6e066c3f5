//! Fixed-window rate limiting for link issuance
//!
//! Buckets are keyed `namespace:identity:origin`. The in-memory store relies
//! on the DashMap entry lock, so the read-check-increment of one key is
//! atomic while unrelated keys proceed in parallel.

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;

/// Outcome of one consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(skip)]
    pub retry_after: Duration,
}

impl RateDecision {
    fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::zero(),
        }
    }

    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: retry_after.max(Duration::zero()),
        }
    }

    /// Whole seconds for a `Retry-After` header, rounded up, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.retry_after.num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Counter state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBucket {
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub window: Duration,
}

impl RateLimitBucket {
    /// None when the end is past the representable range; such a window never closes
    fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_start.checked_add_signed(self.window)
    }

    fn elapsed(&self, now: DateTime<Utc>) -> bool {
        self.window_end().is_some_and(|end| now >= end)
    }
}

/// Backing store for buckets. Implementations must make `consume` atomic
/// per key.
pub trait RateLimitStore: Send + Sync {
    fn consume(&self, key: &str, limit: u32, window: Duration, now: DateTime<Utc>)
    -> RateDecision;

    /// Drop buckets whose window has elapsed; returns how many were removed
    fn cleanup(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: DashMap<String, RateLimitBucket>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, key: &str) -> Option<RateLimitBucket> {
        self.buckets.get(key).map(|b| *b.value())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn consume(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateDecision {
        if limit == 0 {
            return RateDecision::deny(window);
        }

        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert(RateLimitBucket {
                window_start: now,
                count: 0,
                window,
            });
        let bucket = entry.value_mut();

        if bucket.count == 0 || bucket.elapsed(now) {
            *bucket = RateLimitBucket {
                window_start: now,
                count: 1,
                window,
            };
            return RateDecision::allow(limit - 1);
        }

        if bucket.count < limit {
            bucket.count += 1;
            return RateDecision::allow(limit - bucket.count);
        }

        let retry_after = bucket
            .window_end()
            .map_or(bucket.window, |end| end.signed_duration_since(now));
        RateDecision::deny(retry_after)
    }

    fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.elapsed(now));
        before.saturating_sub(self.buckets.len())
    }
}

/// Clock-driven front of a store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), clock)
    }

    pub fn consume(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        let decision = self.store.consume(key, limit, window, self.clock.now());
        if !decision.allowed {
            debug!(key = %key, retry_after = decision.retry_after_secs(), "Rate limit hit");
        }
        decision
    }

    pub fn cleanup(&self) -> usize {
        self.store.cleanup(self.clock.now())
    }
}

/// Client address as reported by the proxy chain
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// `namespace:user|anon:origin`, where `origin` is the resolved client address
pub fn resolve_rate_limit_key(namespace: &str, user_id: Option<&str>, origin: &str) -> String {
    let user = user_id.filter(|u| !u.is_empty()).unwrap_or("anon");
    format!("{}:{}:{}", namespace, user, origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::HeaderValue;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    #[test]
    fn test_limit_then_deny() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::seconds(60);

        for expected_remaining in (0..3).rev() {
            let decision = store.consume("k", 3, window, t0());
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = store.consume("k", 3, window, t0() + Duration::seconds(10));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Duration::seconds(50));
        assert_eq!(denied.retry_after_secs(), 50);
    }

    #[test]
    fn test_denied_request_does_not_increment() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::seconds(60);
        store.consume("k", 1, window, t0());
        store.consume("k", 1, window, t0());
        store.consume("k", 1, window, t0());
        assert_eq!(store.bucket("k").unwrap().count, 1);
    }

    #[test]
    fn test_window_rollover() {
        let clock = Arc::new(ManualClock::new(t0()));
        let limiter = RateLimiter::in_memory(clock.clone());
        let window = Duration::seconds(60);

        assert!(limiter.consume("k", 1, window).allowed);
        assert!(!limiter.consume("k", 1, window).allowed);

        clock.advance(Duration::seconds(59));
        assert!(!limiter.consume("k", 1, window).allowed);

        clock.advance(Duration::seconds(1));
        let decision = limiter.consume("k", 1, window);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::seconds(60);
        assert!(store.consume("a", 1, window, t0()).allowed);
        assert!(store.consume("b", 1, window, t0()).allowed);
        assert!(!store.consume("a", 1, window, t0()).allowed);
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let store = InMemoryRateLimitStore::new();
        let decision = store.consume("k", 0, Duration::seconds(30), t0());
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs(), 30);
        assert!(store.is_empty());
    }

    #[test]
    fn test_retry_after_rounds_up_with_floor() {
        let decision = RateDecision::deny(Duration::milliseconds(1_200));
        assert_eq!(decision.retry_after_secs(), 2);
        let decision = RateDecision::deny(Duration::milliseconds(10));
        assert_eq!(decision.retry_after_secs(), 1);
        let decision = RateDecision::deny(Duration::zero());
        assert_eq!(decision.retry_after_secs(), 1);
    }

    #[test]
    fn test_cleanup_evicts_elapsed() {
        let store = InMemoryRateLimitStore::new();
        store.consume("old", 5, Duration::seconds(10), t0());
        store.consume("new", 5, Duration::seconds(10), t0() + Duration::seconds(8));

        assert_eq!(store.cleanup(t0() + Duration::seconds(10)), 1);
        assert!(store.bucket("old").is_none());
        assert!(store.bucket("new").is_some());
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_limit() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limit = 25;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| {
                            store
                                .consume("shared", limit, Duration::seconds(60), t0())
                                .allowed
                        })
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, limit as usize);
        assert_eq!(store.bucket("shared").unwrap().count, limit);
    }

    #[test]
    fn test_client_ip_from_proxy_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn test_resolve_key() {
        assert_eq!(
            resolve_rate_limit_key("share", None, "198.51.100.1"),
            "share:anon:198.51.100.1"
        );
        assert_eq!(
            resolve_rate_limit_key("share", Some("u1"), "10.0.0.2"),
            "share:u1:10.0.0.2"
        );
        assert_eq!(
            resolve_rate_limit_key("referral", Some(""), "203.0.113.7"),
            "referral:anon:203.0.113.7"
        );
    }

    #[test]
    fn test_unbounded_window_end_does_not_overflow() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::days(100_000_000);

        assert!(store.consume("k", 1, window, t0()).allowed);
        let denied = store.consume("k", 1, window, t0() + Duration::seconds(5));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, window);
        assert_eq!(store.cleanup(t0() + Duration::days(365)), 0);
    }
}
