// ============================================
// Fixed-Window Rate Limiting
// ============================================
//
// Per-key counters behind an injected store: an in-process map for
// single-node deployments and Redis for a shared multi-node view. Callers
// only see `RateLimiter::check`; which backend is active is a startup
// decision. The whole check-and-increment sequence is atomic per key —
// the memory store holds its lock across the sequence, the Redis store
// relies on INCR and compares the post-increment value.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, http::StatusCode};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::middleware::ErrorResponse;

/// Fallback when a window string does not parse. Lenient on purpose:
/// rate limiting must never be the reason a request fails outright.
const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Bound on a single counter-store round-trip.
const STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Counter store contract: one atomic check-and-increment per call.
/// Implementations must not admit two concurrent calls when only one
/// slot remains in the window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;

    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> bool {
        true
    }
}

// ============================================
// In-Process Store
// ============================================

struct WindowRecord {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Map-based store for single-node deployments. Counters are lost on
/// restart; expired windows are replaced lazily on the next check for
/// their key.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, WindowRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));

        // The lock spans the whole read-compare-increment sequence so two
        // concurrent checks for the same key cannot both read the last
        // free slot.
        let mut records = self.records.lock().await;

        match records.entry(key.to_string()) {
            Entry::Occupied(mut entry) if now < entry.get().reset_at => {
                let record = entry.get_mut();

                if record.count >= limit {
                    // Rejected checks do not touch the counter or the window.
                    return Ok(RateLimitDecision {
                        admitted: false,
                        limit,
                        remaining: 0,
                        reset_at: record.reset_at,
                    });
                }

                record.count += 1;
                Ok(RateLimitDecision {
                    admitted: true,
                    limit,
                    remaining: limit.saturating_sub(record.count),
                    reset_at: record.reset_at,
                })
            }
            entry => {
                // First request for this key, or its window has expired.
                let reset_at = now + window;
                let record = WindowRecord { count: 1, reset_at };
                match entry {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(record);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(record);
                    }
                }
                Ok(RateLimitDecision {
                    admitted: true,
                    limit,
                    remaining: limit.saturating_sub(1),
                    reset_at,
                })
            }
        }
    }
}

// ============================================
// Redis Store
// ============================================

/// Shared-counter store for multi-node deployments. INCR is atomic on the
/// server, so admission is decided by the post-increment value rather than
/// a separate read.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    async fn run<T, F>(fut: F) -> Result<T, RateLimitStoreError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(STORE_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RateLimitStoreError::Unavailable(e.to_string())),
            Err(_) => Err(RateLimitStoreError::Unavailable("operation timed out".into())),
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let cache_key = format!("ratelimit:{}", key);
        let window_seconds = window.as_secs().max(1);
        let mut conn = self.conn.clone();

        let count: u32 = Self::run(conn.incr(&cache_key, 1)).await?;

        if count == 1 {
            let _: () = Self::run(conn.expire(&cache_key, window_seconds as i64)).await?;
        } else {
            // A crash between INCR and EXPIRE leaves a key with no TTL;
            // repair it here rather than rate-limiting that key forever.
            let ttl: i64 = Self::run(conn.ttl(&cache_key)).await?;
            if ttl < 0 {
                let _: () = Self::run(conn.expire(&cache_key, window_seconds as i64)).await?;
            }
        }

        let ttl: i64 = Self::run(conn.ttl(&cache_key))
            .await
            .unwrap_or(window_seconds as i64);
        let reset_at = Utc::now() + chrono::Duration::seconds(ttl.max(0));

        if count > limit {
            return Ok(RateLimitDecision {
                admitted: false,
                limit,
                remaining: 0,
                reset_at,
            });
        }

        Ok(RateLimitDecision {
            admitted: true,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
        })
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        Self::run(redis::cmd("PING").query_async::<String>(&mut conn))
            .await
            .is_ok()
    }
}

// ============================================
// Limiter Facade
// ============================================

/// Store-agnostic entry point held in application state.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    fail_open: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, fail_open: bool) -> Self {
        Self { store, fail_open }
    }

    pub fn in_memory(fail_open: bool) -> Self {
        Self::new(Arc::new(MemoryStore::new()), fail_open)
    }

    /// Run an admission check. Store failures are absorbed according to the
    /// configured policy: fail open admits (with best-effort headroom
    /// values), fail closed rejects until the store recovers.
    pub async fn check(&self, key: &str, limit: u32, window: &str) -> RateLimitDecision {
        let window = parse_window(window);

        match self.store.check(key, limit, window).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    key,
                    fail_open = self.fail_open,
                    "rate limit store error: {}",
                    e
                );
                let reset_at = Utc::now()
                    + chrono::Duration::from_std(window)
                        .unwrap_or_else(|_| chrono::Duration::seconds(10));
                RateLimitDecision {
                    admitted: self.fail_open,
                    limit,
                    remaining: if self.fail_open {
                        limit.saturating_sub(1)
                    } else {
                        0
                    },
                    reset_at,
                }
            }
        }
    }

    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }
}

/// Build the counter key for a limited operation, e.g. `create-org:<user>`.
pub fn rate_limit_key(operation: &str, subject: &str) -> String {
    format!("{}:{}", operation, subject)
}

/// Parse a compact window string ("10s", "5m", "2h", "1d"). Invalid input
/// falls back to 10 seconds with a warning instead of failing the caller.
pub fn parse_window(window: &str) -> Duration {
    match try_parse_window(window) {
        Some(d) => d,
        None => {
            tracing::warn!(window, "invalid rate limit window, using 10s default");
            DEFAULT_WINDOW
        }
    }
}

fn try_parse_window(window: &str) -> Option<Duration> {
    let window = window.trim();
    if window.len() < 2 {
        return None;
    }

    let (value, unit) = window.split_at(window.len() - 1);
    let value: u64 = value.parse().ok().filter(|v| *v > 0)?;

    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 24 * 60 * 60,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}

/// 429 response carrying the window reset instant so clients can back off.
pub fn too_many_requests(decision: &RateLimitDecision) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(
            ErrorResponse::new("Rate limit exceeded", "RATE_LIMITED").with_details(format!(
                "Limit of {} requests per window. Retry after {}",
                decision.limit,
                decision.reset_at.to_rfc3339()
            )),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[test]
    fn parses_compact_windows() {
        assert_eq!(parse_window("10s"), Duration::from_secs(10));
        assert_eq!(parse_window("5m"), Duration::from_secs(300));
        assert_eq!(parse_window("2h"), Duration::from_secs(7200));
        assert_eq!(parse_window("1d"), Duration::from_secs(86400));
    }

    #[test]
    fn invalid_windows_fall_back_to_default() {
        assert_eq!(parse_window(""), DEFAULT_WINDOW);
        assert_eq!(parse_window("10"), DEFAULT_WINDOW);
        assert_eq!(parse_window("ten seconds"), DEFAULT_WINDOW);
        assert_eq!(parse_window("0s"), DEFAULT_WINDOW);
        assert_eq!(parse_window("-5m"), DEFAULT_WINDOW);
        assert_eq!(parse_window("10w"), DEFAULT_WINDOW);
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let d = store.check("k", 3, window).await.unwrap();
            assert!(d.admitted);
            remaining.push(d.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let rejected = store.check("k", 3, window).await.unwrap();
        assert!(!rejected.admitted);
        assert_eq!(rejected.remaining, 0);
    }

    #[tokio::test]
    async fn rejection_leaves_window_untouched() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        let first = store.check("k", 1, window).await.unwrap();
        let rejected = store.check("k", 1, window).await.unwrap();

        assert!(!rejected.admitted);
        assert_eq!(rejected.reset_at, first.reset_at);

        // Still rejected: the rejected call must not have incremented.
        let again = store.check("k", 1, window).await.unwrap();
        assert!(!again.admitted);
        assert_eq!(again.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn expired_window_starts_fresh() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        let first = store.check("k", 2, window).await.unwrap();
        assert_eq!(first.remaining, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let fresh = store.check("k", 2, window).await.unwrap();
        assert!(fresh.admitted);
        assert_eq!(fresh.remaining, 1);
        assert!(fresh.reset_at > first.reset_at);
    }

    #[tokio::test]
    async fn concurrent_checks_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let window = Duration::from_secs(60);

        let checks = (0..8).map(|_| {
            let store = store.clone();
            async move { store.check("k", 1, window).await.unwrap() }
        });
        let decisions = join_all(checks).await;

        let admitted = decisions.iter().filter(|d| d.admitted).count();
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn keys_are_limited_independently() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        let a = store.check("a", 1, window).await.unwrap();
        let b = store.check("b", 1, window).await.unwrap();
        assert!(a.admitted);
        assert!(b.admitted);
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn check(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
        ) -> Result<RateLimitDecision, RateLimitStoreError> {
            Err(RateLimitStoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_respects_policy() {
        let open = RateLimiter::new(Arc::new(BrokenStore), true);
        assert!(open.check("k", 3, "1m").await.admitted);

        let closed = RateLimiter::new(Arc::new(BrokenStore), false);
        let decision = closed.check("k", 3, "1m").await;
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn limiter_tolerates_bad_window_strings() {
        let limiter = RateLimiter::in_memory(true);
        let decision = limiter.check("k", 2, "not-a-window").await;
        assert!(decision.admitted);
        assert!(decision.reset_at <= Utc::now() + chrono::Duration::seconds(11));
    }
}
