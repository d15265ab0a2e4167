//! Sliding-window log rate limiter.
//!
//! Each hit is recorded as a uniquely named entry scored by its timestamp;
//! the count is the number of entries inside the trailing window. Rejected
//! hits are recorded too, so a flood keeps the caller limited until `window`
//! after its last request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::store::{WindowStore, rate_limit_key};

/// Extra lifetime of a window log past the window itself.
const EXPIRY_SLACK_MS: i64 = 1_000;

/// Outcome of one `allow` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Hits in the window, this one included. `0` when the store was unreachable.
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the oldest counted hit leaves the window.
    pub reset_at: i64,
}

impl RateDecision {
    /// Seconds until `reset_at`, at least one.
    pub fn retry_after_secs(&self) -> i64 {
        self.reset_at.saturating_sub(Utc::now().timestamp()).max(1)
    }
}

/// Rounds `from_ms + window_ms` up to whole epoch seconds.
fn window_reset_secs(from_ms: i64, window_ms: i64) -> i64 {
    from_ms.saturating_add(window_ms).saturating_add(999) / 1_000
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    prefix: String,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn WindowStore>,
        prefix: impl Into<String>,
        max_requests: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_requests,
            window,
        }
    }

    /// Records a hit for `identifier` and decides whether it is within the limit.
    ///
    /// Fails open: if the store cannot be reached the hit is allowed with a
    /// count of zero.
    pub async fn allow(&self, identifier: &str) -> RateDecision {
        let key = rate_limit_key(&self.prefix, identifier);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let member = format!("{}:{}", now_ms, Uuid::new_v4().simple());

        match self
            .store
            .record_hit(
                &key,
                now_ms,
                window_ms,
                &member,
                window_ms.saturating_add(EXPIRY_SLACK_MS),
            )
            .await
        {
            Ok(window) => {
                let allowed = window.count <= self.max_requests;
                let oldest_ms = window.oldest_ms.unwrap_or(now_ms);
                let reset_at = window_reset_secs(oldest_ms, window_ms);

                if !allowed {
                    tracing::debug!("Rate limit exceeded for {} ({})", key, window.count);
                }

                RateDecision {
                    allowed,
                    count: window.count,
                    limit: self.max_requests,
                    remaining: self.max_requests.saturating_sub(window.count),
                    reset_at,
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Rate limiter store unavailable, allowing {}: {}", key, e);
                RateDecision {
                    allowed: true,
                    count: 0,
                    limit: self.max_requests,
                    remaining: self.max_requests,
                    reset_at: window_reset_secs(now_ms, window_ms),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::MemoryCache;

    #[tokio::test]
    async fn identifiers_are_counted_separately() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryCache::new()),
            "rate_limit:test",
            1,
            Duration::from_secs(60),
        );

        assert!(limiter.allow("a").await.allowed);
        assert!(limiter.allow("b").await.allowed);
        assert!(!limiter.allow("a").await.allowed);
    }

    #[tokio::test]
    async fn remaining_counts_down_to_zero() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryCache::new()),
            "rate_limit:test",
            2,
            Duration::from_secs(60),
        );

        assert_eq!(limiter.allow("a").await.remaining, 1);
        assert_eq!(limiter.allow("a").await.remaining, 0);
        let third = limiter.allow("a").await;
        assert_eq!(third.remaining, 0);
        assert!(third.reset_at >= Utc::now().timestamp());
        assert!(third.retry_after_secs() >= 1);
    }

    #[tokio::test]
    async fn unbounded_window_does_not_overflow() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryCache::new()),
            "rate_limit:test",
            2,
            Duration::MAX,
        );

        let first = limiter.allow("a").await;
        assert!(first.allowed);
        assert!(first.reset_at > Utc::now().timestamp());
        assert!(first.retry_after_secs() >= 1);
        assert!(limiter.allow("a").await.allowed);
        assert!(!limiter.allow("a").await.allowed);
    }
}
