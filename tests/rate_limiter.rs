use std::sync::Arc;
use std::time::Duration;

use civic_gate::{in_memory::MemoryCache, services::rate_limiter::RateLimiter};

fn limiter(cache: &MemoryCache, max_requests: u64, window: Duration) -> RateLimiter {
    RateLimiter::new(Arc::new(cache.clone()), "rate_limit:test", max_requests, window)
}

#[tokio::test]
async fn sliding_window_rejects_then_recovers() {
    let cache = MemoryCache::new();
    let limiter = limiter(&cache, 3, Duration::from_secs(2));

    for expected in 1..=3 {
        let decision = limiter.allow("user-1").await;
        assert!(decision.allowed);
        assert_eq!(decision.count, expected);
    }

    let fourth = limiter.allow("user-1").await;
    assert!(!fourth.allowed);
    assert_eq!(fourth.count, 4);
    assert_eq!(fourth.remaining, 0);

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let fifth = limiter.allow("user-1").await;
    assert!(fifth.allowed);
    assert_eq!(fifth.count, 1);
}

#[tokio::test]
async fn rejected_hits_still_count() {
    let cache = MemoryCache::new();
    let limiter = limiter(&cache, 1, Duration::from_secs(60));

    assert!(limiter.allow("flood").await.allowed);
    for expected in 2..=5 {
        let decision = limiter.allow("flood").await;
        assert!(!decision.allowed);
        assert_eq!(decision.count, expected);
    }
}

#[tokio::test]
async fn unreachable_store_fails_open() {
    let cache = MemoryCache::new();
    let limiter = limiter(&cache, 1, Duration::from_secs(60));
    cache.set_available(false);

    for _ in 0..5 {
        let decision = limiter.allow("user-1").await;
        assert!(decision.allowed);
        assert_eq!(decision.count, 0);
    }

    // Hits made while the store was down were never recorded.
    cache.set_available(true);
    let decision = limiter.allow("user-1").await;
    assert!(decision.allowed);
    assert_eq!(decision.count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hits_are_all_counted() {
    let cache = MemoryCache::new();
    let limiter = limiter(&cache, 10, Duration::from_secs(60));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.allow("shared").await })
        })
        .collect();

    let mut allowed = 0;
    let mut counts = Vec::new();
    for handle in handles {
        let decision = handle.await.unwrap();
        if decision.allowed {
            allowed += 1;
        }
        counts.push(decision.count);
    }

    counts.sort_unstable();
    assert_eq!(allowed, 10);
    assert_eq!(counts, (1..=20).collect::<Vec<u64>>());
}
