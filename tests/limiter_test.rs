use std::sync::Arc;
use std::time::Duration;

use normref::limiter::{permit_interval, RateLimiter};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_permits_are_spaced() {
    let limiter = RateLimiter::new(10.0);
    assert_eq!(limiter.interval(), Some(Duration::from_millis(100)));

    let start = Instant::now();
    for _ in 0..3 {
        limiter.acquire().await;
    }
    // The first permit is immediate.
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(start.elapsed() < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_shared_limiter_spaces_concurrent_callers() {
    let limiter = Arc::new(RateLimiter::new(5.0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.acquire().await;
            Instant::now()
        }));
    }
    let mut times = Vec::new();
    for h in handles {
        times.push(h.await.unwrap());
    }
    times.sort();

    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(200));
    }
    assert!(start.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_unlimited_never_waits() {
    let limiter = RateLimiter::unlimited();
    assert!(limiter.interval().is_none());
    let start = std::time::Instant::now();
    for _ in 0..1000 {
        limiter.acquire().await;
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(RateLimiter::new(0.0).interval().is_none());
    assert!(RateLimiter::new(f64::NAN).interval().is_none());
}

#[test]
fn test_unschedulable_rate_does_not_panic() {
    assert!(permit_interval(1e-20).is_none());
    assert!(RateLimiter::new(1e-20).interval().is_none());
    assert_eq!(permit_interval(4.0), Some(Duration::from_millis(250)));
}
