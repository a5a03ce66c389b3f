//! Unit tests for the sliding-window rate limiter

use halo_stats::accounts::RateLimiter;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_fourth_call_waits_for_the_window() {
    let limiter = RateLimiter::new(3, WINDOW);
    let start = Instant::now();

    for _ in 0..3 {
        assert_eq!(limiter.wait_if_needed("acct").await, Duration::ZERO);
    }
    assert_eq!(limiter.recent_calls("acct").await, 3);

    let waited = limiter.wait_if_needed("acct").await;
    assert!(waited >= WINDOW);
    assert!(waited < WINDOW + Duration::from_secs(1));
    assert!(start.elapsed() >= WINDOW);
}

#[tokio::test(start_paused = true)]
async fn test_no_window_ever_holds_more_than_max_calls() {
    let limiter = RateLimiter::new(3, WINDOW);
    let mut stamps = Vec::new();

    for i in 0..10 {
        limiter.wait_if_needed("acct").await;
        stamps.push(Instant::now());
        if i % 4 == 0 {
            tokio::time::advance(Duration::from_secs(2)).await;
        }
    }

    for (i, at) in stamps.iter().enumerate() {
        let inside = stamps[i..].iter().filter(|s| s.duration_since(*at) < WINDOW).count();
        assert!(inside <= 3, "{inside} calls inside one window");
    }
}

#[tokio::test(start_paused = true)]
async fn test_accounts_are_limited_independently() {
    let limiter = RateLimiter::new(3, WINDOW);
    for _ in 0..3 {
        limiter.wait_if_needed("a").await;
    }

    assert_eq!(limiter.wait_if_needed("b").await, Duration::ZERO);
    assert_eq!(limiter.recent_calls("b").await, 1);
    assert_eq!(limiter.recent_calls("c").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_calls_expire_after_the_window() {
    let limiter = RateLimiter::new(3, WINDOW);
    for _ in 0..3 {
        limiter.wait_if_needed("acct").await;
    }

    tokio::time::advance(WINDOW).await;
    assert_eq!(limiter.recent_calls("acct").await, 0);
    assert_eq!(limiter.wait_if_needed("acct").await, Duration::ZERO);
}

#[test]
fn test_zero_max_calls_is_clamped() {
    let limiter = RateLimiter::new(0, WINDOW);
    assert_eq!(limiter.max_calls(), 1);
    assert_eq!(limiter.window(), WINDOW);
}
