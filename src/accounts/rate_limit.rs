//! Sliding-window rate limiting per account
//!
//! Xbox profile lookups are throttled per account: at most `max_calls` in any
//! trailing `window`. One mutex guards the whole timestamp table and stays
//! held while a caller sleeps, so waiters are served strictly in turn.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Calls allowed per window for one account
pub const DEFAULT_MAX_CALLS: usize = 3;

/// Window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Sliding-window rate limiter keyed by account id
#[derive(Clone)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_calls` per `window` for each key
    ///
    /// # Arguments
    /// * `max_calls` - Calls allowed in any trailing window (at least 1)
    /// * `window` - Window length
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Calls allowed per window
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until `key` may make another call, then record it
    ///
    /// Returns how long the caller was held back.
    pub async fn wait_if_needed(&self, key: &str) -> Duration {
        let mut calls = self.calls.lock().await;
        let started = Instant::now();
        let history = calls.entry(key.to_string()).or_default();

        Self::trim(history, started, self.window);

        if history.len() >= self.max_calls {
            if let Some(&oldest) = history.front() {
                let ready_at = oldest + self.window;
                debug!(
                    account = key,
                    wait_ms = ready_at.saturating_duration_since(started).as_millis() as u64,
                    "Rate limit window saturated, waiting"
                );
                sleep_until(ready_at).await;
            }
            Self::trim(history, Instant::now(), self.window);
        }

        history.push_back(Instant::now());
        let waited = started.elapsed();
        crate::metrics::record_limiter_wait(key, waited);
        waited
    }

    /// Calls recorded for `key` inside the current window
    pub async fn recent_calls(&self, key: &str) -> usize {
        let mut calls = self.calls.lock().await;
        match calls.get_mut(key) {
            Some(history) => {
                Self::trim(history, Instant::now(), self.window);
                history.len()
            }
            None => 0,
        }
    }

    fn trim(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = history.front() {
            if now.saturating_duration_since(front) >= window {
                history.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW)
    }
}
