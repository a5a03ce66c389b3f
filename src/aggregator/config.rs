//! Aggregation and HTTP tuning constants

use std::time::Duration;

/// Maximum number of retries for network errors and 5xx responses.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Fixed pause applied to every request after a 429 response.
pub const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(120);

/// Consecutive 429 responses tolerated for one request before giving up.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Matches per history page; the service caps pages at 25.
pub const PAGE_SIZE: usize = 25;

/// History pages requested concurrently when scanning the whole history.
pub const PAGE_BATCH_SIZE: usize = 40;

/// Page ceiling for an incremental scan.
pub const MAX_INCREMENTAL_PAGES: usize = 1000;

/// Page ceiling for a full scan (200k matches).
pub const MAX_FULL_SCAN_PAGES: usize = 8000;

/// Match details requested concurrently.
pub const DETAIL_BATCH_SIZE: usize = 25;

/// Pause between detail batches.
pub const DETAIL_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Whole-aggregation attempts when the stats service rejects the session.
pub const AUTH_RETRY_BUDGET: u32 = 2;

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Tunables for [`super::MatchAggregator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Matches per history page
    pub page_size: usize,
    /// Pages fetched concurrently for whole-history scans
    pub page_batch_size: usize,
    /// Page ceiling for incremental scans
    pub max_incremental_pages: usize,
    /// Page ceiling for full scans
    pub max_full_scan_pages: usize,
    /// Details fetched concurrently
    pub detail_batch_size: usize,
    /// Pause between detail batches
    pub detail_batch_delay: Duration,
    /// Aggregation attempts allowed when the session is rejected
    pub auth_retry_budget: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            page_batch_size: PAGE_BATCH_SIZE,
            max_incremental_pages: MAX_INCREMENTAL_PAGES,
            max_full_scan_pages: MAX_FULL_SCAN_PAGES,
            detail_batch_size: DETAIL_BATCH_SIZE,
            detail_batch_delay: DETAIL_BATCH_DELAY,
            auth_retry_budget: AUTH_RETRY_BUDGET,
        }
    }
}

impl AggregatorConfig {
    /// Remove the inter-batch delay
    pub fn without_delays(mut self) -> Self {
        self.detail_batch_delay = Duration::ZERO;
        self
    }
}
