//! Observability metrics
//!
//! Counters and histograms are recorded through the `metrics` facade. Nothing
//! is exported unless [`init_metrics`] installs the Prometheus exporter, so
//! library users pay only for the no-op recorder.

use crate::auth::Stage;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Install the Prometheus exporter and describe every metric
///
/// Idempotent: later calls return immediately.
///
/// # Arguments
/// * `addr` - Address of the scrape endpoint (e.g. "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests to Xbox Live and Halo Waypoint by call and status"
    );
    describe_counter!(
        "http_network_errors_total",
        Unit::Count,
        "HTTP requests that failed without a response"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Rate limit responses received"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration"
    );
    describe_histogram!(
        "profile_limiter_wait_seconds",
        Unit::Seconds,
        "Time profile lookups waited for their account's window"
    );
    describe_counter!(
        "cache_lookups_total",
        Unit::Count,
        "Cache reads by result (hit or miss)"
    );
    describe_counter!(
        "cache_corrupt_entries_total",
        Unit::Count,
        "Cache entries discarded because they failed to parse"
    );
    describe_counter!(
        "credentials_derived_total",
        Unit::Count,
        "Credentials derived by stage"
    );
    describe_counter!(
        "credential_forced_refreshes_total",
        Unit::Count,
        "Forced credential refreshes by account"
    );
    describe_counter!(
        "match_detail_failures_total",
        Unit::Count,
        "Match details that could not be fetched"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record a completed HTTP request
pub fn record_http_request(call: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_total",
        "call" => call.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "call" => call.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a request that got no response
pub fn record_http_error(call: &str) {
    counter!("http_network_errors_total", "call" => call.to_string()).increment(1);
}

/// Record a 429 response
pub fn record_rate_limited(call: &str) {
    counter!("http_429_errors_total", "call" => call.to_string()).increment(1);
}

/// Record time spent waiting on the per-account limiter
pub fn record_limiter_wait(account: &str, waited: Duration) {
    histogram!(
        "profile_limiter_wait_seconds",
        "account" => account.to_string(),
    )
    .record(waited.as_secs_f64());

    if waited.as_millis() > 100 {
        debug!(account, wait_ms = waited.as_millis() as u64, "Profile lookup throttled");
    }
}

/// Record a cache read
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("cache_lookups_total", "result" => result).increment(1);
}

/// Record a discarded corrupt cache entry
pub fn record_corrupt_cache() {
    counter!("cache_corrupt_entries_total").increment(1);
}

/// Record a credential derivation
pub fn record_credential_derived(stage: Stage) {
    counter!("credentials_derived_total", "stage" => stage.to_string()).increment(1);
}

/// Record a forced refresh
pub fn record_forced_refresh(account: &str) {
    counter!(
        "credential_forced_refreshes_total",
        "account" => account.to_string(),
    )
    .increment(1);
}

/// Record match details that failed in one run
pub fn record_detail_failures(count: usize) {
    counter!("match_detail_failures_total").increment(count as u64);
}
