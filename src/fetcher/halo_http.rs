//! HTTP client shared by every Xbox Live and Halo service call
//!
//! Provides:
//! - Status mapping (401/403 unauthorized, 404 not found)
//! - A fixed global pause after 429 responses, then a retry of the same request
//! - Exponential backoff for network errors and 5xx responses
//! - JSON decoding with parse failures reported as corrupt responses

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::aggregator::config::{
    calculate_backoff, MAX_RATE_LIMIT_RETRIES, MAX_RETRIES, RATE_LIMIT_PAUSE,
};
use crate::fetcher::endpoints::{Endpoints, HALO_USER_AGENT};
use crate::fetcher::{FetcherError, FetcherResult};

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 30;
/// HTTP request timeout (seconds); stats responses can be slow
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 180;
/// Characters of an error body kept in error messages
const ERROR_EXCERPT_LEN: usize = 200;

/// Shared "do not send before" instant
///
/// A 429 seen by any request pauses every request that goes through the same
/// gate.
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    until: Arc<Mutex<Option<Instant>>>,
}

impl PauseGate {
    /// Open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every request for `duration` from now
    pub fn pause(&self, duration: Duration) {
        let target = Instant::now() + duration;
        let mut until = self.until.lock().unwrap_or_else(PoisonError::into_inner);
        if until.map_or(true, |current| current < target) {
            *until = Some(target);
        }
    }

    /// Instant the gate reopens, if it is closed
    pub fn paused_until(&self) -> Option<Instant> {
        let until = *self.until.lock().unwrap_or_else(PoisonError::into_inner);
        until.filter(|t| *t > Instant::now())
    }

    /// Sleep until the gate is open, returning the time waited
    pub async fn wait(&self) -> Duration {
        match self.paused_until() {
            Some(until) => {
                let started = Instant::now();
                tokio::time::sleep_until(until).await;
                started.elapsed()
            }
            None => Duration::ZERO,
        }
    }
}

/// HTTP client with retry and rate-limit handling
#[derive(Clone)]
pub struct HaloHttpClient {
    client: Client,
    endpoints: Arc<Endpoints>,
    pause: PauseGate,
    max_retries: u32,
    rate_limit_pause: Duration,
}

impl HaloHttpClient {
    /// Client for the production endpoints
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized
    pub fn new() -> FetcherResult<Self> {
        let client = Client::builder()
            .user_agent(HALO_USER_AGENT)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetcherError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, Endpoints::production()))
    }

    /// Client around an existing reqwest client
    pub fn with_client(client: Client, endpoints: Endpoints) -> Self {
        Self {
            client,
            endpoints: Arc::new(endpoints),
            pause: PauseGate::new(),
            max_retries: MAX_RETRIES,
            rate_limit_pause: RATE_LIMIT_PAUSE,
        }
    }

    /// Override the transient-error retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the pause applied after a 429
    pub fn with_rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = pause;
        self
    }

    /// Service endpoints
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Gate shared by all requests of this client
    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    /// Send a request and decode a JSON body
    ///
    /// `build` is called once per attempt so every retry sends a fresh
    /// request. `label` names the call in logs and metrics.
    ///
    /// # Errors
    /// - `Unauthorized` on 401/403, `NotFound` on 404, neither retried
    /// - `RateLimited` once [`MAX_RATE_LIMIT_RETRIES`] consecutive attempts
    ///   are answered with 429; any other answer in between restarts the count
    /// - `HttpError`/`NetworkError` once the backoff budget is spent
    /// - `CorruptResponse` if the body does not decode into `T`
    pub async fn send_json<T, F>(&self, label: &str, build: F) -> FetcherResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        let mut rate_limited = 0u32;

        loop {
            let paused = self.pause.wait().await;
            if !paused.is_zero() {
                debug!(call = label, waited_ms = paused.as_millis() as u64, "Resumed after rate-limit pause");
            }

            let started = Instant::now();
            let response = match build(&self.client).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    crate::metrics::record_http_error(label);
                    rate_limited = 0;
                    if attempt < self.max_retries {
                        let backoff = calculate_backoff(attempt);
                        warn!(
                            call = label,
                            attempt = attempt + 1,
                            max_attempts = self.max_retries + 1,
                            error = %e,
                            "Network error, retrying after {:?}",
                            backoff
                        );
                        attempt += 1;
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(FetcherError::NetworkError(e.to_string()));
                }
            };

            let status = response.status();
            crate::metrics::record_http_request(label, status.as_u16(), started.elapsed());

            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limited += 1;
                crate::metrics::record_rate_limited(label);
                if rate_limited >= MAX_RATE_LIMIT_RETRIES {
                    warn!(call = label, "Rate limited {} times in a row, giving up", rate_limited);
                    return Err(FetcherError::RateLimited);
                }
                warn!(
                    call = label,
                    pause_secs = self.rate_limit_pause.as_secs(),
                    "Rate limited (429), pausing all requests"
                );
                self.pause.pause(self.rate_limit_pause);
                continue;
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = excerpt(response.text().await.unwrap_or_default());
                debug!(call = label, %status, body = %body, "Credential rejected");
                return Err(FetcherError::Unauthorized(format!("{label}: {status}")));
            }

            if status == StatusCode::NOT_FOUND {
                return Err(FetcherError::NotFound(label.to_string()));
            }

            if status.is_server_error() {
                rate_limited = 0;
                if attempt < self.max_retries {
                    let backoff = calculate_backoff(attempt);
                    warn!(
                        call = label,
                        %status,
                        attempt = attempt + 1,
                        "Server error, retrying after {:?}",
                        backoff
                    );
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                let body = excerpt(response.text().await.unwrap_or_default());
                return Err(FetcherError::HttpError {
                    status: status.as_u16(),
                    message: body,
                });
            }

            if !status.is_success() {
                let body = excerpt(response.text().await.unwrap_or_default());
                return Err(FetcherError::HttpError {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetcherError::NetworkError(e.to_string()))?;
            return serde_json::from_slice(&bytes).map_err(|e| {
                warn!(call = label, error = %e, "Failed to decode response");
                FetcherError::CorruptResponse(format!("{label}: {e}"))
            });
        }
    }
}

fn excerpt(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(ERROR_EXCERPT_LEN) {
        body.truncate(idx);
    }
    body
}
