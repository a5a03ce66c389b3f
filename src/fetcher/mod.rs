//! Network collaborators
//!
//! Match data comes from the Halo Waypoint stats service and identity lookups
//! from the Xbox Live profile service. Both sit behind traits so the
//! aggregation and resolution logic can run against in-memory fakes.

use crate::auth::{ProfileAuth, SessionCredentials};
use crate::identifier::Xuid;
use async_trait::async_trait;

pub mod endpoints;
pub mod halo_http;
pub mod pagination;
pub mod parser;
pub mod waypoint;
pub mod xbox_profile;

pub use halo_http::{HaloHttpClient, PauseGate};
pub use parser::{MatchDetail, PlayerResult};

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    /// Credential rejected (401/403)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource does not exist (404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Still rate limited after the pause budget was spent
    #[error("rate limit exceeded")]
    RateLimited,

    /// Unexpected HTTP status
    #[error("HTTP error {status}: {message}")]
    HttpError {
        /// Status code
        status: u16,
        /// Response excerpt
        message: String,
    },

    /// Transport failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response body did not match the expected shape
    #[error("corrupt response: {0}")]
    CorruptResponse(String),
}

impl FetcherError {
    /// Whether this error means the credential must be refreshed
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetcherError::Unauthorized(_))
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Halo match history source
#[async_trait]
pub trait MatchHistoryFetcher: Send + Sync {
    /// Match ids for `xuid`, newest first, starting at offset `start`
    ///
    /// The service returns at most `count` ids; a shorter page means the end
    /// of the history.
    async fn fetch_match_page(
        &self,
        session: &SessionCredentials,
        xuid: Xuid,
        start: usize,
        count: usize,
    ) -> FetcherResult<Vec<String>>;

    /// Full results of one match
    async fn fetch_match_detail(
        &self,
        session: &SessionCredentials,
        match_id: &str,
    ) -> FetcherResult<MatchDetail>;
}

/// A resolved player identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    /// Numeric id
    pub xuid: Xuid,
    /// Current gamertag
    pub gamertag: String,
}

/// Xbox Live profile lookups
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Resolve a gamertag to its profile
    async fn profile_by_gamertag(&self, auth: &ProfileAuth, gamertag: &str) -> FetcherResult<PlayerProfile>;

    /// Resolve an id to its profile
    async fn profile_by_xuid(&self, auth: &ProfileAuth, xuid: Xuid) -> FetcherResult<PlayerProfile>;
}
