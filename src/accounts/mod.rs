//! Accounts, per-account throttling and identity resolution
//!
//! Each account owns one credential chain. Profile lookups rotate across
//! accounts and every account is throttled on its own key, so N accounts
//! give N times the lookup throughput. Match data always goes through the
//! primary account.

use crate::auth::{AuthError, CredentialChain};
use crate::cache::CacheError;
use crate::fetcher::FetcherError;
use std::sync::Arc;

pub mod pool;
pub mod rate_limit;
pub mod resolver;

pub use pool::AccountPool;
pub use rate_limit::RateLimiter;
pub use resolver::{IdentityResolver, ResolveSummary};

/// An account id plus its credential chain
#[derive(Clone)]
pub struct Account {
    id: String,
    chain: Arc<CredentialChain>,
}

impl Account {
    /// Account `id` using `chain`
    pub fn new(id: impl Into<String>, chain: CredentialChain) -> Self {
        Self::with_shared_chain(id, Arc::new(chain))
    }

    /// Account sharing a chain that is also held elsewhere
    pub fn with_shared_chain(id: impl Into<String>, chain: Arc<CredentialChain>) -> Self {
        Self { id: id.into(), chain }
    }

    /// Account id, also the rate limiter key
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Credential chain
    pub fn chain(&self) -> &Arc<CredentialChain> {
        &self.chain
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Identity resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No player with this gamertag or id
    #[error("player not found: {0}")]
    NotFound(String),

    /// The pool was built without accounts
    #[error("no accounts configured")]
    NoAccounts,

    /// Profile service kept answering 429
    #[error("profile lookups are rate limited")]
    RateLimited,

    /// Profile credentials could not be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Profile lookup failed
    #[error("profile lookup failed: {0}")]
    Fetch(FetcherError),

    /// Identity index could not be read or written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<FetcherError> for ResolveError {
    fn from(err: FetcherError) -> Self {
        match err {
            FetcherError::NotFound(what) => ResolveError::NotFound(what),
            FetcherError::RateLimited => ResolveError::RateLimited,
            other => ResolveError::Fetch(other),
        }
    }
}
