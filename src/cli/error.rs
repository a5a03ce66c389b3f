//! CLI error types and conversions

use crate::accounts::ResolveError;
use crate::aggregator::AggregateError;
use crate::auth::AuthError;
use crate::cache::CacheError;
use crate::discovery::DiscoveryError;
use crate::fetcher::FetcherError;
use crate::identifier::IdentifierError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Identifier error
    #[error("identifier error: {0}")]
    IdentifierError(#[from] IdentifierError),

    /// Credential chain error
    #[error("authentication error: {0}")]
    AuthError(#[from] AuthError),

    /// Aggregation error
    #[error("stats error: {0}")]
    AggregateError(#[from] AggregateError),

    /// Identity resolution error
    #[error("lookup error: {0}")]
    ResolveError(#[from] ResolveError),

    /// Discovery error
    #[error("populate error: {0}")]
    DiscoveryError(#[from] DiscoveryError),

    /// Cache error
    #[error("cache error: {0}")]
    CacheError(#[from] CacheError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
