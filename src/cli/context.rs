//! Wiring shared by the commands that talk to the services

use crate::accounts::{Account, AccountPool, IdentityResolver, RateLimiter};
use crate::aggregator::{AggregatorConfig, MatchAggregator};
use crate::auth::{CredentialChain, NoLogin, OAuthSettings, TokenExchange, XboxLiveExchange};
use crate::cache::{FileStore, PersistentCache};
use crate::fetcher::waypoint::WaypointFetcher;
use crate::fetcher::xbox_profile::XboxProfileFetcher;
use crate::fetcher::{HaloHttpClient, MatchHistoryFetcher};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Cli, CliError};

/// Cache over the directory named by `--cache-dir`
pub fn open_cache(cli: &Cli) -> PersistentCache {
    PersistentCache::new(Arc::new(FileStore::new(&cli.cache_dir)))
}

/// OAuth application settings from `--client-id`/`--client-secret`
pub fn oauth_settings(cli: &Cli) -> Result<OAuthSettings, CliError> {
    let client_id = cli
        .client_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            CliError::ConfigurationError("no client id; set HALO_CLIENT_ID or pass --client-id".to_string())
        })?;
    let client_secret = cli
        .client_secret
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            CliError::ConfigurationError(
                "no client secret; set HALO_CLIENT_SECRET or pass --client-secret".to_string(),
            )
        })?;
    Ok(OAuthSettings::new(client_id, client_secret))
}

/// Live clients, account pool and cache for one invocation
pub struct AppContext {
    /// Persistent cache
    pub cache: PersistentCache,
    /// Accounts in the order given on the command line
    pub pool: Arc<AccountPool>,
    /// Index-first identity resolution
    pub resolver: Arc<IdentityResolver>,
    /// Waypoint match history
    pub fetcher: Arc<dyn MatchHistoryFetcher>,
}

impl AppContext {
    /// Build clients for every `--account`
    ///
    /// Accounts must have logged in before (`halo-stats login`); chains here
    /// never prompt for a new authorization code.
    pub fn build(cli: &Cli) -> Result<Self, CliError> {
        let settings = oauth_settings(cli)?;
        let cache = open_cache(cli);
        let http = Arc::new(HaloHttpClient::new()?);
        let exchange: Arc<dyn TokenExchange> = Arc::new(XboxLiveExchange::with_settings(http.clone(), settings));

        let mut accounts = Vec::with_capacity(cli.accounts.len());
        for id in &cli.accounts {
            if id.trim().is_empty() {
                return Err(CliError::InvalidArgument("account id must not be empty".to_string()));
            }
            let chain = CredentialChain::new(id.clone(), exchange.clone(), Arc::new(NoLogin), cache.clone());
            accounts.push(Account::new(id.clone(), chain));
        }
        debug!(accounts = accounts.len(), cache_dir = %cli.cache_dir.display(), "Built account pool");

        let profiles = Arc::new(XboxProfileFetcher::new(http.clone()));
        let pool = Arc::new(AccountPool::new(accounts, profiles, RateLimiter::default())?);
        let resolver = Arc::new(IdentityResolver::new(pool.clone(), cache.clone()));
        let fetcher: Arc<dyn MatchHistoryFetcher> = Arc::new(WaypointFetcher::new(http));

        Ok(Self {
            cache,
            pool,
            resolver,
            fetcher,
        })
    }

    /// Aggregator over the primary account's session
    pub fn aggregator(&self, config: AggregatorConfig) -> MatchAggregator {
        MatchAggregator::new(
            self.pool.primary().clone(),
            self.fetcher.clone(),
            self.cache.clone(),
            config,
        )
    }
}

/// Spinner shown while a command runs (hidden for JSON output)
pub fn spinner(message: impl Into<String>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
