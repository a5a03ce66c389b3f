//! Round-robin account pool for profile lookups

use super::{Account, RateLimiter, ResolveError};
use crate::auth::{AuthError, Stage};
use crate::fetcher::{FetcherError, PlayerProfile, ProfileFetcher};
use crate::identifier::Xuid;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a profile lookup is keyed on
#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    Gamertag(&'a str),
    Xuid(Xuid),
}

/// Accounts sharing the identity-resolution load
pub struct AccountPool {
    accounts: Vec<Account>,
    cursor: AtomicUsize,
    profiles: Arc<dyn ProfileFetcher>,
    limiter: RateLimiter,
}

impl AccountPool {
    /// Pool over `accounts`; the first one is the primary
    ///
    /// # Errors
    /// `NoAccounts` if `accounts` is empty
    pub fn new(
        accounts: Vec<Account>,
        profiles: Arc<dyn ProfileFetcher>,
        limiter: RateLimiter,
    ) -> Result<Self, ResolveError> {
        if accounts.is_empty() {
            return Err(ResolveError::NoAccounts);
        }
        Ok(Self {
            accounts,
            cursor: AtomicUsize::new(0),
            profiles,
            limiter,
        })
    }

    /// Next account in rotation
    pub fn next_account(&self) -> &Account {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.accounts.len();
        &self.accounts[idx]
    }

    /// Account used for match data
    pub fn primary(&self) -> &Account {
        &self.accounts[0]
    }

    /// All accounts, primary first
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Always false; a pool has at least one account
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Limiter shared by the pool
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Profile for a gamertag
    pub async fn lookup_gamertag(&self, gamertag: &str) -> Result<PlayerProfile, ResolveError> {
        self.lookup(Lookup::Gamertag(gamertag)).await
    }

    /// Profile for an id
    pub async fn lookup_xuid(&self, xuid: Xuid) -> Result<PlayerProfile, ResolveError> {
        self.lookup(Lookup::Xuid(xuid)).await
    }

    async fn lookup(&self, what: Lookup<'_>) -> Result<PlayerProfile, ResolveError> {
        let account = self.next_account();
        let waited = self.limiter.wait_if_needed(account.id()).await;
        debug!(account = account.id(), ?what, waited_ms = waited.as_millis() as u64, "Profile lookup");

        let auth = account.chain().profile_auth().await?;
        let reason = match self.fetch(&auth, what).await {
            Err(FetcherError::Unauthorized(reason)) => reason,
            other => return Ok(other?),
        };

        // Profile token rejected before its expiry: one forced refresh, then give up
        warn!(account = account.id(), %reason, "Profile token rejected, forcing refresh");
        if let Err(e) = account.chain().force_refresh(Stage::XstsXbox).await {
            warn!(account = account.id(), error = %e, "Profile token refresh refused");
            return Err(match e {
                AuthError::RefreshCooldown { .. } | AuthError::RefreshInProgress => {
                    AuthError::AuthFailure(Stage::XstsXbox)
                }
                other => other,
            }
            .into());
        }
        let auth = account.chain().profile_auth().await?;

        self.limiter.wait_if_needed(account.id()).await;
        match self.fetch(&auth, what).await {
            Err(FetcherError::Unauthorized(reason)) => {
                warn!(account = account.id(), %reason, "Refreshed profile token rejected");
                Err(AuthError::AuthFailure(Stage::XstsXbox).into())
            }
            other => Ok(other?),
        }
    }

    async fn fetch(&self, auth: &crate::auth::ProfileAuth, what: Lookup<'_>) -> Result<PlayerProfile, FetcherError> {
        match what {
            Lookup::Gamertag(name) => self.profiles.profile_by_gamertag(auth, name).await,
            Lookup::Xuid(xuid) => self.profiles.profile_by_xuid(auth, xuid).await,
        }
    }
}
