//! Gamertag ↔ XUID resolution through the identity index
//!
//! The index is always consulted first. A miss goes to the account pool and
//! the answer is merged back into the index, so a name is only ever looked
//! up remotely once.

use super::{AccountPool, ResolveError};
use crate::cache::{IdentityIndex, PersistentCache};
use crate::fetcher::PlayerProfile;
use crate::identifier::{Gamertag, Xuid};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// New index entries accumulated before the index is written
pub const INDEX_SAVE_INTERVAL: usize = 50;

/// Attempts per id when the profile service keeps rate limiting
const RATE_LIMITED_ATTEMPTS: u32 = 2;

/// Outcome of a bulk resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Ids resolved through the profile service
    pub resolved: usize,
    /// Ids already present in the index
    pub already_known: usize,
    /// Ids that could not be resolved
    pub failed: usize,
}

/// Resolves identities, index first
pub struct IdentityResolver {
    pool: Arc<AccountPool>,
    cache: PersistentCache,
}

impl IdentityResolver {
    /// Resolver over `pool`, recording answers in `cache`'s identity index
    pub fn new(pool: Arc<AccountPool>, cache: PersistentCache) -> Self {
        Self { pool, cache }
    }

    /// Profile for a gamertag
    ///
    /// # Errors
    /// `NotFound` if the profile service has no such gamertag
    pub async fn resolve_gamertag(&self, gamertag: &Gamertag) -> Result<PlayerProfile, ResolveError> {
        let index = self.cache.load_identity_index().await?;
        if let Some(xuid) = index.xuid_for(gamertag.as_str()) {
            debug!(%gamertag, %xuid, "Gamertag found in identity index");
            let name = index.gamertag(xuid).unwrap_or(gamertag.as_str()).to_string();
            return Ok(PlayerProfile { xuid, gamertag: name });
        }

        let profile = match self.pool.lookup_gamertag(gamertag.as_str()).await {
            Err(ResolveError::NotFound(_)) => return Err(ResolveError::NotFound(gamertag.to_string())),
            other => other?,
        };
        info!(%gamertag, xuid = %profile.xuid, "Resolved gamertag");
        self.record(&[&profile]).await?;
        Ok(profile)
    }

    /// Current gamertag for an id
    pub async fn resolve_xuid(&self, xuid: Xuid) -> Result<String, ResolveError> {
        let index = self.cache.load_identity_index().await?;
        if let Some(name) = index.gamertag(xuid) {
            return Ok(name.to_string());
        }

        let profile = match self.pool.lookup_xuid(xuid).await {
            Err(ResolveError::NotFound(_)) => return Err(ResolveError::NotFound(xuid.to_string())),
            other => other?,
        };
        self.record(&[&profile]).await?;
        Ok(profile.gamertag)
    }

    /// Resolve many ids in order, skipping those already indexed
    ///
    /// The index is written every [`INDEX_SAVE_INTERVAL`] new entries and at
    /// the end. A lookup that fails for one id is logged and skipped;
    /// credential failures abort the whole run since every later lookup
    /// would fail the same way. `on_progress(done, total)` is called after
    /// each id.
    pub async fn resolve_many<F>(&self, xuids: &[Xuid], mut on_progress: F) -> Result<ResolveSummary, ResolveError>
    where
        F: FnMut(usize, usize),
    {
        let known = self.cache.load_identity_index().await?;
        let mut pending = IdentityIndex::new();
        let mut summary = ResolveSummary::default();

        for (i, &xuid) in xuids.iter().enumerate() {
            if known.contains(xuid) || pending.contains(xuid) {
                summary.already_known += 1;
            } else {
                match self.lookup_with_retry(xuid).await {
                    Ok(profile) => {
                        pending.insert(profile.xuid, profile.gamertag);
                        summary.resolved += 1;
                        if pending.len() >= INDEX_SAVE_INTERVAL {
                            self.cache.merge_identity_index(std::mem::take(&mut pending)).await?;
                            debug!(resolved = summary.resolved, "Saved identity index");
                        }
                    }
                    Err(ResolveError::Auth(e)) => {
                        self.flush(pending).await?;
                        return Err(ResolveError::Auth(e));
                    }
                    Err(e) => {
                        warn!(%xuid, error = %e, "Could not resolve player, skipping");
                        summary.failed += 1;
                    }
                }
            }
            on_progress(i + 1, xuids.len());
        }

        self.flush(pending).await?;
        info!(
            resolved = summary.resolved,
            already_known = summary.already_known,
            failed = summary.failed,
            "Bulk resolution complete"
        );
        Ok(summary)
    }

    async fn lookup_with_retry(&self, xuid: Xuid) -> Result<PlayerProfile, ResolveError> {
        let mut attempt = 1;
        loop {
            match self.pool.lookup_xuid(xuid).await {
                Err(ResolveError::RateLimited) if attempt < RATE_LIMITED_ATTEMPTS => {
                    warn!(%xuid, attempt, "Profile lookup rate limited, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn record(&self, profiles: &[&PlayerProfile]) -> Result<(), ResolveError> {
        let mut entries = IdentityIndex::new();
        for profile in profiles {
            entries.insert(profile.xuid, profile.gamertag.clone());
        }
        self.flush(entries).await
    }

    async fn flush(&self, entries: IdentityIndex) -> Result<(), ResolveError> {
        if !entries.is_empty() {
            self.cache.merge_identity_index(entries).await?;
        }
        Ok(())
    }
}
