//! Co-player discovery
//!
//! Walks a player's recent matches, collects everyone they played with and
//! resolves those ids to gamertags so the identity index fills up ahead of
//! time. The pass is resumable: progress is saved after every batch of
//! matches and every block of resolutions, and a rerun continues from the
//! saved record. The record is deleted once the pass completes.

use crate::accounts::{Account, IdentityResolver, ResolveError, ResolveSummary};
use crate::aggregator::{AggregateError, MatchAggregator};
use crate::auth::AuthError;
use crate::cache::{CacheError, PersistentCache, ScanProgress};
use crate::fetcher::{FetcherError, MatchHistoryFetcher, PlayerProfile};
use crate::identifier::Xuid;
use crate::MatchCount;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Recent matches scanned by default
pub const DEFAULT_DISCOVERY_MATCHES: usize = 50;

/// Match details fetched concurrently
pub const DISCOVERY_BATCH_SIZE: usize = 5;

/// Pause between match batches
pub const DISCOVERY_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Resolutions between progress saves
pub const RESOLVE_CHUNK_SIZE: usize = crate::accounts::resolver::INDEX_SAVE_INTERVAL;

/// Discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The match list could not be built
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Session credentials could not be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The stats service rejected the session while scanning
    #[error("session rejected while scanning matches; rerun to resume")]
    SessionRejected,

    /// Bulk resolution aborted
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Progress could not be read or written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Discovery tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Recent matches to scan
    pub matches: usize,
    /// Match details fetched concurrently
    pub batch_size: usize,
    /// Pause between match batches
    pub batch_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            matches: DEFAULT_DISCOVERY_MATCHES,
            batch_size: DISCOVERY_BATCH_SIZE,
            batch_delay: DISCOVERY_BATCH_DELAY,
        }
    }
}

/// Result of a discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Matches scanned in total (this run and resumed runs)
    pub matches_scanned: usize,
    /// Distinct co-players found
    pub players_found: usize,
    /// Resolution counts for this run
    pub resolution: ResolveSummary,
    /// Known gamertags of the co-players, sorted
    pub gamertags: Vec<String>,
}

/// Runs discovery passes
pub struct PlayerDiscovery {
    aggregator: Arc<MatchAggregator>,
    account: Account,
    fetcher: Arc<dyn MatchHistoryFetcher>,
    resolver: Arc<IdentityResolver>,
    cache: PersistentCache,
    config: DiscoveryConfig,
}

impl PlayerDiscovery {
    /// Discovery using `account`'s session for match details
    pub fn new(
        aggregator: Arc<MatchAggregator>,
        account: Account,
        fetcher: Arc<dyn MatchHistoryFetcher>,
        resolver: Arc<IdentityResolver>,
        cache: PersistentCache,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            aggregator,
            account,
            fetcher,
            resolver,
            cache,
            config,
        }
    }

    /// Progress record name for a player
    pub fn progress_name(xuid: Xuid) -> String {
        format!("populate_{}", xuid.value())
    }

    /// Scan `player`'s recent matches and resolve every co-player
    pub async fn discover(&self, player: &PlayerProfile) -> Result<DiscoveryReport, DiscoveryError> {
        let span = info_span!("discover", xuid = %player.xuid, gamertag = %player.gamertag);
        self.discover_inner(player).instrument(span).await
    }

    async fn discover_inner(&self, player: &PlayerProfile) -> Result<DiscoveryReport, DiscoveryError> {
        let name = Self::progress_name(player.xuid);
        let mut progress = match self.cache.load_progress(&name).await? {
            Some(progress) if progress.scan_complete() => {
                info!(players = progress.discovered_xuids.len(), "Match scan already complete, resuming resolution");
                progress
            }
            saved => self.scan(player, &name, saved).await?,
        };

        let resolution = self.resolve(&name, &mut progress).await?;

        let index = self.cache.load_identity_index().await?;
        let mut gamertags: Vec<String> = progress
            .discovered_xuids
            .iter()
            .filter_map(|xuid| index.gamertag(*xuid).map(str::to_string))
            .collect();
        gamertags.sort_by_key(|g| g.to_lowercase());

        self.cache.clear_progress(&name).await?;
        info!(
            matches = progress.completed_ids.len(),
            players = progress.discovered_xuids.len(),
            named = gamertags.len(),
            "Discovery complete"
        );

        Ok(DiscoveryReport {
            matches_scanned: progress.completed_ids.len(),
            players_found: progress.discovered_xuids.len(),
            resolution,
            gamertags,
        })
    }

    /// Scan match details for co-players, saving after every batch
    async fn scan(
        &self,
        player: &PlayerProfile,
        name: &str,
        saved: Option<ScanProgress>,
    ) -> Result<ScanProgress, DiscoveryError> {
        let report = self
            .aggregator
            .aggregate(
                player.xuid,
                Some(&player.gamertag),
                MatchCount::Recent(self.config.matches),
                false,
            )
            .await?;
        let match_ids: Vec<String> = report
            .matches
            .iter()
            .take(self.config.matches)
            .map(|m| m.match_id.clone())
            .collect();

        let mut progress = saved.unwrap_or_else(|| ScanProgress::new(match_ids.len()));
        progress.total_matches = match_ids.len();
        let remaining: Vec<&String> = match_ids
            .iter()
            .filter(|id| !progress.completed_ids.contains(*id))
            .collect();
        if remaining.len() < match_ids.len() {
            info!(done = match_ids.len() - remaining.len(), total = match_ids.len(), "Resuming match scan");
        }

        let session = self.account.chain().session().await?;
        let batch_size = self.config.batch_size.max(1);

        for (index, batch) in remaining.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let requests = batch
                .iter()
                .map(|id| self.fetcher.fetch_match_detail(&session, id));
            for (id, result) in batch.iter().zip(join_all(requests).await) {
                match result {
                    Ok(detail) => {
                        progress
                            .discovered_xuids
                            .extend(detail.player_xuids().into_iter().filter(|x| *x != player.xuid));
                        progress.completed_ids.insert((*id).clone());
                    }
                    Err(FetcherError::Unauthorized(_)) => {
                        self.save(name, &mut progress).await?;
                        return Err(DiscoveryError::SessionRejected);
                    }
                    Err(e) => {
                        // Skipped for good; a rerun will not retry it
                        warn!(match_id = %id, error = %e, "Could not scan match");
                        progress.completed_ids.insert((*id).clone());
                    }
                }
            }

            progress.last_processed_index = progress.completed_ids.len().min(progress.total_matches);
            self.save(name, &mut progress).await?;
            debug!(
                scanned = progress.last_processed_index,
                total = progress.total_matches,
                players = progress.discovered_xuids.len(),
                "Scanned match batch"
            );
        }

        progress.last_processed_index = progress.total_matches;
        self.save(name, &mut progress).await?;
        info!(
            matches = progress.total_matches,
            players = progress.discovered_xuids.len(),
            "Match scan complete"
        );
        Ok(progress)
    }

    /// Resolve pending co-players in chunks, saving progress after each
    async fn resolve(&self, name: &str, progress: &mut ScanProgress) -> Result<ResolveSummary, DiscoveryError> {
        let pending = progress.pending_xuids();
        let mut total = ResolveSummary::default();
        if pending.is_empty() {
            return Ok(total);
        }
        info!(pending = pending.len(), "Resolving co-players");

        for chunk in pending.chunks(RESOLVE_CHUNK_SIZE) {
            let summary = self
                .resolver
                .resolve_many(chunk, |done, size| {
                    debug!(done, size, "Resolving chunk");
                })
                .await?;
            total.resolved += summary.resolved;
            total.already_known += summary.already_known;
            total.failed += summary.failed;

            progress.resolved_xuids.extend(chunk.iter().copied());
            self.save(name, progress).await?;
        }

        Ok(total)
    }

    async fn save(&self, name: &str, progress: &mut ScanProgress) -> Result<(), DiscoveryError> {
        progress.updated_at = Utc::now();
        self.cache.save_progress(name, progress).await?;
        Ok(())
    }
}
