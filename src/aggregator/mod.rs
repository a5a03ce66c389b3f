//! Incremental match aggregation
//!
//! A run for one player:
//! 1. consult the stats cache; a counted request the cache already covers is
//!    answered without any network or credential call
//! 2. scan the match history (incremental against the cache, or full)
//! 3. fetch details for new ids in delayed concurrent batches, tolerating
//!    per-match failures
//! 4. merge with the cache, recompute aggregates and persist once
//!
//! A rejected session aborts the attempt, forces a credential refresh and
//! starts over, within a fixed budget.

use crate::accounts::Account;
use crate::auth::{AuthError, SessionCredentials, Stage};
use crate::cache::{CacheError, PersistentCache, PlayerStatsCache};
use crate::fetcher::pagination::HistoryScanner;
use crate::fetcher::{FetcherError, MatchHistoryFetcher};
use crate::identifier::Xuid;
use crate::{AggregateStats, MatchCount, MatchRecord};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

pub mod config;
pub mod locks;

pub use config::AggregatorConfig;
pub use locks::IdentityLocks;

/// Aggregation errors
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Credentials could not be obtained at all
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The stats service kept rejecting the session after refreshing it
    #[error("authentication failed at stage {0} after refreshing credentials")]
    AuthFailure(Stage),

    /// The player or one of the requested resources does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The stats service kept answering 429
    #[error("stats service rate limit exceeded")]
    RateLimited,

    /// Match history could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(FetcherError),

    /// Stats cache could not be read or written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<FetcherError> for AggregateError {
    fn from(err: FetcherError) -> Self {
        match err {
            FetcherError::NotFound(what) => AggregateError::NotFound(what),
            FetcherError::RateLimited => AggregateError::RateLimited,
            other => AggregateError::Fetch(other),
        }
    }
}

impl AggregateError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, AggregateError::Fetch(e) if e.is_unauthorized())
    }
}

/// Result of one aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationReport {
    /// Aggregates over every cached match
    pub stats: AggregateStats,
    /// Matches now cached for the player
    pub total_matches: usize,
    /// Matches fetched by this run
    pub new_matches: usize,
    /// Whether some matches could not be fetched
    pub incomplete: bool,
    /// Ids that could not be fetched (at most 50 are kept)
    pub failed_matches: Vec<String>,
    /// Cached records, newest first
    pub matches: Vec<MatchRecord>,
    /// True when the cache answered without fetching anything
    pub from_cache: bool,
}

impl AggregationReport {
    fn from_cache(cache: PlayerStatsCache, new_matches: usize, from_cache: bool) -> Self {
        Self {
            stats: cache.stats,
            total_matches: cache.processed_matches.len(),
            new_matches,
            incomplete: cache.incomplete_data,
            failed_matches: cache.failed_matches,
            matches: cache.processed_matches,
            from_cache,
        }
    }
}

/// Details fetched for one run
struct DetailBatch {
    records: Vec<MatchRecord>,
    failed: Vec<String>,
}

/// Aggregates one player's match history through one account
pub struct MatchAggregator {
    account: Account,
    fetcher: Arc<dyn MatchHistoryFetcher>,
    cache: PersistentCache,
    config: AggregatorConfig,
    locks: IdentityLocks,
}

impl MatchAggregator {
    /// Aggregator using `account`'s session for every stats call
    pub fn new(
        account: Account,
        fetcher: Arc<dyn MatchHistoryFetcher>,
        cache: PersistentCache,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            account,
            fetcher,
            cache,
            config,
            locks: IdentityLocks::new(),
        }
    }

    /// Share a lock registry with other aggregators over the same cache
    pub fn with_locks(mut self, locks: IdentityLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Tunables in use
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate `xuid`'s matches
    ///
    /// `display_name` selects the cache entry; without it the entry is keyed
    /// by a hash of the id. `force_full` ignores the cache and rescans the
    /// history from scratch.
    ///
    /// # Errors
    /// - `AuthFailure(GameSession)` if the session is still rejected after a
    ///   forced refresh, or the refresh itself is refused
    /// - `Auth` if no session can be derived
    /// - `NotFound`, `RateLimited` or `Fetch` if the history cannot be listed
    /// - `Cache` if the result cannot be persisted
    pub async fn aggregate(
        &self,
        xuid: Xuid,
        display_name: Option<&str>,
        count: MatchCount,
        force_full: bool,
    ) -> Result<AggregationReport, AggregateError> {
        let span = info_span!("aggregate", %xuid, %count, force_full);
        self.aggregate_locked(xuid, display_name, count, force_full)
            .instrument(span)
            .await
    }

    async fn aggregate_locked(
        &self,
        xuid: Xuid,
        display_name: Option<&str>,
        count: MatchCount,
        force_full: bool,
    ) -> Result<AggregationReport, AggregateError> {
        let _guard = self.locks.lock(xuid).await;

        let cached = if force_full {
            None
        } else {
            self.cache.load_player(display_name, xuid).await?
        };

        if let (Some(cache), Some(n)) = (&cached, count.limit()) {
            if cache.processed_matches.len() >= n {
                debug!(cached = cache.processed_matches.len(), requested = n, "Cache covers request");
                return Ok(AggregationReport::from_cache(cache.clone(), 0, true));
            }
        }

        self.aggregate_with_auth_retry(xuid, display_name, count, cached).await
    }

    async fn aggregate_with_auth_retry(
        &self,
        xuid: Xuid,
        display_name: Option<&str>,
        count: MatchCount,
        cached: Option<PlayerStatsCache>,
    ) -> Result<AggregationReport, AggregateError> {
        let budget = self.config.auth_retry_budget.max(1);
        let mut attempt = 1;

        loop {
            let session = self.account.chain().session().await?;
            match self.run(&session, xuid, display_name, count, cached.as_ref()).await {
                Err(e) if e.is_unauthorized() => {
                    if attempt >= budget {
                        warn!(attempt, "Session still rejected, giving up");
                        return Err(AggregateError::AuthFailure(Stage::GameSession));
                    }
                    warn!(attempt, error = %e, "Session rejected, forcing credential refresh");
                    if let Err(refresh) = self.account.chain().force_refresh(Stage::Clearance).await {
                        warn!(error = %refresh, "Credential refresh refused");
                        return Err(AggregateError::AuthFailure(Stage::GameSession));
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run(
        &self,
        session: &SessionCredentials,
        xuid: Xuid,
        display_name: Option<&str>,
        count: MatchCount,
        cached: Option<&PlayerStatsCache>,
    ) -> Result<AggregationReport, AggregateError> {
        let scanner = HistoryScanner::new(self.fetcher.as_ref(), session, xuid, &self.config);

        let base = cached.filter(|c| !c.processed_matches.is_empty());
        let to_fetch = match base {
            Some(cache) => self.incremental_ids(&scanner, cache, count).await?,
            None => scanner.full(count.limit()).await?,
        };

        let Some(cache) = base else {
            info!(matches = to_fetch.len(), "Full scan");
            let fetched = self.fetch_details(session, xuid, &to_fetch).await?;
            let entry = PlayerStatsCache::new(xuid, display_name.map(str::to_string));
            return self.persist(entry, fetched, display_name).await;
        };

        if to_fetch.is_empty() {
            debug!(cached = cache.processed_matches.len(), "No new matches");
            return Ok(AggregationReport::from_cache(cache.clone(), 0, false));
        }

        info!(new = to_fetch.len(), cached = cache.processed_matches.len(), "Incremental update");
        let fetched = self.fetch_details(session, xuid, &to_fetch).await?;
        self.persist(cache.clone(), fetched, display_name).await
    }

    /// New ids, backfill and previously failed ids, in fetch order
    async fn incremental_ids(
        &self,
        scanner: &HistoryScanner<'_>,
        cache: &PlayerStatsCache,
        count: MatchCount,
    ) -> Result<Vec<String>, AggregateError> {
        let known = cache.match_ids();
        let mut ids = scanner.incremental(&known, count == MatchCount::All).await?;

        if let Some(n) = count.limit() {
            let have = known.len() + ids.len();
            if have < n {
                let mut exclude = known.clone();
                exclude.extend(ids.iter().cloned());
                let extra = scanner.backfill(have, n - have, &exclude).await?;
                debug!(backfilled = extra.len(), "Backfilled older matches");
                ids.extend(extra);
            }
        }

        let mut queued: HashSet<String> = ids.iter().cloned().collect();
        for id in &cache.failed_matches {
            if !known.contains(id) && queued.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    /// Fetch details in delayed batches; per-match failures are collected
    ///
    /// A rejected session aborts immediately so the caller can refresh.
    async fn fetch_details(
        &self,
        session: &SessionCredentials,
        xuid: Xuid,
        ids: &[String],
    ) -> Result<DetailBatch, AggregateError> {
        let batch_size = self.config.detail_batch_size.max(1);
        let total_batches = ids.len().div_ceil(batch_size);
        let mut batch = DetailBatch {
            records: Vec::with_capacity(ids.len()),
            failed: Vec::new(),
        };

        for (index, chunk) in ids.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.detail_batch_delay.is_zero() {
                tokio::time::sleep(self.config.detail_batch_delay).await;
            }
            debug!(batch = index + 1, total_batches, size = chunk.len(), "Fetching match details");

            let requests = chunk
                .iter()
                .map(|id| self.fetcher.fetch_match_detail(session, id));
            let results = join_all(requests).await;

            for (id, result) in chunk.iter().zip(results) {
                match result.and_then(|detail| detail.record_for(xuid)) {
                    Ok(Some(record)) => batch.records.push(record),
                    Ok(None) => {
                        warn!(match_id = %id, "Player missing from match results");
                        batch.failed.push(id.clone());
                    }
                    Err(e) if e.is_unauthorized() => return Err(e.into()),
                    Err(e) => {
                        warn!(match_id = %id, error = %e, "Match detail failed");
                        batch.failed.push(id.clone());
                    }
                }
            }
        }

        if !batch.failed.is_empty() {
            crate::metrics::record_detail_failures(batch.failed.len());
            warn!(failed = batch.failed.len(), "Some matches could not be fetched");
        }
        Ok(batch)
    }

    async fn persist(
        &self,
        mut entry: PlayerStatsCache,
        fetched: DetailBatch,
        display_name: Option<&str>,
    ) -> Result<AggregationReport, AggregateError> {
        if let Some(name) = display_name {
            entry.display_name = Some(name.to_string());
        }
        let new_matches = fetched.records.len();
        entry.merge(fetched.records);
        entry.set_failed(fetched.failed);
        entry.recompute();
        entry.last_update = Utc::now();

        self.cache.save_player(&entry).await?;
        info!(
            total = entry.processed_matches.len(),
            new = new_matches,
            failed = entry.failed_match_count,
            "Stats updated"
        );
        Ok(AggregationReport::from_cache(entry, new_matches, false))
    }
}
