//! Match history paging
//!
//! Three scan shapes are used by the aggregator:
//! - incremental: newest first until the first id already cached
//! - backfill: continue past the cached history until a requested count is met
//! - full: the whole history (or its newest N), ignoring the cache
//!
//! Every scan assumes the service returns a player's matches newest first.
//! That ordering is not checked. An undersized or empty page ends a scan.

use crate::aggregator::config::AggregatorConfig;
use crate::auth::SessionCredentials;
use crate::fetcher::{FetcherResult, MatchHistoryFetcher};
use crate::identifier::Xuid;
use futures::future::join_all;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::debug;

/// Pages through one player's match history
pub struct HistoryScanner<'a> {
    fetcher: &'a dyn MatchHistoryFetcher,
    session: &'a SessionCredentials,
    xuid: Xuid,
    config: &'a AggregatorConfig,
}

impl<'a> HistoryScanner<'a> {
    /// Scanner for `xuid`'s history using `session`
    pub fn new(
        fetcher: &'a dyn MatchHistoryFetcher,
        session: &'a SessionCredentials,
        xuid: Xuid,
        config: &'a AggregatorConfig,
    ) -> Self {
        Self {
            fetcher,
            session,
            xuid,
            config,
        }
    }

    /// Ids newer than anything in `known`, newest first
    ///
    /// Pages are requested one at a time unless `batched`, in which case
    /// they go out in concurrent batches. Stops at the first known id, at an
    /// undersized page or at the incremental page ceiling.
    pub async fn incremental(&self, known: &HashSet<String>, batched: bool) -> FetcherResult<Vec<String>> {
        let batch = if batched { self.config.page_batch_size } else { 1 };
        let mut fresh = Vec::new();

        let pages = self
            .scan_pages(self.config.max_incremental_pages, batch, |page| {
                for id in page {
                    if known.contains(&id) {
                        return ControlFlow::Break(());
                    }
                    fresh.push(id);
                }
                ControlFlow::Continue(())
            })
            .await?;

        debug!(xuid = %self.xuid, pages, new = fresh.len(), "Incremental scan complete");
        Ok(fresh)
    }

    /// Up to `wanted` ids from offset `start` onward, skipping `exclude`
    pub async fn backfill(&self, start: usize, wanted: usize, exclude: &HashSet<String>) -> FetcherResult<Vec<String>> {
        let page_size = self.config.page_size;
        let mut offset = start;
        let mut seen: HashSet<String> = HashSet::new();
        let mut extra = Vec::new();

        for _ in 0..self.config.max_incremental_pages {
            if extra.len() >= wanted {
                break;
            }
            let page = self
                .fetcher
                .fetch_match_page(self.session, self.xuid, offset, page_size)
                .await?;
            let received = page.len();
            for id in page {
                if !exclude.contains(&id) && seen.insert(id.clone()) {
                    extra.push(id);
                }
            }
            if received < page_size {
                break;
            }
            offset += received;
        }

        extra.truncate(wanted);
        debug!(xuid = %self.xuid, start, found = extra.len(), wanted, "Backfill complete");
        Ok(extra)
    }

    /// The whole history, or its newest `limit` ids
    pub async fn full(&self, limit: Option<usize>) -> FetcherResult<Vec<String>> {
        let max_pages = match limit {
            Some(n) => n.div_ceil(self.config.page_size).min(self.config.max_full_scan_pages),
            None => self.config.max_full_scan_pages,
        };
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        let pages = self
            .scan_pages(max_pages, self.config.page_batch_size, |page| {
                ids.extend(page.into_iter().filter(|id| seen.insert(id.clone())));
                ControlFlow::Continue(())
            })
            .await?;

        if let Some(n) = limit {
            ids.truncate(n);
        }
        debug!(xuid = %self.xuid, pages, matches = ids.len(), "Full scan complete");
        Ok(ids)
    }

    /// Visit pages in order, `batch` requests at a time
    ///
    /// Returns the number of pages visited. The first error in page order
    /// aborts the scan.
    async fn scan_pages<F>(&self, max_pages: usize, batch: usize, mut visit: F) -> FetcherResult<usize>
    where
        F: FnMut(Vec<String>) -> ControlFlow<()>,
    {
        let page_size = self.config.page_size;
        let batch = batch.max(1);
        let mut next = 0;
        let mut visited = 0;

        while next < max_pages {
            let end = (next + batch).min(max_pages);
            let requests = (next..end).map(|index| {
                self.fetcher
                    .fetch_match_page(self.session, self.xuid, index * page_size, page_size)
            });

            for page in join_all(requests).await {
                let page = page?;
                visited += 1;
                let undersized = page.len() < page_size;
                if visit(page).is_break() || undersized {
                    return Ok(visited);
                }
            }
            next = end;
        }

        Ok(visited)
    }
}
