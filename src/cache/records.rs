//! Typed records persisted through the cache

use crate::identifier::Xuid;
use crate::{AggregateStats, MatchRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Failed match ids kept on disk; the full count is stored separately
///
/// Only the stored ids are retried on the next run. Matches past this limit
/// stay missing from the stats until a `force_full` run fetches them again.
pub const MAX_STORED_FAILED_MATCHES: usize = 50;

/// Cached match history and aggregates for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsCache {
    /// When the cache was last rewritten
    pub last_update: DateTime<Utc>,
    /// Gamertag at the time of the last update
    pub display_name: Option<String>,
    /// Player id
    pub xuid: Xuid,
    /// Deduplicated records, newest first
    pub processed_matches: Vec<MatchRecord>,
    /// Aggregates over `processed_matches`
    pub stats: AggregateStats,
    /// True when the last run could not fetch every match
    pub incomplete_data: bool,
    /// Number of matches that failed in the last run
    #[serde(default)]
    pub failed_match_count: usize,
    /// Up to [`MAX_STORED_FAILED_MATCHES`] failed match ids
    #[serde(default)]
    pub failed_matches: Vec<String>,
}

impl PlayerStatsCache {
    /// Empty cache for a player
    pub fn new(xuid: Xuid, display_name: Option<String>) -> Self {
        Self {
            last_update: Utc::now(),
            display_name,
            xuid,
            processed_matches: Vec::new(),
            stats: AggregateStats::default(),
            incomplete_data: false,
            failed_match_count: 0,
            failed_matches: Vec::new(),
        }
    }

    /// Ids of every cached match
    pub fn match_ids(&self) -> HashSet<String> {
        self.processed_matches.iter().map(|m| m.match_id.clone()).collect()
    }

    /// Merge freshly fetched records into the cache
    ///
    /// On an id collision the fresh record replaces the cached one. The result
    /// is sorted by start time, newest first.
    pub fn merge(&mut self, fresh: Vec<MatchRecord>) {
        let mut by_id: HashMap<String, MatchRecord> = self
            .processed_matches
            .drain(..)
            .map(|m| (m.match_id.clone(), m))
            .collect();
        for record in fresh {
            by_id.insert(record.match_id.clone(), record);
        }

        let mut merged: Vec<MatchRecord> = by_id.into_values().collect();
        merged.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });
        debug!(total = merged.len(), "Merged match records");
        self.processed_matches = merged;
    }

    /// Record the failures of the current run
    pub fn set_failed(&mut self, mut failed: Vec<String>) {
        failed.sort();
        failed.dedup();
        self.failed_match_count = failed.len();
        self.incomplete_data = !failed.is_empty();
        failed.truncate(MAX_STORED_FAILED_MATCHES);
        self.failed_matches = failed;
    }

    /// Recompute aggregates from the stored records
    pub fn recompute(&mut self) {
        self.stats = AggregateStats::from_matches(&self.processed_matches);
    }

    /// Keep only the newest `n` records
    pub fn truncate(&mut self, n: usize) {
        self.processed_matches.truncate(n);
    }
}

/// Global XUID ↔ gamertag index
///
/// Entries are never removed. Recording a new gamertag for a known XUID
/// replaces the old one, since gamertags can change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityIndex {
    entries: BTreeMap<Xuid, String>,
}

impl IdentityIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping, returning true if the index changed
    pub fn insert(&mut self, xuid: Xuid, gamertag: impl Into<String>) -> bool {
        let gamertag = gamertag.into();
        match self.entries.get(&xuid) {
            Some(existing) if *existing == gamertag => false,
            _ => {
                self.entries.insert(xuid, gamertag);
                true
            }
        }
    }

    /// Gamertag for an id
    pub fn gamertag(&self, xuid: Xuid) -> Option<&str> {
        self.entries.get(&xuid).map(String::as_str)
    }

    /// Id for a gamertag, compared case-insensitively
    pub fn xuid_for(&self, gamertag: &str) -> Option<Xuid> {
        let wanted = gamertag.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(_, name)| name.to_lowercase() == wanted)
            .map(|(xuid, _)| *xuid)
    }

    /// Whether the id is known
    pub fn contains(&self, xuid: Xuid) -> bool {
        self.entries.contains_key(&xuid)
    }

    /// Fold another index into this one; `other` wins on conflicts
    pub fn merge(&mut self, other: &IdentityIndex) -> usize {
        other
            .entries
            .iter()
            .filter(|(xuid, name)| self.insert(**xuid, name.as_str()))
            .count()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (Xuid, &str)> {
        self.entries.iter().map(|(x, n)| (*x, n.as_str()))
    }
}

/// Resumable progress of a co-player discovery pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Index into the match list of the next batch to scan
    pub last_processed_index: usize,
    /// Match ids already scanned
    pub completed_ids: BTreeSet<String>,
    /// Co-player ids found so far
    pub discovered_xuids: BTreeSet<Xuid>,
    /// Co-player ids already resolved (or given up on)
    #[serde(default)]
    pub resolved_xuids: BTreeSet<Xuid>,
    /// Size of the match list being scanned
    pub total_matches: usize,
    /// Last save time
    pub updated_at: DateTime<Utc>,
}

impl ScanProgress {
    /// Fresh progress for a list of `total_matches` matches
    pub fn new(total_matches: usize) -> Self {
        Self {
            last_processed_index: 0,
            completed_ids: BTreeSet::new(),
            discovered_xuids: BTreeSet::new(),
            resolved_xuids: BTreeSet::new(),
            total_matches,
            updated_at: Utc::now(),
        }
    }

    /// Whether every match has been scanned
    pub fn scan_complete(&self) -> bool {
        self.last_processed_index >= self.total_matches
    }

    /// Discovered ids not yet resolved
    pub fn pending_xuids(&self) -> Vec<Xuid> {
        self.discovered_xuids
            .difference(&self.resolved_xuids)
            .copied()
            .collect()
    }
}
