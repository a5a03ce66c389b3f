//! Persistent JSON cache
//!
//! Every record type is stored as one JSON document per key through a
//! [`KeyValueStore`]. Blocking store I/O runs on the blocking thread pool.
//! A document that fails to parse is logged and treated as absent, so a
//! damaged file costs a rescan rather than an outage.

use crate::identifier::{sanitize_key, Xuid};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod records;
pub mod store;

pub use records::{IdentityIndex, PlayerStatsCache, ScanProgress, MAX_STORED_FAILED_MATCHES};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Could not take the file lock
    #[error("lock error: {0}")]
    Lock(String),

    /// Could not serialize a record
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored document exceeds the size limit
    #[error("cache file too large: {size} bytes (max {max} bytes)")]
    TooLarge {
        /// Actual size
        size: u64,
        /// Limit
        max: u64,
    },
}

/// Cache key layout
pub mod keys {
    use super::*;

    /// Global identity index
    pub const IDENTITY_INDEX: &str = "identity_index";

    /// Per-player stats, by sanitized gamertag or by a hash of the id
    pub fn player(display_name: Option<&str>, xuid: Xuid) -> String {
        match display_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("players/{}", sanitize_key(name)),
            None => format!("players/xuid_{}", xuid.cache_hash()),
        }
    }

    /// Resumable progress record
    pub fn progress(name: &str) -> String {
        format!("progress/{}", sanitize_key(name))
    }

    /// Stored credential chain for an account
    pub fn credentials(account_id: &str) -> String {
        format!("credentials/{}", sanitize_key(account_id))
    }
}

/// Typed async facade over a [`KeyValueStore`]
#[derive(Clone)]
pub struct PersistentCache {
    store: Arc<dyn KeyValueStore>,
}

impl PersistentCache {
    /// Wrap a store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeyValueStore) -> Result<T, CacheError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| CacheError::Io(format!("cache task failed: {e}")))?
    }

    /// Load a JSON document, treating unparseable content as absent
    pub async fn load<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let owned_key = key.to_string();
        let bytes = self.blocking(move |s| s.read(&owned_key)).await?;
        let Some(bytes) = bytes else {
            crate::metrics::record_cache_lookup(false);
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                crate::metrics::record_cache_lookup(true);
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt cache entry");
                crate::metrics::record_corrupt_cache();
                Ok(None)
            }
        }
    }

    /// Atomically replace a JSON document
    pub async fn save<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let owned_key = key.to_string();
        self.blocking(move |s| s.write(&owned_key, &bytes)).await?;
        debug!(key, "Cache entry written");
        Ok(())
    }

    /// Read-modify-write a JSON document under one exclusive lock
    ///
    /// A corrupt current value is handed to `f` as `None`.
    pub async fn update<T, F>(&self, key: &str, f: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Option<T>) -> T + Send + 'static,
    {
        let owned_key = key.to_string();
        self.blocking(move |s| {
            let mut f = Some(f);
            let mut result: Option<T> = None;
            s.update(&owned_key, &mut |current| {
                let parsed = current.and_then(|bytes| match serde_json::from_slice::<T>(bytes) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(key = %owned_key, error = %e, "Discarding corrupt cache entry");
                        None
                    }
                });
                let apply = f
                    .take()
                    .ok_or_else(|| CacheError::Io("update callback invoked twice".to_string()))?;
                let next = apply(parsed);
                let bytes = serde_json::to_vec_pretty(&next)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                result = Some(next);
                Ok(bytes)
            })?;
            result.ok_or_else(|| CacheError::Io("update produced no value".to_string()))
        })
        .await
    }

    /// Delete a document
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let owned_key = key.to_string();
        self.blocking(move |s| s.remove(&owned_key)).await
    }

    /// Load a player's cached stats
    pub async fn load_player(
        &self,
        display_name: Option<&str>,
        xuid: Xuid,
    ) -> Result<Option<PlayerStatsCache>, CacheError> {
        let cached: Option<PlayerStatsCache> = self.load(&keys::player(display_name, xuid)).await?;
        // A sanitized-name collision must not hand back someone else's history
        Ok(cached.filter(|c| c.xuid == xuid))
    }

    /// Persist a player's stats
    pub async fn save_player(&self, cache: &PlayerStatsCache) -> Result<(), CacheError> {
        self.save(&keys::player(cache.display_name.as_deref(), cache.xuid), cache)
            .await
    }

    /// Delete a player's cached stats (explicit reset)
    pub async fn reset_player(&self, display_name: Option<&str>, xuid: Xuid) -> Result<bool, CacheError> {
        self.remove(&keys::player(display_name, xuid)).await
    }

    /// Load the identity index, empty if missing or corrupt
    pub async fn load_identity_index(&self) -> Result<IdentityIndex, CacheError> {
        Ok(self.load(keys::IDENTITY_INDEX).await?.unwrap_or_default())
    }

    /// Merge entries into the stored identity index under the write lock
    ///
    /// Entries written concurrently by another process are kept.
    pub async fn merge_identity_index(&self, entries: IdentityIndex) -> Result<IdentityIndex, CacheError> {
        self.update(keys::IDENTITY_INDEX, move |current: Option<IdentityIndex>| {
            let mut index = current.unwrap_or_default();
            index.merge(&entries);
            index
        })
        .await
    }

    /// Load a progress record
    pub async fn load_progress(&self, name: &str) -> Result<Option<ScanProgress>, CacheError> {
        self.load(&keys::progress(name)).await
    }

    /// Save a progress record
    pub async fn save_progress(&self, name: &str, progress: &ScanProgress) -> Result<(), CacheError> {
        self.save(&keys::progress(name), progress).await
    }

    /// Delete a progress record
    pub async fn clear_progress(&self, name: &str) -> Result<bool, CacheError> {
        self.remove(&keys::progress(name)).await
    }
}
