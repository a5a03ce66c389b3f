//! Per-identity mutual exclusion

use crate::identifier::Xuid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per player
///
/// Two aggregations of the same player would both read the cache, fetch the
/// same matches and race on the final write. Holding the player's lock for
/// the whole run serializes them; different players never contend.
#[derive(Clone, Default)]
pub struct IdentityLocks {
    locks: Arc<Mutex<HashMap<Xuid, Arc<AsyncMutex<()>>>>>,
}

impl IdentityLocks {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold `xuid`'s lock until the guard drops
    pub async fn lock(&self, xuid: Xuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(xuid).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Whether `xuid`'s lock is currently held
    pub fn is_locked(&self, xuid: Xuid) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(&xuid).is_some_and(|l| l.try_lock().is_err())
    }
}
