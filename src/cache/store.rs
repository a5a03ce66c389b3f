//! Key-value store backends
//!
//! `FileStore` keeps one JSON file per key with advisory locking (fd-lock) and
//! atomic temp-file writes. `MemoryStore` has the same contract in process.

use super::CacheError;
use fd_lock::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Maximum accepted cache file size (64 MB)
pub const MAX_CACHE_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Read-modify-write callback for [`KeyValueStore::update`]
pub type UpdateFn<'a> = dyn FnMut(Option<&[u8]>) -> Result<Vec<u8>, CacheError> + 'a;

/// Blocking key-value storage with atomic replace semantics
///
/// Implementations must never expose a partially written value, and `update`
/// must hold exclusive access across its read and its write.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replace the value stored under `key`
    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Read, transform and write back under one exclusive lock
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), CacheError>;

    /// Delete `key`, returning whether anything was there
    fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// One JSON file per key under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn open_lock(path: &Path) -> Result<RwLock<File>, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io(e.to_string()))?;
        }
        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| CacheError::Lock(format!("Failed to create lock file: {e}")))?;
        Ok(RwLock::new(lock_file))
    }

    fn read_unlocked(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e.to_string())),
        };
        if metadata.len() > MAX_CACHE_FILE_SIZE {
            return Err(CacheError::TooLarge {
                size: metadata.len(),
                max: MAX_CACHE_FILE_SIZE,
            });
        }
        std::fs::read(path)
            .map(Some)
            .map_err(|e| CacheError::Io(e.to_string()))
    }

    fn write_unlocked(path: &Path, value: &[u8]) -> Result<(), CacheError> {
        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(value)
            .map_err(|e| CacheError::Io(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| CacheError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CacheError::Io(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| CacheError::Io(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        if !path.parent().is_some_and(Path::exists) {
            return Ok(None);
        }

        let lock = Self::open_lock(&path)?;
        let _guard = lock
            .read()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire read lock: {e}")))?;

        let value = Self::read_unlocked(&path)?;
        debug!(path = %path.display(), found = value.is_some(), "Read cache entry");
        Ok(value)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let mut lock = Self::open_lock(&path)?;
        let _guard = lock
            .write()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire write lock: {e}")))?;

        Self::write_unlocked(&path, value)?;
        debug!(path = %path.display(), bytes = value.len(), "Cache entry saved");
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let mut lock = Self::open_lock(&path)?;
        let _guard = lock
            .write()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let current = Self::read_unlocked(&path)?;
        let next = f(current.as_deref())?;
        Self::write_unlocked(&path, &next)?;
        debug!(path = %path.display(), bytes = next.len(), "Cache entry updated");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }

        let mut lock = Self::open_lock(&path)?;
        let _guard = lock
            .write()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire write lock: {e}")))?;

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Cache entry removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io(e.to_string())),
        }
    }
}

/// In-process store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<HashMap<String, usize>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes (including updates) for `key`
    pub fn write_count(&self, key: &str) -> usize {
        self.writes
            .lock()
            .map(|w| w.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Keys currently stored
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn record_write(&self, key: &str) {
        if let Ok(mut writes) = self.writes.lock() {
            *writes.entry(key.to_string()).or_default() += 1;
        }
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Lock("memory store mutex poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        self.record_write(key);
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let next = f(entries.get(key).map(Vec::as_slice))?;
        entries.insert(key.to_string(), next);
        drop(entries);
        self.record_write(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().map_err(poisoned)?.remove(key).is_some())
    }
}
