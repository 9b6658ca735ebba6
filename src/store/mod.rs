//! Key-Value Storage
//!
//! This module defines the storage seam used for everything this client
//! remembers between operations.
//!
//! # Tiers
//! - Durable: [`FileStore`], a single JSON object in `<state_dir>/state.json`.
//!   Holds the recent-connections list and the current pointer.
//! - Session: [`MemoryStore`], process lifetime only. The only implementor of
//!   [`SessionScoped`], which is what the credential cache requires.
//!
//! Reads never fail: a missing or corrupt file reads as empty. Writes report
//! `ConfigError` when the file cannot be written.

mod recent;

pub use recent::{ConnectionRecord, RecentConnections, CURRENT_KEY, MAX_RECENT, RECENT_KEY};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SqlizerError};

/// String key-value storage with get/set/delete
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, `None` when absent or unreadable
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;
}

/// Marker for stores whose contents die with the session
///
/// Only implement this for storage that is never written to disk.
pub trait SessionScoped: KeyValueStore {}

/// In-memory store, cleared when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| SqlizerError::config_error("session store lock poisoned"))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| SqlizerError::config_error("session store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

impl SessionScoped for MemoryStore {}

/// Durable store backed by one JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Store at `<state_dir>/state.json`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self { path: state_dir.as_ref().join("state.json"), lock: Mutex::new(()) }
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        self.read_entries().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, code = e.error_code(), "treating state file as empty");
            HashMap::new()
        })
    }

    fn read_entries(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| SqlizerError::storage_corruption(format!("Could not read state file: {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| SqlizerError::storage_corruption(format!("State file is corrupt: {e}")))
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SqlizerError::config_error(format!("Could not create state directory: {e}"))
            })?;
        }

        let contents = serde_json::to_string_pretty(entries)
            .map_err(|e| SqlizerError::config_error(format!("Could not serialize state: {e}")))?;

        fs::write(&self.path, contents)
            .map_err(|e| SqlizerError::config_error(format!("Could not write state file: {e}")))
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| SqlizerError::config_error("state file lock poisoned"))?;
        let mut entries = self.load();
        f(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
