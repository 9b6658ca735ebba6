//! Recent-Connections Store
//!
//! Bounded most-recently-used list of [`ConnectionRecord`]s plus a single
//! "current" pointer, persisted through any [`KeyValueStore`].
//!
//! # Layout
//! - `sqlizer.recent`: JSON array, at most [`MAX_RECENT`] records, newest first
//! - `sqlizer.current`: one JSON record
//!
//! Malformed persisted data reads as an empty list / absent pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::dsn::{self, ConnectionFields, Grammar, PublicFields};
use crate::error::{Result, SqlizerError};
use crate::identity::identity;

/// Durable key for the recent list
pub const RECENT_KEY: &str = "sqlizer.recent";

/// Durable key for the current pointer
pub const CURRENT_KEY: &str = "sqlizer.current";

/// Maximum number of remembered connections
pub const MAX_RECENT: usize = 3;

/// Remembered connection target, safe for durable storage
///
/// Holds no password: the structured fields are [`PublicFields`] and the URL
/// is masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Connection identity
    pub id: String,
    pub display_name: String,
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub database: String,
    pub masked_url: String,
    pub fields_sans_password: PublicFields,
    /// Schema discovery progress, 0-100
    #[serde(default)]
    pub index_progress: u8,
    /// Model training progress, 0-100
    #[serde(default)]
    pub train_progress: u8,
    pub created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Record for a freshly tested target
    ///
    /// Returns `None` when the fields cannot be rendered as a URL.
    #[must_use]
    pub fn from_fields(fields: &ConnectionFields) -> Option<Self> {
        let masked_url = dsn::masked(fields)?;
        let database = fields.database.clone().unwrap_or_default();
        Some(Self {
            id: identity(fields),
            display_name: display_name(fields),
            driver: fields.driver.clone(),
            host: fields.host.clone(),
            database,
            masked_url,
            fields_sans_password: fields.without_password(),
            index_progress: 0,
            train_progress: 0,
            created_at: Utc::now(),
        })
    }
}

fn display_name(fields: &ConnectionFields) -> String {
    let dialect = fields.dialect();
    let database = fields.database.as_deref().unwrap_or_default();
    match dialect.grammar {
        Grammar::FilePath => format!("{} · {}", dialect.label, database),
        _ if database.is_empty() => format!("{} · {}", dialect.label, fields.host),
        _ => format!("{} · {}/{}", dialect.label, fields.host, database),
    }
}

/// MRU list and current pointer over a key-value store
#[derive(Debug)]
pub struct RecentConnections<S> {
    store: S,
}

impl<S: KeyValueStore> RecentConnections<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Remembered records, newest first
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionRecord> {
        let Some(raw) = self.store.get(RECENT_KEY) else {
            return Vec::new();
        };
        match from_json::<Vec<ConnectionRecord>>(RECENT_KEY, &raw) {
            Ok(mut records) => {
                records.truncate(MAX_RECENT);
                records
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "using empty recent list");
                Vec::new()
            }
        }
    }

    /// Record with the given id, if remembered
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ConnectionRecord> {
        self.list().into_iter().find(|r| r.id == id)
    }

    /// Insert or promote `record` to the front, evicting beyond [`MAX_RECENT`]
    pub fn save(&self, record: ConnectionRecord) -> Result<Vec<ConnectionRecord>> {
        let mut records = self.list();
        records.retain(|r| r.id != record.id);
        records.insert(0, record);
        records.truncate(MAX_RECENT);
        self.write_list(&records)?;
        Ok(records)
    }

    /// Forget `id`; clears the current pointer when it pointed at `id`
    pub fn delete(&self, id: &str) -> Result<Vec<ConnectionRecord>> {
        let mut records = self.list();
        records.retain(|r| r.id != id);
        self.write_list(&records)?;

        if self.read_current().is_some_and(|current| current.id == id) {
            self.store.delete(CURRENT_KEY)?;
        }
        Ok(records)
    }

    /// Current target
    ///
    /// A pointer whose id is no longer in the list is orphaned: it is cleared
    /// and reported as absent.
    #[must_use]
    pub fn current(&self) -> Option<ConnectionRecord> {
        let current = self.read_current()?;
        if self.list().iter().any(|r| r.id == current.id) {
            return Some(current);
        }

        tracing::debug!(id = %current.id, "clearing orphaned current pointer");
        if let Err(e) = self.store.delete(CURRENT_KEY) {
            tracing::warn!(error = %e, "could not clear orphaned current pointer");
        }
        None
    }

    /// Point at `record`, or clear the pointer with `None`
    pub fn set_current(&self, record: Option<&ConnectionRecord>) -> Result<()> {
        match record {
            Some(record) => self.store.set(CURRENT_KEY, to_json(record)?),
            None => self.store.delete(CURRENT_KEY),
        }
    }

    /// Update progress fields of `id` in the list and in the current pointer
    ///
    /// `None` leaves a field unchanged. Unknown ids are ignored.
    pub fn update_progress(&self, id: &str, index: Option<u8>, train: Option<u8>) -> Result<()> {
        let apply = |record: &mut ConnectionRecord| {
            if let Some(index) = index {
                record.index_progress = index.min(100);
            }
            if let Some(train) = train {
                record.train_progress = train.min(100);
            }
        };

        let mut records = self.list();
        let Some(position) = records.iter().position(|r| r.id == id) else {
            return Ok(());
        };
        apply(&mut records[position]);
        self.write_list(&records)?;

        if let Some(mut current) = self.read_current().filter(|c| c.id == id) {
            apply(&mut current);
            self.set_current(Some(&current))?;
        }
        Ok(())
    }

    fn read_current(&self) -> Option<ConnectionRecord> {
        let raw = self.store.get(CURRENT_KEY)?;
        from_json(CURRENT_KEY, &raw)
            .map_err(|e| tracing::warn!(error = %e, code = e.error_code(), "treating current pointer as absent"))
            .ok()
    }

    fn write_list(&self, records: &[ConnectionRecord]) -> Result<()> {
        self.store.set(RECENT_KEY, to_json(&records)?)
    }
}

fn from_json<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| SqlizerError::storage_corruption(format!("{key} is unreadable: {e}")))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| SqlizerError::config_error(format!("Could not serialize connection record: {e}")))
}
