//! Credential Cache
//!
//! Session-lifetime map from connection identity to the full, secret-bearing
//! URL. The connect flow is the only writer and the readiness orchestrator
//! the only reader.
//!
//! The backing store must implement [`SessionScoped`], so handing this cache a
//! durable [`FileStore`](crate::store::FileStore) does not compile.

use crate::error::Result;
use crate::store::SessionScoped;

const KEY_PREFIX: &str = "sqlizer.credential.";

/// Secret-bearing URLs keyed by identity
#[derive(Debug)]
pub struct CredentialCache<S> {
    store: S,
}

impl<S: SessionScoped> CredentialCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Remember the full URL for `id` (last write wins)
    pub fn put(&self, id: &str, full_url: &str) -> Result<()> {
        self.store.set(&key(id), full_url.to_string())
    }

    /// Full URL for `id`, if this session connected to it
    #[must_use]
    pub fn get(&self, id: &str) -> Option<String> {
        self.store.get(&key(id))
    }
}

fn key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    #[test]
    fn test_put_get_last_write_wins() {
        let cache = CredentialCache::new(MemoryStore::new());
        assert_eq!(cache.get("id"), None);

        cache.put("id", "postgresql://u:one@h/d").unwrap();
        cache.put("id", "postgresql://u:two@h/d").unwrap();
        assert_eq!(cache.get("id").as_deref(), Some("postgresql://u:two@h/d"));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_entries_are_namespaced() {
        let cache = CredentialCache::new(MemoryStore::new());
        cache.put("postgresql|h|5432|d", "postgresql://u:p@h:5432/d").unwrap();
        assert!(cache.store.get("sqlizer.credential.postgresql|h|5432|d").is_some());
    }
}
