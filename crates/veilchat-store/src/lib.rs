//! Local key-value persistence for the Veilchat node.
//!
//! The [`ConfigStore`] owns the sled database. On [`open`](ConfigStore::open)
//! it opens the database and pre-creates all required trees. Values are
//! opaque byte blobs; callers own their encoding.

use std::path::Path;

use veilchat_types::{Result, VeilError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Tree holding node-level configuration (identity key, settings).
const TREE_SYSTEM_CONFIG: &str = "system_config";

/// All trees pre-created on open so later access cannot fail on creation.
const TREES: &[&str] = &[TREE_SYSTEM_CONFIG, "users", "messages"];

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Durable key-value store backed by sled.
///
/// # Trees
///
/// - `system_config` — node identity and settings
/// - `users` — known peer profiles
/// - `messages` — message history
pub struct ConfigStore {
    db: sled::Db,
    system: sled::Tree,
}

impl ConfigStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Storage`] if the database cannot be opened
    /// or a tree cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| VeilError::Storage {
            reason: format!("failed to open sled database at {}: {e}", path.display()),
        })?;

        // Pre-create all trees so they exist for later access.
        for name in TREES {
            db.open_tree(name).map_err(|e| VeilError::Storage {
                reason: format!("failed to open tree '{name}': {e}"),
            })?;
        }

        let system = db.open_tree(TREE_SYSTEM_CONFIG).map_err(|e| VeilError::Storage {
            reason: format!("failed to open tree '{TREE_SYSTEM_CONFIG}': {e}"),
        })?;

        tracing::debug!(path = %path.display(), "opened config store");
        Ok(Self { db, system })
    }

    /// Reads a configuration value. Returns `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Storage`] only on an underlying read failure;
    /// a missing key is not an error.
    pub fn get_config(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.system.get(key).map_err(|e| VeilError::Storage {
            reason: format!("failed to read config key '{key}': {e}"),
        })?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    /// Writes a configuration value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Storage`] if the write fails.
    pub fn set_config(&self, key: &str, value: &[u8]) -> Result<()> {
        self.system.insert(key, value).map_err(|e| VeilError::Storage {
            reason: format!("failed to write config key '{key}': {e}"),
        })?;
        Ok(())
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Storage`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| VeilError::Storage {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&dir.path().join("db")).unwrap();
        (dir, store)
    }

    #[test]
    fn get_missing_key_is_none() {
        let (_dir, store) = open_temp();
        assert!(store.get_config("absent").unwrap().is_none());
    }

    #[test]
    fn set_then_get_roundtrip() {
        let (_dir, store) = open_temp();
        store.set_config("k", b"value").unwrap();
        assert_eq!(store.get_config("k").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn set_overwrites_previous_value() {
        let (_dir, store) = open_temp();
        store.set_config("k", b"one").unwrap();
        store.set_config("k", b"two").unwrap();
        assert_eq!(store.get_config("k").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = ConfigStore::open(&path).unwrap();
            store.set_config("k", b"persisted").unwrap();
            store.flush().unwrap();
        }
        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.get_config("k").unwrap(), Some(b"persisted".to_vec()));
    }
}
