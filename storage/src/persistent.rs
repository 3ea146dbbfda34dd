//! Persistent storage backend using sled database

use async_trait::async_trait;
use sled::{Db, Tree};
use statestash_core::{PersistError, PersistResult, StorageBackend, StoredValue};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const ITEMS_TREE: &str = "items";

fn storage_err(e: sled::Error) -> PersistError {
    PersistError::StorageError(e.to_string())
}

/// Durable storage backend backed by a sled tree
///
/// Values are stored as JSON bytes. Every write is flushed before it
/// resolves.
pub struct SledStorage {
    db: Db,
    items: Tree,
}

impl SledStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let items = db.open_tree(ITEMS_TREE).map_err(storage_err)?;
        Ok(Self { db, items })
    }

    /// Number of stored items
    pub fn size_estimate(&self) -> u64 {
        self.items.len() as u64
    }

    fn decode(bytes: &[u8]) -> PersistResult<StoredValue> {
        serde_json::from_slice(bytes).map_err(|e| PersistError::StorageError(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for SledStorage {
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>> {
        match self.items.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()> {
        let bytes =
            serde_json::to_vec(&value).map_err(|e| PersistError::StorageError(e.to_string()))?;
        self.items.insert(key, bytes).map_err(storage_err)?;
        self.db.flush_async().await.map_err(storage_err)?;
        debug!("Stored {}", key);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        self.items.remove(key).map_err(storage_err)?;
        self.db.flush_async().await.map_err(storage_err)?;
        Ok(())
    }

    async fn get_all_keys(&self) -> PersistResult<Vec<String>> {
        self.items
            .iter()
            .keys()
            .map(|result| {
                let key = result.map_err(storage_err)?;
                String::from_utf8(key.to_vec())
                    .map_err(|e| PersistError::StorageError(e.to_string()))
            })
            .collect()
    }
}

/// Thread-safe persistent storage wrapper
pub type SharedSledStorage = Arc<SledStorage>;

/// Create a shared persistent storage
pub fn create_sled_storage<P: AsRef<Path>>(path: P) -> PersistResult<SharedSledStorage> {
    Ok(Arc::new(SledStorage::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sled_storage_basic() {
        let tmp = TempDir::new().unwrap();
        let storage = SledStorage::open(tmp.path()).unwrap();

        storage.set_item("key1", json!({"n": 1})).await.unwrap();
        let value = storage.get_item("key1").await.unwrap();
        assert_eq!(value, Some(json!({"n": 1})));

        storage.remove_item("key1").await.unwrap();
        let value = storage.get_item("key1").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_sled_storage_reopen() {
        let tmp = TempDir::new().unwrap();

        // Write data
        {
            let storage = SledStorage::open(tmp.path()).unwrap();
            storage.set_item("app:a", json!("one")).await.unwrap();
            storage.set_item("app:b", json!([1, 2])).await.unwrap();
        }

        // Reopen and verify
        {
            let storage = SledStorage::open(tmp.path()).unwrap();
            assert_eq!(storage.get_item("app:a").await.unwrap(), Some(json!("one")));
            assert_eq!(storage.get_all_keys().await.unwrap(), vec!["app:a", "app:b"]);
            assert_eq!(storage.size_estimate(), 2);
        }
    }
}
