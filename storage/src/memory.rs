//! In-memory storage backend for testing and ephemeral sessions

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use statestash_core::{PersistError, PersistResult, StorageBackend, StoredValue};
use std::collections::HashSet;
use std::sync::Arc;

/// Operation observed by a `MemoryStorage`
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    Set { key: String, value: StoredValue },
    Remove { key: String },
}

/// In-memory storage backend
///
/// Records every mutating operation so callers can assert on write traffic,
/// and can be told to reject writes for chosen keys.
pub struct MemoryStorage {
    data: DashMap<String, StoredValue>,
    log: RwLock<Vec<StorageOp>>,
    rejected: RwLock<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            log: RwLock::new(Vec::new()),
            rejected: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_data(data: Vec<(String, StoredValue)>) -> Self {
        let storage = Self::new();
        for (key, value) in data {
            storage.data.insert(key, value);
        }
        storage
    }

    /// Make every later `set_item` for `key` fail
    pub fn reject_writes_for(&self, key: impl Into<String>) {
        self.rejected.write().insert(key.into());
    }

    /// Mutating operations in the order they were applied
    pub fn operations(&self) -> Vec<StorageOp> {
        self.log.read().clone()
    }

    /// Keys passed to `set_item`, in order, including repeats
    pub fn written_keys(&self) -> Vec<String> {
        self.log
            .read()
            .iter()
            .filter_map(|op| match op {
                StorageOp::Set { key, .. } => Some(key.clone()),
                StorageOp::Remove { .. } => None,
            })
            .collect()
    }

    /// Synchronous peek at a stored value
    pub fn peek(&self, key: &str) -> Option<StoredValue> {
        self.data.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>> {
        Ok(self.peek(key))
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()> {
        if self.rejected.read().contains(key) {
            return Err(PersistError::StorageError(format!("write rejected for {}", key)));
        }
        self.log.write().push(StorageOp::Set {
            key: key.to_string(),
            value: value.clone(),
        });
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        self.log.write().push(StorageOp::Remove {
            key: key.to_string(),
        });
        self.data.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> PersistResult<Vec<String>> {
        let mut keys: Vec<String> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// Thread-safe memory storage wrapper
pub type SharedMemoryStorage = Arc<MemoryStorage>;

/// Create a shared memory storage
pub fn create_memory_storage() -> SharedMemoryStorage {
    Arc::new(MemoryStorage::new())
}
