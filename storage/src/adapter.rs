//! Adapter for backends that enumerate keys through `keys()`

use async_trait::async_trait;
use statestash_core::{KeysStorage, PersistResult, StorageBackend, StoredValue};

/// Exposes a `KeysStorage` as a `StorageBackend`, serving `get_all_keys`
/// from `keys`
pub struct WithAllKeys<T>(pub T);

impl<T> WithAllKeys<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[async_trait]
impl<T: KeysStorage> StorageBackend for WithAllKeys<T> {
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>> {
        self.0.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()> {
        self.0.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        self.0.remove_item(key).await
    }

    async fn get_all_keys(&self) -> PersistResult<Vec<String>> {
        self.0.keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct ForageLike {
        items: RwLock<BTreeMap<String, StoredValue>>,
    }

    #[async_trait]
    impl KeysStorage for ForageLike {
        async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>> {
            Ok(self.items.read().get(key).cloned())
        }

        async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()> {
            self.items.write().insert(key.to_string(), value);
            Ok(())
        }

        async fn remove_item(&self, key: &str) -> PersistResult<()> {
            self.items.write().remove(key);
            Ok(())
        }

        async fn keys(&self) -> PersistResult<Vec<String>> {
            Ok(self.items.read().keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_all_keys_served_from_keys() {
        let storage = WithAllKeys::new(ForageLike::default());
        storage.set_item("x:1", json!(1)).await.unwrap();
        storage.set_item("x:2", json!(2)).await.unwrap();

        assert_eq!(storage.get_all_keys().await.unwrap(), vec!["x:1", "x:2"]);
        assert_eq!(storage.get_item("x:2").await.unwrap(), Some(json!(2)));
    }
}
