//! Raw snapshots of the entries stored under a key prefix

use serde_json::{Map, Value};
use statestash_core::{parse_storage_key, storage_key, PersistResult, StorageBackend, StoredValue};
use tracing::{debug, warn};

/// Stored entries under one prefix, keyed by logical key, still in their
/// stored (serialized and transformed) form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSnapshot {
    /// Prefix the entries were read from
    pub prefix: String,
    /// `(logical key, stored value)` in key order
    pub entries: Vec<(String, StoredValue)>,
}

impl StoredSnapshot {
    /// Read every entry under `prefix`
    ///
    /// A key that fails to read is logged and left out.
    pub async fn read(storage: &dyn StorageBackend, prefix: &str) -> PersistResult<Self> {
        let mut logical: Vec<String> = storage
            .get_all_keys()
            .await?
            .iter()
            .filter_map(|k| parse_storage_key(prefix, k))
            .map(str::to_string)
            .collect();
        logical.sort();

        let mut entries = Vec::with_capacity(logical.len());
        for key in logical {
            match storage.get_item(&storage_key(prefix, &key)).await {
                Ok(Some(value)) => entries.push((key, value)),
                Ok(None) => debug!("Stored key {} vanished while reading", key),
                Err(e) => warn!("Error reading stored state for key \"{}\": {}", key, e),
            }
        }

        Ok(Self {
            prefix: prefix.to_string(),
            entries,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Drop the listed logical keys
    pub fn without_keys(mut self, keys: &[String]) -> Self {
        self.entries.retain(|(k, _)| !keys.contains(k));
        self
    }

    /// Render as a JSON object of stored values
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.entries.iter().cloned().collect();
        Value::Object(map)
    }

    pub fn into_entries(self) -> Vec<(String, StoredValue)> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_strips_prefix() {
        let storage = MemoryStorage::with_data(vec![
            ("app:todos".into(), json!("[1,2]")),
            ("app:user".into(), json!("\"ada\"")),
            ("other:todos".into(), json!("[]")),
        ]);

        let snapshot = StoredSnapshot::read(&storage, "app:").await.unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["todos", "user"]);
        assert_eq!(snapshot.get("todos"), Some(&json!("[1,2]")));
        assert_eq!(
            snapshot.to_json(),
            json!({"todos": "[1,2]", "user": "\"ada\""})
        );
    }

    #[tokio::test]
    async fn test_without_keys() {
        let storage = MemoryStorage::with_data(vec![
            ("p:a".into(), json!(1)),
            ("p:b".into(), json!(2)),
        ]);
        let snapshot = StoredSnapshot::read(&storage, "p:")
            .await
            .unwrap()
            .without_keys(&["a".to_string()]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("a").is_none());
    }
}
