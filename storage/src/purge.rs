//! Removal of persisted entries under a key prefix

use statestash_core::{parse_storage_key, storage_key, PersistResult, StorageBackend};
use tracing::{info, warn};

/// Outcome of a purge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurgeReport {
    /// Logical keys whose entries were removed
    pub removed: Vec<String>,
    /// Logical keys whose removal failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove persisted entries stored under `prefix`
///
/// With `keys == None` every entry under the prefix goes; otherwise only the
/// listed logical keys that are actually stored. Listing keys fails the whole
/// purge; a failing removal is recorded and the rest continue.
pub async fn purge_stored_state(
    storage: &dyn StorageBackend,
    prefix: &str,
    keys: Option<&[String]>,
) -> PersistResult<PurgeReport> {
    let all_keys = storage.get_all_keys().await?;

    let targets: Vec<String> = all_keys
        .iter()
        .filter_map(|k| parse_storage_key(prefix, k))
        .filter(|k| keys.map(|only| only.iter().any(|o| o == k)).unwrap_or(true))
        .map(str::to_string)
        .collect();

    let mut report = PurgeReport::default();
    for key in targets {
        match storage.remove_item(&storage_key(prefix, &key)).await {
            Ok(()) => report.removed.push(key),
            Err(e) => {
                warn!("Error purging stored state for key \"{}\": {}", key, e);
                report.failed.push((key, e.to_string()));
            }
        }
    }

    info!(
        "Purged {} stored entries under prefix \"{}\" ({} failed)",
        report.removed.len(),
        prefix,
        report.failed.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use serde_json::json;

    fn seeded() -> MemoryStorage {
        MemoryStorage::with_data(vec![
            ("app:a".into(), json!(1)),
            ("app:b".into(), json!(2)),
            ("other:a".into(), json!(3)),
        ])
    }

    #[tokio::test]
    async fn test_purge_all_under_prefix() {
        let storage = seeded();
        let report = purge_stored_state(&storage, "app:", None).await.unwrap();

        assert_eq!(report.removed, vec!["a", "b"]);
        assert!(report.is_clean());
        assert_eq!(storage.get_all_keys().await.unwrap(), vec!["other:a"]);
    }

    #[tokio::test]
    async fn test_purge_subset() {
        let storage = seeded();
        let only = vec!["b".to_string(), "missing".to_string()];
        let report = purge_stored_state(&storage, "app:", Some(&only)).await.unwrap();

        assert_eq!(report.removed, vec!["b"]);
        assert_eq!(storage.get_all_keys().await.unwrap(), vec!["app:a", "other:a"]);
    }
}
