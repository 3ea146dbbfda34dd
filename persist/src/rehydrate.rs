//! Rebuilding state from persisted entries

use crate::codec::StateCodec;
use crate::persistor::ErrorCallback;
use statestash_core::{PersistResult, StateAccessor, StorageBackend, StoredValue};
use statestash_storage::StoredSnapshot;
use tracing::{debug, warn};

/// Input to `Persistor::rehydrate`
#[derive(Debug, Clone)]
pub enum RehydrateInput<S> {
    /// Already-typed state, dispatched as is
    State(S),
    /// Stored entries `(logical key, stored value)` to decode first
    Serialized(Vec<(String, StoredValue)>),
}

impl<S> From<StoredSnapshot> for RehydrateInput<S> {
    fn from(snapshot: StoredSnapshot) -> Self {
        RehydrateInput::Serialized(snapshot.into_entries())
    }
}

/// Decode each entry and set it into a fresh state
///
/// A key that fails to deserialize or transform is logged, reported once
/// through `on_error`, and omitted.
pub(crate) fn reconstruct<S>(
    accessor: &dyn StateAccessor<S>,
    codec: &StateCodec,
    entries: Vec<(String, StoredValue)>,
    on_error: Option<&ErrorCallback>,
) -> S {
    let mut state = accessor.initial();
    let mut restored = 0usize;
    for (key, stored) in entries {
        match codec.decode(&key, &stored) {
            Ok(value) => {
                state = accessor.set(state, &key, value);
                restored += 1;
            }
            Err(e) => {
                warn!("Error rehydrating data for key \"{}\": {}", key, e);
                if let Some(callback) = on_error {
                    callback(key.as_str(), &e);
                }
            }
        }
    }
    debug!("Reconstructed {} keys", restored);
    state
}

/// Load and decode every entry stored under `prefix`
pub async fn get_stored_state<S>(
    storage: &dyn StorageBackend,
    prefix: &str,
    accessor: &dyn StateAccessor<S>,
    codec: &StateCodec,
    on_error: Option<&ErrorCallback>,
) -> PersistResult<S> {
    let snapshot = StoredSnapshot::read(storage, prefix).await?;
    Ok(reconstruct(accessor, codec, snapshot.into_entries(), on_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::PlainStateAccessor;
    use crate::serializer::JsonSerializer;
    use crate::transform::TransformPipeline;
    use parking_lot::Mutex;
    use serde_json::json;
    use statestash_core::{Environment, PersistError, StateTree};
    use statestash_storage::MemoryStorage;
    use std::sync::Arc;

    fn json_codec() -> StateCodec {
        StateCodec::new(
            TransformPipeline::default(),
            Arc::new(JsonSerializer),
            Environment::Development,
        )
    }

    #[test]
    fn test_corrupt_key_omitted_and_reported_once() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let callback: ErrorCallback = Arc::new(move |key: &str, _e: &PersistError| {
            sink.lock().push(key.to_string());
        });

        let entries = vec![
            ("a".to_string(), json!("1")),
            ("x".to_string(), json!("{\"broken\":")),
            ("b".to_string(), json!("[true]")),
        ];
        let state: StateTree =
            reconstruct(&PlainStateAccessor, &json_codec(), entries, Some(&callback));

        assert_eq!(state.to_json(), json!({"a": 1, "b": [true]}));
        assert_eq!(*reported.lock(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_get_stored_state_reads_prefix_only() {
        let storage = MemoryStorage::with_data(vec![
            ("app:todos".into(), json!("[\"milk\"]")),
            ("app:user".into(), json!("{\"name\":\"ada\"}")),
            ("else:todos".into(), json!("[]")),
        ]);

        let state: StateTree =
            get_stored_state(&storage, "app:", &PlainStateAccessor, &json_codec(), None)
                .await
                .unwrap();

        assert_eq!(
            state.to_json(),
            json!({"todos": ["milk"], "user": {"name": "ada"}})
        );
    }
}
