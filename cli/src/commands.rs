//! CLI Commands

use serde_json::{json, Value};
use statestash::{
    create_sled_storage, get_stored_state, persist_store, purge_stored_state, with_auto_rehydrate,
    Action, ChecksumTransform, ErrorCallback, MemoryStateContainer, PersistConfig, PersistError,
    PersistResult, PersistStoreOptions, PersistorBuilder, PlainStateAccessor, PurgeKeys,
    SharedSledStorage, StateContainer, StateTree, StorageBackend, StoredSnapshot,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Entries of the demo history kept in state
const HISTORY_LEN: usize = 5;

/// Load the persistor configuration, then apply flag overrides
pub fn load_config(
    path: Option<&Path>,
    key_prefix: Option<String>,
) -> anyhow::Result<PersistConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let config = PersistConfig::from_json(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => PersistConfig::default(),
    };

    Ok(match key_prefix {
        Some(prefix) => config.with_key_prefix(prefix),
        None => config,
    })
}

fn open_storage(data_dir: &Path) -> anyhow::Result<SharedSledStorage> {
    std::fs::create_dir_all(data_dir)?;
    let storage = create_sled_storage(data_dir)?;
    info!("Opened store at {} ({} items)", data_dir.display(), storage.size_estimate());
    Ok(storage)
}

/// Persistor builder shared by every command, so stored values written by
/// `demo` decode the same way in `inspect`
fn builder(config: PersistConfig) -> PersistorBuilder<StateTree> {
    PersistorBuilder::new()
        .config(config)
        .transform(ChecksumTransform)
        .on_write_error(|key, e| warn!("Write for {} failed: {}", key, e))
        .on_rehydrate_error(warn_unrestorable)
}

fn warn_unrestorable(key: &str, e: &PersistError) {
    warn!("Stored {} could not be restored: {}", key, e);
}

fn initial_state() -> StateTree {
    StateTree::new()
        .with_value("counter", json!({"value": 0}))
        .with_value("history", json!([]))
        .with_value("session", json!({"ticks": 0}))
}

fn counter_value(state: &StateTree) -> i64 {
    state
        .get("counter")
        .and_then(|c| c["value"].as_i64())
        .unwrap_or(0)
}

fn demo_reducer(state: &StateTree, action: &Action<StateTree>) -> StateTree {
    match action {
        Action::Custom { kind, payload } if kind == "tick" => {
            let mut history: Vec<Value> = state
                .get("history")
                .and_then(|h| h.as_array().cloned())
                .unwrap_or_default();
            history.push(payload["step"].clone());
            if history.len() > HISTORY_LEN {
                history.drain(..history.len() - HISTORY_LEN);
            }

            let ticks = state
                .get("session")
                .and_then(|s| s["ticks"].as_u64())
                .unwrap_or(0);

            state
                .with_value("counter", json!({"value": counter_value(state) + 1}))
                .with_value("history", Value::Array(history))
                .with_value("session", json!({"ticks": ticks + 1}))
        }
        _ => state.clone(),
    }
}

/// Run the counter app against the sled store in `data_dir`
pub async fn demo(
    data_dir: &Path,
    mut config: PersistConfig,
    actions: u64,
    pace_ms: u64,
    fresh: bool,
) -> anyhow::Result<()> {
    let storage = open_storage(data_dir)?;
    // Per-run bookkeeping, never stored
    config.blacklist.insert("session".to_string());

    let container = Arc::new(MemoryStateContainer::new(
        initial_state(),
        with_auto_rehydrate(demo_reducer),
    ));
    let options = PersistStoreOptions {
        skip_restore: false,
        purge_keys: fresh.then_some(PurgeKeys::All),
    };

    let target: Arc<dyn StateContainer<StateTree>> = container.clone();
    let persistor = persist_store(target, builder(config).storage(storage), options).await?;

    let start = counter_value(&container.get_state());
    println!("Counter starts at {}", start);

    for step in 0..actions {
        container.dispatch(Action::custom("tick", json!({"step": step})));
        tokio::time::sleep(Duration::from_millis(pace_ms)).await;
    }

    let flushed = persistor.flush().wait_all().await?;
    let stats = persistor.stats();
    let state = container.get_state();

    println!("Counter:        {} -> {}", start, counter_value(&state));
    println!("Writes issued:  {}", stats.writes_issued);
    println!("Flushed:        {}", flushed);
    println!("Drain loops:    {}", stats.drains_started);
    Ok(())
}

/// Print what is stored under the configured prefix
pub async fn inspect(data_dir: &Path, config: PersistConfig, raw: bool) -> anyhow::Result<()> {
    let storage = open_storage(data_dir)?;

    let rendered = if raw {
        StoredSnapshot::read(&*storage, &config.key_prefix).await?.to_json()
    } else {
        decode_stored(&*storage, config, Arc::new(warn_unrestorable)).await?.to_json()
    };

    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// Decode every stored key; keys that fail are reported and left out
async fn decode_stored(
    storage: &dyn StorageBackend,
    config: PersistConfig,
    on_error: ErrorCallback,
) -> PersistResult<StateTree> {
    let prefix = config.key_prefix.clone();
    let codec = builder(config).codec();
    get_stored_state(storage, &prefix, &PlainStateAccessor, &codec, Some(&on_error)).await
}

/// Remove stored keys under the configured prefix
pub async fn purge(
    data_dir: &Path,
    config: PersistConfig,
    keys: Vec<String>,
) -> anyhow::Result<()> {
    let storage = open_storage(data_dir)?;
    let only = (!keys.is_empty()).then_some(keys.as_slice());

    let report = purge_stored_state(&*storage, &config.key_prefix, only).await?;

    println!("Removed {} keys", report.removed.len());
    for (key, reason) in &report.failed {
        eprintln!("Could not remove {}: {}", key, reason);
    }
    if !report.is_clean() {
        anyhow::bail!("{} keys could not be removed", report.failed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use statestash::{substate, MemoryStorage};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_decode_stored_reports_unrestorable_keys() {
        let config = PersistConfig::default();
        let encoded = builder(config.clone())
            .codec()
            .encode("counter", substate(json!({"value": 3})))
            .unwrap()
            .unwrap();
        let storage = MemoryStorage::with_data(vec![
            ("reduxPersist:counter".into(), encoded),
            ("reduxPersist:history".into(), json!("{oops")),
        ]);

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let on_error: ErrorCallback = Arc::new(move |key: &str, _e: &PersistError| {
            sink.lock().unwrap().push(key.to_string())
        });

        let state = decode_stored(&storage, config, on_error).await.unwrap();
        assert_eq!(state.to_json(), json!({"counter": {"value": 3}}));
        assert_eq!(*reported.lock().unwrap(), vec!["history".to_string()]);
    }
}
