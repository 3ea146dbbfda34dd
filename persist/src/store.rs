//! One-call setup: build a persistor, restore stored state, resume

use crate::persistor::{Persistor, PersistorBuilder};
use crate::rehydrate::RehydrateInput;
use statestash_core::{PersistResult, StateContainer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stored keys to discard during `persist_store`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeKeys {
    /// Everything under the prefix
    All,
    /// Only these logical keys
    Keys(Vec<String>),
}

/// Options for `persist_store`
#[derive(Debug, Clone, Default)]
pub struct PersistStoreOptions {
    /// Do not read stored state; dispatch nothing
    pub skip_restore: bool,
    /// Keys removed from the restored state and from storage
    pub purge_keys: Option<PurgeKeys>,
}

/// Build a persistor for `container`, restore whatever is stored, and start
/// persisting
///
/// The persistor stays paused while stored state is read and dispatched, so
/// the rehydrate itself is not written back. A failure to enumerate storage
/// resumes the persistor and is returned.
pub async fn persist_store<S>(
    container: Arc<dyn StateContainer<S>>,
    builder: PersistorBuilder<S>,
    options: PersistStoreOptions,
) -> PersistResult<Persistor<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let persistor = builder.build(container)?;
    if options.skip_restore {
        return Ok(persistor);
    }

    persistor.pause();

    let snapshot = match persistor.stored_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Failed to read stored state: {}", e);
            persistor.resume();
            return Err(e);
        }
    };

    let snapshot = match &options.purge_keys {
        Some(purge) => {
            let keys: Vec<String> = match purge {
                PurgeKeys::All => snapshot.keys().map(str::to_string).collect(),
                PurgeKeys::Keys(keys) => keys.clone(),
            };
            let scope = match purge {
                PurgeKeys::All => None,
                PurgeKeys::Keys(_) => Some(keys.as_slice()),
            };
            match persistor.purge(scope).await {
                Ok(report) if !report.is_clean() => {
                    warn!("Purge left {} stored keys behind", report.failed.len())
                }
                Ok(report) => debug!("Purged {} stored keys", report.removed.len()),
                Err(e) => warn!("Failed to purge stored keys: {}", e),
            }
            snapshot.without_keys(&keys)
        }
        None => snapshot,
    };

    let restored = snapshot.len();
    persistor.rehydrate(RehydrateInput::from(snapshot));
    persistor.resume();

    info!("Restored {} stored keys", restored);
    Ok(persistor)
}
