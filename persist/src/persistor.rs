//! Persistor: watches a state container and writes dirty substates to storage

use crate::accessor::PlainStateAccessor;
use crate::codec::StateCodec;
use crate::rehydrate::{reconstruct, RehydrateInput};
use crate::scheduler::{drain_loop, PendingWrites, WriteHandle};
use crate::serializer::serializer_for;
use crate::tracker::{dirty_keys, PendingQueue};
use crate::transform::TransformPipeline;
use parking_lot::Mutex;
use statestash_core::{
    storage_key, Action, PersistConfig, PersistError, PersistResult, Serializer, StateAccessor,
    StateContainer, StateTree, StorageBackend, StoredValue, SubscriptionId, Transform,
};
use statestash_storage::{create_memory_storage, purge_stored_state, PurgeReport, StoredSnapshot};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Side-channel for non-fatal per-key failures
pub type ErrorCallback = Arc<dyn Fn(&str, &PersistError) + Send + Sync>;

/// Mutable control state, guarded by one lock
pub(crate) struct ControlState<S> {
    pub paused: bool,
    pub stopped: bool,
    pub queue: PendingQueue,
    pub last_state: S,
    pub timer: Option<JoinHandle<()>>,
    /// Bumped by every flush; a drain tick that encoded before a flush
    /// discards its write
    pub flushes: u64,
}

/// Counters describing persistor activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistorStats {
    /// Writes handed to the storage backend
    pub writes_issued: u64,
    /// Drain loops started
    pub drains_started: u64,
    /// Drain loops currently running
    pub active_drains: usize,
    /// Most drain loops ever running at once
    pub peak_active_drains: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    writes_issued: AtomicU64,
    drains_started: AtomicU64,
    active_drains: AtomicUsize,
    peak_active_drains: AtomicUsize,
}

impl Counters {
    pub(crate) fn write_issued(&self) {
        self.writes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn drain_started(&self) {
        self.drains_started.fetch_add(1, Ordering::Relaxed);
        let active = self.active_drains.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active_drains.fetch_max(active, Ordering::SeqCst);
    }

    pub(crate) fn drain_stopped(&self) {
        self.active_drains.fetch_sub(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> PersistorStats {
        PersistorStats {
            writes_issued: self.writes_issued.load(Ordering::Relaxed),
            drains_started: self.drains_started.load(Ordering::Relaxed),
            active_drains: self.active_drains.load(Ordering::SeqCst),
            peak_active_drains: self.peak_active_drains.load(Ordering::SeqCst),
        }
    }
}

/// State shared between the persistor handle, its subscription and its
/// drain loop
pub(crate) struct Shared<S> {
    pub config: PersistConfig,
    pub container: Arc<dyn StateContainer<S>>,
    pub storage: Arc<dyn StorageBackend>,
    pub accessor: Arc<dyn StateAccessor<S>>,
    pub codec: StateCodec,
    pub on_write_error: Option<ErrorCallback>,
    pub on_rehydrate_error: Option<ErrorCallback>,
    pub runtime: Handle,
    pub control: Mutex<ControlState<S>>,
    pub counters: Counters,
}

impl<S> Shared<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Scan for dirty keys after a state change and make sure a drain loop
    /// is running
    fn on_state_change(self: &Arc<Self>) {
        let state = self.container.get_state();
        let mut control = self.control.lock();
        if control.paused || control.stopped {
            return;
        }

        let dirty = dirty_keys(&*self.accessor, &control.last_state, &state, &self.config);
        let added = control.queue.extend(dirty);
        if added > 0 {
            debug!("Queued {} dirty keys ({} pending)", added, control.queue.len());
        }

        if control.timer.is_none() && !control.queue.is_empty() {
            let started_len = control.queue.len();
            self.counters.drain_started();
            control.timer = Some(self.runtime.spawn(drain_loop(Arc::clone(self), started_len)));
        }

        control.last_state = state;
    }

    /// Encode one key of `state` for storage
    ///
    /// Returns `Ok(None)` when the key is absent from the state or a
    /// transform suppressed it. Runs user transforms and the serializer, so
    /// it must be called without the control lock held.
    pub(crate) fn encode_key(&self, state: &S, key: &str) -> PersistResult<Option<StoredValue>> {
        let Some(value) = self.accessor.get(state, key) else {
            debug!("Key {} not present in state, skipping", key);
            return Ok(None);
        };
        let encoded = self.codec.encode(key, value)?;
        if encoded.is_none() {
            debug!("Key {} suppressed by transform", key);
        }
        Ok(encoded)
    }
}

impl<S> Shared<S> {
    /// Spawn the storage write for an encoded key
    ///
    /// The write's failure goes to the write error callback.
    pub(crate) fn issue_write(&self, key: &str, stored: StoredValue) -> WriteHandle {
        let storage = Arc::clone(&self.storage);
        let on_error = self.on_write_error.clone();
        let target = storage_key(&self.config.key_prefix, key);
        let logical = key.to_string();

        self.counters.write_issued();
        debug!("Writing {}", target);

        let handle = self.runtime.spawn(async move {
            let result = storage.set_item(&target, stored).await;
            if let Err(e) = &result {
                warn!("Error storing data for key \"{}\": {}", logical, e);
                if let Some(callback) = on_error {
                    callback(logical.as_str(), e);
                }
            }
            result
        });

        WriteHandle {
            key: key.to_string(),
            handle,
        }
    }

    pub(crate) fn report_write_error(&self, key: &str, err: &PersistError) {
        if let Some(callback) = &self.on_write_error {
            callback(key, err);
        }
    }
}

/// Incremental persistor bound to one state container
///
/// Dropping the persistor unsubscribes it and stops its drain loop. Writes
/// already issued run to completion.
pub struct Persistor<S> {
    shared: Arc<Shared<S>>,
    subscription: SubscriptionId,
}

impl<S> Persistor<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Stop scanning for changes and stop the drain loop after its current
    /// tick
    pub fn pause(&self) {
        self.shared.control.lock().paused = true;
        debug!("Persistor paused");
    }

    /// Resume scanning. Does not trigger a drain by itself.
    pub fn resume(&self) {
        self.shared.control.lock().paused = false;
        debug!("Persistor resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.control.lock().paused
    }

    /// Whether a drain loop is currently active
    pub fn is_draining(&self) -> bool {
        self.shared.control.lock().timer.is_some()
    }

    /// Keys awaiting persistence, in drain order
    pub fn pending_keys(&self) -> Vec<String> {
        self.shared.control.lock().queue.to_vec()
    }

    pub fn stats(&self) -> PersistorStats {
        self.shared.counters.snapshot()
    }

    pub fn config(&self) -> &PersistConfig {
        &self.shared.config
    }

    /// Issue writes for every pending key at once and empty the queue
    ///
    /// Keys are encoded against the current state. Every key is attempted;
    /// keys that fail to encode are reported through the write error callback
    /// and carried in the returned `PendingWrites` next to the issued writes.
    pub fn flush(&self) -> PendingWrites {
        let keys = self.shared.control.lock().queue.to_vec();
        let state = self.shared.container.get_state();
        let encoded: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let result = self.shared.encode_key(&state, &key);
                (key, result)
            })
            .collect();

        let mut pending = PendingWrites::default();
        {
            let mut control = self.shared.control.lock();
            control.flushes += 1;
            for (key, result) in encoded {
                control.queue.remove(&key);
                match result {
                    Ok(Some(stored)) => pending.push(self.shared.issue_write(&key, stored)),
                    Ok(None) => {}
                    Err(e) => pending.push_failure(key, e),
                }
            }
        }

        info!("Flushed {} writes", pending.len());
        for (key, e) in pending.failures() {
            warn!("Failed to persist key \"{}\" during flush: {}", key, e);
            self.shared.report_write_error(key, e);
        }
        pending
    }

    /// Rebuild state from `input` and dispatch it as a rehydrate action
    ///
    /// Serialized entries that fail to decode are reported and left out.
    pub fn rehydrate(&self, input: RehydrateInput<S>) -> S {
        let state = match input {
            RehydrateInput::State(state) => state,
            RehydrateInput::Serialized(entries) => reconstruct(
                &*self.shared.accessor,
                &self.shared.codec,
                entries,
                self.shared.on_rehydrate_error.as_ref(),
            ),
        };

        self.shared.container.dispatch(Action::Rehydrate {
            payload: state.clone(),
        });
        info!("Rehydrate dispatched");

        state
    }

    /// Read the raw entries stored under this persistor's prefix
    pub async fn stored_snapshot(&self) -> PersistResult<StoredSnapshot> {
        StoredSnapshot::read(&*self.shared.storage, &self.shared.config.key_prefix).await
    }

    /// Load and decode the state stored under this persistor's prefix
    pub async fn get_stored_state(&self) -> PersistResult<S> {
        let snapshot = self.stored_snapshot().await?;
        Ok(reconstruct(
            &*self.shared.accessor,
            &self.shared.codec,
            snapshot.into_entries(),
            self.shared.on_rehydrate_error.as_ref(),
        ))
    }

    /// Remove stored entries under this persistor's prefix; all of them, or
    /// only the listed logical keys
    pub async fn purge(&self, keys: Option<&[String]>) -> PersistResult<PurgeReport> {
        purge_stored_state(&*self.shared.storage, &self.shared.config.key_prefix, keys).await
    }
}

impl<S> Persistor<S> {
    /// Unsubscribe from the container and abort the drain loop. Idempotent.
    pub fn stop(&self) {
        let timer = {
            let mut control = self.shared.control.lock();
            if control.stopped {
                return;
            }
            control.stopped = true;
            control.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
            self.shared.counters.drain_stopped();
        }
        self.shared.container.unsubscribe(self.subscription);
        info!("Persistor stopped");
    }
}

impl<S> Drop for Persistor<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for `Persistor`
pub struct PersistorBuilder<S> {
    config: PersistConfig,
    storage: Option<Arc<dyn StorageBackend>>,
    accessor: Arc<dyn StateAccessor<S>>,
    transforms: TransformPipeline,
    serializer: Option<Arc<dyn Serializer>>,
    on_write_error: Option<ErrorCallback>,
    on_rehydrate_error: Option<ErrorCallback>,
}

impl PersistorBuilder<StateTree> {
    /// Builder for the default `StateTree` shape
    pub fn new() -> Self {
        Self::with_accessor(PlainStateAccessor)
    }
}

impl Default for PersistorBuilder<StateTree> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PersistorBuilder<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Builder for a custom state shape
    pub fn with_accessor(accessor: impl StateAccessor<S> + 'static) -> Self {
        Self {
            config: PersistConfig::default(),
            storage: None,
            accessor: Arc::new(accessor),
            transforms: TransformPipeline::default(),
            serializer: None,
            on_write_error: None,
            on_rehydrate_error: None,
        }
    }

    pub fn config(mut self, config: PersistConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Append a transform; transforms run forward in the order added
    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn transforms(mut self, transforms: Vec<Arc<dyn Transform>>) -> Self {
        self.transforms = TransformPipeline::new(transforms);
        self
    }

    /// Override the serializer chosen by `config.serialize`
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn on_write_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &PersistError) + Send + Sync + 'static,
    {
        self.on_write_error = Some(Arc::new(callback));
        self
    }

    pub fn on_rehydrate_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &PersistError) + Send + Sync + 'static,
    {
        self.on_rehydrate_error = Some(Arc::new(callback));
        self
    }

    /// Codec this builder would use
    pub fn codec(&self) -> StateCodec {
        let serializer = self
            .serializer
            .clone()
            .unwrap_or_else(|| serializer_for(&self.config));
        StateCodec::new(self.transforms.clone(), serializer, self.config.environment)
    }

    /// Subscribe a new persistor to `container`
    ///
    /// Must be called from within a tokio runtime; the drain loop and writes
    /// are spawned on it. Without a configured storage backend an in-memory
    /// one is used.
    pub fn build(self, container: Arc<dyn StateContainer<S>>) -> PersistResult<Persistor<S>> {
        let runtime = Handle::try_current().map_err(|e| PersistError::NoRuntime(e.to_string()))?;
        let codec = self.codec();

        let storage: Arc<dyn StorageBackend> = match self.storage {
            Some(storage) => storage,
            None => {
                debug!("No storage backend configured, using memory storage");
                create_memory_storage()
            }
        };

        let shared = Arc::new(Shared {
            control: Mutex::new(ControlState {
                paused: false,
                stopped: false,
                queue: PendingQueue::new(),
                last_state: self.accessor.initial(),
                timer: None,
                flushes: 0,
            }),
            config: self.config,
            container: Arc::clone(&container),
            storage,
            accessor: self.accessor,
            codec,
            on_write_error: self.on_write_error,
            on_rehydrate_error: self.on_rehydrate_error,
            runtime,
            counters: Counters::default(),
        });

        let weak: Weak<Shared<S>> = Arc::downgrade(&shared);
        let subscription = container.subscribe(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_state_change();
            }
        }));

        info!(
            "Persistor created (prefix: \"{}\", debounce: {}ms)",
            shared.config.key_prefix, shared.config.debounce_ms
        );

        Ok(Persistor {
            shared,
            subscription,
        })
    }
}
