//! Drain scheduler: the timer loop that persists one pending key per tick

use crate::persistor::Shared;
use statestash_core::{PersistError, PersistResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error};

/// Tick source for the drain loop
pub(crate) enum Ticker {
    /// Zero debounce: yield to the runtime between ticks
    BackToBack,
    Every(Interval),
}

impl Ticker {
    pub(crate) fn new(debounce: Duration) -> Self {
        if debounce.is_zero() {
            return Ticker::BackToBack;
        }
        let start = tokio::time::Instant::now() + debounce;
        let mut interval = tokio::time::interval_at(start, debounce);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticker::Every(interval)
    }

    pub(crate) async fn tick(&mut self) {
        match self {
            Ticker::BackToBack => tokio::task::yield_now().await,
            Ticker::Every(interval) => {
                interval.tick().await;
            }
        }
    }
}

/// Drain loop for one persistor
///
/// `started_len` is the queue length when the loop was started. While paused,
/// the loop stops once the queue is back at that length. Progress made and
/// new keys added inside one window can cancel out, which this check does not
/// notice.
pub(crate) async fn drain_loop<S>(shared: Arc<Shared<S>>, started_len: usize)
where
    S: Clone + Send + Sync + 'static,
{
    let mut ticker = Ticker::new(shared.config.debounce());
    loop {
        ticker.tick().await;

        let (key, flushes) = {
            let mut control = shared.control.lock();
            if control.stopped {
                return;
            }
            let head = control.queue.front().cloned();
            match head {
                Some(key) if !(control.paused && control.queue.len() == started_len) => {
                    (key, control.flushes)
                }
                _ => {
                    control.timer = None;
                    shared.counters.drain_stopped();
                    debug!(
                        "Drain loop stopped ({} keys pending, paused: {})",
                        control.queue.len(),
                        control.paused
                    );
                    return;
                }
            }
        };

        // Transforms and the serializer run without the lock held
        let state = shared.container.get_state();
        let encoded = shared.encode_key(&state, &key);

        let mut failure = None;
        {
            let mut control = shared.control.lock();
            if control.stopped {
                return;
            }
            if control.flushes != flushes || control.queue.front() != Some(&key) {
                debug!("Key {} was flushed while encoding, skipping", key);
                continue;
            }
            match encoded {
                Ok(Some(stored)) => {
                    shared.issue_write(&key, stored);
                }
                Ok(None) => {}
                Err(e) => failure = Some(e),
            }
            control.queue.pop_front();
        }

        // Callbacks run outside the lock so they may call back into the persistor
        if let Some(e) = failure {
            error!("Failed to persist key \"{}\": {}", key, e);
            shared.report_write_error(&key, &e);
        }
    }
}

/// A write issued to the storage backend
pub struct WriteHandle {
    pub key: String,
    pub(crate) handle: JoinHandle<PersistResult<()>>,
}

/// Writes issued by `flush`, still running, plus the keys that could not be
/// encoded
#[derive(Default)]
pub struct PendingWrites {
    writes: Vec<WriteHandle>,
    failures: Vec<(String, PersistError)>,
}

impl PendingWrites {
    pub(crate) fn push(&mut self, write: WriteHandle) {
        self.writes.push(write);
    }

    pub(crate) fn push_failure(&mut self, key: String, err: PersistError) {
        self.failures.push((key, err));
    }

    /// Number of issued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Logical keys of the issued writes, in issue order
    pub fn keys(&self) -> Vec<String> {
        self.writes.iter().map(|w| w.key.clone()).collect()
    }

    /// Keys that failed before a write could be issued
    pub fn failures(&self) -> &[(String, PersistError)] {
        &self.failures
    }

    /// Wait for every issued write to resolve
    ///
    /// Results of issued writes come first, in issue order, followed by the
    /// encoding failures.
    pub async fn wait(self) -> Vec<(String, PersistResult<()>)> {
        let mut results = Vec::with_capacity(self.writes.len() + self.failures.len());
        for write in self.writes {
            let result = match write.handle.await {
                Ok(result) => result,
                Err(_) => Err(PersistError::WriteAborted(write.key.clone())),
            };
            results.push((write.key, result));
        }
        results.extend(self.failures.into_iter().map(|(key, e)| (key, Err(e))));
        results
    }

    /// Wait for every issued write, then fail on the first error
    pub async fn wait_all(self) -> PersistResult<usize> {
        let mut written = 0;
        for (_, result) in self.wait().await {
            result?;
            written += 1;
        }
        Ok(written)
    }
}
