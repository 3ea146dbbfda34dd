//! Dirty-key detection and the pending key queue

use statestash_core::{same_substate, PersistConfig, StateAccessor};
use std::collections::VecDeque;

/// Keys of `next` whose substate is not the same allocation as in
/// `previous`, restricted to keys the config allows
///
/// Both snapshots are read through `accessor`. A key missing from
/// `previous` counts as changed; keys only in `previous` are ignored.
pub fn dirty_keys<S>(
    accessor: &dyn StateAccessor<S>,
    previous: &S,
    next: &S,
    config: &PersistConfig,
) -> Vec<String> {
    let mut dirty = Vec::new();
    accessor.iterate(next, &mut |key, _| {
        if !config.allows(key) {
            return;
        }
        let unchanged = match (accessor.get(previous, key), accessor.get(next, key)) {
            (Some(before), Some(after)) => same_substate(&before, &after),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            dirty.push(key.to_string());
        }
    });
    dirty
}

/// Ordered set of keys awaiting persistence
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    keys: VecDeque<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` unless it is already queued. Returns whether it was added.
    pub fn push(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push_back(key);
        true
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, keys: I) -> usize {
        keys.into_iter().filter(|k| self.push(k.clone())).count()
    }

    pub fn front(&self) -> Option<&String> {
        self.keys.front()
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.keys.pop_front()
    }

    /// Drop `key` wherever it sits. Returns whether it was queued.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.keys.iter().position(|k| k == key) {
            Some(index) => self.keys.remove(index).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.keys.iter().cloned().collect()
    }
}
