//! Core traits defining STATESTASH interfaces
//!
//! These traits are the seams between the persistor and the outside world:
//! the state container it watches, the shape of the state it walks, the
//! storage it writes to, and the codecs applied on the way.

use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for STATESTASH operations
pub type PersistResult<T> = Result<T, crate::error::PersistError>;

/// Change listener registered with a state container
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// State container capability
///
/// Listeners are invoked after every dispatched action, in arrival order.
pub trait StateContainer<S>: Send + Sync {
    /// Current state
    fn get_state(&self) -> S;

    /// Register a change listener
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Remove a previously registered listener
    fn unsubscribe(&self, id: SubscriptionId);

    /// Dispatch an action
    fn dispatch(&self, action: Action<S>);
}

/// Pluggable access to the top-level entries of a state shape
pub trait StateAccessor<S>: Send + Sync {
    /// Value the last-observed snapshot starts from, and the empty tree
    /// rehydration builds into
    fn initial(&self) -> S;

    /// Visit every top-level entry
    fn iterate(&self, state: &S, visit: &mut dyn FnMut(&str, &Substate));

    /// Read one top-level entry
    fn get(&self, state: &S, key: &str) -> Option<Substate>;

    /// Return a state with `key` replaced
    fn set(&self, state: S, key: &str, value: Substate) -> S;
}

/// Async key-value storage backend
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get a stored value
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>>;

    /// Store a value
    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()>;

    /// Remove a value
    async fn remove_item(&self, key: &str) -> PersistResult<()>;

    /// Enumerate every stored key
    async fn get_all_keys(&self) -> PersistResult<Vec<String>>;
}

/// Storage exposing `keys()` instead of `get_all_keys()`
#[async_trait]
pub trait KeysStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>>;

    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()>;

    async fn remove_item(&self, key: &str) -> PersistResult<()>;

    async fn keys(&self) -> PersistResult<Vec<String>>;
}

/// Converts substates to stored values and back
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &serde_json::Value) -> PersistResult<StoredValue>;

    fn deserialize(&self, stored: &StoredValue) -> PersistResult<serde_json::Value>;
}

/// Reversible substate modifier
///
/// `forward` runs on write in declared order; `backward` runs on rehydrate in
/// reverse order. Returning `Ok(None)` from `forward` suppresses the write.
/// Both are called with no persistor lock held.
pub trait Transform: Send + Sync {
    fn forward(&self, substate: Substate, key: &str) -> PersistResult<Option<Substate>>;

    fn backward(&self, substate: Substate, key: &str) -> PersistResult<Substate>;
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    async fn get_item(&self, key: &str) -> PersistResult<Option<StoredValue>> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: StoredValue) -> PersistResult<()> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        (**self).remove_item(key).await
    }

    async fn get_all_keys(&self) -> PersistResult<Vec<String>> {
        (**self).get_all_keys().await
    }
}

impl<S, T: StateContainer<S> + ?Sized> StateContainer<S> for Arc<T> {
    fn get_state(&self) -> S {
        (**self).get_state()
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }

    fn dispatch(&self, action: Action<S>) {
        (**self).dispatch(action)
    }
}
