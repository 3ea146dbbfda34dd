//! Core types for STATESTASH
//!
//! Defines the state tree, substates, actions and storage keys shared by
//! every other crate.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Action type tag carried by rehydrate notifications
pub const REHYDRATE: &str = "persist/REHYDRATE";

/// Default prefix prepended to every storage key
pub const KEY_PREFIX: &str = "reduxPersist:";

/// A top-level substate. Identity (`Arc::ptr_eq`) is what the dirty
/// tracker compares, never deep equality.
pub type Substate = Arc<Value>;

/// Value as handed to and received from a storage backend
pub type StoredValue = Value;

/// Wrap a JSON value as a fresh substate
pub fn substate(value: Value) -> Substate {
    Arc::new(value)
}

/// Whether two substates are the same allocation
pub fn same_substate(a: &Substate, b: &Substate) -> bool {
    Arc::ptr_eq(a, b)
}

/// Default state shape: an immutable mapping from top-level key to substate.
///
/// Cloning is a reference-count bump. Updates build a new tree that shares
/// every untouched substate with the old one.
#[derive(Clone, Default)]
pub struct StateTree(Arc<BTreeMap<String, Substate>>);

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Substate> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// New tree with `key` set to `value`
    pub fn with(&self, key: impl Into<String>, value: Substate) -> Self {
        let mut entries = (*self.0).clone();
        entries.insert(key.into(), value);
        Self(Arc::new(entries))
    }

    /// New tree with `key` set to a fresh substate built from `value`
    pub fn with_value(&self, key: impl Into<String>, value: Value) -> Self {
        self.with(key, substate(value))
    }

    /// New tree without `key`
    pub fn without(&self, key: &str) -> Self {
        if !self.0.contains_key(key) {
            return self.clone();
        }
        let mut entries = (*self.0).clone();
        entries.remove(key);
        Self(Arc::new(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Substate)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both handles point at the same tree
    pub fn ptr_eq(&self, other: &StateTree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Render the tree as a JSON object
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), (**v).clone()))
            .collect();
        Value::Object(map)
    }

    /// Build a tree from a JSON object, one substate per top-level field
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for StateTree {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let entries = iter.into_iter().map(|(k, v)| (k, substate(v))).collect();
        Self(Arc::new(entries))
    }
}

impl FromIterator<(String, Substate)> for StateTree {
    fn from_iter<I: IntoIterator<Item = (String, Substate)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

/// Deep equality, for assertions and reconciliation
impl PartialEq for StateTree {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(k, v)| other.0.get(k).map(|o| **o == **v).unwrap_or(false))
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k, &**v)))
            .finish()
    }
}

/// Actions dispatched to a state container
#[derive(Debug, Clone)]
pub enum Action<S> {
    /// Reconstructed state read back from storage
    Rehydrate { payload: S },
    /// Application-defined action
    Custom { kind: String, payload: Value },
}

impl<S> Action<S> {
    pub fn custom(kind: impl Into<String>, payload: Value) -> Self {
        Action::Custom {
            kind: kind.into(),
            payload,
        }
    }

    /// Type tag of the action
    pub fn kind(&self) -> &str {
        match self {
            Action::Rehydrate { .. } => REHYDRATE,
            Action::Custom { kind, .. } => kind,
        }
    }
}

/// Handle returned by `StateContainer::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Build a storage key: plain concatenation, no separator inserted
pub fn storage_key(prefix: &str, key: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + key.len());
    out.push_str(prefix);
    out.push_str(key);
    out
}

/// Strip `prefix` from a storage key
pub fn parse_storage_key<'a>(prefix: &str, storage_key: &'a str) -> Option<&'a str> {
    storage_key.strip_prefix(prefix)
}
