//! In-memory state container and rehydrate reconciliation

use parking_lot::RwLock;
use serde_json::Value;
use statestash_core::{
    substate, Action, Listener, StateContainer, StateTree, SubscriptionId, Substate,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Pure state transition
pub type Reducer<S> = Arc<dyn Fn(&S, &Action<S>) -> S + Send + Sync>;

/// Reducer-driven state container
///
/// `dispatch` applies the reducer, then calls every listener in subscription
/// order. Listeners run after the state lock is released and may call
/// `get_state`.
pub struct MemoryStateContainer<S> {
    state: RwLock<S>,
    reducer: Reducer<S>,
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
}

impl<S> MemoryStateContainer<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new<F>(initial: S, reducer: F) -> Self
    where
        F: Fn(&S, &Action<S>) -> S + Send + Sync + 'static,
    {
        Self {
            state: RwLock::new(initial),
            reducer: Arc::new(reducer),
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<S> StateContainer<S> for MemoryStateContainer<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn get_state(&self) -> S {
        self.state.read().clone()
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.write().remove(&id);
    }

    fn dispatch(&self, action: Action<S>) {
        {
            let mut state = self.state.write();
            let next = (self.reducer)(&*state, &action);
            *state = next;
        }
        debug!("Dispatched {}", action.kind());

        let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

/// Merge a rehydrate payload into live state
///
/// Each incoming key replaces the live one, except when both sides are JSON
/// objects: then the incoming fields are laid over the live fields, one
/// level deep.
pub fn auto_rehydrate(state: &StateTree, inbound: &StateTree) -> StateTree {
    let mut next = state.clone();
    for (key, incoming) in inbound.iter() {
        let merged: Substate = match (state.get(key).map(|s| &**s), &**incoming) {
            (Some(Value::Object(live)), Value::Object(restored)) => {
                let mut fields = live.clone();
                for (field, value) in restored {
                    fields.insert(field.clone(), value.clone());
                }
                substate(Value::Object(fields))
            }
            _ => Arc::clone(incoming),
        };
        next = next.with(key.clone(), merged);
    }
    next
}

/// Wrap a reducer so rehydrate actions are reconciled with `auto_rehydrate`
/// and everything else goes to `inner`
pub fn with_auto_rehydrate<F>(
    inner: F,
) -> impl Fn(&StateTree, &Action<StateTree>) -> StateTree + Send + Sync + 'static
where
    F: Fn(&StateTree, &Action<StateTree>) -> StateTree + Send + Sync + 'static,
{
    move |state: &StateTree, action: &Action<StateTree>| match action {
        Action::Rehydrate { payload } => auto_rehydrate(state, payload),
        other => inner(state, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter_reducer(state: &StateTree, action: &Action<StateTree>) -> StateTree {
        match action {
            Action::Custom { kind, .. } if kind == "increment" => {
                let n = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                state.with_value("count", json!(n + 1))
            }
            _ => state.clone(),
        }
    }

    #[test]
    fn test_dispatch_notifies_listeners() {
        let container = Arc::new(MemoryStateContainer::new(StateTree::new(), counter_reducer));
        let calls = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&calls);
        let reader = Arc::clone(&container);
        let id = container.subscribe(Arc::new(move || {
            // Listeners can read the state they were notified about
            assert!(reader.get_state().contains_key("count"));
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        container.dispatch(Action::custom("increment", Value::Null));
        container.dispatch(Action::custom("increment", Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(**container.get_state().get("count").unwrap(), json!(2));

        container.unsubscribe(id);
        container.dispatch(Action::custom("increment", Value::Null));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(container.listener_count(), 0);
    }

    #[test]
    fn test_auto_rehydrate_merges_objects_one_level() {
        let live = StateTree::from_json(json!({
            "settings": {"theme": "dark", "lang": "en"},
            "count": 0,
        }))
        .unwrap();
        let inbound = StateTree::from_json(json!({
            "settings": {"lang": "fr", "nested": {"a": 1}},
            "count": 7,
            "todos": ["milk"],
        }))
        .unwrap();

        let merged = auto_rehydrate(&live, &inbound);
        assert_eq!(
            merged.to_json(),
            json!({
                "settings": {"theme": "dark", "lang": "fr", "nested": {"a": 1}},
                "count": 7,
                "todos": ["milk"],
            })
        );
    }

    #[test]
    fn test_with_auto_rehydrate_routes_actions() {
        let reducer = with_auto_rehydrate(counter_reducer);
        let state = StateTree::new();

        let state = reducer(&state, &Action::custom("increment", Value::Null));
        assert_eq!(**state.get("count").unwrap(), json!(1));

        let payload = StateTree::new().with_value("count", json!(41));
        let state = reducer(&state, &Action::Rehydrate { payload });
        assert_eq!(**state.get("count").unwrap(), json!(41));
    }
}
