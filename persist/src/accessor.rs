//! Default state accessor for plain key → substate trees

use statestash_core::{StateAccessor, StateTree, Substate};

/// Accessor for `StateTree`, the default state shape
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainStateAccessor;

impl StateAccessor<StateTree> for PlainStateAccessor {
    fn initial(&self) -> StateTree {
        StateTree::new()
    }

    fn iterate(&self, state: &StateTree, visit: &mut dyn FnMut(&str, &Substate)) {
        for (key, value) in state.iter() {
            visit(key, value);
        }
    }

    fn get(&self, state: &StateTree, key: &str) -> Option<Substate> {
        state.get(key).cloned()
    }

    fn set(&self, state: StateTree, key: &str, value: Substate) -> StateTree {
        state.with(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statestash_core::substate;

    #[test]
    fn test_iterate_visits_every_key() {
        let tree = StateTree::new()
            .with_value("a", json!(1))
            .with_value("b", json!(2));
        let mut seen = Vec::new();
        PlainStateAccessor.iterate(&tree, &mut |k, _| seen.push(k.to_string()));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_set_then_get() {
        let accessor = PlainStateAccessor;
        let value = substate(json!({"x": true}));
        let tree = accessor.set(accessor.initial(), "flags", value.clone());
        let got = accessor.get(&tree, "flags").unwrap();
        assert!(std::sync::Arc::ptr_eq(&got, &value));
        assert!(accessor.get(&tree, "missing").is_none());
    }
}
