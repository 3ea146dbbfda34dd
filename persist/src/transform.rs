//! Ordered transform pipeline and closure-backed transforms

use statestash_core::{PersistResult, Substate, Transform};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Ordered list of transforms, shared by every key
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new(transforms: Vec<Arc<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn push(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Fold forward functions in declared order. `None` as soon as any
    /// transform suppresses the key.
    pub fn forward(&self, substate: Substate, key: &str) -> PersistResult<Option<Substate>> {
        let mut current = substate;
        for transform in &self.transforms {
            match transform.forward(current, key)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Fold backward functions in reverse order
    pub fn backward(&self, substate: Substate, key: &str) -> PersistResult<Substate> {
        self.transforms
            .iter()
            .rev()
            .try_fold(substate, |current, transform| transform.backward(current, key))
    }
}

type ForwardFn = dyn Fn(Substate, &str) -> PersistResult<Option<Substate>> + Send + Sync;
type BackwardFn = dyn Fn(Substate, &str) -> PersistResult<Substate> + Send + Sync;

/// Key selection for a single transform
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    pub whitelist: Option<BTreeSet<String>>,
    pub blacklist: BTreeSet<String>,
}

impl TransformConfig {
    pub fn only<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            whitelist: Some(keys.into_iter().map(Into::into).collect()),
            blacklist: BTreeSet::new(),
        }
    }

    pub fn except<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            whitelist: None,
            blacklist: keys.into_iter().map(Into::into).collect(),
        }
    }

    fn applies_to(&self, key: &str) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(key) {
                return false;
            }
        }
        !self.blacklist.contains(key)
    }
}

/// Transform built from a pair of closures. Keys the config does not select
/// pass through untouched in both directions.
pub struct FnTransform {
    forward: Box<ForwardFn>,
    backward: Box<BackwardFn>,
    config: TransformConfig,
}

impl Transform for FnTransform {
    fn forward(&self, substate: Substate, key: &str) -> PersistResult<Option<Substate>> {
        if !self.config.applies_to(key) {
            return Ok(Some(substate));
        }
        (self.forward)(substate, key)
    }

    fn backward(&self, substate: Substate, key: &str) -> PersistResult<Substate> {
        if !self.config.applies_to(key) {
            return Ok(substate);
        }
        (self.backward)(substate, key)
    }
}

/// Build a transform from forward and backward closures
pub fn create_transform<F, B>(forward: F, backward: B, config: TransformConfig) -> FnTransform
where
    F: Fn(Substate, &str) -> PersistResult<Option<Substate>> + Send + Sync + 'static,
    B: Fn(Substate, &str) -> PersistResult<Substate> + Send + Sync + 'static,
{
    FnTransform {
        forward: Box::new(forward),
        backward: Box::new(backward),
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use statestash_core::{substate, PersistError};

    /// Appends its tag to a string substate, strips it on the way back
    fn tagging(tag: &'static str) -> Arc<dyn Transform> {
        Arc::new(create_transform(
            move |s, _| {
                let text = s.as_str().unwrap_or_default();
                Ok(Some(substate(json!(format!("{}{}", text, tag)))))
            },
            move |s, key| {
                let text = s.as_str().unwrap_or_default();
                text.strip_suffix(tag)
                    .map(|t| substate(json!(t)))
                    .ok_or_else(|| PersistError::transform(key, format!("missing tag {}", tag)))
            },
            TransformConfig::default(),
        ))
    }

    #[test]
    fn test_forward_in_order_backward_in_reverse() {
        let pipeline = TransformPipeline::new(vec![tagging("1"), tagging("2"), tagging("3")]);

        let written = pipeline.forward(substate(json!("x")), "k").unwrap().unwrap();
        assert_eq!(*written, json!("x123"));

        let restored = pipeline.backward(written, "k").unwrap();
        assert_eq!(*restored, json!("x"));
    }

    #[test]
    fn test_wrong_order_fails() {
        let pipeline = TransformPipeline::new(vec![tagging("1"), tagging("2")]);
        // Reversed pipeline expects "2" stripped last
        let reversed = TransformPipeline::new(vec![tagging("2"), tagging("1")]);
        let written = pipeline.forward(substate(json!("x")), "k").unwrap().unwrap();
        assert!(reversed.backward(written, "k").is_err());
    }

    #[test]
    fn test_suppression_short_circuits() {
        let drop_secrets: Arc<dyn Transform> = Arc::new(create_transform(
            |_, _| Ok(None),
            |s, _| Ok(s),
            TransformConfig::only(["secrets"]),
        ));
        let pipeline = TransformPipeline::new(vec![drop_secrets, tagging("!")]);

        assert!(pipeline.forward(substate(json!("pw")), "secrets").unwrap().is_none());
        let kept = pipeline.forward(substate(json!("hi")), "greeting").unwrap().unwrap();
        assert_eq!(*kept, json!("hi!"));
    }

    #[test]
    fn test_unselected_keys_pass_through() {
        let upper = create_transform(
            |s, _| {
                Ok(Some(substate(Value::String(
                    s.as_str().unwrap_or_default().to_uppercase(),
                ))))
            },
            |s, _| Ok(s),
            TransformConfig::except(["raw"]),
        );
        let out = upper.forward(substate(json!("abc")), "raw").unwrap().unwrap();
        assert_eq!(*out, json!("abc"));
        let out = upper.forward(substate(json!("abc")), "name").unwrap().unwrap();
        assert_eq!(*out, json!("ABC"));
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = TransformPipeline::default();
        let value = substate(json!({"a": 1}));
        let out = pipeline.forward(value.clone(), "k").unwrap().unwrap();
        assert!(Arc::ptr_eq(&out, &value));
        let back = pipeline.backward(out, "k").unwrap();
        assert!(Arc::ptr_eq(&back, &value));
    }
}
