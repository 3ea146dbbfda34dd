//! Built-in transforms

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use statestash_core::{substate, PersistError, PersistResult, Substate, Transform};

/// Wraps each substate with a blake3 digest of its JSON encoding and
/// verifies the digest on the way back
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumTransform;

impl ChecksumTransform {
    fn digest(value: &Value, key: &str) -> PersistResult<String> {
        let bytes = serde_json::to_vec(value).map_err(|e| PersistError::transform(key, e))?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }
}

impl Transform for ChecksumTransform {
    fn forward(&self, substate_in: Substate, key: &str) -> PersistResult<Option<Substate>> {
        let checksum = Self::digest(&substate_in, key)?;
        Ok(Some(substate(json!({
            "checksum": checksum,
            "data": (*substate_in).clone(),
        }))))
    }

    fn backward(&self, wrapped: Substate, key: &str) -> PersistResult<Substate> {
        let expected = wrapped
            .get("checksum")
            .and_then(Value::as_str)
            .ok_or_else(|| PersistError::transform(key, "missing checksum"))?;
        let data = wrapped
            .get("data")
            .ok_or_else(|| PersistError::transform(key, "missing data"))?;

        let got = Self::digest(data, key)?;
        if got != expected {
            return Err(PersistError::ChecksumMismatch {
                key: key.to_string(),
                expected: expected.to_string(),
                got,
            });
        }
        Ok(substate(data.clone()))
    }
}

/// Encodes each substate's JSON text as base64
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeTransform;

impl Transform for EncodeTransform {
    fn forward(&self, substate_in: Substate, key: &str) -> PersistResult<Option<Substate>> {
        let text = serde_json::to_vec(&*substate_in).map_err(|e| PersistError::transform(key, e))?;
        Ok(Some(substate(Value::String(STANDARD.encode(text)))))
    }

    fn backward(&self, encoded: Substate, key: &str) -> PersistResult<Substate> {
        let text = encoded
            .as_str()
            .ok_or_else(|| PersistError::transform(key, "expected base64 string"))?;
        let bytes = STANDARD
            .decode(text)
            .map_err(|e| PersistError::transform(key, e))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| PersistError::transform(key, e))?;
        Ok(substate(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformPipeline;
    use std::sync::Arc;

    fn samples() -> Vec<Value> {
        vec![
            json!(null),
            json!(7),
            json!("text with \"quotes\""),
            json!([1, {"nested": [true, false]}]),
            json!({"user": {"name": "ada", "roles": ["admin"]}, "count": 3}),
        ]
    }

    #[test]
    fn test_checksum_detects_tampering() {
        let wrapped = ChecksumTransform
            .forward(substate(json!({"n": 1})), "k")
            .unwrap()
            .unwrap();
        let mut tampered = (*wrapped).clone();
        tampered["data"]["n"] = json!(2);

        let err = ChecksumTransform
            .backward(substate(tampered), "k")
            .unwrap_err();
        assert!(matches!(err, PersistError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_encode_rejects_garbage() {
        assert!(EncodeTransform.backward(substate(json!("@@@")), "k").is_err());
        assert!(EncodeTransform.backward(substate(json!(5)), "k").is_err());
    }

    #[test]
    fn test_stacked_round_trip() {
        let transforms: Vec<Arc<dyn Transform>> =
            vec![Arc::new(ChecksumTransform), Arc::new(EncodeTransform)];
        let pipeline = TransformPipeline::new(transforms);
        for value in samples() {
            let written = pipeline.forward(substate(value.clone()), "k").unwrap().unwrap();
            assert!(written.is_string());
            let restored = pipeline.backward(written, "k").unwrap();
            assert_eq!(*restored, value);
        }
    }
}
