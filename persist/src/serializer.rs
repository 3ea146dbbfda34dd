//! Serializers applied between the transform pipeline and storage

use serde_json::Value;
use statestash_core::{PersistConfig, PersistError, PersistResult, Serializer, StoredValue};
use std::sync::Arc;

/// Stores each substate as a JSON text string
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> PersistResult<StoredValue> {
        serde_json::to_string(value)
            .map(Value::String)
            .map_err(|e| PersistError::SerializationError(e.to_string()))
    }

    fn deserialize(&self, stored: &StoredValue) -> PersistResult<Value> {
        match stored {
            Value::String(text) => serde_json::from_str(text)
                .map_err(|e| PersistError::DeserializationError(e.to_string())),
            other => Err(PersistError::DeserializationError(format!(
                "expected serialized text, found {}",
                kind_of(other)
            ))),
        }
    }
}

/// Stores substates as they are
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySerializer;

impl Serializer for IdentitySerializer {
    fn serialize(&self, value: &Value) -> PersistResult<StoredValue> {
        Ok(value.clone())
    }

    fn deserialize(&self, stored: &StoredValue) -> PersistResult<Value> {
        Ok(stored.clone())
    }
}

/// Serializer selected by `config.serialize`
pub fn serializer_for(config: &PersistConfig) -> Arc<dyn Serializer> {
    if config.serialize {
        Arc::new(JsonSerializer)
    } else {
        Arc::new(IdentitySerializer)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
