//! Write-side and read-side conversion of a single substate

use crate::transform::TransformPipeline;
use serde_json::Value;
use statestash_core::{substate, Environment, PersistResult, Serializer, StoredValue, Substate};
use std::sync::Arc;
use tracing::{debug, error};

/// Transform pipeline plus serializer, applied per key
#[derive(Clone)]
pub struct StateCodec {
    transforms: TransformPipeline,
    serializer: Arc<dyn Serializer>,
    environment: Environment,
}

impl StateCodec {
    pub fn new(
        transforms: TransformPipeline,
        serializer: Arc<dyn Serializer>,
        environment: Environment,
    ) -> Self {
        Self {
            transforms,
            serializer,
            environment,
        }
    }

    pub fn transforms(&self) -> &TransformPipeline {
        &self.transforms
    }

    /// Forward transforms then serialize. `Ok(None)` means a transform
    /// suppressed the key.
    ///
    /// A serializer failure is returned in development and written as
    /// `null` in production.
    pub fn encode(&self, key: &str, value: Substate) -> PersistResult<Option<StoredValue>> {
        let Some(transformed) = self.transforms.forward(value, key)? else {
            return Ok(None);
        };

        match self.serializer.serialize(&transformed) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => match self.environment {
                Environment::Development => {
                    error!("Failed to serialize state for key \"{}\": {}", key, e);
                    Err(e)
                }
                Environment::Production => {
                    debug!("Serialization of key {} failed, storing null", key);
                    Ok(Some(Value::Null))
                }
            },
        }
    }

    /// Deserialize then backward transforms in reverse order
    pub fn decode(&self, key: &str, stored: &StoredValue) -> PersistResult<Substate> {
        let data = self.serializer.deserialize(stored)?;
        self.transforms.backward(substate(data), key)
    }
}
