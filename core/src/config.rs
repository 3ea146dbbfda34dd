//! Configuration types for STATESTASH

use crate::error::PersistError;
use crate::traits::PersistResult;
use crate::types::KEY_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Deployment context, decides how serialization failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Serialization failures propagate
    Development,
    /// Serialization failures are written as `null`
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

/// Persistor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Run substates through the JSON serializer. When false, stored values
    /// are the substates themselves.
    pub serialize: bool,

    /// Keys that are never persisted
    pub blacklist: BTreeSet<String>,

    /// If set, the only keys that are persisted
    pub whitelist: Option<BTreeSet<String>>,

    /// Delay between drain ticks in milliseconds. 0 drains back-to-back.
    pub debounce_ms: u64,

    /// Prepended verbatim to every storage key
    pub key_prefix: String,

    /// Deployment context
    pub environment: Environment,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            serialize: true,
            blacklist: BTreeSet::new(),
            whitelist: None,
            debounce_ms: 0,
            key_prefix: KEY_PREFIX.to_string(),
            environment: Environment::default(),
        }
    }
}

impl PersistConfig {
    /// Parse a configuration from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> PersistResult<Self> {
        serde_json::from_str(json).map_err(|e| PersistError::ConfigError(e.to_string()))
    }

    /// Tick interval of the drain loop
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether `key` passes the whitelist and blacklist. The blacklist wins.
    pub fn allows(&self, key: &str) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(key) {
                return false;
            }
        }
        !self.blacklist.contains(key)
    }

    pub fn with_whitelist<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.whitelist = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_blacklist<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.blacklist = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PersistConfig::default();
        assert!(config.serialize);
        assert_eq!(config.key_prefix, "reduxPersist:");
        assert_eq!(config.debounce(), Duration::ZERO);
        assert!(config.allows("anything"));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let config = PersistConfig::default()
            .with_whitelist(["a", "b"])
            .with_blacklist(["b"]);
        assert!(config.allows("a"));
        assert!(!config.allows("b"));
        assert!(!config.allows("c"));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            PersistConfig::from_json(r#"{"key_prefix": "app:", "environment": "production"}"#)
                .unwrap();
        assert_eq!(config.key_prefix, "app:");
        assert_eq!(config.environment, Environment::Production);
        assert!(config.serialize);
        assert!(config.whitelist.is_none());
    }

    #[test]
    fn test_from_json_shadowed_whitelist_allows_nothing() {
        let config =
            PersistConfig::from_json(r#"{"whitelist": ["a"], "blacklist": ["a"]}"#).unwrap();
        assert!(!config.allows("a"));
        assert!(!config.allows("b"));
    }

    #[test]
    fn test_from_json_rejects_bad_field() {
        let err = PersistConfig::from_json(r#"{"debounce_ms": "soon"}"#).unwrap_err();
        assert!(matches!(err, PersistError::ConfigError(_)));
    }
}
