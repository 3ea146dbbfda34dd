//! STATESTASH Persistor
//!
//! Watches a state container and persists its top-level substates one key at
//! a time, debounced, to an async key-value storage backend. Provides:
//! - Identity-based dirty-key tracking with whitelist/blacklist filtering
//! - A single drain loop per persistor, with pause/resume and flush
//! - Transform pipelines and serializers on the write and rehydrate paths
//! - Rehydration from stored entries, with per-key error isolation

pub mod accessor;
pub mod builtin;
pub mod codec;
pub mod container;
pub mod persistor;
pub mod rehydrate;
pub mod scheduler;
pub mod serializer;
pub mod store;
pub mod tracker;
pub mod transform;

pub use accessor::*;
pub use builtin::*;
pub use codec::*;
pub use container::*;
pub use persistor::*;
pub use rehydrate::*;
pub use scheduler::*;
pub use serializer::*;
pub use store::*;
pub use tracker::*;
pub use transform::*;

pub use statestash_core::*;
pub use statestash_storage::*;
