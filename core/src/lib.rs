//! STATESTASH Core Library
//! 
//! Core types, traits, and abstractions for incremental state persistence.
//! This crate provides the contracts the persistor consumes: state containers,
//! state accessors, storage backends, serializers and transforms.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
