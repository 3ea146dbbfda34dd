//! STATESTASH Storage
//! 
//! Storage backends the persistor writes through, plus the routines that
//! operate on a whole key prefix: snapshotting and purging.
//! Every backend stores `{ key → value }` and can enumerate its keys.

pub mod adapter;
pub mod memory;
pub mod persistent;
pub mod purge;
pub mod snapshot;

pub use adapter::*;
pub use memory::*;
pub use persistent::*;
pub use purge::*;
pub use snapshot::*;
