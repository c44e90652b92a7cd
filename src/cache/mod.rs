//! Client-side cache of remotely-owned datasets.
//!
//! This module provides:
//! - Versioned, subscribable storage per logical query key
//! - Snapshot capture and rollback for speculative (optimistic) writes
//! - Stable cache keys derived from query parameters

mod keys;
mod snapshot;
mod store;

pub use keys::{QueryKey, SyncQueryKey};
pub use snapshot::{Snapshot, SnapshotState};
pub use store::EntityCache;
