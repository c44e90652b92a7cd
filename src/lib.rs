//! Client-side state synchronization for cached remote datasets.
//!
//! Two mechanisms with real ordering and failure-recovery guarantees:
//!
//! - **Optimistic mutations** ([`MutationExecutor`]): a local edit is
//!   applied to the cached value before the server confirms it, rolled
//!   back bit-for-bit if the server rejects it, and always reconciled with
//!   a follow-up refetch.
//! - **Debounced, cancellable preview queries** ([`PreviewPipeline`]):
//!   rapid parameter changes coalesce into one fetch, and sequencer tokens
//!   guarantee that only the most recently issued request's result ever
//!   reaches visible state, whatever order responses arrive in.
//!
//! Transport, persistence, authentication and rendering are external
//! collaborators reached through the closures in [`remote`].

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod mutation;
pub mod preview;
pub mod remote;
pub mod selection;
pub mod sequencer;

pub use cache::{EntityCache, QueryKey, Snapshot, SnapshotState, SyncQueryKey};
pub use config::SyncConfig;
pub use debounce::DebounceScheduler;
pub use error::SyncError;
pub use mutation::{apply_patch, KeyResolver, MutationExecutor, MutationRecord, MutationStatus};
pub use preview::{PreviewParams, PreviewPipeline};
pub use remote::{FetchOutcome, RemoteList, RemoteRead, RemoteWrite};
pub use selection::{
  compute_view, AggregationResult, EntryView, ManualEntry, SortKey, SortOrder, TimeEntry,
};
pub use sequencer::{CancelToken, RequestSequencer};
