//! Contracts for the external collaborators the core calls out to.
//!
//! Transport, authentication and wire formats live outside the core. The
//! core only sees boxed async closures with these shapes, so tests can
//! substitute in-process fakes.

use color_eyre::{Report, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::SyncQueryKey;
use crate::sequencer::CancelToken;

/// Resolution of a cancellable remote read.
///
/// `Cancelled` is not an error: the result is discarded silently and no
/// visible state is touched.
#[derive(Debug)]
pub enum FetchOutcome<T> {
  Fetched(T),
  Cancelled,
  Failed(Report),
}

/// Remote write: `(target_id, patch) -> confirmed entity`.
/// Used by the mutation executor.
pub type RemoteWrite = Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Cancellable remote read: `(params, cancel) -> result set`.
/// Used by the debounced preview pipeline. The transport should abort when
/// the cancel token fires; resolving anyway is tolerated (the stale result
/// fails the sequencer's token check).
pub type RemoteRead<P, T> =
  Arc<dyn Fn(P, CancelToken) -> BoxFuture<'static, FetchOutcome<T>> + Send + Sync>;

/// Remote list fetch for full cache population (no patch semantics).
/// Used for reconciliation refetches after mutations.
pub type RemoteList =
  Arc<dyn Fn(SyncQueryKey) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
