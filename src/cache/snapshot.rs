//! Snapshot/rollback support for speculative cache writes.

use serde_json::Value;
use tracing::warn;

use super::keys::{QueryKey, SyncQueryKey};
use super::store::EntityCache;

/// Lifecycle of a captured snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
  /// Captured, awaiting the outcome of the speculative write.
  Pending,
  /// The mutation was confirmed; the snapshot is discarded.
  Committed,
  /// The snapshot was restored into the cache.
  RolledBack,
}

/// A captured pre-mutation value for one cache key.
///
/// Known limitation: if an unrelated write lands on the same key between
/// `capture` and `rollback`, rollback still restores the captured value and
/// discards the interleaved write. Callers are expected to run at most one
/// optimistic mutation per key at a time.
pub struct Snapshot {
  cache: EntityCache,
  key: SyncQueryKey,
  /// `None` means the key had never been fetched when captured.
  prior: Option<Value>,
  state: SnapshotState,
}

impl Snapshot {
  /// Capture the current value for `key` before a speculative write.
  pub fn capture(cache: &EntityCache, key: SyncQueryKey) -> Self {
    let prior = cache.read(&key);
    Self {
      cache: cache.clone(),
      key,
      prior,
      state: SnapshotState::Pending,
    }
  }

  pub fn state(&self) -> SnapshotState {
    self.state
  }

  /// The mutation was confirmed; drop the captured value.
  pub fn commit(&mut self) {
    if self.state == SnapshotState::Pending {
      self.state = SnapshotState::Committed;
      self.prior = None;
    }
  }

  /// Restore the captured value into the cache. Idempotent: the second and
  /// later calls are no-ops, as is a rollback after commit.
  pub fn rollback(&mut self) {
    if self.state != SnapshotState::Pending {
      return;
    }
    self.state = SnapshotState::RolledBack;
    warn!(key = %self.key.description(), "rolling back optimistic write");
    match self.prior.take() {
      Some(value) => {
        self.cache.write(&self.key, value);
      }
      None => {
        // The key had never been fetched: return it to the absent state.
        self.cache.remove(&self.key);
      }
    }
  }
}
