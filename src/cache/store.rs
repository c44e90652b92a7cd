//! In-memory entity cache keyed by logical query.
//!
//! The cache holds the last known value of each remote dataset as a tree of
//! plain records (`serde_json::Value`). Values are versioned: every accepted
//! write bumps the version and notifies subscribers of that key so dependent
//! views recompute.
//!
//! All operations are synchronous; the internal lock is held only for the
//! duration of one call and never across an await point, so writers take
//! turns and no value is ever observed mid-update.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use super::keys::QueryKey;

struct CacheEntry {
  value: Value,
  version: u64,
  cached_at: DateTime<Utc>,
  /// Set by `invalidate`: the value must be refetched before it is trusted.
  invalidated: bool,
}

#[derive(Default)]
struct CacheInner {
  entries: HashMap<String, CacheEntry>,
  /// Version a removed key reached, so a later write continues the
  /// per-key sequence instead of restarting at 1.
  removed_versions: HashMap<String, u64>,
  subscribers: HashMap<String, Vec<mpsc::UnboundedSender<u64>>>,
  torn_down: bool,
}

/// Shared handle to the entity cache.
///
/// Cloning is cheap; all clones see the same entries. The cache has an
/// explicit lifecycle: created with `new`, shared by handle, and released
/// with `teardown` (which closes all subscriber channels).
#[derive(Clone, Default)]
pub struct EntityCache {
  inner: Arc<Mutex<CacheInner>>,
}

impl EntityCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, CacheInner> {
    // A poisoned lock means a panic elsewhere; the cache state itself is
    // still consistent because every mutation completes before unlock.
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read the last known value for `key`, if any was ever written.
  pub fn read(&self, key: &impl QueryKey) -> Option<Value> {
    let inner = self.lock();
    inner.entries.get(&key.cache_hash()).map(|e| e.value.clone())
  }

  /// Read the value for `key` only when it is still trustworthy: written
  /// within `max_age` and not invalidated since.
  pub fn read_if_fresh(&self, key: &impl QueryKey, max_age: Duration) -> Option<Value> {
    let inner = self.lock();
    let entry = inner.entries.get(&key.cache_hash())?;
    if entry.invalidated || Utc::now() - entry.cached_at > max_age {
      return None;
    }
    Some(entry.value.clone())
  }

  /// Current version for `key`. Absent entries have no version.
  pub fn version(&self, key: &impl QueryKey) -> Option<u64> {
    let inner = self.lock();
    inner.entries.get(&key.cache_hash()).map(|e| e.version)
  }

  /// Replace the value for `key` wholesale, bumping the version and
  /// clearing any invalidation mark. Returns the new version.
  pub fn write(&self, key: &impl QueryKey, value: Value) -> u64 {
    let mut inner = self.lock();
    if inner.torn_down {
      return 0;
    }
    let hash = key.cache_hash();
    let prior = inner.entries.get(&hash).map(|e| e.version);
    let version = match prior {
      Some(v) => v + 1,
      None => inner.removed_versions.remove(&hash).unwrap_or(0) + 1,
    };
    inner.entries.insert(
      hash.clone(),
      CacheEntry {
        value,
        version,
        cached_at: Utc::now(),
        invalidated: false,
      },
    );
    debug!(key = %key.description(), version, "cache write");
    Self::notify(&mut inner, &hash, version);
    version
  }

  /// Apply a transform to the current value for `key`, bumping the version.
  /// Returns `None` (and leaves the cache untouched) when no value exists.
  pub fn patch(&self, key: &impl QueryKey, updater: impl FnOnce(Value) -> Value) -> Option<u64> {
    let mut inner = self.lock();
    if inner.torn_down {
      return None;
    }
    let hash = key.cache_hash();
    let entry = inner.entries.get_mut(&hash)?;
    let current = std::mem::take(&mut entry.value);
    entry.value = updater(current);
    entry.version += 1;
    entry.cached_at = Utc::now();
    let version = entry.version;
    debug!(key = %key.description(), version, "cache patch");
    Self::notify(&mut inner, &hash, version);
    Some(version)
  }

  /// Remove the entry for `key` entirely (back to the never-fetched state).
  /// Removal is a visible state change: subscribers get a version bump, and
  /// the per-key version sequence continues across a later write.
  pub fn remove(&self, key: &impl QueryKey) {
    let mut inner = self.lock();
    if inner.torn_down {
      return;
    }
    let hash = key.cache_hash();
    if let Some(entry) = inner.entries.remove(&hash) {
      let version = entry.version + 1;
      inner.removed_versions.insert(hash.clone(), version);
      debug!(key = %key.description(), version, "cache remove");
      Self::notify(&mut inner, &hash, version);
    }
  }

  /// Mark `key` for mandatory refetch before its value is trusted again.
  /// The value itself stays readable (stale-but-present).
  pub fn invalidate(&self, key: &impl QueryKey) {
    let mut inner = self.lock();
    if let Some(entry) = inner.entries.get_mut(&key.cache_hash()) {
      entry.invalidated = true;
      debug!(key = %key.description(), "cache invalidated");
    }
  }

  /// Whether `key` has been invalidated since its last write.
  pub fn is_invalidated(&self, key: &impl QueryKey) -> bool {
    let inner = self.lock();
    inner
      .entries
      .get(&key.cache_hash())
      .map(|e| e.invalidated)
      .unwrap_or(false)
  }

  /// Subscribe to version bumps for `key`. Each accepted `write`/`patch`
  /// delivers the new version. The channel closes on `teardown`.
  pub fn subscribe(&self, key: &impl QueryKey) -> mpsc::UnboundedReceiver<u64> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inner = self.lock();
    inner.subscribers.entry(key.cache_hash()).or_default().push(tx);
    rx
  }

  /// Release the cache: drop all entries and close all subscriber channels.
  /// Further writes are ignored.
  pub fn teardown(&self) {
    let mut inner = self.lock();
    inner.entries.clear();
    inner.removed_versions.clear();
    inner.subscribers.clear();
    inner.torn_down = true;
  }

  fn notify(inner: &mut CacheInner, hash: &str, version: u64) {
    if let Some(subs) = inner.subscribers.get_mut(hash) {
      // Prune subscribers whose receiver has been dropped.
      subs.retain(|tx| tx.send(version).is_ok());
    }
  }
}
