//! Optimistic mutation execution.
//!
//! A mutation applies its patch to the cached value immediately, before the
//! remote write confirms it. On success the optimistic value stands until a
//! reconciliation refetch replaces it with the server's authoritative
//! result (server-computed fields may differ from the local approximation).
//! On failure the pre-mutation snapshot is restored before the error is
//! returned, so callers never observe a confirmed-looking state that is
//! later silently undone.
//!
//! A reconciliation refetch is scheduled regardless of outcome: even a
//! reported failure may have partially changed server state (e.g. a timeout
//! after commit).

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{EntityCache, QueryKey, Snapshot, SyncQueryKey};
use crate::error::SyncError;
use crate::remote::{RemoteList, RemoteWrite};

/// Lifecycle of one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
  /// Patch applied locally, remote write outstanding.
  Applying,
  /// Remote write succeeded; snapshot discarded.
  Confirmed,
  /// Remote write failed; snapshot restored into the cache.
  RolledBack,
}

/// Record of a completed mutation, returned to the caller on success.
#[derive(Debug)]
pub struct MutationRecord {
  pub target_id: String,
  pub patch: Value,
  pub status: MutationStatus,
  /// The entity as confirmed by the server, when the write succeeded.
  pub confirmed: Option<Value>,
}

/// Maps a mutation target to the cache key that owns it.
pub type KeyResolver = Arc<dyn Fn(&str) -> SyncQueryKey + Send + Sync>;

/// Orchestrates snapshot, optimistic patch, remote write and reconciliation.
#[derive(Clone)]
pub struct MutationExecutor {
  cache: EntityCache,
  resolve_key: KeyResolver,
  write: RemoteWrite,
  refetch: RemoteList,
}

impl MutationExecutor {
  pub fn new(
    cache: EntityCache,
    resolve_key: KeyResolver,
    write: RemoteWrite,
    refetch: RemoteList,
  ) -> Self {
    Self {
      cache,
      resolve_key,
      write,
      refetch,
    }
  }

  /// Run one optimistic mutation against `target_id`.
  ///
  /// On failure the returned `SyncError::MutationFailed` carries the
  /// original patch and the downstream error detail; the cache has already
  /// been restored to its pre-mutation value.
  pub async fn mutate(&self, target_id: &str, patch: Value) -> Result<MutationRecord, SyncError> {
    let key = (self.resolve_key)(target_id);
    let mut record = MutationRecord {
      target_id: target_id.to_string(),
      patch: patch.clone(),
      status: MutationStatus::Applying,
      confirmed: None,
    };

    let mut snapshot = Snapshot::capture(&self.cache, key.clone());
    self
      .cache
      .patch(&key, |value| apply_patch(value, target_id, &patch));
    debug!(target_id, key = %key.description(), "optimistic patch applied");

    match (self.write)(target_id.to_string(), patch.clone()).await {
      Ok(confirmed) => {
        snapshot.commit();
        record.status = MutationStatus::Confirmed;
        record.confirmed = Some(confirmed);
        self.schedule_refetch(key);
        Ok(record)
      }
      Err(report) => {
        snapshot.rollback();
        record.status = MutationStatus::RolledBack;
        self.schedule_refetch(key);
        Err(SyncError::MutationFailed {
          target_id: target_id.to_string(),
          patch,
          detail: format!("{report:#}"),
        })
      }
    }
  }

  /// Invalidate the key and refetch it in the background so the cache
  /// converges with the canonical server state.
  fn schedule_refetch(&self, key: SyncQueryKey) {
    self.cache.invalidate(&key);
    let cache = self.cache.clone();
    let refetch = Arc::clone(&self.refetch);
    tokio::spawn(async move {
      match refetch(key.clone()).await {
        Ok(value) => {
          cache.write(&key, value);
        }
        Err(report) => {
          // Leave the entry invalidated; the next consumer knows the value
          // is not to be trusted until a fetch succeeds.
          warn!(key = %key.description(), error = %report, "reconciliation refetch failed");
        }
      }
    });
  }
}

/// Pure merge: wherever a record in the tree carries `"id" == target_id`,
/// replace exactly the fields present in `patch`. Every other record and
/// field is left untouched.
pub fn apply_patch(value: Value, target_id: &str, patch: &Value) -> Value {
  match value {
    Value::Object(mut record) => {
      if matches_target(record.get("id"), target_id) {
        if let Value::Object(fields) = patch {
          for (field, new_value) in fields {
            record.insert(field.clone(), new_value.clone());
          }
        }
        Value::Object(record)
      } else {
        Value::Object(
          record
            .into_iter()
            .map(|(field, child)| (field, apply_patch(child, target_id, patch)))
            .collect(),
        )
      }
    }
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .map(|item| apply_patch(item, target_id, patch))
        .collect(),
    ),
    scalar => scalar,
  }
}

fn matches_target(id: Option<&Value>, target_id: &str) -> bool {
  match id {
    Some(Value::String(s)) => s == target_id,
    Some(Value::Number(n)) => n.to_string() == target_id,
    _ => false,
  }
}
