//! Typed error surface for the synchronization core.
//!
//! `FetchCancelled` is deliberately not represented here: a cancelled or
//! superseded fetch is discarded silently (see `remote::FetchOutcome`), it
//! never surfaces as an error to the caller.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to the caller. The core never retries automatically;
/// retry is a caller-level decision.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
  /// A remote write was rejected (or the network failed) during an
  /// optimistic mutation. The optimistic change has already been rolled
  /// back by the time this is returned.
  #[error("mutation failed for {target_id}: {detail}")]
  MutationFailed {
    target_id: String,
    /// The patch the caller asked for, so it can be retried or reported.
    patch: Value,
    detail: String,
  },

  /// A remote read for a current (non-superseded) request failed.
  #[error("fetch failed for {key}: {detail}")]
  FetchFailed { key: String, detail: String },

  /// Caller-supplied parameters were out of range (e.g. non-positive
  /// conversion rate). Rejected before any computation.
  #[error("validation error: {0}")]
  Validation(String),
}

impl SyncError {
  pub fn is_mutation_failed(&self) -> bool {
    matches!(self, SyncError::MutationFailed { .. })
  }

  pub fn is_fetch_failed(&self) -> bool {
    matches!(self, SyncError::FetchFailed { .. })
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, SyncError::Validation(_))
  }
}
