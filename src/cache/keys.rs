//! Logical query keys for remotely-owned datasets.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// A logical query key identifies one reactively-cached remote dataset.
///
/// Implementors provide a stable hash (used as the cache and sequencer
/// lookup key) and a human-readable description for logging.
pub trait QueryKey {
  /// Stable, fixed-length key derived from the query parameters.
  fn cache_hash(&self) -> String;

  /// Human-readable description, for logs and error messages.
  fn description(&self) -> String;
}

/// Query keys for the datasets the synchronization core manages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncQueryKey {
  /// The task board: every lane with its tasks, as one tree.
  TaskBoard,
  /// Time-entry preview for a billing period.
  TimeEntriesPreview {
    period_start: NaiveDate,
    period_end: NaiveDate,
  },
  /// The invoice list.
  InvoiceList,
  /// The client list.
  ClientList,
}

impl QueryKey for SyncQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::TaskBoard => "task_board".to_string(),
      Self::TimeEntriesPreview {
        period_start,
        period_end,
      } => format!("time_entries_preview:{}:{}", period_start, period_end),
      Self::InvoiceList => "invoice_list".to_string(),
      Self::ClientList => "client_list".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::TaskBoard => "task board".to_string(),
      Self::TimeEntriesPreview {
        period_start,
        period_end,
      } => format!("time entries {} to {}", period_start, period_end),
      Self::InvoiceList => "invoices".to_string(),
      Self::ClientList => "clients".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_is_stable_for_equal_keys() {
    let a = SyncQueryKey::TimeEntriesPreview {
      period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    };
    let b = a.clone();
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn hash_differs_per_period() {
    let january = SyncQueryKey::TimeEntriesPreview {
      period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    };
    let february = SyncQueryKey::TimeEntriesPreview {
      period_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
      period_end: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
    };
    assert_ne!(january.cache_hash(), february.cache_hash());
    assert_ne!(january.cache_hash(), SyncQueryKey::TaskBoard.cache_hash());
  }
}
