//! Request sequencing and cancellation for overlapping fetches.
//!
//! Every fetch for a logical query key carries a token from `issue`. At
//! resolution time the caller checks `is_current`; a stale token means the
//! request was superseded and its result must be discarded without touching
//! visible state. The check is token-based, not arrival-order-based, so
//! out-of-order network delivery is handled correctly.
//!
//! Issuing a new token also cancels the previous in-flight request through
//! its `CancelToken`. Cancellation is a latency optimization only;
//! correctness comes from the token check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

use crate::cache::QueryKey;

/// Cooperative cancellation handle for one in-flight request.
///
/// The transport layer can poll `is_cancelled` or await `cancelled` to
/// abort early. Delivering a response anyway is fine; it will fail the
/// token check.
#[derive(Clone)]
pub struct CancelToken {
  rx: watch::Receiver<bool>,
}

impl CancelToken {
  /// Whether this request has been superseded or torn down.
  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the request is cancelled. Suitable for `tokio::select!`
  /// against the transport future.
  pub async fn cancelled(mut self) {
    // A dropped sender means the registry released the slot; treat it the
    // same as cancellation.
    let _ = self.rx.wait_for(|cancelled| *cancelled).await;
  }
}

#[derive(Default)]
struct SequenceSlot {
  current: u64,
  in_flight_cancel: Option<watch::Sender<bool>>,
}

/// Monotonic token registry, one sequence per logical query key.
#[derive(Clone, Default)]
pub struct RequestSequencer {
  slots: Arc<Mutex<HashMap<String, SequenceSlot>>>,
}

impl RequestSequencer {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, SequenceSlot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Issue a new token for `key`, cancelling any previous in-flight
  /// request for the same key.
  pub fn issue(&self, key: &impl QueryKey) -> (u64, CancelToken) {
    let mut slots = self.lock();
    let slot = slots.entry(key.cache_hash()).or_default();
    slot.current += 1;

    if let Some(previous) = slot.in_flight_cancel.take() {
      debug!(key = %key.description(), token = slot.current, "superseding in-flight request");
      let _ = previous.send(true);
    }

    let (tx, rx) = watch::channel(false);
    slot.in_flight_cancel = Some(tx);
    (slot.current, CancelToken { rx })
  }

  /// True iff `token` is the most recently issued token for `key`.
  pub fn is_current(&self, key: &impl QueryKey, token: u64) -> bool {
    let slots = self.lock();
    slots
      .get(&key.cache_hash())
      .map(|slot| slot.current == token)
      .unwrap_or(false)
  }

  /// Mark the request for `token` finished, releasing the cancel handle if
  /// the token is still current.
  pub fn complete(&self, key: &impl QueryKey, token: u64) {
    let mut slots = self.lock();
    if let Some(slot) = slots.get_mut(&key.cache_hash()) {
      if slot.current == token {
        slot.in_flight_cancel = None;
      }
    }
  }

  /// Cancel every outstanding request. Tokens already issued become stale.
  pub fn cancel_all(&self) {
    let mut slots = self.lock();
    for slot in slots.values_mut() {
      if let Some(cancel) = slot.in_flight_cancel.take() {
        let _ = cancel.send(true);
      }
    }
  }
}
