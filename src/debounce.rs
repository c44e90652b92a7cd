//! Debounce scheduling: coalesce rapid parameter changes into one trigger.
//!
//! Each logical query key owns at most one pending timer. Scheduling again
//! before the timer fires supersedes it, so a burst of parameter edits
//! costs a single action once the input goes quiet. The bounded extra
//! latency is the quiescence window itself.
//!
//! Once the window elapses the action is out of the scheduler's hands:
//! a later `schedule` or `cancel` only ever aborts a still-pending timer,
//! never an action that has already started. In-flight work is superseded
//! through its own cancellation token, not by killing the task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use crate::cache::QueryKey;

type TimerSlot = (u64, JoinHandle<()>);

/// One pending timer per logical query key.
#[derive(Clone, Default)]
pub struct DebounceScheduler {
  timers: Arc<Mutex<HashMap<String, TimerSlot>>>,
  generation: Arc<AtomicU64>,
}

impl DebounceScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, TimerSlot>> {
    self.timers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Schedule `action` to run after `delay` of quiescence for `key`.
  ///
  /// Any timer already pending for `key` is cancelled first; the action
  /// runs exactly once per uninterrupted window.
  pub fn schedule<F>(&self, key: &impl QueryKey, delay: Duration, action: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
    let timers = Arc::clone(&self.timers);
    let hash = key.cache_hash();
    let slot_hash = hash.clone();

    let handle = tokio::spawn(async move {
      sleep(delay).await;
      // The window elapsed uninterrupted: retire this slot so later
      // schedule/cancel calls find no timer to abort.
      {
        let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
        if timers.get(&slot_hash).map(|(g, _)| *g) == Some(generation) {
          timers.remove(&slot_hash);
        }
      }
      // Detached: the action owns its own task from here on.
      tokio::spawn(action);
    });

    let mut timers = self.lock();
    if let Some((_, previous)) = timers.insert(hash, (generation, handle)) {
      debug!(key = %key.description(), "debounce timer superseded");
      previous.abort();
    }
  }

  /// Clear any pending timer for `key` without firing it. An action whose
  /// timer has already fired is unaffected.
  pub fn cancel(&self, key: &impl QueryKey) {
    let mut timers = self.lock();
    if let Some((_, handle)) = timers.remove(&key.cache_hash()) {
      handle.abort();
    }
  }

  /// Clear every pending timer without firing. Used on teardown.
  pub fn cancel_all(&self) {
    let mut timers = self.lock();
    for (_, (_, handle)) in timers.drain() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SyncQueryKey;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test]
  async fn rapid_schedules_fire_exactly_once() {
    let scheduler = DebounceScheduler::new();
    let key = SyncQueryKey::TaskBoard;
    let fired = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
      let fired = fired.clone();
      scheduler.schedule(&key, Duration::from_millis(30), async move {
        fired.fetch_add(1, Ordering::SeqCst);
      });
      sleep(Duration::from_millis(5)).await;
    }

    sleep(Duration::from_millis(80)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cancel_clears_a_pending_timer_without_firing() {
    let scheduler = DebounceScheduler::new();
    let key = SyncQueryKey::TaskBoard;
    let fired = Arc::new(AtomicU32::new(0));

    let fired_clone = fired.clone();
    scheduler.schedule(&key, Duration::from_millis(20), async move {
      fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    scheduler.cancel(&key);

    sleep(Duration::from_millis(60)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn keys_debounce_independently() {
    let scheduler = DebounceScheduler::new();
    let fired = Arc::new(AtomicU32::new(0));

    for key in [SyncQueryKey::TaskBoard, SyncQueryKey::InvoiceList] {
      let fired = fired.clone();
      scheduler.schedule(&key, Duration::from_millis(10), async move {
        fired.fetch_add(1, Ordering::SeqCst);
      });
    }

    sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn reschedule_after_firing_leaves_the_running_action_alone() {
    let scheduler = DebounceScheduler::new();
    let key = SyncQueryKey::TaskBoard;
    let finished = Arc::new(AtomicU32::new(0));

    // A slow action whose timer fires well before the reschedule
    let finished_clone = finished.clone();
    scheduler.schedule(&key, Duration::from_millis(10), async move {
      sleep(Duration::from_millis(40)).await;
      finished_clone.fetch_add(1, Ordering::SeqCst);
    });
    sleep(Duration::from_millis(25)).await;

    let finished_clone = finished.clone();
    scheduler.schedule(&key, Duration::from_millis(10), async move {
      finished_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Both the already-running action and the rescheduled one complete
    sleep(Duration::from_millis(80)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn cancel_after_firing_leaves_the_running_action_alone() {
    let scheduler = DebounceScheduler::new();
    let key = SyncQueryKey::TaskBoard;
    let finished = Arc::new(AtomicU32::new(0));

    let finished_clone = finished.clone();
    scheduler.schedule(&key, Duration::from_millis(10), async move {
      sleep(Duration::from_millis(40)).await;
      finished_clone.fetch_add(1, Ordering::SeqCst);
    });
    sleep(Duration::from_millis(25)).await;
    scheduler.cancel(&key);

    sleep(Duration::from_millis(60)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cancel_all_clears_every_timer() {
    let scheduler = DebounceScheduler::new();
    let fired = Arc::new(AtomicU32::new(0));

    for key in [SyncQueryKey::TaskBoard, SyncQueryKey::ClientList] {
      let fired = fired.clone();
      scheduler.schedule(&key, Duration::from_millis(20), async move {
        fired.fetch_add(1, Ordering::SeqCst);
      });
    }
    scheduler.cancel_all();

    sleep(Duration::from_millis(60)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }
}
