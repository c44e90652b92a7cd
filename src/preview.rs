//! Debounced, cancellable preview pipeline for time-entry batches.
//!
//! Parameter changes are coalesced by the debounce scheduler; each fired
//! fetch carries a sequencer token, and only the result of the most recent
//! request is ever applied to visible state. Overlapping in-flight requests
//! are cancelled best-effort and their late responses discarded by the
//! token check, whatever order they arrive in.
//!
//! The pipeline is a scoped resource: `teardown` cancels any pending timer
//! and in-flight request, and must be called when the consuming view goes
//! inactive.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{EntityCache, QueryKey, SyncQueryKey};
use crate::config::SyncConfig;
use crate::debounce::DebounceScheduler;
use crate::error::SyncError;
use crate::remote::{FetchOutcome, RemoteRead};
use crate::selection::{compute_view, EntryView, ManualEntry, SortKey, SortOrder, TimeEntry};
use crate::sequencer::RequestSequencer;

/// Parameters of one preview lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewParams {
  pub period_start: NaiveDate,
  pub period_end: NaiveDate,
}

impl PreviewParams {
  fn cache_key(&self) -> SyncQueryKey {
    SyncQueryKey::TimeEntriesPreview {
      period_start: self.period_start,
      period_end: self.period_end,
    }
  }
}

/// All preview fetches share one debounce/sequence channel regardless of
/// the period: a new period supersedes the previous request rather than
/// racing it. Cached values still land under their per-period key.
struct PreviewChannel;

impl QueryKey for PreviewChannel {
  fn cache_hash(&self) -> String {
    "time_entries_preview".to_string()
  }

  fn description(&self) -> String {
    "time entries preview".to_string()
  }
}

struct PreviewState {
  params: Option<PreviewParams>,
  entries: Vec<TimeEntry>,
  excluded: HashSet<String>,
  manual_entries: Vec<ManualEntry>,
  sort_key: SortKey,
  sort_order: SortOrder,
  date_filter: Option<NaiveDate>,
  conversion_rate: f64,
  tax_rate_percent: f64,
  loading: bool,
  error: Option<SyncError>,
}

impl Default for PreviewState {
  fn default() -> Self {
    Self {
      params: None,
      entries: Vec::new(),
      excluded: HashSet::new(),
      manual_entries: Vec::new(),
      sort_key: SortKey::StartTime,
      sort_order: SortOrder::Asc,
      date_filter: None,
      conversion_rate: 1.0,
      tax_rate_percent: 0.0,
      loading: false,
      error: None,
    }
  }
}

/// The debounce → sequence → fetch → apply pipeline plus the synchronous
/// view controls that never touch the network.
#[derive(Clone)]
pub struct PreviewPipeline {
  cache: EntityCache,
  scheduler: DebounceScheduler,
  sequencer: RequestSequencer,
  fetch: RemoteRead<PreviewParams, Vec<TimeEntry>>,
  state: Arc<Mutex<PreviewState>>,
  debounce: Duration,
  stale_after: chrono::Duration,
}

impl PreviewPipeline {
  pub fn new(
    cache: EntityCache,
    config: &SyncConfig,
    fetch: RemoteRead<PreviewParams, Vec<TimeEntry>>,
  ) -> Self {
    Self {
      cache,
      scheduler: DebounceScheduler::new(),
      sequencer: RequestSequencer::new(),
      fetch,
      state: Arc::new(Mutex::new(PreviewState::default())),
      debounce: Duration::from_millis(config.debounce_ms),
      stale_after: chrono::Duration::seconds(config.preview_stale_secs as i64),
    }
  }

  fn lock(&self) -> MutexGuard<'_, PreviewState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Change the lookup parameters. The fetch fires after the quiescence
  /// window; further changes within the window supersede this one. A fresh
  /// cached batch for the same period is served without going to the
  /// network at all.
  pub fn set_query_params(&self, params: PreviewParams) {
    {
      let mut state = self.lock();
      state.params = Some(params.clone());
    }

    if let Some(cached) = self.cache.read_if_fresh(&params.cache_key(), self.stale_after) {
      if let Ok(entries) = serde_json::from_value::<Vec<TimeEntry>>(cached) {
        debug!(key = %params.cache_key().description(), "serving preview from cache");
        self.scheduler.cancel(&PreviewChannel);
        // Supersede any in-flight request; the cached batch is newer intent.
        let _ = self.sequencer.issue(&PreviewChannel);
        let mut state = self.lock();
        state.entries = entries;
        state.excluded.clear();
        state.loading = false;
        state.error = None;
        return;
      }
    }

    let pipeline = self.clone();
    self.scheduler.schedule(&PreviewChannel, self.debounce, async move {
      pipeline.run_fetch(params).await;
    });
  }

  /// Drop the current parameters and preview without fetching (e.g. the
  /// caller cleared the period inputs).
  pub fn clear_query_params(&self) {
    self.scheduler.cancel(&PreviewChannel);
    // Supersede any in-flight request so its late response is discarded.
    let _ = self.sequencer.issue(&PreviewChannel);
    let mut state = self.lock();
    state.params = None;
    state.entries.clear();
    state.excluded.clear();
    state.loading = false;
    state.error = None;
  }

  async fn run_fetch(&self, params: PreviewParams) {
    let (token, cancel) = self.sequencer.issue(&PreviewChannel);
    {
      let mut state = self.lock();
      state.loading = true;
    }

    let outcome = (self.fetch)(params.clone(), cancel).await;

    match outcome {
      FetchOutcome::Fetched(entries) => {
        if !self.sequencer.is_current(&PreviewChannel, token) {
          debug!(token, "discarding superseded preview response");
          return;
        }
        match serde_json::to_value(&entries) {
          Ok(value) => {
            self.cache.write(&params.cache_key(), value);
          }
          Err(e) => warn!(error = %e, "preview batch not cacheable"),
        }
        let mut state = self.lock();
        state.entries = entries;
        // Fresh data invalidates previous manual deselections.
        state.excluded.clear();
        state.loading = false;
        state.error = None;
        self.sequencer.complete(&PreviewChannel, token);
      }
      FetchOutcome::Cancelled => {
        // Usually a superseded request whose replacement manages the
        // loading flag; if the transport bailed while still current,
        // settle the state without touching the entries.
        debug!(token, "preview fetch cancelled");
        if self.sequencer.is_current(&PreviewChannel, token) {
          self.lock().loading = false;
          self.sequencer.complete(&PreviewChannel, token);
        }
      }
      FetchOutcome::Failed(report) => {
        if !self.sequencer.is_current(&PreviewChannel, token) {
          debug!(token, "discarding superseded preview failure");
          return;
        }
        warn!(token, error = %report, "preview fetch failed");
        let mut state = self.lock();
        state.entries.clear();
        state.excluded.clear();
        state.loading = false;
        state.error = Some(SyncError::FetchFailed {
          key: params.cache_key().description(),
          detail: format!("{report:#}"),
        });
        self.sequencer.complete(&PreviewChannel, token);
      }
    }
  }

  /// Toggle one entry in or out of the aggregate. Pairwise idempotent and
  /// independent of display ordering.
  pub fn toggle_exclusion(&self, external_id: &str) {
    let mut state = self.lock();
    if !state.excluded.remove(external_id) {
      state.excluded.insert(external_id.to_string());
    }
  }

  /// Include every entry.
  pub fn select_all(&self) {
    self.lock().excluded.clear();
  }

  /// Exclude every entry currently in the batch.
  pub fn exclude_all(&self) {
    let mut state = self.lock();
    state.excluded = state
      .entries
      .iter()
      .map(|e| e.external_id.clone())
      .collect();
  }

  pub fn set_sort(&self, key: SortKey, order: SortOrder) {
    let mut state = self.lock();
    state.sort_key = key;
    state.sort_order = order;
  }

  pub fn set_date_filter(&self, date: Option<NaiveDate>) {
    self.lock().date_filter = date;
  }

  /// Store the conversion and tax rates. Range validation happens in
  /// `view`, where out-of-range values surface as `SyncError::Validation`.
  pub fn set_rates(&self, conversion_rate: f64, tax_rate_percent: f64) {
    let mut state = self.lock();
    state.conversion_rate = conversion_rate;
    state.tax_rate_percent = tax_rate_percent;
  }

  pub fn add_manual_entry(&self, entry: ManualEntry) {
    self.lock().manual_entries.push(entry);
  }

  pub fn remove_manual_entry(&self, index: usize) {
    let mut state = self.lock();
    if index < state.manual_entries.len() {
      state.manual_entries.remove(index);
    }
  }

  /// Recompute the derived view from current state. Synchronous, no
  /// network.
  pub fn view(&self) -> Result<EntryView, SyncError> {
    let state = self.lock();
    compute_view(
      &state.entries,
      &state.excluded,
      state.sort_key,
      state.sort_order,
      state.date_filter,
      &state.manual_entries,
      state.conversion_rate,
      state.tax_rate_percent,
    )
  }

  pub fn is_loading(&self) -> bool {
    self.lock().loading
  }

  /// The failure of the most recent current fetch, if any. Cleared by the
  /// next applied response and by `clear_query_params`.
  pub fn error(&self) -> Option<SyncError> {
    self.lock().error.clone()
  }

  pub fn params(&self) -> Option<PreviewParams> {
    self.lock().params.clone()
  }

  /// Release the pipeline: cancel any pending timer and in-flight request.
  /// Late responses from before teardown fail the token check.
  pub fn teardown(&self) {
    self.scheduler.cancel_all();
    let _ = self.sequencer.issue(&PreviewChannel);
    self.sequencer.cancel_all();
  }
}
