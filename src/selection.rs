//! Entry selection and aggregation for time-entry previews.
//!
//! Pure functions only: given a fetched batch of candidate entries, an
//! exclusion set and display parameters, produce the deterministic ordered
//! view and its numeric aggregates. No hidden state, no network.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::SyncError;

/// One candidate line item fetched from the time-tracking source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
  /// Stable identifier from the remote source; unique within one batch.
  /// Exclusion-set membership is keyed on this, never on position.
  pub external_id: String,
  pub start_time: DateTime<Utc>,
  pub end_time: DateTime<Utc>,
  pub duration_hours: f64,
  /// Amount as computed by the source, in the source currency.
  pub amount_source: f64,
  pub project_label: String,
  pub description: String,
}

/// A manually added line item, priced directly in the target currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
  pub description: String,
  pub quantity: f64,
  pub unit_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
  StartTime,
  Project,
  Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
  Asc,
  Desc,
}

/// Derived totals. Pure function output, recomputed on every input change.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
  pub included_hours: f64,
  /// Included time-entry amounts converted to the target currency.
  pub included_amount: f64,
  pub tax_amount: f64,
  pub grand_total: f64,
}

/// The ordered display list, the included subset and the aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryView {
  pub ordered: Vec<TimeEntry>,
  pub included: Vec<TimeEntry>,
  pub totals: AggregationResult,
}

/// Compute the deterministic view of a fetched batch.
///
/// - `date_filter` keeps entries whose start falls on that calendar day.
/// - Sorting is stable: equal keys preserve their original relative order.
/// - Inclusion is decided purely by `external_id` membership in `excluded`;
///   it never affects ordering or filtering.
/// - Monetary sums stay unrounded; display rounding is the caller's.
///
/// `conversion_rate` must be positive and `tax_rate_percent` within
/// [0, 100]; anything else is a `SyncError::Validation`.
#[allow(clippy::too_many_arguments)]
pub fn compute_view(
  entries: &[TimeEntry],
  excluded: &HashSet<String>,
  sort_key: SortKey,
  sort_order: SortOrder,
  date_filter: Option<NaiveDate>,
  manual_entries: &[ManualEntry],
  conversion_rate: f64,
  tax_rate_percent: f64,
) -> Result<EntryView, SyncError> {
  if !(conversion_rate > 0.0) || !conversion_rate.is_finite() {
    return Err(SyncError::Validation(format!(
      "conversion rate must be positive, got {conversion_rate}"
    )));
  }
  if !(0.0..=100.0).contains(&tax_rate_percent) {
    return Err(SyncError::Validation(format!(
      "tax rate must be within [0, 100], got {tax_rate_percent}"
    )));
  }

  let mut ordered: Vec<TimeEntry> = entries
    .iter()
    .filter(|entry| match date_filter {
      Some(day) => entry.start_time.date_naive() == day,
      None => true,
    })
    .cloned()
    .collect();

  // Vec::sort_by is stable, so same-valued rows never visibly reorder
  // across repeated computations.
  ordered.sort_by(|a, b| {
    let comparison = match sort_key {
      SortKey::StartTime => a.start_time.cmp(&b.start_time),
      SortKey::Project => a.project_label.cmp(&b.project_label),
      SortKey::Duration => a
        .duration_hours
        .partial_cmp(&b.duration_hours)
        .unwrap_or(Ordering::Equal),
    };
    match sort_order {
      SortOrder::Asc => comparison,
      SortOrder::Desc => comparison.reverse(),
    }
  });

  let included: Vec<TimeEntry> = ordered
    .iter()
    .filter(|entry| !excluded.contains(&entry.external_id))
    .cloned()
    .collect();

  let included_hours: f64 = included.iter().map(|e| e.duration_hours).sum();
  let included_amount: f64 = included
    .iter()
    .map(|e| e.amount_source / conversion_rate)
    .sum();
  let manual_total: f64 = manual_entries
    .iter()
    .map(|m| m.quantity * m.unit_price)
    .sum();

  let subtotal = included_amount + manual_total;
  let tax_amount = subtotal * tax_rate_percent / 100.0;

  Ok(EntryView {
    ordered,
    included,
    totals: AggregationResult {
      included_hours,
      included_amount,
      tax_amount,
      grand_total: subtotal + tax_amount,
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn entry(id: &str, day: u32, hour: u32, hours: f64, amount: f64, project: &str) -> TimeEntry {
    let start = Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap();
    TimeEntry {
      external_id: id.to_string(),
      start_time: start,
      end_time: start + chrono::Duration::minutes((hours * 60.0) as i64),
      duration_hours: hours,
      amount_source: amount,
      project_label: project.to_string(),
      description: format!("work on {project}"),
    }
  }

  fn sample() -> Vec<TimeEntry> {
    vec![
      entry("a", 1, 9, 1.5, 15.0, "alpha"),
      entry("b", 1, 11, 2.0, 20.0, "beta"),
      entry("c", 2, 9, 0.5, 5.0, "alpha"),
    ]
  }

  fn view(
    entries: &[TimeEntry],
    excluded: &HashSet<String>,
    manual: &[ManualEntry],
    tax: f64,
  ) -> EntryView {
    compute_view(
      entries,
      excluded,
      SortKey::StartTime,
      SortOrder::Asc,
      None,
      manual,
      1.0,
      tax,
    )
    .unwrap()
  }

  #[test]
  fn aggregates_with_no_exclusions() {
    let result = view(&sample(), &HashSet::new(), &[], 10.0);
    assert_eq!(result.totals.included_hours, 4.0);
    assert_eq!(result.totals.included_amount, 40.0);
    assert_eq!(result.totals.tax_amount, 4.0);
    assert_eq!(result.totals.grand_total, 44.0);
  }

  #[test]
  fn excluding_an_entry_removes_it_from_the_aggregates() {
    let excluded: HashSet<String> = ["b".to_string()].into();
    let result = view(&sample(), &excluded, &[], 10.0);
    assert_eq!(result.totals.included_hours, 2.0);
    assert_eq!(result.totals.included_amount, 20.0);
    assert_eq!(result.totals.tax_amount, 2.0);
    assert_eq!(result.totals.grand_total, 22.0);
    // Display ordering is unaffected by exclusion
    assert_eq!(result.ordered.len(), 3);
    assert_eq!(result.included.len(), 2);
  }

  #[test]
  fn manual_entries_add_to_the_subtotal_in_target_currency() {
    let manual = vec![ManualEntry {
      description: "hosting".to_string(),
      quantity: 2.0,
      unit_price: 5.0,
    }];
    let result = view(&sample(), &HashSet::new(), &manual, 10.0);
    // 40 time + 10 manual, 10% tax
    assert_eq!(result.totals.tax_amount, 5.0);
    assert_eq!(result.totals.grand_total, 55.0);
  }

  #[test]
  fn conversion_rate_divides_source_amounts() {
    let result = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::StartTime,
      SortOrder::Asc,
      None,
      &[],
      2.0,
      0.0,
    )
    .unwrap();
    assert_eq!(result.totals.included_amount, 20.0);
    assert_eq!(result.totals.grand_total, 20.0);
  }

  #[test]
  fn sort_is_stable_for_equal_keys() {
    // "a" and "c" share the project label; ascending project sort must
    // keep their original relative order.
    let result = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::Project,
      SortOrder::Asc,
      None,
      &[],
      1.0,
      0.0,
    )
    .unwrap();
    let ids: Vec<&str> = result.ordered.iter().map(|e| e.external_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
  }

  #[test]
  fn descending_order_reverses_the_comparison() {
    let result = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::Duration,
      SortOrder::Desc,
      None,
      &[],
      1.0,
      0.0,
    )
    .unwrap();
    let ids: Vec<&str> = result.ordered.iter().map(|e| e.external_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
  }

  #[test]
  fn date_filter_matches_the_calendar_day() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let result = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::StartTime,
      SortOrder::Asc,
      Some(day),
      &[],
      1.0,
      0.0,
    )
    .unwrap();
    // Entries at 09:00 and 11:00 on March 1 both match; March 2 does not.
    let ids: Vec<&str> = result.ordered.iter().map(|e| e.external_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
  }

  #[test]
  fn computation_is_pure() {
    let excluded: HashSet<String> = ["a".to_string()].into();
    let first = view(&sample(), &excluded, &[], 7.5);
    let second = view(&sample(), &excluded, &[], 7.5);
    assert_eq!(first, second);
  }

  #[test]
  fn out_of_range_rates_are_rejected() {
    let err = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::StartTime,
      SortOrder::Asc,
      None,
      &[],
      0.0,
      10.0,
    )
    .unwrap_err();
    assert!(err.is_validation());

    let err = compute_view(
      &sample(),
      &HashSet::new(),
      SortKey::StartTime,
      SortOrder::Asc,
      None,
      &[],
      1.0,
      101.0,
    )
    .unwrap_err();
    assert!(err.is_validation());
  }
}
