// src/pipeline/mod.rs
pub mod ranking;
pub mod sourcing;

use chrono::NaiveDate;
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One-time metrics registration so series show up with descriptions.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sourcing_candidates_total",
            "Raw search candidates fetched across providers."
        );
        describe_counter!(
            "sourcing_events_total",
            "Events created/updated by the sourcing pipeline."
        );
        describe_counter!(
            "sourcing_skipped_total",
            "Candidates dropped (irrelevant, below threshold, or unprocessable)."
        );
        describe_counter!(
            "sourcing_failures_total",
            "Per-candidate failures after exhausting retries."
        );
        describe_counter!(
            "ranking_cohorts_total",
            "Cohorts ranked by the ranking pipeline."
        );
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when a pipeline last completed a date."
        );
    });
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date_string(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Human-facing date, e.g. "January 3, 2009".
pub fn format_date_for_display(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Inclusive sequence of dates.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

/// Cooperative cancellation checked between dates, never mid-date.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-date mutual exclusion between sourcing and cohort loading. Both
/// pipelines take the date's lock for the duration of their run, so ranking
/// always reads a fully persisted snapshot.
#[derive(Clone, Default)]
pub struct DateLocks {
    inner: Arc<Mutex<HashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>>>,
}

impl DateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("poisoned date lock registry");
        map.entry(date).or_default().clone()
    }
}

/// Aggregate outcome of a date-range sourcing run. One date's failure never
/// aborts the range; it is counted here instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub dates_succeeded: usize,
    pub dates_partial: usize,
    pub dates_failed: usize,
    pub dates_cancelled: usize,
    pub total_events: usize,
}
