//! Storage seams used by the analysis core.
//!
//! Everything the pipeline reads or writes goes through these traits, so the
//! core can be exercised against any backing store.

use chrono::NaiveDate;

use super::repository::{AnalysisRecord, EventSummary, RaceOutcome, Runner};
use crate::error::Result;
use crate::form::FormRecord;
use crate::predictions::Region;

/// Source of freshly scraped form records for one selection.
pub trait FormProvider {
    /// Every known record for the selection. Errors never yield a partial list.
    fn fetch_form(&self, selection_link: &str) -> Result<Vec<FormRecord>>;
}

/// Stored form history.
pub trait FormStore {
    /// History ordered by race date, most recent first.
    fn forms_for_selection(&self, selection_id: i64) -> Result<Vec<FormRecord>>;

    /// Date of the most recent stored run; `NotFound` when nothing is stored.
    fn last_run_date(&self, selection_id: i64) -> Result<NaiveDate>;

    /// Returns whether the record was new.
    fn insert_form(&self, runner: &Runner, record: &FormRecord) -> Result<bool>;
}

/// Race cards for an event date.
pub trait MeetingStore {
    fn runners_for_date(&self, event_date: NaiveDate) -> Result<Vec<Runner>>;

    fn selection_price(&self, event_date: NaiveDate, selection_id: i64) -> Result<Option<String>>;

    fn events_for_date(&self, event_date: NaiveDate) -> Result<Vec<EventSummary>>;
}

/// Named business tunables.
pub trait ConfigStore {
    fn config_value(&self, key: &str) -> Result<Option<String>>;
}

/// Filters applied when reading predictions back.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionFilter {
    pub event_date: NaiveDate,
    /// Exclusive bound on |preferred - current| distance
    pub distance_tolerance: f64,
    /// Exclusive bound on average finishing position
    pub max_average_position: f64,
    /// Exclusive bound on number of runs
    pub max_runs: u32,
    pub region: Region,
    pub limit: usize,
}

/// Persisted analysis rows keyed by (event date, selection id).
pub trait AnalysisStore {
    /// Returns whether a row was removed.
    fn delete_analysis(&self, event_date: NaiveDate, selection_id: i64) -> Result<bool>;

    fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// Delete and re-insert every record of the batch in one transaction.
    ///
    /// Every record must belong to `event_date`; the market price is looked
    /// up inside the transaction. Rows keyed by `stale` selection ids are
    /// deleted in the same transaction. Returns the number of rows written.
    fn replace_analyses(
        &self,
        event_date: NaiveDate,
        records: &[AnalysisRecord],
        stale: &[i64],
    ) -> Result<usize>;

    /// Matching rows ordered by total score descending, at most `filter.limit`.
    fn query_analyses(&self, filter: &PredictionFilter) -> Result<Vec<AnalysisRecord>>;

    fn get_analysis(&self, event_date: NaiveDate, selection_id: i64) -> Result<Option<AnalysisRecord>>;

    /// Store the outcome on a row that has none yet. Returns whether a row
    /// was updated.
    fn record_outcome(
        &self,
        event_date: NaiveDate,
        selection_id: i64,
        outcome: &RaceOutcome,
    ) -> Result<bool>;
}
