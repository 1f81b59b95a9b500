//! Idempotent write-back of scored selections.

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::scoring::ScoredSelection;
use crate::storage::{AnalysisRecord, AnalysisStore};

/// Round to 3 decimals for storage
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Persisted row for a scored selection. Outcome fields start empty and the
/// market price is filled in by the store at write time.
pub fn build_record(scored: &ScoredSelection) -> AnalysisRecord {
    let runner = &scored.analysis.runner;
    let profile = &scored.analysis.profile;

    AnalysisRecord {
        event_date: runner.event_date,
        selection_id: runner.selection_id,
        selection_name: runner.selection_name.clone(),
        selection_link: runner.selection_link.clone(),
        event_link: runner.event_link.clone(),
        event_name: runner.event_name.clone(),
        event_time: runner.event_time.clone(),
        race_date: profile.last_run_date,
        odds: None,
        age: profile.age.trim().parse().ok(),
        total_score: round3(scored.total_score()),
        average_position: round3(profile.avg_position),
        average_rating: round3(profile.avg_rating),
        selection_position: profile.last_position.clone(),
        num_runners: runner.number_of_runners,
        number_runs: profile.num_runs as u32,
        preferred_distance: round3(scored.analysis.preferred_distance),
        current_distance: round3(scored.analysis.current_distance),
        potential_return: None,
        current_event_price: None,
        current_event_position: None,
    }
}

/// Replace the stored rows of `event_date` for every scored selection and
/// remove the rows of `unscored` selection ids.
///
/// Runs as one transaction: either every row is replaced or none is.
pub fn sync_event_date<S: AnalysisStore + ?Sized>(
    store: &S,
    event_date: NaiveDate,
    scored: &[ScoredSelection],
    unscored: &[i64],
) -> Result<usize> {
    let records: Vec<AnalysisRecord> = scored.iter().map(build_record).collect();
    let written = store.replace_analyses(event_date, &records, unscored)?;
    info!(%event_date, written, removed = unscored.len(), "Synced analysis rows");
    Ok(written)
}
