//! One analysis request: profile, score, persist and rank the runners of an
//! event date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, Tunables};
use crate::distance::parse_furlongs;
use crate::error::{AnalysisError, Result};
use crate::form::aggregate;
use crate::persistence::sync_event_date;
use crate::preference::preferred_distance_for;
use crate::ranking::{best_per_slot, distance_fit_candidates, top_n_per_slot, ByMatchScore};
use crate::scoring::{
    DeterministicTotalScore, HeuristicMatchScore, ScoredSelection, ScoringStrategy,
    SelectionAnalysis, StrategyKind,
};
use crate::storage::{AnalysisStore, ConfigStore, FormStore, MeetingStore, Runner};

/// Every store the pipeline touches.
pub trait AnalysisBackend: FormStore + MeetingStore + ConfigStore + AnalysisStore + Send + Sync {}

impl<T> AnalysisBackend for T where T: FormStore + MeetingStore + ConfigStore + AnalysisStore + Send + Sync {}

/// Shared, immutable state of the analysis engine.
pub struct AnalysisContext {
    store: Arc<dyn AnalysisBackend>,
    tunables: Tunables,
    settings: AnalysisConfig,
}

impl AnalysisContext {
    /// Reads the tunables once; a missing key fails here rather than mid-request.
    pub fn new(store: Arc<dyn AnalysisBackend>, settings: AnalysisConfig) -> Result<Self> {
        let tunables = Tunables::from_store(store.as_ref())?;
        Ok(Self {
            store,
            tunables,
            settings,
        })
    }

    pub fn store(&self) -> &dyn AnalysisBackend {
        self.store.as_ref()
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub event_date: NaiveDate,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    /// Seed for the heuristic random source
    #[serde(default)]
    pub seed: Option<u64>,
    /// Also return the top N (1..=3) per time slot
    #[serde(default)]
    pub top_n: Option<usize>,
}

impl AnalysisRequest {
    pub fn for_date(event_date: NaiveDate) -> Self {
        Self {
            event_date,
            strategy: None,
            seed: None,
            top_n: None,
        }
    }
}

/// A runner left out of scoring
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSelection {
    pub selection_id: i64,
    pub selection_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub event_date: NaiveDate,
    pub strategy: StrategyKind,
    pub selections: Vec<ScoredSelection>,
    pub skipped: Vec<SkippedSelection>,
    /// Rows written to the analysis table
    pub persisted: usize,
    /// Winner candidate per time slot under the requested strategy
    pub best_per_slot: BTreeMap<String, ScoredSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_per_slot: Option<BTreeMap<String, Vec<ScoredSelection>>>,
    /// Selections whose preferred distance suits today's race, best first
    pub distance_fit: Vec<i64>,
}

/// Build the analysis of one runner from its stored history.
///
/// Fails with `Parse` when today's distance cannot be read and with
/// `NotFound` when no run precedes the event date.
pub fn analyse_selection<S>(store: &S, runner: &Runner) -> Result<SelectionAnalysis>
where
    S: FormStore + ?Sized,
{
    let current_distance = parse_furlongs(&runner.race_distance)?;
    let forms = store.forms_for_selection(runner.selection_id)?;
    let profile = aggregate(&forms, runner.event_date);
    if profile.is_empty() {
        return Err(AnalysisError::NotFound(format!(
            "insufficient history for selection {}",
            runner.selection_id
        )));
    }

    let preferred_distance = preferred_distance_for(&profile);
    debug!(
        selection_id = runner.selection_id,
        runs = profile.num_runs,
        current_distance,
        preferred_distance,
        "Analysed selection"
    );

    Ok(SelectionAnalysis {
        runner: runner.clone(),
        profile,
        current_distance,
        preferred_distance,
    })
}

/// Score and persist every runner of the requested date.
pub fn run_analysis(ctx: &AnalysisContext, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
    if let Some(n) = request.top_n {
        if !(1..=3).contains(&n) {
            return Err(AnalysisError::Validation(format!(
                "top_n must be between 1 and 3, got {}",
                n
            )));
        }
    }

    let store = ctx.store();
    let strategy = request.strategy.unwrap_or(ctx.settings.strategy);
    let runners = store.runners_for_date(request.event_date)?;
    if runners.is_empty() {
        return Err(AnalysisError::NotFound(format!(
            "no runners for {}",
            request.event_date
        )));
    }
    info!(event_date = %request.event_date, runners = runners.len(), ?strategy, "Running analysis");

    let mut heuristic = match strategy {
        StrategyKind::Deterministic => None,
        StrategyKind::Heuristic => {
            let params = ctx.tunables.heuristic_params(ctx.settings.window);
            Some(match request.seed.or(ctx.settings.seed) {
                Some(seed) => HeuristicMatchScore::seeded(params, seed),
                None => HeuristicMatchScore::from_entropy(params),
            })
        }
    };

    let mut selections = Vec::with_capacity(runners.len());
    let mut skipped = Vec::new();
    for runner in &runners {
        let analysis = match analyse_selection(store, runner) {
            Ok(analysis) => analysis,
            Err(e) if e.is_not_found() => {
                debug!(selection_id = runner.selection_id, "Skipping: {}", e);
                skipped.push(SkippedSelection {
                    selection_id: runner.selection_id,
                    selection_name: runner.selection_name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let breakdown = DeterministicTotalScore.score(&analysis);
        let match_breakdown = heuristic.as_mut().map(|h| h.score(&analysis));
        selections.push(ScoredSelection {
            analysis,
            breakdown,
            match_breakdown,
        });
    }

    let unscored: Vec<i64> = skipped.iter().map(|s| s.selection_id).collect();
    let persisted = sync_event_date(store, request.event_date, &selections, &unscored)?;

    let best = match strategy {
        StrategyKind::Deterministic => best_per_slot(&selections),
        StrategyKind::Heuristic => {
            let wrapped: Vec<ByMatchScore<'_>> = selections.iter().map(ByMatchScore).collect();
            best_per_slot(&wrapped)
                .into_iter()
                .map(|(slot, entry)| (slot, entry.0.clone()))
                .collect()
        }
    };
    let top_per_slot = request
        .top_n
        .map(|n| top_n_per_slot(&selections, n))
        .transpose()?;
    let distance_fit = distance_fit_candidates(&selections)
        .iter()
        .map(|s| s.analysis.runner.selection_id)
        .collect();

    info!(
        scored = selections.len(),
        skipped = skipped.len(),
        persisted,
        "Analysis complete"
    );

    Ok(AnalysisOutcome {
        event_date: request.event_date,
        strategy,
        selections,
        skipped,
        persisted,
        best_per_slot: best,
        top_per_slot,
        distance_fit,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{AVERAGE_POSITION_KEY, BET_VALUE_KEY, DELTA_KEY, TOTAL_RUNS_KEY};
    use crate::error::ParseKind;
    use crate::form::tests::record;
    use crate::storage::repository::tests::{analysis_record, date, runner};
    use crate::storage::SqliteStore;

    pub(crate) fn store_with_card() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_config(DELTA_KEY, "1").unwrap();
        store.set_config(TOTAL_RUNS_KEY, "10").unwrap();
        store.set_config(BET_VALUE_KEY, "5").unwrap();
        store.set_config(AVERAGE_POSITION_KEY, "4").unwrap();

        let first = runner(1, "14:00");
        let second = runner(2, "14:00");
        let third = runner(3, "15:30");
        for r in [&first, &second, &third] {
            store.insert_runner(r).unwrap();
        }
        store.insert_form(&first, &record("2024-05-10", "1/4", "8")).unwrap();
        store.insert_form(&first, &record("2024-05-01", "4/8", "10")).unwrap();
        store.insert_form(&second, &record("2024-04-01", "6/9", "1m4f")).unwrap();
        // Runner 3 has only a run on the event date itself
        store.insert_form(&third, &record("2024-06-01", "1/5", "8")).unwrap();
        store
    }

    pub(crate) fn context(store: SqliteStore) -> AnalysisContext {
        AnalysisContext::new(Arc::new(store), AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_context_requires_tunables() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = AnalysisContext::new(Arc::new(store), AnalysisConfig::default());
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_analyse_selection_strict_distance() {
        let store = store_with_card();
        let mut card = runner(1, "14:00");
        card.race_distance = "about a mile".to_string();

        let err = analyse_selection(&store, &card).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Parse {
                kind: ParseKind::Distance,
                ..
            }
        ));
    }

    #[test]
    fn test_run_analysis_deterministic() {
        let ctx = context(store_with_card());
        let outcome = run_analysis(&ctx, &AnalysisRequest::for_date(date("2024-06-01"))).unwrap();

        assert_eq!(outcome.strategy, StrategyKind::Deterministic);
        assert_eq!(outcome.selections.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].selection_id, 3);
        assert_eq!(outcome.persisted, 2);
        assert!(outcome.selections.iter().all(|s| s.match_breakdown.is_none()));

        // Runner 1 scores 47; runner 2: avg 6 -> 3, 61 days -> 4, 8 < 12 -> 10,
        // no wins -> 4, odds 4.0 -> 7
        let best = &outcome.best_per_slot["14:00"];
        assert_eq!(best.analysis.runner.selection_id, 1);
        assert_eq!(best.total_score(), 47.0);
        assert_eq!(outcome.selections[1].total_score(), 28.0);
        assert!(!outcome.best_per_slot.contains_key("15:30"));
        // Runner 2 prefers 12f, exactly 4f off today's 8f
        assert_eq!(outcome.distance_fit, vec![1]);

        let stored = ctx.store().get_analysis(date("2024-06-01"), 1).unwrap().unwrap();
        assert_eq!(stored.total_score, 47.0);
        assert_eq!(stored.odds, Some("5/2".to_string()));
    }

    #[test]
    fn test_run_analysis_heuristic_seeded() {
        let ctx = context(store_with_card());
        let request = AnalysisRequest {
            event_date: date("2024-06-01"),
            strategy: Some(StrategyKind::Heuristic),
            seed: Some(9),
            top_n: Some(2),
        };

        let first = run_analysis(&ctx, &request).unwrap();
        let second = run_analysis(&ctx, &request).unwrap();

        let scores = |o: &AnalysisOutcome| -> Vec<Option<f64>> {
            o.selections.iter().map(|s| s.match_score()).collect()
        };
        assert_eq!(scores(&first), scores(&second));
        assert!(first.selections.iter().all(|s| s.match_breakdown.is_some()));
        // Persisted score stays the deterministic one
        assert_eq!(first.selections[0].total_score(), 47.0);
        let top = first.top_per_slot.unwrap();
        assert_eq!(top["14:00"].len(), 2);
    }

    #[test]
    fn test_rerun_leaves_one_identical_row_per_key() {
        let store = Arc::new(store_with_card());
        let ctx = AnalysisContext::new(store.clone(), AnalysisConfig::default()).unwrap();
        let request = AnalysisRequest::for_date(date("2024-06-01"));

        run_analysis(&ctx, &request).unwrap();
        let first = store.analyses_for_date(date("2024-06-01")).unwrap();
        run_analysis(&ctx, &request).unwrap();
        let second = store.analyses_for_date(date("2024-06-01")).unwrap();

        let ids: Vec<i64> = second.iter().map(|r| r.selection_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_skipped_selection_loses_stale_row() {
        let store = store_with_card();
        // Left behind by a run made before runner 3 lost its usable history
        store.insert_analysis(&analysis_record(3, 30.0)).unwrap();

        let ctx = context(store);
        let outcome = run_analysis(&ctx, &AnalysisRequest::for_date(date("2024-06-01"))).unwrap();

        assert_eq!(outcome.skipped[0].selection_id, 3);
        assert!(ctx.store().get_analysis(date("2024-06-01"), 3).unwrap().is_none());
        assert!(ctx.store().get_analysis(date("2024-06-01"), 1).unwrap().is_some());
    }

    #[test]
    fn test_run_analysis_validates_top_n() {
        let ctx = context(store_with_card());
        let mut request = AnalysisRequest::for_date(date("2024-06-01"));
        request.top_n = Some(4);
        assert!(matches!(
            run_analysis(&ctx, &request),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_run_analysis_without_runners() {
        let ctx = context(store_with_card());
        let err = run_analysis(&ctx, &AnalysisRequest::for_date(date("2024-07-01"))).unwrap_err();
        assert!(err.is_not_found());
    }
}
