//! Full flow: race card and form in, scores persisted, predictions and
//! results back out.

use chrono::NaiveDate;
use std::sync::Arc;

use cleanbet_api::config::AnalysisConfig;
use cleanbet_api::form::FormRecord;
use cleanbet_api::pipeline::{run_analysis, AnalysisContext, AnalysisRequest};
use cleanbet_api::predictions::{get_predictions, PredictionRequest, Region};
use cleanbet_api::results::{reconcile_result, ResultRequest};
use cleanbet_api::scoring::StrategyKind;
use cleanbet_api::storage::{AnalysisStore, FormStore, Runner, SqliteStore};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn runner() -> Runner {
    Runner {
        selection_id: 101,
        selection_name: "Clean Sweep".to_string(),
        selection_link: "https://example.com/horse/101".to_string(),
        event_name: "Ascot".to_string(),
        event_date: date("2024-06-01"),
        event_time: "14:00".to_string(),
        event_link: "https://example.com/ascot".to_string(),
        price: "2/1".to_string(),
        race_distance: "8".to_string(),
        race_category: "Flat".to_string(),
        race_class: "3".to_string(),
        track_condition: "Good".to_string(),
        number_of_runners: Some(9),
        race_track: "Ascot".to_string(),
    }
}

fn form(race_date: &str, position: &str) -> FormRecord {
    FormRecord {
        race_date: date(race_date),
        position: position.to_string(),
        rating: "80".to_string(),
        race_type: "Flat".to_string(),
        racecourse: "Newbury".to_string(),
        distance: "8".to_string(),
        going: "Good".to_string(),
        race_class: "3".to_string(),
        sp_odds: "2/1".to_string(),
        age: "4".to_string(),
        trainer: "A Trainer".to_string(),
        sex: "Colt".to_string(),
        sire: "Sire".to_string(),
        dam: "Dam".to_string(),
        owner: "Owner".to_string(),
    }
}

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set_config("delta", "1").unwrap();
    store.set_config("total_runs", "10").unwrap();
    store.set_config("bet_value", "5").unwrap();
    store.set_config("average_postion", "4").unwrap();
    store.insert_event("Ascot", "UK").unwrap();

    let card = runner();
    store.insert_runner(&card).unwrap();
    // Two months before the event, 8f both times
    store.insert_form(&card, &form("2024-04-01", "1/4")).unwrap();
    store.insert_form(&card, &form("2024-03-25", "2/5")).unwrap();
    store
}

#[test]
fn test_analysis_scores_and_persists() {
    let context = AnalysisContext::new(Arc::new(seeded_store()), AnalysisConfig::default()).unwrap();
    let request = AnalysisRequest {
        event_date: date("2024-06-01"),
        strategy: Some(StrategyKind::Heuristic),
        seed: Some(2024),
        top_n: Some(1),
    };

    let outcome = run_analysis(&context, &request).unwrap();
    assert_eq!(outcome.selections.len(), 1);
    let selection = &outcome.selections[0];
    assert_eq!(selection.analysis.preferred_distance, 8.0);
    assert_eq!(selection.analysis.current_distance, 8.0);

    // Within delta of the preferred distance, so the bonus applies
    let heuristic = selection.match_breakdown.as_ref().unwrap();
    let bonus = heuristic.component("distance_match_bonus").unwrap();
    assert!((5.0..20.0).contains(&bonus));

    // avg 1.5 -> 10, 61 days -> 4, equal distance -> 15, 1 of 2 won -> 10, 2.0 odds -> 9
    let breakdown = &selection.breakdown;
    assert_eq!(breakdown.components.len(), 5);
    assert_eq!(breakdown.total(), 48.0);

    let stored = context
        .store()
        .get_analysis(date("2024-06-01"), 101)
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_score, 48.0);
    assert_eq!(stored.odds, Some("2/1".to_string()));
    assert_eq!(stored.number_runs, 2);
    assert_eq!(stored.race_date, Some(date("2024-04-01")));

    // A rerun replaces the row instead of adding one
    run_analysis(&context, &request).unwrap();
    let predictions = get_predictions(
        context.store(),
        context.tunables(),
        &PredictionRequest {
            event_date: date("2024-06-01"),
            region: Region::Both,
        },
    )
    .unwrap();
    assert_eq!(predictions.selections.len(), 1);
    assert_eq!(predictions.total_bet, 5.0);
    assert_eq!(predictions.status, "pending");
}

#[test]
fn test_result_reconciliation_feeds_predictions() {
    let context = AnalysisContext::new(Arc::new(seeded_store()), AnalysisConfig::default()).unwrap();
    run_analysis(&context, &AnalysisRequest::for_date(date("2024-06-01"))).unwrap();

    let response = reconcile_result(
        context.store(),
        context.tunables(),
        &ResultRequest {
            event_date: date("2024-06-01"),
            selection_id: 101,
            position: "1/9".to_string(),
            price: "2/1".to_string(),
        },
    )
    .unwrap();
    assert!(response.updated);
    assert_eq!(response.outcome.potential_return, "10.00");

    let predictions = get_predictions(
        context.store(),
        context.tunables(),
        &PredictionRequest {
            event_date: date("2024-06-01"),
            region: Region::Uk,
        },
    )
    .unwrap();
    assert_eq!(predictions.total_return, 10.0);
    assert_eq!(predictions.status, "settled");
}

#[test]
fn test_history_on_event_date_is_not_used() {
    let store = seeded_store();
    store
        .insert_form(&runner(), &form("2024-06-01", "1/9"))
        .unwrap();
    assert_eq!(store.forms_for_selection(101).unwrap().len(), 3);

    let context = AnalysisContext::new(Arc::new(store), AnalysisConfig::default()).unwrap();
    let outcome = run_analysis(&context, &AnalysisRequest::for_date(date("2024-06-01"))).unwrap();
    assert_eq!(outcome.selections[0].analysis.profile.num_runs, 2);
}
