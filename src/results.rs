//! Post-race reconciliation of stored predictions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Tunables;
use crate::error::{AnalysisError, ParseKind, Result};
use crate::form::{finishing_place, parse_fractional_odds};
use crate::storage::{AnalysisStore, RaceOutcome};

/// Bet suggested by a selection's starting price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetType {
    #[serde(rename = "win bet")]
    Win,
    #[serde(rename = "place bet")]
    Place,
    #[serde(rename = "none")]
    NoBet,
}

impl BetType {
    /// Odds-on prices are backed to win, long prices each-way to place.
    pub fn from_odds(fractional: f64) -> Self {
        if fractional < 1.0 {
            BetType::Win
        } else if fractional > 4.0 {
            BetType::Place
        } else {
            BetType::NoBet
        }
    }
}

/// Return on `stake` at fractional `odds`: `stake * odds` on a win, 0 otherwise,
/// formatted to 2 decimals.
pub fn potential_return(stake: f64, odds: f64, won: bool) -> String {
    let value = if won { stake * odds } else { 0.0 };
    format!("{:.2}", value)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRequest {
    pub event_date: NaiveDate,
    pub selection_id: i64,
    /// Finishing position, `"1"`, `"1/9"` or a non-finish code
    pub position: String,
    /// Starting price, e.g. `"5/2"`
    pub price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultResponse {
    pub selection_id: i64,
    pub bet_type: BetType,
    pub outcome: RaceOutcome,
    /// False when the row already carried an outcome
    pub updated: bool,
}

/// Store the race outcome on a predicted selection.
///
/// Rows that already have an outcome are left untouched and their stored
/// outcome is returned.
pub fn reconcile_result<S>(
    store: &S,
    tunables: &Tunables,
    request: &ResultRequest,
) -> Result<ResultResponse>
where
    S: AnalysisStore + ?Sized,
{
    let position = request.position.trim();
    if position.is_empty() {
        return Err(AnalysisError::Validation("position is required".to_string()));
    }
    let odds = parse_fractional_odds(&request.price)
        .ok_or_else(|| AnalysisError::parse(ParseKind::Odds, request.price.as_str()))?;
    let bet_type = BetType::from_odds(odds);

    let row = store
        .get_analysis(request.event_date, request.selection_id)?
        .ok_or_else(|| {
            AnalysisError::NotFound(format!(
                "no analysis for selection {} on {}",
                request.selection_id, request.event_date
            ))
        })?;

    if let Some(existing_position) = row.current_event_position {
        warn!(
            selection_id = request.selection_id,
            "Result already recorded, leaving it unchanged"
        );
        return Ok(ResultResponse {
            selection_id: request.selection_id,
            bet_type,
            outcome: RaceOutcome {
                current_event_price: row.current_event_price.unwrap_or_default(),
                current_event_position: existing_position,
                potential_return: row.potential_return.unwrap_or_default(),
            },
            updated: false,
        });
    }

    let won = finishing_place(position) == Some(1);
    let outcome = RaceOutcome {
        current_event_price: request.price.trim().to_string(),
        current_event_position: position.to_string(),
        potential_return: potential_return(tunables.bet_value, odds, won),
    };
    let updated = store.record_outcome(request.event_date, request.selection_id, &outcome)?;

    info!(
        selection_id = request.selection_id,
        position,
        potential_return = %outcome.potential_return,
        "Result reconciled"
    );

    Ok(ResultResponse {
        selection_id: request.selection_id,
        bet_type,
        outcome,
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::tests::{analysis_record, date};
    use crate::storage::SqliteStore;

    fn tunables() -> Tunables {
        Tunables {
            delta: 1.0,
            total_runs: 10,
            bet_value: 5.0,
            average_position: 4.0,
        }
    }

    fn request(position: &str, price: &str) -> ResultRequest {
        ResultRequest {
            event_date: date("2024-06-01"),
            selection_id: 1,
            position: position.to_string(),
            price: price.to_string(),
        }
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_analysis(&analysis_record(1, 40.0)).unwrap();
        store
    }

    #[test]
    fn test_bet_type_from_odds() {
        assert_eq!(BetType::from_odds(0.5), BetType::Win);
        assert_eq!(BetType::from_odds(1.0), BetType::NoBet);
        assert_eq!(BetType::from_odds(4.0), BetType::NoBet);
        assert_eq!(BetType::from_odds(5.0), BetType::Place);
    }

    #[test]
    fn test_potential_return() {
        assert_eq!(potential_return(5.0, 2.5, true), "12.50");
        assert_eq!(potential_return(5.0, 2.5, false), "0.00");
    }

    #[test]
    fn test_reconcile_winner() {
        let store = store();
        let response = reconcile_result(&store, &tunables(), &request("1/9", "5/2")).unwrap();

        assert!(response.updated);
        assert_eq!(response.bet_type, BetType::NoBet);
        assert_eq!(response.outcome.potential_return, "12.50");

        let row = store.get_analysis(date("2024-06-01"), 1).unwrap().unwrap();
        assert_eq!(row.current_event_position, Some("1/9".to_string()));
        assert_eq!(row.current_event_price, Some("5/2".to_string()));
    }

    #[test]
    fn test_reconcile_loser_and_repeat() {
        let store = store();
        let first = reconcile_result(&store, &tunables(), &request("3", "6/1")).unwrap();
        assert_eq!(first.outcome.potential_return, "0.00");
        assert_eq!(first.bet_type, BetType::Place);

        let second = reconcile_result(&store, &tunables(), &request("1", "6/1")).unwrap();
        assert!(!second.updated);
        assert_eq!(second.outcome.current_event_position, "3");
    }

    #[test]
    fn test_reconcile_errors() {
        let store = store();
        assert!(matches!(
            reconcile_result(&store, &tunables(), &request("", "5/2")),
            Err(AnalysisError::Validation(_))
        ));
        assert!(matches!(
            reconcile_result(&store, &tunables(), &request("1", "n/a")),
            Err(AnalysisError::Parse {
                kind: ParseKind::Odds,
                ..
            })
        ));
        let mut missing = request("1", "5/2");
        missing.selection_id = 99;
        assert!(reconcile_result(&store, &tunables(), &missing)
            .unwrap_err()
            .is_not_found());
    }
}
