//! Retrieval of the day's top selections with stake totals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::config::Tunables;
use crate::error::{AnalysisError, Result};
use crate::storage::{AnalysisRecord, AnalysisStore, PredictionFilter};

/// Predictions returned per request
pub const PREDICTION_LIMIT: usize = 5;

/// Which racecourses a prediction request covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "UK", alias = "uk")]
    Uk,
    #[serde(alias = "ireland")]
    Ireland,
    /// UK and Ireland
    #[default]
    #[serde(alias = "both")]
    Both,
    /// No region restriction
    #[serde(alias = "all")]
    All,
}

impl Region {
    /// Country stored in the events table, for single-country regions
    pub fn country(&self) -> Option<&'static str> {
        match self {
            Region::Uk => Some("UK"),
            Region::Ireland => Some("Ireland"),
            Region::Both | Region::All => None,
        }
    }
}

impl FromStr for Region {
    type Err = AnalysisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uk" => Ok(Region::Uk),
            "ireland" | "ie" => Ok(Region::Ireland),
            "both" => Ok(Region::Both),
            "all" => Ok(Region::All),
            other => Err(AnalysisError::Validation(format!("unknown region: {}", other))),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Uk => "UK",
            Region::Ireland => "Ireland",
            Region::Both => "Both",
            Region::All => "All",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub event_date: NaiveDate,
    #[serde(default)]
    pub region: Region,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub selections: Vec<AnalysisRecord>,
    /// Number of selections times the configured stake
    pub total_bet: f64,
    /// Sum of the recorded potential returns
    pub total_return: f64,
    /// "settled" once every selection has an outcome, otherwise "pending"
    pub status: String,
}

pub fn prediction_filter(tunables: &Tunables, request: &PredictionRequest) -> PredictionFilter {
    PredictionFilter {
        event_date: request.event_date,
        distance_tolerance: tunables.delta,
        max_average_position: tunables.average_position,
        max_runs: tunables.total_runs as u32,
        region: request.region,
        limit: PREDICTION_LIMIT,
    }
}

/// Top stored selections for a date, with stake and return totals.
pub fn get_predictions<S>(
    store: &S,
    tunables: &Tunables,
    request: &PredictionRequest,
) -> Result<PredictionResponse>
where
    S: AnalysisStore + ?Sized,
{
    let selections = store.query_analyses(&prediction_filter(tunables, request))?;

    let total_bet = selections.len() as f64 * tunables.bet_value;
    let total_return: f64 = selections
        .iter()
        .filter_map(|s| s.potential_return.as_deref())
        .filter_map(|r| r.trim().parse::<f64>().ok())
        .sum();
    let settled =
        !selections.is_empty() && selections.iter().all(|s| s.current_event_position.is_some());

    info!(
        event_date = %request.event_date,
        region = %request.region,
        count = selections.len(),
        "Predictions retrieved"
    );

    Ok(PredictionResponse {
        selections,
        total_bet,
        total_return,
        status: if settled { "settled" } else { "pending" }.to_string(),
    })
}
