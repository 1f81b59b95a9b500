//! Historical form records and their aggregate profile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distance::read_distance;
use crate::error::{AnalysisError, ParseKind, Result};

/// Separator used by the concatenated history strings
pub const HISTORY_SEPARATOR: &str = ", ";

/// One historical race for a selection, as scraped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormRecord {
    pub race_date: NaiveDate,
    /// `place/field-size`, e.g. `"3/9"`, or a non-finish code such as `"PU"`
    pub position: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub race_type: String,
    #[serde(default)]
    pub racecourse: String,
    pub distance: String,
    #[serde(default)]
    pub going: String,
    #[serde(default)]
    pub race_class: String,
    #[serde(default)]
    pub sp_odds: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub trainer: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub sire: String,
    #[serde(default)]
    pub dam: String,
    #[serde(default)]
    pub owner: String,
}

/// A finishing position written as `place/field-size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placing {
    pub place: u32,
    pub field: u32,
}

impl Placing {
    /// Parse `"3/9"`. Anything else (`"PU"`, `"3"`, `"1/2/3"`) is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('/');
        let place = parts.next()?.trim().parse().ok()?;
        let field = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { place, field })
    }

    /// place / field-size, lower is better. `None` for an empty field.
    pub fn ratio(&self) -> Option<f64> {
        if self.field == 0 {
            return None;
        }
        Some(self.place as f64 / self.field as f64)
    }
}

/// Finishing place from the leading part of a position (`"3/9"` -> 3).
///
/// Non-finish codes and a zero place give `None`.
pub fn finishing_place(text: &str) -> Option<u32> {
    let lead = text.trim().split('/').next()?;
    lead.trim().parse::<u32>().ok().filter(|p| *p > 0)
}

/// Mean finishing place over a concatenated positions string.
pub fn average_finishing_position(positions: &str) -> f64 {
    let places: Vec<u32> = split_history(positions)
        .filter_map(finishing_place)
        .collect();
    if places.is_empty() {
        return 0.0;
    }
    places.iter().map(|p| *p as f64).sum::<f64>() / places.len() as f64
}

/// Split one of the concatenated history strings into trimmed entries.
pub fn split_history(joined: &str) -> impl Iterator<Item = &str> {
    joined.split(',').map(str::trim)
}

/// Undo the scraper's doubled odds cell (`"5/25/2"` -> `"5/2"`).
pub fn remove_duplicate_odds(odds: &str) -> &str {
    if odds.matches('/').count() == 2 {
        let mid = odds.len() / 2;
        if odds.is_char_boundary(mid) {
            return &odds[..mid];
        }
    }
    odds
}

/// Starting price as fractional odds: `"5/2"` -> 2.5, `"Evens"` -> 1.0.
///
/// Favourite markers (`"5/2F"`, `"3/1JF"`) are stripped and decimals pass
/// through.
pub fn parse_fractional_odds(text: &str) -> Option<f64> {
    let cleaned = remove_duplicate_odds(text.trim())
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim();
    let lowered = text.trim().to_ascii_lowercase();
    if lowered.starts_with("ev") {
        return Some(1.0);
    }

    match cleaned.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num / den)
        }
        None => cleaned.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Parse a `YYYY-MM-DD` date, tolerating a trailing time component.
pub fn parse_race_date(text: &str) -> Result<NaiveDate> {
    let trimmed = text.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| AnalysisError::parse(ParseKind::Date, text))
}

/// Derived summary of a selection's history before a cutoff date.
///
/// The four `all_*` strings share one ordering, most recent run first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateProfile {
    pub num_runs: usize,
    pub win_count: usize,
    pub last_run_date: Option<NaiveDate>,
    /// Days between the first and the most recent run
    pub duration: i64,
    /// Days between the most recent run and the cutoff
    pub days_since_last_run: i64,
    pub avg_position: f64,
    pub avg_rating: f64,
    pub avg_distance: f64,
    pub avg_odds: f64,
    pub all_positions: String,
    pub all_distances: String,
    pub all_courses: String,
    pub all_race_dates: String,
    // Most recent run
    pub last_position: String,
    pub race_class: String,
    pub age: String,
    pub sex: String,
    pub trainer: String,
    pub sire: String,
    pub dam: String,
    pub owner: String,
    /// Entries skipped while averaging
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl AggregateProfile {
    /// No qualifying history: "insufficient history", not a zero score.
    pub fn is_empty(&self) -> bool {
        self.num_runs == 0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Aggregate the records dated strictly before `cutoff`.
///
/// Records on or after the cutoff are dropped, so no profile ever sees the
/// race it is used to score.
pub fn aggregate(records: &[FormRecord], cutoff: NaiveDate) -> AggregateProfile {
    let mut history: Vec<&FormRecord> = records.iter().filter(|r| r.race_date < cutoff).collect();
    if history.is_empty() {
        return AggregateProfile::default();
    }
    history.sort_by(|a, b| b.race_date.cmp(&a.race_date));

    let mut diagnostics = Vec::new();
    let mut places = Vec::new();
    let mut ratings = Vec::new();
    let mut distances = Vec::new();
    let mut odds = Vec::new();
    let mut win_count = 0;

    for record in &history {
        if let Some(place) = finishing_place(&record.position) {
            if place == 1 {
                win_count += 1;
            }
            places.push(place as f64);
        }

        let rating = record.rating.trim();
        if !rating.is_empty() && rating != "-" {
            match rating.parse::<f64>() {
                Ok(value) => ratings.push(value),
                Err(_) => diagnostics.push(format!("rating {:?} on {}", rating, record.race_date)),
            }
        }

        let reading = read_distance(&record.distance);
        if reading.recognized > 0 {
            distances.push(reading.furlongs);
        } else {
            diagnostics.push(format!("distance {:?} on {}", record.distance, record.race_date));
        }

        if !record.sp_odds.trim().is_empty() {
            match parse_fractional_odds(&record.sp_odds) {
                Some(value) => odds.push(value),
                None => diagnostics.push(format!("odds {:?} on {}", record.sp_odds, record.race_date)),
            }
        }
    }

    for entry in &diagnostics {
        warn!("Skipped form entry: {}", entry);
    }

    let latest = history[0];
    let earliest = history[history.len() - 1];
    let join = |f: fn(&FormRecord) -> String| {
        history
            .iter()
            .map(|r| f(r))
            .collect::<Vec<_>>()
            .join(HISTORY_SEPARATOR)
    };

    AggregateProfile {
        num_runs: history.len(),
        win_count,
        last_run_date: Some(latest.race_date),
        duration: (latest.race_date - earliest.race_date).num_days(),
        days_since_last_run: (cutoff - latest.race_date).num_days(),
        avg_position: mean(&places),
        avg_rating: mean(&ratings),
        avg_distance: mean(&distances),
        avg_odds: mean(&odds),
        all_positions: join(|r| r.position.trim().to_string()),
        all_distances: join(|r| r.distance.trim().to_string()),
        all_courses: join(|r| r.racecourse.trim().to_string()),
        all_race_dates: join(|r| r.race_date.format("%Y-%m-%d").to_string()),
        last_position: latest.position.clone(),
        race_class: latest.race_class.clone(),
        age: latest.age.clone(),
        sex: latest.sex.clone(),
        trainer: latest.trainer.clone(),
        sire: latest.sire.clone(),
        dam: latest.dam.clone(),
        owner: latest.owner.clone(),
        diagnostics,
    }
}
