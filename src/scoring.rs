//! Selection scoring.
//!
//! Two independent strategies share the [`ScoringStrategy`] trait:
//!
//! - [`HeuristicMatchScore`]: distance/history match used to pick a single
//!   winner candidate. Contains a randomized component.
//! - [`DeterministicTotalScore`]: the "clean-bet score" that is persisted and
//!   ranked. Fully reproducible.
//!
//! The two are never combined.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::distance::read_distance;
use crate::error::AnalysisError;
use crate::form::{average_finishing_position, split_history, AggregateProfile, Placing};
use crate::storage::Runner;

/// Everything the strategies need to know about one selection.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionAnalysis {
    pub runner: Runner,
    pub profile: AggregateProfile,
    /// Today's race distance in furlongs
    pub current_distance: f64,
    pub preferred_distance: f64,
}

/// One named contribution to a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub value: f64,
}

/// Named score components, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub strategy: &'static str,
    pub components: Vec<ScoreComponent>,
}

impl ScoreBreakdown {
    pub fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            components: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &'static str, value: f64) {
        self.components.push(ScoreComponent { name, value });
    }

    pub fn component(&self, name: &str) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    pub fn total(&self) -> f64 {
        self.components.iter().map(|c| c.value).sum()
    }
}

/// A scoring algorithm over an analysed selection.
pub trait ScoringStrategy {
    fn name(&self) -> &'static str;

    fn score(&mut self, selection: &SelectionAnalysis) -> ScoreBreakdown;
}

/// Strategy selector for requests and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Deterministic,
    Heuristic,
}

impl FromStr for StrategyKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deterministic" | "total" => Ok(StrategyKind::Deterministic),
            "heuristic" | "match" => Ok(StrategyKind::Heuristic),
            other => Err(AnalysisError::Validation(format!(
                "unknown scoring strategy: {}",
                other
            ))),
        }
    }
}

// ==================== Heuristic match score ====================

/// Tunables of the heuristic match score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicParams {
    /// Distance-match tolerance in furlongs
    pub delta: f64,
    /// Runs below this count earn a bonus
    pub total_runs: usize,
    /// Most recent runs considered for distance and position history
    pub limit: usize,
}

/// Short-course table (average distance <= 12f): finer bands, max 15.
pub const SHORT_COURSE_BANDS: [(f64, f64); 9] = [
    (0.1, 15.0),
    (0.2, 13.0),
    (0.3, 11.0),
    (0.4, 9.0),
    (0.5, 7.0),
    (0.6, 5.0),
    (0.7, 3.0),
    (0.8, 1.0),
    (0.9, 0.0),
];

/// Long-course table: coarser bands, max 9.
pub const LONG_COURSE_BANDS: [(f64, f64); 9] = [
    (0.5, 9.0),
    (1.0, 8.0),
    (1.5, 7.0),
    (2.0, 6.0),
    (2.5, 5.0),
    (3.0, 4.0),
    (3.5, 3.0),
    (4.0, 2.0),
    (4.5, 1.0),
];

const SHORT_COURSE_LIMIT: f64 = 12.0;
const NON_FINISH_CODES: [&str; 4] = ["F", "PU", "U", "R"];

/// Bonus drawn from [5, 20) when today's distance is within `delta` of the
/// preferred one.
pub fn distance_match_bonus<R: Rng>(current: f64, preferred: f64, delta: f64, rng: &mut R) -> f64 {
    if (current - preferred).abs() <= delta {
        rng.gen_range(5.0..20.0)
    } else {
        0.0
    }
}

pub fn sex_adjustment(sex: &str, duration: i64) -> f64 {
    if sex.trim() == "Gelding" {
        2.0 + duration as f64
    } else {
        duration as f64
    }
}

pub fn run_count_bonus(num_runs: usize, total_runs: usize) -> f64 {
    if num_runs < total_runs {
        num_runs as f64
    } else {
        0.0
    }
}

/// Score of the first band whose threshold `diff` does not exceed.
pub fn band_score(diff: f64, bands: &[(f64, f64)]) -> f64 {
    bands
        .iter()
        .find(|(threshold, _)| diff <= *threshold)
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
}

/// Closeness of today's distance to the recent average distance.
///
/// Unreadable distances are left out of the average; with none readable the
/// band score is 0.
pub fn distance_band_score(distances: &str, current: f64, limit: usize) -> f64 {
    let recent: Vec<f64> = split_history(distances)
        .take(limit)
        .map(read_distance)
        .filter(|r| r.recognized > 0)
        .map(|r| r.furlongs)
        .collect();
    if recent.is_empty() {
        return 0.0;
    }

    let avg_distance = recent.iter().sum::<f64>() / recent.len() as f64;
    let diff = (avg_distance - current).abs();
    if avg_distance <= SHORT_COURSE_LIMIT {
        band_score(diff, &SHORT_COURSE_BANDS)
    } else {
        band_score(diff, &LONG_COURSE_BANDS)
    }
}

/// Score of the recent position history.
///
/// Non-finish codes cost 5. A `place/field` entry adds `round(field / place) * 10`
/// (field over place, not the usual place over field). Entries that cannot be
/// read, or have a zero place or field, cost 1.
pub fn position_history_score(positions: &str, limit: usize) -> f64 {
    let mut score = 0.0;
    for entry in split_history(positions).take(limit) {
        if NON_FINISH_CODES.iter().any(|code| entry.contains(code)) {
            score -= 5.0;
        }
        if !entry.contains('/') {
            continue;
        }
        match Placing::parse(entry) {
            Some(p) if p.place > 0 && p.field > 0 => {
                score += (p.field as f64 / p.place as f64).round() * 10.0;
            }
            _ => score -= 1.0,
        }
    }
    score
}

/// Heuristic match score with an injected random source.
pub struct HeuristicMatchScore<R = StdRng> {
    params: HeuristicParams,
    rng: R,
}

impl<R: Rng> HeuristicMatchScore<R> {
    pub fn new(params: HeuristicParams, rng: R) -> Self {
        Self { params, rng }
    }

    pub fn params(&self) -> &HeuristicParams {
        &self.params
    }
}

impl HeuristicMatchScore<StdRng> {
    /// Reproducible instance
    pub fn seeded(params: HeuristicParams, seed: u64) -> Self {
        Self::new(params, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(params: HeuristicParams) -> Self {
        Self::new(params, StdRng::from_entropy())
    }
}

impl<R: Rng> ScoringStrategy for HeuristicMatchScore<R> {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn score(&mut self, selection: &SelectionAnalysis) -> ScoreBreakdown {
        let profile = &selection.profile;
        let params = self.params;
        let mut breakdown = ScoreBreakdown::new(self.name());

        breakdown.push(
            "distance_match_bonus",
            distance_match_bonus(
                selection.current_distance,
                selection.preferred_distance,
                params.delta,
                &mut self.rng,
            ),
        );
        breakdown.push("sex_adjustment", sex_adjustment(&profile.sex, profile.duration));
        breakdown.push(
            "run_count_bonus",
            run_count_bonus(profile.num_runs, params.total_runs),
        );
        breakdown.push(
            "distance_band",
            distance_band_score(&profile.all_distances, selection.current_distance, params.limit),
        );
        breakdown.push(
            "position_history",
            position_history_score(&profile.all_positions, params.limit),
        );
        breakdown
    }
}

// ==================== Deterministic total score ====================

pub fn last_run_position_score(average_position: f64) -> f64 {
    if average_position <= 1.5 {
        10.0
    } else if average_position <= 3.0 {
        8.0
    } else if average_position <= 5.0 {
        6.0
    } else {
        3.0
    }
}

/// Rewards a 10 to 21 day rest; too fresh and too stale both lose points.
pub fn days_since_last_run_score(days: i64) -> f64 {
    if days < 10 {
        3.0
    } else if days <= 21 {
        10.0
    } else if days <= 35 {
        7.0
    } else {
        4.0
    }
}

pub fn distance_suitability_score(current: f64, preferred: f64) -> f64 {
    if (current - preferred).abs() < f64::EPSILON {
        15.0
    } else if current < preferred {
        10.0
    } else {
        5.0
    }
}

pub fn win_rate_score(win_count: usize, previous_runs: usize) -> f64 {
    if previous_runs == 0 {
        return 0.0;
    }

    let win_rate = win_count as f64 / previous_runs as f64;
    if win_rate >= 0.5 {
        10.0
    } else if win_rate >= 0.25 {
        7.0
    } else {
        4.0
    }
}

pub fn odds_score(average_odds: f64) -> f64 {
    if average_odds < 3.0 {
        9.0
    } else if average_odds < 5.0 {
        7.0
    } else if average_odds < 10.0 {
        5.0
    } else {
        3.0
    }
}

/// The persisted clean-bet score: five banded components.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicTotalScore;

impl ScoringStrategy for DeterministicTotalScore {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    fn score(&mut self, selection: &SelectionAnalysis) -> ScoreBreakdown {
        let profile = &selection.profile;
        let mut breakdown = ScoreBreakdown::new(self.name());

        breakdown.push(
            "last_run_position",
            last_run_position_score(average_finishing_position(&profile.all_positions)),
        );
        breakdown.push(
            "days_since_last_run",
            days_since_last_run_score(profile.days_since_last_run),
        );
        breakdown.push(
            "distance_suitability",
            distance_suitability_score(selection.current_distance, selection.preferred_distance),
        );
        breakdown.push("win_rate", win_rate_score(profile.win_count, profile.num_runs));
        breakdown.push("odds_quality", odds_score(profile.avg_odds));
        breakdown
    }
}

/// A scored selection: the persisted breakdown plus, when requested, the
/// heuristic match breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSelection {
    pub analysis: SelectionAnalysis,
    pub breakdown: ScoreBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_breakdown: Option<ScoreBreakdown>,
}

impl ScoredSelection {
    pub fn total_score(&self) -> f64 {
        self.breakdown.total()
    }

    pub fn match_score(&self) -> Option<f64> {
        self.match_breakdown.as_ref().map(ScoreBreakdown::total)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::form::aggregate;
    use crate::form::tests::record;
    use crate::storage::repository::tests::runner;
    use chrono::NaiveDate;

    fn params() -> HeuristicParams {
        HeuristicParams {
            delta: 1.0,
            total_runs: 10,
            limit: 5,
        }
    }

    pub(crate) fn analysis(positions: &[(&str, &str, &str)], current: f64) -> SelectionAnalysis {
        let records: Vec<_> = positions
            .iter()
            .map(|(date, pos, dist)| record(date, pos, dist))
            .collect();
        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let profile = aggregate(&records, cutoff);
        let preferred = crate::preference::preferred_distance_for(&profile);
        SelectionAnalysis {
            runner: runner(1, "14:00"),
            profile,
            current_distance: current,
            preferred_distance: preferred,
        }
    }

    #[test]
    fn test_strategy_kind_from_str() {
        assert_eq!("heuristic".parse::<StrategyKind>().unwrap(), StrategyKind::Heuristic);
        assert_eq!("Total".parse::<StrategyKind>().unwrap(), StrategyKind::Deterministic);
        assert!("random".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_win_rate_score() {
        assert_eq!(win_rate_score(0, 0), 0.0);
        assert_eq!(win_rate_score(1, 2), 10.0);
        assert_eq!(win_rate_score(1, 4), 7.0);
        assert_eq!(win_rate_score(1, 5), 4.0);
        assert_eq!(win_rate_score(0, 3), 4.0);
    }

    #[test]
    fn test_last_run_position_score() {
        assert_eq!(last_run_position_score(1.2), 10.0);
        assert_eq!(last_run_position_score(1.5), 10.0);
        assert_eq!(last_run_position_score(3.0), 8.0);
        assert_eq!(last_run_position_score(4.5), 6.0);
        assert_eq!(last_run_position_score(7.0), 3.0);
    }

    #[test]
    fn test_days_since_last_run_score() {
        assert_eq!(days_since_last_run_score(5), 3.0);
        assert_eq!(days_since_last_run_score(10), 10.0);
        assert_eq!(days_since_last_run_score(15), 10.0);
        assert_eq!(days_since_last_run_score(30), 7.0);
        assert_eq!(days_since_last_run_score(60), 4.0);
    }

    #[test]
    fn test_distance_suitability_score() {
        assert_eq!(distance_suitability_score(8.0, 8.0), 15.0);
        assert_eq!(distance_suitability_score(7.0, 8.0), 10.0);
        assert_eq!(distance_suitability_score(9.0, 8.0), 5.0);
    }

    #[test]
    fn test_odds_score() {
        assert_eq!(odds_score(2.5), 9.0);
        assert_eq!(odds_score(3.0), 7.0);
        assert_eq!(odds_score(9.99), 5.0);
        assert_eq!(odds_score(10.0), 3.0);
    }

    #[test]
    fn test_band_score_first_match_wins() {
        assert_eq!(band_score(0.0, &SHORT_COURSE_BANDS), 15.0);
        assert_eq!(band_score(0.25, &SHORT_COURSE_BANDS), 11.0);
        assert_eq!(band_score(0.95, &SHORT_COURSE_BANDS), 0.0);
        assert_eq!(band_score(1.2, &LONG_COURSE_BANDS), 7.0);
        assert_eq!(band_score(5.0, &LONG_COURSE_BANDS), 0.0);
    }

    #[test]
    fn test_distance_band_score_tables() {
        // Short course: avg 8, today 8.25 -> diff 0.25
        assert_eq!(distance_band_score("8, 8", 8.25, 5), 11.0);
        // Long course: avg 14, today 12 -> diff 2.0
        assert_eq!(distance_band_score("14, 1m6f", 12.0, 5), 6.0);
        // Only the most recent `limit` runs count
        assert_eq!(distance_band_score("8, 20", 8.0, 1), 15.0);
        assert_eq!(distance_band_score("far", 8.0, 5), 0.0);
    }

    #[test]
    fn test_position_history_score() {
        // round(4/1)*10 + round(5/2)*10 = 40 + 30 (2.5 rounds away from zero)
        assert_eq!(position_history_score("1/4, 2/5", 5), 70.0);
        assert_eq!(position_history_score("PU", 5), -5.0);
        assert_eq!(position_history_score("F/9", 5), -6.0);
        assert_eq!(position_history_score("x/9, 3/0", 5), -2.0);
        assert_eq!(position_history_score("1/4, 1/4", 1), 40.0);
        assert_eq!(position_history_score("3", 5), 0.0);
    }

    #[test]
    fn test_sex_and_run_count() {
        assert_eq!(sex_adjustment("Gelding", 30), 32.0);
        assert_eq!(sex_adjustment("Mare", 30), 30.0);
        assert_eq!(run_count_bonus(3, 10), 3.0);
        assert_eq!(run_count_bonus(10, 10), 0.0);
    }

    #[test]
    fn test_distance_match_bonus_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let bonus = distance_match_bonus(8.0, 8.5, 1.0, &mut rng);
            assert!((5.0..20.0).contains(&bonus));
        }
        assert_eq!(distance_match_bonus(8.0, 10.0, 1.0, &mut rng), 0.0);
    }

    #[test]
    fn test_heuristic_is_reproducible_with_seed() {
        let selection = analysis(&[("2024-04-01", "1/4", "8"), ("2024-03-01", "2/5", "8")], 8.0);

        let first = HeuristicMatchScore::seeded(params(), 42).score(&selection);
        let second = HeuristicMatchScore::seeded(params(), 42).score(&selection);

        assert_eq!(first, second);
        assert_eq!(first.strategy, "heuristic");
        let bonus = first.component("distance_match_bonus").unwrap();
        assert!((5.0..20.0).contains(&bonus));
        // Gelding with 31 days between runs
        assert_eq!(first.component("sex_adjustment"), Some(33.0));
        assert_eq!(first.component("run_count_bonus"), Some(2.0));
        assert_eq!(first.component("distance_band"), Some(15.0));
        assert_eq!(first.component("position_history"), Some(70.0));
        assert!((first.total() - (bonus + 33.0 + 2.0 + 15.0 + 70.0)).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_total() {
        // Runs 10 May and 1 May before a 1 June cutoff
        let selection = analysis(&[("2024-05-10", "1/4", "8"), ("2024-05-01", "4/8", "10")], 8.0);
        let breakdown = DeterministicTotalScore.score(&selection);

        assert_eq!(breakdown.component("last_run_position"), Some(8.0));
        assert_eq!(breakdown.component("days_since_last_run"), Some(7.0));
        assert_eq!(breakdown.component("distance_suitability"), Some(15.0));
        assert_eq!(breakdown.component("win_rate"), Some(10.0));
        assert_eq!(breakdown.component("odds_quality"), Some(7.0));
        assert_eq!(breakdown.total(), 47.0);
    }
}
