//! Ranking of scored selections within each race time slot.
//!
//! All orderings are stable and descending by total score only, so equal
//! scores keep the order in which entries arrived. Slots come back in a
//! `BTreeMap`, ordered by slot text.

use std::collections::BTreeMap;

use crate::error::{AnalysisError, Result};
use crate::scoring::ScoredSelection;

/// Something that competes within a race time slot.
pub trait Ranked {
    fn slot(&self) -> &str;
    fn total_score(&self) -> f64;
}

impl Ranked for ScoredSelection {
    fn slot(&self) -> &str {
        &self.analysis.runner.event_time
    }

    fn total_score(&self) -> f64 {
        ScoredSelection::total_score(self)
    }
}

/// Ranks a scored selection by its heuristic match score instead of its
/// persisted total.
#[derive(Debug, Clone)]
pub struct ByMatchScore<'a>(pub &'a ScoredSelection);

impl Ranked for ByMatchScore<'_> {
    fn slot(&self) -> &str {
        &self.0.analysis.runner.event_time
    }

    fn total_score(&self) -> f64 {
        self.0.match_score().unwrap_or(0.0)
    }
}

fn sort_descending<T: Ranked>(items: &mut [T]) {
    items.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
}

/// Entries grouped by slot, in arrival order.
pub fn group_by_slot<T: Ranked + Clone>(items: &[T]) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.slot().to_string())
            .or_default()
            .push(item.clone());
    }
    groups
}

/// Highest scoring entry per slot. Ties keep the first entry encountered.
pub fn best_per_slot<T: Ranked + Clone>(items: &[T]) -> BTreeMap<String, T> {
    let mut best: BTreeMap<String, T> = BTreeMap::new();
    for item in items {
        let replace = best
            .get(item.slot())
            .map_or(true, |current| item.total_score() > current.total_score());
        if replace {
            best.insert(item.slot().to_string(), item.clone());
        }
    }
    best
}

/// Second-ranked entry per slot; slots with a single entry are absent.
pub fn runner_up_per_slot<T: Ranked + Clone>(items: &[T]) -> BTreeMap<String, T> {
    group_by_slot(items)
        .into_iter()
        .filter_map(|(slot, mut entries)| {
            sort_descending(&mut entries);
            entries.into_iter().nth(1).map(|entry| (slot, entry))
        })
        .collect()
}

/// Top `n` entries per slot, descending, for `n` in 1..=3.
///
/// Each slot keeps a sorted list truncated to `n` as entries arrive.
pub fn top_n_per_slot<T: Ranked + Clone>(items: &[T], n: usize) -> Result<BTreeMap<String, Vec<T>>> {
    if !(1..=3).contains(&n) {
        return Err(AnalysisError::Validation(format!(
            "top-N must be between 1 and 3, got {}",
            n
        )));
    }

    let mut top: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let entries = top.entry(item.slot().to_string()).or_default();
        entries.push(item.clone());
        sort_descending(entries);
        entries.truncate(n);
    }
    Ok(top)
}

/// Selections whose preferred distance suits today's race, best first.
///
/// A selection qualifies when its preferred distance is within 4f of a race
/// shorter than 12f, or within 2f of a longer race. Ordered by total score
/// descending, then average position and average rating ascending.
pub fn distance_fit_candidates(selections: &[ScoredSelection]) -> Vec<ScoredSelection> {
    let mut candidates: Vec<ScoredSelection> = selections
        .iter()
        .filter(|s| {
            let current = s.analysis.current_distance;
            let diff = (s.analysis.preferred_distance - current).abs();
            (current < 12.0 && diff < 4.0) || (current >= 12.0 && diff <= 2.0)
        })
        .cloned()
        .collect();

    candidates.sort_by(|a, b| {
        b.total_score()
            .total_cmp(&a.total_score())
            .then_with(|| {
                a.analysis
                    .profile
                    .avg_position
                    .total_cmp(&b.analysis.profile.avg_position)
            })
            .then_with(|| {
                a.analysis
                    .profile
                    .avg_rating
                    .total_cmp(&b.analysis.profile.avg_rating)
            })
    });
    candidates
}
