//! Preferred racing distance from finishing history.

use tracing::{debug, warn};

use crate::distance::read_distance;
use crate::form::{split_history, AggregateProfile, Placing};

/// Running ratio total for one distinct distance.
#[derive(Debug)]
struct DistanceGroup {
    furlongs: f64,
    total: f64,
    count: usize,
}

impl DistanceGroup {
    fn mean(&self) -> f64 {
        self.total / self.count as f64
    }
}

/// Distance (in furlongs) with the lowest mean `place / field-size` ratio.
///
/// The three inputs are the parallel concatenated strings of a profile.
/// Entries whose position is not `place/field-size` or whose distance cannot be
/// read are skipped. Distances are grouped after unit conversion, so `"1m"` and
/// `"8"` count as the same distance. On equal means the distance seen first
/// (the most recent in history order) wins.
///
/// Returns 0 for mismatched list lengths or when nothing could be parsed.
pub fn preferred_distance(positions: &str, distances: &str, dates: &str) -> f64 {
    let positions: Vec<&str> = split_history(positions).collect();
    let distances: Vec<&str> = split_history(distances).collect();
    let dates: Vec<&str> = split_history(dates).collect();

    if positions.len() != distances.len() || distances.len() != dates.len() {
        debug!(
            positions = positions.len(),
            distances = distances.len(),
            dates = dates.len(),
            "History lists differ in length"
        );
        return 0.0;
    }

    let mut groups: Vec<DistanceGroup> = Vec::new();
    for (position, distance) in positions.iter().zip(&distances) {
        let Some(ratio) = Placing::parse(position).and_then(|p| p.ratio()) else {
            continue;
        };

        let reading = read_distance(distance);
        if reading.recognized == 0 {
            warn!(distance = *distance, "Skipping history entry with unreadable distance");
            continue;
        }

        match groups
            .iter_mut()
            .find(|g| (g.furlongs - reading.furlongs).abs() < 1e-9)
        {
            Some(group) => {
                group.total += ratio;
                group.count += 1;
            }
            None => groups.push(DistanceGroup {
                furlongs: reading.furlongs,
                total: ratio,
                count: 1,
            }),
        }
    }

    let mut best: Option<&DistanceGroup> = None;
    for group in &groups {
        if best.map_or(true, |b| group.mean() < b.mean()) {
            best = Some(group);
        }
    }

    best.map(|g| g.furlongs).unwrap_or(0.0)
}

/// Preferred distance of an aggregated profile.
pub fn preferred_distance_for(profile: &AggregateProfile) -> f64 {
    preferred_distance(
        &profile.all_positions,
        &profile.all_distances,
        &profile.all_race_dates,
    )
}
