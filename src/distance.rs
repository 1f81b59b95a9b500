//! Distance notation to furlongs.
//!
//! Race cards mix notations: `"1m2f"`, `"1m 2f 110y"`, `"6f"`, or an already
//! converted `"10.5"`. Everything downstream works in furlongs.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::{AnalysisError, ParseKind, Result};

const FURLONGS_PER_MILE: f64 = 8.0;
/// 220 yards is taken as one furlong
const YARDS_PER_FURLONG: f64 = 220.0;

fn segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)([mfy])").unwrap())
}

/// Result of reading a distance string.
///
/// `recognized` counts the unit segments that contributed to `furlongs`;
/// `ignored` keeps every fragment that did not, so a zero contribution can be
/// told apart from a failed parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistanceReading {
    pub furlongs: f64,
    pub recognized: usize,
    pub ignored: Vec<String>,
}

impl DistanceReading {
    pub fn is_clean(&self) -> bool {
        self.ignored.is_empty()
    }
}

/// Parse `text` as an already converted furlong value.
fn plain_decimal(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a distance string into furlongs, recording anything unrecognized.
pub fn read_distance(raw: &str) -> DistanceReading {
    let text = raw.trim();
    if let Some(value) = plain_decimal(text) {
        return DistanceReading {
            furlongs: value,
            recognized: 1,
            ignored: Vec::new(),
        };
    }

    let mut reading = DistanceReading::default();
    for token in text.split_whitespace() {
        let mut consumed = 0;
        for caps in segment_re().captures_iter(token) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > consumed {
                reading.ignored.push(token[consumed..whole.start()].to_string());
            }
            consumed = whole.end();

            let Ok(value) = caps[1].parse::<f64>() else {
                reading.ignored.push(whole.as_str().to_string());
                continue;
            };
            reading.furlongs += match caps[2].to_ascii_lowercase().as_str() {
                "m" => value * FURLONGS_PER_MILE,
                "f" => value,
                _ => value / YARDS_PER_FURLONG,
            };
            reading.recognized += 1;
        }
        if consumed < token.len() {
            reading.ignored.push(token[consumed..].to_string());
        }
    }
    reading
}

/// Format a furlong value in its shortest decimal form (`10`, `1.25`).
pub fn format_furlongs(furlongs: f64) -> String {
    format!("{}", furlongs)
}

/// Canonical furlong value of `raw` as text.
///
/// Plain decimals are returned unchanged. Unrecognized tokens contribute
/// nothing and are reported through a warning.
pub fn convert_distance(raw: &str) -> String {
    let text = raw.trim();
    if plain_decimal(text).is_some() {
        return text.to_string();
    }

    let reading = read_distance(text);
    if !reading.is_clean() {
        warn!(distance = raw, ignored = ?reading.ignored, "Ignored distance tokens");
    }
    format_furlongs(reading.furlongs)
}

/// Strict conversion: fails when not a single unit segment was recognized.
pub fn parse_furlongs(raw: &str) -> Result<f64> {
    let reading = read_distance(raw);
    if reading.recognized == 0 {
        return Err(AnalysisError::parse(ParseKind::Distance, raw));
    }
    if !reading.is_clean() {
        warn!(distance = raw, ignored = ?reading.ignored, "Ignored distance tokens");
    }
    Ok(reading.furlongs)
}
