//! Error types for the analysis core.

use std::fmt;
use thiserror::Error;

/// Which grammar a rejected string failed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseKind {
    Distance,
    Date,
    Position,
    Odds,
}

impl fmt::Display for ParseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseKind::Distance => "distance",
            ParseKind::Date => "date",
            ParseKind::Position => "position",
            ParseKind::Odds => "odds",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Malformed request input, nothing was processed
    #[error("validation error: {0}")]
    Validation(String),

    #[error("cannot parse {kind} from {input:?}")]
    Parse { kind: ParseKind, input: String },

    /// No prior history for a selection (a first observation)
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn parse(kind: ParseKind, input: impl Into<String>) -> Self {
        AnalysisError::Parse {
            kind,
            input: input.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::NotFound(_))
    }
}

impl From<rusqlite::Error> for AnalysisError {
    fn from(err: rusqlite::Error) -> Self {
        AnalysisError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = AnalysisError::parse(ParseKind::Distance, "2x");
        assert_eq!(err.to_string(), "cannot parse distance from \"2x\"");
    }

    #[test]
    fn test_storage_from_rusqlite() {
        let err: AnalysisError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AnalysisError::Storage(_)));
        assert!(!err.is_not_found());
    }
}
