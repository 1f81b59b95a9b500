//! Clean-Bet racing analysis.
//!
//! Turns scraped race-form history into per-selection scores for an event
//! date, persists them idempotently and serves them back as predictions.

pub mod cli;
pub mod config;
pub mod distance;
pub mod error;
pub mod form;
pub mod form_sync;
pub mod persistence;
pub mod pipeline;
pub mod predictions;
pub mod preference;
pub mod ranking;
pub mod results;
pub mod routes;
pub mod scoring;
pub mod storage;
pub mod types;

pub use error::{AnalysisError, Result};
