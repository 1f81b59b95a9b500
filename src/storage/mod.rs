//! SQLite storage for meetings, scraped form and analysis results.
//!
//! The core talks to storage only through the traits in [`stores`];
//! [`SqliteStore`] implements all of them over one connection.

pub mod repository;
pub mod schema;
pub mod stores;

pub use repository::{AnalysisRecord, EventSummary, RaceOutcome, Runner, SqliteStore};
pub use schema::create_tables;
pub use stores::{AnalysisStore, ConfigStore, FormProvider, FormStore, MeetingStore, PredictionFilter};
