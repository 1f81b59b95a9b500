//! API request and response types not owned by a core module.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::storage::EventSummary;

/// Query string of the events listing
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub date: NaiveDate,
}

/// Events of one date with their race times
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub event_date: NaiveDate,
    pub events: Vec<EventSummary>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
