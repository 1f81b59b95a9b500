//! API route handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::pipeline::{run_analysis, AnalysisContext, AnalysisOutcome, AnalysisRequest};
use crate::predictions::{get_predictions, PredictionRequest, PredictionResponse};
use crate::results::{reconcile_result, ResultRequest, ResultResponse};
use crate::storage::MeetingStore;
use crate::types::{ErrorResponse, EventsQuery, EventsResponse, HealthResponse};

/// Application state shared across handlers.
pub struct AppState {
    pub context: Arc<AnalysisContext>,
    pub config: AppConfig,
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(_) | AnalysisError::Parse { .. } => {
                ApiError::bad_request(err.to_string())
            }
            AnalysisError::NotFound(_) => ApiError::not_found(err.to_string()),
            AnalysisError::Storage(_) | AnalysisError::Config(_) => {
                tracing::error!("Request failed: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Run blocking store work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/racing/events", get(events))
        .route("/racing/analysis", post(analysis))
        .route("/racing/predictions", post(predictions))
        .route("/racing/results", post(results));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Events and race times for a date.
pub async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let context = state.context.clone();
    let date = query.date;
    let events = blocking(move || context.store().events_for_date(date)).await?;
    Ok(Json(EventsResponse {
        event_date: date,
        events,
    }))
}

/// Score, persist and rank the runners of a date.
pub async fn analysis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalysisRequest>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let context = state.context.clone();
    let outcome = blocking(move || run_analysis(&context, &req)).await?;
    Ok(Json(outcome))
}

/// Top stored selections for a date.
pub async fn predictions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let context = state.context.clone();
    let response =
        blocking(move || get_predictions(context.store(), context.tunables(), &req)).await?;
    Ok(Json(response))
}

/// Record a race result against a stored selection.
pub async fn results(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResultRequest>,
) -> Result<Json<ResultResponse>, ApiError> {
    let context = state.context.clone();
    let response =
        blocking(move || reconcile_result(context.store(), context.tunables(), &req)).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{context, store_with_card};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState {
            context: Arc::new(context(store_with_card())),
            config: AppConfig::default(),
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AnalysisError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AnalysisError::parse(crate::error::ParseKind::Odds, "x"), StatusCode::BAD_REQUEST),
            (AnalysisError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AnalysisError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AnalysisError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_events() {
        let response = app()
            .oneshot(
                Request::get("/api/v1/racing/events?date=2024-06-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["events"][0]["event_name"], "Ascot");
        assert_eq!(json["events"][0]["event_times"], "14:00,15:30");
    }

    #[tokio::test]
    async fn test_analysis_and_top_n_validation() {
        let app = app();
        let ok = app
            .clone()
            .oneshot(post_json("/api/v1/racing/analysis", r#"{"event_date": "2024-06-01"}"#))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let json = body_json(ok).await;
        assert_eq!(json["persisted"], 2);
        assert_eq!(json["strategy"], "deterministic");

        let bad = app
            .oneshot(post_json(
                "/api/v1/racing/analysis",
                r#"{"event_date": "2024-06-01", "top_n": 5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_results_for_unknown_selection() {
        let response = app()
            .oneshot(post_json(
                "/api/v1/racing/results",
                r#"{"event_date": "2024-06-01", "selection_id": 42, "position": "1", "price": "2/1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
