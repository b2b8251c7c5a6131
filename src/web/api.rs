use crate::geoip::{enrich_from_header, Enricher};
use crate::pipeline::{PipelineStats, ReportSender, StatsSnapshot};
use crate::report::{ClientReport, Enrichment, Report};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Shared state for the report API
pub struct AppState {
    pub sender: ReportSender,
    pub enricher: Arc<dyn Enricher>,
    /// Header the fronting proxy puts the client address in
    pub ip_header: HeaderName,
    pub stats: Arc<PipelineStats>,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub pipeline: StatsSnapshot,
}

/// POST /api/v1/report
pub async fn post_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let events: ClientReport = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, bytes = body.len(), "Rejected malformed report");
        ApiError::BadRequest
    })?;

    let enrichment = match headers.get(&state.ip_header).map(|v| v.to_str()) {
        Some(Ok(ip)) if !ip.is_empty() => enrich_from_header(state.enricher.as_ref(), ip),
        _ => Enrichment::none(),
    };

    let report = Report::new(events, enrichment, Utc::now());
    state.sender.submit(report).await;

    Ok(Json(serde_json::json!({})))
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pipeline: state.stats.snapshot(),
    })
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

// Error handling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request")]
    BadRequest,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
