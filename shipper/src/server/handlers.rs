//! HTTP route handlers for the log server.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::metrics::Metrics;
use crate::pipeline::ShipperHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub shipper: ShipperHandle,
    pub metrics: Arc<Metrics>,
}

/// Query parameters for POST /api/v1/lines.
#[derive(Debug, Default, Deserialize)]
pub struct LinesParams {
    /// Flush the active writer once the lines are queued.
    #[serde(default)]
    pub flush: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinesResponse {
    pub status: String,
    pub accepted: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

/// Handle POST /api/v1/lines
///
/// The body is plain text; every line becomes one record, blank lines
/// included.
pub async fn handle_lines(
    State(state): State<AppState>,
    Query(params): Query<LinesParams>,
    body: String,
) -> Result<Json<LinesResponse>, ApiError> {
    let mut accepted = 0;
    for line in body.lines() {
        state.shipper.log(line)?;
        accepted += 1;
    }

    if params.flush {
        state.shipper.flush().await?;
    }

    Ok(Json(LinesResponse {
        status: "success".to_string(),
        accepted,
    }))
}

/// Handle POST /api/v1/flush
///
/// Returns once every line accepted before the request has been delivered.
pub async fn handle_flush(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.shipper.flush().await?;
    Ok(Json(StatusResponse {
        status: "success".to_string(),
    }))
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle GET /-/healthy
///
/// Returns 200 OK if the service is running.
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /-/ready
///
/// Returns 200 OK while the shipper accepts records.
pub async fn handle_ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.shipper.is_open() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}
