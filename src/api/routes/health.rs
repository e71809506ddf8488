//! Health Routes
//!
//! - GET /health/live - Liveness probe
//! - GET /health/ready - Readiness probe
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Ready once the state (store, charts) is constructed; construction order
/// guarantees the bucket store was opened first.
pub async fn readiness(State(_state): State<Arc<AppState>>) -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let charts = state
        .charts
        .rollables()
        .iter()
        .map(|c| c.chart_name())
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        charts,
    })
}
