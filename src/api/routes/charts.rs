//! Chart Routes
//!
//! The query facade: validates span/limit/group, passes through to the chart
//! engine, and returns the gap-filled series unmodified.
//!
//! - GET /api/v1/charts/notes/:user_id - Per-user note activity
//! - GET /api/v1/charts/federation - Instance-wide federation activity
//! - GET /api/v1/charts/drive/:user_id - Per-user drive usage

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::ChartQuery;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::chart::charts::{FederationPayload, PerUserDrivePayload, PerUserNotesPayload};
use crate::chart::MAX_CHART_LIMIT;

/// GET /api/v1/charts/notes/:user_id
pub async fn per_user_notes(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Vec<PerUserNotesPayload>>> {
    let user_id = validate_group(&user_id)?;
    validate_limit(query.limit)?;

    let series = state
        .charts
        .notes
        .get_chart(query.span, query.limit, user_id)
        .await?;

    Ok(Json(series))
}

/// GET /api/v1/charts/federation
pub async fn federation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Vec<FederationPayload>>> {
    validate_limit(query.limit)?;

    let series = state
        .charts
        .federation
        .get_chart(query.span, query.limit)
        .await?;

    Ok(Json(series))
}

/// GET /api/v1/charts/drive/:user_id
pub async fn per_user_drive(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Vec<PerUserDrivePayload>>> {
    let user_id = validate_group(&user_id)?;
    validate_limit(query.limit)?;

    let series = state
        .charts
        .drive
        .get_chart(query.span, query.limit, user_id)
        .await?;

    Ok(Json(series))
}

/// Bounds-check the requested series length.
fn validate_limit(limit: usize) -> ApiResult<()> {
    if limit < 1 || limit > MAX_CHART_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_CHART_LIMIT
        )));
    }
    Ok(())
}

/// Map the external grouping identifier to the internal group key.
fn validate_group(user_id: &str) -> ApiResult<&str> {
    if user_id.is_empty() || user_id.len() > 128 {
        return Err(ApiError::Validation(
            "user id must be between 1 and 128 characters".to_string(),
        ));
    }
    Ok(user_id)
}
