//! Operator repair of quarantined rows

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::quarantine::ErrorFilter;
use crate::error::{ApiError, ApiResult};
use crate::models::{CorrectedFields, NormalizedRecord, QuarantinedError};
use crate::services::{CorrectionUpdate, ErrorDetail, ReplayOutcome};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub error_id: i64,
    pub resolved: bool,
    /// True when the error had been resolved before this call
    pub already_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<NormalizedRecord>,
}

/// GET /import/errors
pub async fn list_errors(
    State(state): State<AppState>,
    Query(filter): Query<ErrorFilter>,
) -> ApiResult<Json<Vec<QuarantinedError>>> {
    Ok(Json(state.quarantine.list(&filter).await?))
}

/// GET /import/errors/:id
pub async fn get_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
) -> ApiResult<Json<ErrorDetail>> {
    state
        .quarantine
        .describe(error_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Import error not found: {}", error_id)))
}

/// PUT /import/errors/:id
pub async fn update_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
    Json(fields): Json<CorrectedFields>,
) -> ApiResult<Json<ErrorDetail>> {
    match state.quarantine.update_corrections(error_id, &fields).await? {
        CorrectionUpdate::Updated => {
            tracing::info!(error_id, "Corrections saved");
        }
        CorrectionUpdate::AlreadyResolved => {
            return Err(ApiError::Conflict(format!(
                "Import error {} is resolved and can no longer be edited",
                error_id
            )));
        }
    }

    get_error(State(state), Path(error_id)).await
}

/// POST /import/errors/:id/retry
pub async fn retry_error(
    State(state): State<AppState>,
    Path(error_id): Path<i64>,
) -> ApiResult<Json<RetryResponse>> {
    match state.quarantine.replay(error_id).await? {
        ReplayOutcome::Resolved(record) => Ok(Json(RetryResponse {
            error_id,
            resolved: true,
            already_resolved: false,
            record: Some(record),
        })),
        ReplayOutcome::AlreadyResolved => Ok(Json(RetryResponse {
            error_id,
            resolved: true,
            already_resolved: true,
            record: None,
        })),
        ReplayOutcome::Rejected(reason) => Err(ApiError::Unprocessable(reason)),
    }
}

pub fn quarantine_routes() -> Router<AppState> {
    Router::new()
        .route("/import/errors", get(list_errors))
        .route("/import/errors/:id", get(get_error).put(update_error))
        .route("/import/errors/:id/retry", post(retry_error))
}
