//! Archive submission, run status and statistics
//!
//! Submission only validates the URL and returns 202; the import runs in a
//! background task and its outcome is read back through the status routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use deces_common::events::ImportEvent;
use serde::{Deserialize, Serialize};

use crate::db::runs;
use crate::error::{ApiError, ApiResult};
use crate::models::{ImportRun, RunStatus};
use crate::services::filename_from_url;
use crate::AppState;

/// POST /import body
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub url: String,
    /// Defaults to the last URL segment
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportAccepted {
    pub accepted: bool,
    pub message: String,
    pub zip_filename: String,
}

/// GET /import/:id/status response
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_processed: u64,
    pub total_records: Option<u64>,
    pub percentage: f64,
    pub error_message: Option<String>,
    pub zip_filename: String,
    pub inner_filename: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ImportRun> for RunStatusResponse {
    fn from(run: ImportRun) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            records_processed: run.records_processed,
            total_records: run.total_records,
            percentage: run.percentage(),
            error_message: run.error_message,
            zip_filename: run.zip_filename,
            inner_filename: run.inner_filename,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub records_processed: u64,
    pub total_records: u64,
    pub percentage: f64,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

/// Validate a submitted URL and derive the archive filename
pub fn validate_submission(
    request: &ImportRequest,
    trusted_prefix: &str,
) -> Result<String, ApiError> {
    let url = request.url.trim();

    if !url.starts_with(trusted_prefix) {
        return Err(ApiError::BadRequest(format!(
            "URL must start with {}",
            trusted_prefix
        )));
    }
    if !url.to_ascii_lowercase().ends_with(".zip") {
        return Err(ApiError::BadRequest("URL must point to a .zip archive".to_string()));
    }

    let filename = match request.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => filename_from_url(url)
            .ok_or_else(|| ApiError::BadRequest("Cannot derive a filename from the URL".to_string()))?,
    };

    if filename.contains('/') || filename.contains('\\') {
        return Err(ApiError::BadRequest(format!("Invalid filename: {}", filename)));
    }

    Ok(filename)
}

/// POST /import
pub async fn submit_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<ImportAccepted>)> {
    let zip_filename = validate_submission(&request, &state.config.trusted_url_prefix)?;
    let zip_url = request.url.trim().to_string();

    tracing::info!(zip_filename = %zip_filename, url = %zip_url, "Archive submitted");

    state.event_bus.emit_lossy(ImportEvent::ArchiveSubmitted {
        zip_url: zip_url.clone(),
        zip_filename: zip_filename.clone(),
        timestamp: Utc::now(),
    });

    let pipeline = state.pipeline.clone();
    let last_error = state.last_error.clone();
    let task_filename = zip_filename.clone();

    tokio::spawn(async move {
        tracing::info!(zip_filename = %task_filename, "Background import task started");

        match pipeline.run_archive(&zip_url, &task_filename).await {
            Ok(report) => {
                tracing::info!(
                    zip_filename = %task_filename,
                    completed = report.completed(),
                    skipped = report.skipped(),
                    failed = report.failed(),
                    "Background import task finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    zip_filename = %task_filename,
                    error = %e,
                    "Background import task failed"
                );
                *last_error.write().await = Some(format!("{}: {}", task_filename, e));
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportAccepted {
            accepted: true,
            message: "Import started".to_string(),
            zip_filename,
        }),
    ))
}

/// GET /import/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<RunStatusResponse>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let runs = runs::list_runs(&state.db, limit).await?;
    Ok(Json(runs.into_iter().map(RunStatusResponse::from).collect()))
}

/// GET /import/:id/status
pub async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<RunStatusResponse>> {
    let run = runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Import run not found: {}", run_id)))?;

    tracing::debug!(run_id, status = %run.status, "Status query");

    Ok(Json(run.into()))
}

/// GET /import/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = runs::import_stats(&state.db).await?;
    let percentage = if stats.total_records > 0 {
        stats.records_processed as f64 / stats.total_records as f64 * 100.0
    } else {
        0.0
    };

    Ok(Json(StatsResponse {
        records_processed: stats.records_processed,
        total_records: stats.total_records,
        percentage,
    }))
}

pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import", post(submit_import))
        .route("/import/runs", get(list_runs))
        .route("/import/stats", get(get_stats))
        .route("/import/:id/status", get(get_run_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TRUSTED_URL_PREFIX;

    fn request(url: &str) -> ImportRequest {
        ImportRequest {
            url: url.to_string(),
            filename: None,
        }
    }

    #[test]
    fn test_trusted_url_accepted() {
        let name = validate_submission(
            &request("https://www.insee.fr/fr/statistiques/fichier/4190491/Deces_2024_M01.zip"),
            DEFAULT_TRUSTED_URL_PREFIX,
        )
        .unwrap();
        assert_eq!(name, "Deces_2024_M01.zip");
    }

    #[test]
    fn test_untrusted_or_non_zip_rejected() {
        for url in [
            "https://example.com/fr/statistiques/fichier/1/a.zip",
            "https://www.insee.fr/fr/statistiques/fichier/1/a.csv",
            "http://www.insee.fr/fr/statistiques/fichier/1/a.zip",
        ] {
            assert!(
                validate_submission(&request(url), DEFAULT_TRUSTED_URL_PREFIX).is_err(),
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_explicit_filename_wins() {
        let mut req = request("https://www.insee.fr/fr/statistiques/fichier/1/a.zip");
        req.filename = Some("deces-2024.zip".to_string());
        assert_eq!(
            validate_submission(&req, DEFAULT_TRUSTED_URL_PREFIX).unwrap(),
            "deces-2024.zip"
        );

        req.filename = Some("../etc/passwd".to_string());
        assert!(validate_submission(&req, DEFAULT_TRUSTED_URL_PREFIX).is_err());
    }
}
