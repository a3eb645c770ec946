//! Error types for deces-ingest
//!
//! - [`FetchError`]: archive retrieval, aborts the whole archive
//! - [`IngestError`]: fatal outcomes of an archive or inner file
//! - [`ApiError`]: HTTP handler errors with a JSON envelope
//!
//! Per-row problems are [`crate::codec::RowRejection`] values and are never
//! escalated through these types; only the error ceiling and the completion
//! ratio turn them into an [`IngestError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::RunStatus;

/// Archive download failure; never retried
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("Download failed with HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Transport failure or timeout
    #[error("Download failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// Local temp file could not be created or written
    #[error("Could not store downloaded archive: {0}")]
    Write(#[from] std::io::Error),
}

/// Fatal pipeline outcome
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Too many rejected rows in one inner file
    #[error("Too many row errors: {errors} rejected rows exceed the ceiling of {ceiling}")]
    RowErrorCeilingExceeded { errors: usize, ceiling: usize },

    /// Too few rows landed for the run to count as complete
    #[error("Incomplete import: only {processed}/{total} records processed")]
    IncompleteImport { processed: u64, total: u64 },

    /// Batch flush failed
    #[error("Storage write failed: {0}")]
    StorageWrite(#[source] sqlx::Error),

    #[error("Invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Unreadable inner file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error(transparent)]
    Common(#[from] deces_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}

/// Result type for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. editing a resolved error
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request understood but the data does not validate (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// deces-common error
    #[error("Common error: {0}")]
    Common(#[from] deces_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(deces_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(deces_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
