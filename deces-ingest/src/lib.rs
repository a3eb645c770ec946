//! deces-ingest library interface
//!
//! Exposes the pipeline, storage and HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, IngestError, IngestResult};

use axum::Router;
use chrono::{DateTime, Utc};
use deces_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::IngestConfig;
use crate::services::{ErrorQuarantine, PipelineOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<IngestConfig>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub quarantine: ErrorQuarantine,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background import failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: IngestConfig,
        work_dir: PathBuf,
    ) -> IngestResult<Self> {
        let pipeline =
            PipelineOrchestrator::new(db.clone(), event_bus.clone(), config.clone(), work_dir)?;

        Ok(Self {
            quarantine: ErrorQuarantine::new(db.clone(), event_bus.clone()),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            db,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::import_routes())
        .merge(api::quarantine_routes())
        .route("/import/events", get(api::import_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
