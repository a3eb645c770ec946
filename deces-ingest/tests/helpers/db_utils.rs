//! Database Test Utilities

use anyhow::Result;
use deces_common::events::EventBus;
use deces_ingest::config::IngestConfig;
use deces_ingest::services::PipelineOrchestrator;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

/// Temporary root folder with an initialized database
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestDb {
    pub dir: TempDir,
    pub pool: SqlitePool,
}

impl TestDb {
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// Files left behind in the work directory
    pub fn leftovers(&self) -> usize {
        std::fs::read_dir(self.work_dir()).unwrap().count()
    }
}

/// Create temporary test database with the full schema
pub async fn create_test_db() -> Result<TestDb> {
    let dir = TempDir::new()?;
    let pool = deces_ingest::db::init_database_pool(&dir.path().join("deces.db")).await?;
    Ok(TestDb { dir, pool })
}

/// Small batches and frequent progress so tests exercise both paths
pub fn test_config(trusted_url_prefix: &str) -> IngestConfig {
    IngestConfig {
        batch_size: 4,
        error_ceiling: 100,
        progress_interval: 3,
        trusted_url_prefix: trusted_url_prefix.to_string(),
        fetch_timeout_secs: 10,
        ..IngestConfig::default()
    }
}

pub fn test_pipeline(db: &TestDb, config: IngestConfig) -> PipelineOrchestrator {
    test_pipeline_with_bus(db, config, EventBus::new(100))
}

pub fn test_pipeline_with_bus(
    db: &TestDb,
    config: IngestConfig,
    event_bus: EventBus,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(db.pool.clone(), event_bus, config, db.work_dir()).unwrap()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
