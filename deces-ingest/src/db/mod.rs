//! Database access for deces-ingest
//!
//! Schema lives in `deces_common::db`; this module holds the queries the
//! pipeline and the HTTP handlers run against it.

pub mod places;
pub mod quarantine;
pub mod records;
pub mod runs;

use deces_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the shared database in the root folder, creating the schema if needed
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    let pool = deces_common::db::init_database(db_path).await?;
    tracing::info!("Database ready: {}", db_path.display());
    Ok(pool)
}
