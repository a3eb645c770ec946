//! Import run persistence
//!
//! The `import_runs` table doubles as the dedup ledger: the partial unique
//! index on (inner_filename, content_hash) refuses a second live run for the
//! same content.

use chrono::{DateTime, Utc};
use deces_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::models::{failure_message, ImportRun, RunStatus};

const RUN_COLUMNS: &str = r#"
    id, zip_url, zip_filename, inner_filename, content_hash, status,
    records_processed, total_records, error_message, started_at, completed_at
"#;

/// Aggregate progress over completed and processing runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub records_processed: u64,
    pub total_records: u64,
}

/// Insert a new run in `status` and return it
pub async fn create_run(
    pool: &SqlitePool,
    zip_url: &str,
    zip_filename: &str,
    inner_filename: Option<&str>,
    status: RunStatus,
) -> Result<ImportRun> {
    let started_at = Utc::now();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO import_runs (zip_url, zip_filename, inner_filename, status, started_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(zip_url)
    .bind(zip_filename)
    .bind(inner_filename)
    .bind(status.as_str())
    .bind(started_at.to_rfc3339())
    .fetch_one(pool)
    .await?;

    Ok(ImportRun {
        id,
        zip_url: zip_url.to_string(),
        zip_filename: zip_filename.to_string(),
        inner_filename: inner_filename.map(str::to_string),
        content_hash: None,
        status,
        records_processed: 0,
        total_records: None,
        error_message: None,
        started_at,
        completed_at: None,
    })
}

pub async fn load_run(pool: &SqlitePool, run_id: i64) -> Result<Option<ImportRun>> {
    let sql = format!("SELECT {} FROM import_runs WHERE id = ?", RUN_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(run_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(run_from_row).transpose()
}

/// Most recent runs first
pub async fn list_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<ImportRun>> {
    let sql = format!(
        "SELECT {} FROM import_runs ORDER BY started_at DESC, id DESC LIMIT ?",
        RUN_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(limit).fetch_all(pool).await?;

    rows.iter().map(run_from_row).collect()
}

/// Persist status, error message and completion time of `run`
pub async fn save_status(pool: &SqlitePool, run: &ImportRun) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE import_runs
        SET status = ?, error_message = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(run.status.as_str())
    .bind(&run.error_message)
    .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
    .bind(run.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Import run {}", run.id)));
    }
    Ok(())
}

pub async fn update_progress(pool: &SqlitePool, run_id: i64, records_processed: u64) -> Result<()> {
    sqlx::query("UPDATE import_runs SET records_processed = ? WHERE id = ?")
        .bind(records_processed as i64)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_total_records(pool: &SqlitePool, run_id: i64, total_records: u64) -> Result<()> {
    sqlx::query("UPDATE import_runs SET total_records = ? WHERE id = ?")
        .bind(total_records as i64)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Write the content hash onto a run
///
/// Fails with a unique violation (`Error::is_unique_violation`) when another
/// live run already holds the same (inner file, hash).
pub async fn set_content_hash(pool: &SqlitePool, run_id: i64, content_hash: &str) -> Result<()> {
    sqlx::query("UPDATE import_runs SET content_hash = ? WHERE id = ?")
        .bind(content_hash)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove a run and, by cascade, its quarantined errors
pub async fn delete_run(pool: &SqlitePool, run_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM import_runs WHERE id = ?")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// True if a completed or in-flight run already holds this content
pub async fn is_already_imported(
    pool: &SqlitePool,
    inner_filename: &str,
    content_hash: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM import_runs
        WHERE inner_filename = ? AND content_hash = ? AND status != 'failed'
        "#,
    )
    .bind(inner_filename)
    .bind(content_hash)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn import_stats(pool: &SqlitePool) -> Result<ImportStats> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(records_processed), 0) AS processed,
               COALESCE(SUM(total_records), 0) AS total
        FROM import_runs
        WHERE status IN ('completed', 'processing')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ImportStats {
        records_processed: row.get::<i64, _>("processed").max(0) as u64,
        total_records: row.get::<i64, _>("total").max(0) as u64,
    })
}

/// Mark a run failed without going through the state machine
///
/// Terminal runs are left alone; returns whether a row changed.
pub async fn force_failed(pool: &SqlitePool, run_id: i64, message: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_runs
        SET status = 'failed', error_message = ?, completed_at = ?
        WHERE id = ? AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(failure_message(message))
    .bind(Utc::now().to_rfc3339())
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Fail every non-terminal run started more than `older_than` ago
///
/// Returns the ids of the runs that were failed.
pub async fn fail_stale_runs(pool: &SqlitePool, older_than: Duration) -> Result<Vec<i64>> {
    let threshold = chrono::Duration::from_std(older_than)
        .map_err(|e| Error::InvalidInput(format!("Stale run threshold out of range: {}", e)))?;
    let cutoff = Utc::now() - threshold;

    let sql = format!(
        "SELECT {} FROM import_runs WHERE status NOT IN ('completed', 'failed')",
        RUN_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let message = failure_message(&format!(
        "Interrupted: run exceeded {}s without reaching a terminal state",
        older_than.as_secs()
    ));

    let mut failed = Vec::new();
    for row in &rows {
        let mut run = run_from_row(row)?;
        if run.started_at >= cutoff {
            continue;
        }
        if run.transition_to(RunStatus::Failed).is_none() {
            continue;
        }
        run.error_message = Some(message.clone());
        save_status(pool, &run).await?;
        failed.push(run.id);
    }

    Ok(failed)
}

fn run_from_row(row: &SqliteRow) -> Result<ImportRun> {
    let status: String = row.get("status");
    let status: RunStatus = status.parse().map_err(Error::Internal)?;

    let started_at: String = row.get("started_at");
    let started_at = parse_timestamp(&started_at, "started_at")?;

    let completed_at: Option<String> = row.get("completed_at");
    let completed_at = completed_at
        .map(|s| parse_timestamp(&s, "completed_at"))
        .transpose()?;

    let total_records: Option<i64> = row.get("total_records");

    Ok(ImportRun {
        id: row.get("id"),
        zip_url: row.get("zip_url"),
        zip_filename: row.get("zip_filename"),
        inner_filename: row.get("inner_filename"),
        content_hash: row.get("content_hash"),
        status,
        records_processed: row.get::<i64, _>("records_processed").max(0) as u64,
        total_records: total_records.map(|t| t.max(0) as u64),
        error_message: row.get("error_message"),
        started_at,
        completed_at,
    })
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
