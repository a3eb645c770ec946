//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date.
//! Every statement is `IF NOT EXISTS`, so initialization is idempotent and
//! safe to run on each start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (creating if needed) the database at `db_path` and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys and busy timeout are per-connection pragmas, so they go
    // into the connect options rather than a one-off query.
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index used by the deces services
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_deces_table(pool).await?;
    create_import_runs_table(pool).await?;
    create_import_errors_table(pool).await?;

    // Geographic reference data, loaded by external tooling and only read here
    create_reference_tables(pool).await?;

    info!("Database schema initialized");
    Ok(())
}

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Death registrations, keyed by (death date, death place, death act)
pub async fn create_deces_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deces (
            death_date TEXT NOT NULL,
            death_place_code TEXT NOT NULL,
            death_act TEXT NOT NULL,
            surname TEXT,
            given_names TEXT,
            sex TEXT NOT NULL CHECK (sex IN ('1', '2')),
            birth_date TEXT,
            birth_place_code TEXT,
            birth_place_name TEXT,
            birth_country_name TEXT,
            PRIMARY KEY (death_date, death_place_code, death_act)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (name, column) in [
        ("idx_deces_surname", "surname"),
        ("idx_deces_given_names", "given_names"),
        ("idx_deces_birth_date", "birth_date"),
        ("idx_deces_death_date", "death_date"),
        ("idx_deces_birth_place_name", "birth_place_name"),
    ] {
        let sql = format!("CREATE INDEX IF NOT EXISTS {} ON deces({})", name, column);
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

/// Import run tracking
///
/// The partial unique index over (inner_filename, content_hash) is the dedup
/// ledger: at most one completed or in-flight run may hold a given content.
/// Failed runs drop out of the index so the same content can be retried.
/// Runs without a hash yet (NULL) never conflict.
pub async fn create_import_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            zip_url TEXT NOT NULL,
            zip_filename TEXT NOT NULL,
            inner_filename TEXT,
            content_hash TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'downloading', 'checking', 'processing', 'completed', 'failed')),
            records_processed INTEGER NOT NULL DEFAULT 0,
            total_records INTEGER,
            error_message TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_import_runs_content
        ON import_runs(inner_filename, content_hash)
        WHERE status != 'failed'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_runs_status ON import_runs(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Quarantined rows, owned by (and deleted with) their import run
pub async fn create_import_errors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_run_id INTEGER NOT NULL REFERENCES import_runs(id) ON DELETE CASCADE,
            row_number INTEGER,
            raw_payload TEXT NOT NULL,
            reason TEXT NOT NULL,
            reason_kind TEXT NOT NULL CHECK (reason_kind IN ('parse', 'validation')),
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            surname TEXT,
            given_names TEXT,
            sex TEXT,
            birth_date TEXT,
            birth_place_code TEXT,
            birth_place_name TEXT,
            birth_country_name TEXT,
            death_date TEXT,
            death_place_code TEXT,
            death_act TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_errors_run ON import_errors(import_run_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_errors_resolved ON import_errors(resolved)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Regions, departments, communes and countries (COG reference data)
pub async fn create_reference_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS regions (
            reg TEXT PRIMARY KEY,
            libelle TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departements (
            dep TEXT PRIMARY KEY,
            reg TEXT REFERENCES regions(reg),
            libelle TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Associated and delegated communes share the code of their parent,
    // so `com` is indexed but not unique.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS communes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            typecom TEXT NOT NULL DEFAULT 'COM',
            com TEXT NOT NULL,
            dep TEXT,
            reg TEXT,
            libelle TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_communes_com ON communes(com)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cog TEXT NOT NULL,
            actual TEXT NOT NULL DEFAULT '1',
            libcog TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pays_cog ON pays(cog)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Read a raw setting value; `None` when missing or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value.flatten())
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
