//! Tests for database creation and schema initialization

use deces_common::db::init::{get_setting, init_database, init_schema, set_setting};
use sqlx::Row;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("deces.db");
    assert!(!db_path.exists());

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_schema_initialization_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("deces.db");

    let pool = init_database(&db_path).await.unwrap();
    init_schema(&pool).await.unwrap();
    pool.close().await;

    // Second open runs every CREATE again
    let pool = init_database(&db_path).await.unwrap();
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "communes",
        "deces",
        "departements",
        "import_errors",
        "import_runs",
        "pays",
        "regions",
        "settings",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_content_index_ignores_failed_runs() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("deces.db")).await.unwrap();

    let insert = "INSERT INTO import_runs (zip_url, zip_filename, inner_filename, content_hash, status, started_at) \
                  VALUES ('u', 'a.zip', 'f.csv', 'abc', ?, '2024-01-01T00:00:00Z')";

    sqlx::query(insert).bind("failed").execute(&pool).await.unwrap();
    sqlx::query(insert).bind("completed").execute(&pool).await.unwrap();

    // A second non-failed run with the same content is refused
    let err = sqlx::query(insert).bind("processing").execute(&pool).await.unwrap_err();
    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());

    // Runs without a hash yet never conflict
    let no_hash = "INSERT INTO import_runs (zip_url, zip_filename, status, started_at) \
                   VALUES ('u', 'a.zip', 'downloading', '2024-01-01T00:00:00Z')";
    sqlx::query(no_hash).execute(&pool).await.unwrap();
    sqlx::query(no_hash).execute(&pool).await.unwrap();
}

#[tokio::test]
async fn test_errors_cascade_with_run() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("deces.db")).await.unwrap();

    let run_id: i64 = sqlx::query(
        "INSERT INTO import_runs (zip_url, zip_filename, status, started_at) \
         VALUES ('u', 'a.zip', 'processing', '2024-01-01T00:00:00Z') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap()
    .get("id");

    sqlx::query(
        "INSERT INTO import_errors (import_run_id, raw_payload, reason, reason_kind, created_at, updated_at) \
         VALUES (?, '{}', 'bad', 'parse', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .bind(run_id)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM import_runs WHERE id = ?")
        .bind(run_id)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_errors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("deces.db")).await.unwrap();

    assert_eq!(get_setting(&pool, "ingest_batch_size").await.unwrap(), None);
    set_setting(&pool, "ingest_batch_size", "250").await.unwrap();
    set_setting(&pool, "ingest_batch_size", "500").await.unwrap();
    assert_eq!(
        get_setting(&pool, "ingest_batch_size").await.unwrap(),
        Some("500".to_string())
    );
}
