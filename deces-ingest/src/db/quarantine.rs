//! Quarantined row persistence

use chrono::Utc;
use deces_common::{Error, Result};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};

use super::runs::parse_timestamp;
use crate::models::{CorrectedFields, QuarantinedError, RejectionKind};

const ERROR_COLUMNS: &str = r#"
    id, import_run_id, row_number, raw_payload, reason, reason_kind, resolved, resolved_at,
    surname, given_names, sex, birth_date, birth_place_code, birth_place_name,
    birth_country_name, death_date, death_place_code, death_act, created_at, updated_at
"#;

/// Listing filter; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorFilter {
    pub resolved: Option<bool>,
    pub run_id: Option<i64>,
    pub limit: Option<i64>,
}

/// New quarantine entry
#[derive(Debug, Clone)]
pub struct NewError<'a> {
    pub import_run_id: i64,
    pub row_number: Option<u64>,
    pub raw_payload: &'a serde_json::Value,
    pub reason: &'a str,
    pub reason_kind: RejectionKind,
    /// Pre-filled from the lenient decode
    pub corrections: &'a CorrectedFields,
}

/// Insert a quarantine entry and return its id
pub async fn insert_error(pool: &SqlitePool, new: &NewError<'_>) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let payload = serde_json::to_string(new.raw_payload)
        .map_err(|e| Error::Internal(format!("Failed to serialize raw payload: {}", e)))?;
    let c = new.corrections;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO import_errors (
            import_run_id, row_number, raw_payload, reason, reason_kind,
            surname, given_names, sex, birth_date, birth_place_code, birth_place_name,
            birth_country_name, death_date, death_place_code, death_act,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(new.import_run_id)
    .bind(new.row_number.map(|n| n as i64))
    .bind(payload)
    .bind(new.reason)
    .bind(new.reason_kind.as_str())
    .bind(&c.surname)
    .bind(&c.given_names)
    .bind(&c.sex)
    .bind(&c.birth_date)
    .bind(&c.birth_place_code)
    .bind(&c.birth_place_name)
    .bind(&c.birth_country_name)
    .bind(&c.death_date)
    .bind(&c.death_place_code)
    .bind(&c.death_act)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn load_error<'e, E>(executor: E, error_id: i64) -> Result<Option<QuarantinedError>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM import_errors WHERE id = ?", ERROR_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(error_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(error_from_row).transpose()
}

/// Newest first
pub async fn list_errors(pool: &SqlitePool, filter: &ErrorFilter) -> Result<Vec<QuarantinedError>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM import_errors
        WHERE (?1 IS NULL OR resolved = ?1)
          AND (?2 IS NULL OR import_run_id = ?2)
        ORDER BY id DESC
        LIMIT ?3
        "#,
        ERROR_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(filter.resolved)
        .bind(filter.run_id)
        .bind(filter.limit.unwrap_or(500))
        .fetch_all(pool)
        .await?;

    rows.iter().map(error_from_row).collect()
}

pub async fn count_errors(pool: &SqlitePool, run_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM import_errors WHERE import_run_id = ?")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Replace the corrected fields of an unresolved error
///
/// Returns false when the error is missing or already resolved.
pub async fn update_corrections(
    pool: &SqlitePool,
    error_id: i64,
    fields: &CorrectedFields,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_errors SET
            surname = ?, given_names = ?, sex = ?, birth_date = ?,
            birth_place_code = ?, birth_place_name = ?, birth_country_name = ?,
            death_date = ?, death_place_code = ?, death_act = ?,
            updated_at = ?
        WHERE id = ? AND resolved = 0
        "#,
    )
    .bind(&fields.surname)
    .bind(&fields.given_names)
    .bind(&fields.sex)
    .bind(&fields.birth_date)
    .bind(&fields.birth_place_code)
    .bind(&fields.birth_place_name)
    .bind(&fields.birth_country_name)
    .bind(&fields.death_date)
    .bind(&fields.death_place_code)
    .bind(&fields.death_act)
    .bind(Utc::now().to_rfc3339())
    .bind(error_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flag an error resolved; resolution is never undone
///
/// Returns false when the error was already resolved.
pub async fn mark_resolved<'e, E>(executor: E, error_id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE import_errors SET resolved = 1, resolved_at = ?, updated_at = ? WHERE id = ? AND resolved = 0",
    )
    .bind(&now)
    .bind(&now)
    .bind(error_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn error_from_row(row: &SqliteRow) -> Result<QuarantinedError> {
    let payload: String = row.get("raw_payload");
    let raw_payload = serde_json::from_str(&payload)
        .map_err(|e| Error::Internal(format!("Failed to deserialize raw payload: {}", e)))?;

    let reason_kind: String = row.get("reason_kind");
    let reason_kind: RejectionKind = reason_kind.parse().map_err(Error::Internal)?;

    let resolved_at: Option<String> = row.get("resolved_at");
    let resolved_at = resolved_at
        .map(|s| parse_timestamp(&s, "resolved_at"))
        .transpose()?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let row_number: Option<i64> = row.get("row_number");

    Ok(QuarantinedError {
        id: row.get("id"),
        import_run_id: row.get("import_run_id"),
        row_number: row_number.map(|n| n.max(0) as u64),
        raw_payload,
        reason: row.get("reason"),
        reason_kind,
        resolved: row.get::<i64, _>("resolved") != 0,
        resolved_at,
        corrections: CorrectedFields {
            surname: row.get("surname"),
            given_names: row.get("given_names"),
            sex: row.get("sex"),
            birth_date: row.get("birth_date"),
            birth_place_code: row.get("birth_place_code"),
            birth_place_name: row.get("birth_place_name"),
            birth_country_name: row.get("birth_country_name"),
            death_date: row.get("death_date"),
            death_place_code: row.get("death_place_code"),
            death_act: row.get("death_act"),
        },
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
