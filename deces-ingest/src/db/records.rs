//! Death record persistence
//!
//! Every write is an upsert on the natural key. On conflict only the
//! birth-place columns are refreshed; the key and the identity fields of the
//! first record stay as they were.

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{Row, Sqlite, SqliteExecutor, SqlitePool};

use crate::models::{NaturalKey, NormalizedRecord, PlaceCode, Sex};

const UPSERT_SQL: &str = r#"
    INSERT INTO deces (
        surname, given_names, sex, birth_date, birth_place_code,
        birth_place_name, birth_country_name, death_date, death_place_code, death_act
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(death_date, death_place_code, death_act) DO UPDATE SET
        birth_place_code = excluded.birth_place_code,
        birth_place_name = excluded.birth_place_name,
        birth_country_name = excluded.birth_country_name
"#;

fn bind_record<'q>(record: &'q NormalizedRecord) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(UPSERT_SQL)
        .bind(&record.surname)
        .bind(&record.given_names)
        .bind(record.sex.as_code())
        .bind(record.birth_date)
        .bind(record.birth_place_code.as_ref().map(PlaceCode::as_str))
        .bind(&record.birth_place_name)
        .bind(&record.birth_country_name)
        .bind(record.death_date)
        .bind(record.death_place_code.as_str())
        .bind(&record.death_act)
}

/// Upsert a batch inside one transaction
///
/// Either every record lands or none does. Returns the number of records
/// written.
pub async fn upsert_batch(pool: &SqlitePool, records: &[NormalizedRecord]) -> sqlx::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for record in records {
        bind_record(record).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(records.len() as u64)
}

/// Upsert a single record (quarantine replay)
pub async fn upsert_one<'e, E>(executor: E, record: &NormalizedRecord) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    bind_record(record).execute(executor).await?;
    Ok(())
}

pub async fn load_record(pool: &SqlitePool, key: &NaturalKey) -> sqlx::Result<Option<NormalizedRecord>> {
    let row = sqlx::query(
        r#"
        SELECT surname, given_names, sex, birth_date, birth_place_code,
               birth_place_name, birth_country_name, death_date, death_place_code, death_act
        FROM deces
        WHERE death_date = ? AND death_place_code = ? AND death_act = ?
        "#,
    )
    .bind(key.death_date)
    .bind(key.death_place_code.as_str())
    .bind(&key.death_act)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

pub async fn count_records(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM deces")
        .fetch_one(pool)
        .await
}

fn record_from_row(row: &SqliteRow) -> sqlx::Result<NormalizedRecord> {
    let sex: String = row.try_get("sex")?;
    let sex = Sex::from_code(&sex).ok_or_else(|| decode_error("sex", &sex))?;

    let death_place: String = row.try_get("death_place_code")?;
    let death_place_code =
        PlaceCode::parse(&death_place).ok_or_else(|| decode_error("death_place_code", &death_place))?;

    let birth_place: Option<String> = row.try_get("birth_place_code")?;
    let birth_place_code = match birth_place {
        Some(code) => Some(PlaceCode::parse(&code).ok_or_else(|| decode_error("birth_place_code", &code))?),
        None => None,
    };

    let death_date: NaiveDate = row.try_get("death_date")?;

    Ok(NormalizedRecord {
        surname: row.try_get("surname")?,
        given_names: row.try_get("given_names")?,
        sex,
        birth_date: row.try_get("birth_date")?,
        birth_place_code,
        birth_place_name: row.try_get("birth_place_name")?,
        birth_country_name: row.try_get("birth_country_name")?,
        death_date,
        death_place_code,
        death_act: row.try_get("death_act")?,
    })
}

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value '{}'", value).into(),
    }
}
