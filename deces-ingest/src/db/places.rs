//! Geographic reference lookups (read only)
//!
//! `communes` and `pays` are loaded by external tooling; the ingest service
//! never writes them.

use deces_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::codec::{place_kind, PlaceKind};
use crate::models::PlaceCode;

/// Display name of a place code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceName {
    pub code: PlaceCode,
    pub kind: PlaceKind,
    pub name: String,
    /// Communes only
    pub departement: Option<String>,
    pub region: Option<String>,
}

/// Resolve a code against `communes`, or `pays` for `99xxx` codes
///
/// Commune codes are shared by associated and delegated communes; the
/// commune proper (`COM`) wins. For countries the current entry wins.
pub async fn resolve_place(pool: &SqlitePool, code: &PlaceCode) -> Result<Option<PlaceName>> {
    let kind = place_kind(code);

    let found: Option<(String, Option<String>, Option<String>)> = match kind {
        PlaceKind::Commune => {
            sqlx::query_as(
                r#"
                SELECT c.libelle, d.libelle, r.libelle
                FROM communes c
                LEFT JOIN departements d ON d.dep = c.dep
                LEFT JOIN regions r ON r.reg = c.reg
                WHERE c.com = ?
                ORDER BY CASE c.typecom WHEN 'COM' THEN 0 ELSE 1 END, c.id
                LIMIT 1
                "#,
            )
            .bind(code.as_str())
            .fetch_optional(pool)
            .await?
        }
        PlaceKind::Country => {
            sqlx::query_as(
                r#"
                SELECT libcog, NULL, NULL FROM pays
                WHERE cog = ?
                ORDER BY CASE actual WHEN '1' THEN 0 ELSE 1 END, id
                LIMIT 1
                "#,
            )
            .bind(code.as_str())
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(found.map(|(name, departement, region)| PlaceName {
        code: code.clone(),
        kind,
        name,
        departement,
        region,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = deces_common::db::init_database(&dir.path().join("deces.db"))
            .await
            .unwrap();

        sqlx::query("INSERT INTO regions (reg, libelle) VALUES ('84', 'Auvergne-Rhône-Alpes')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO departements (dep, reg, libelle) VALUES ('01', '84', 'Ain')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO communes (typecom, com, dep, reg, libelle) VALUES \
             ('COMD', '01015', '01', '84', 'Arbignieu'), \
             ('COM', '01015', '01', '84', 'Arboys en Bugey')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO pays (cog, actual, libcog) VALUES \
             ('99109', '2', 'Allemagne (ancien)'), ('99109', '1', 'Allemagne')",
        )
        .execute(&pool)
        .await
        .unwrap();

        (dir, pool)
    }

    #[tokio::test]
    async fn test_commune_proper_wins() {
        let (_dir, pool) = setup().await;
        let code = PlaceCode::parse("01015").unwrap();
        let place = resolve_place(&pool, &code).await.unwrap().unwrap();
        assert_eq!(place.kind, PlaceKind::Commune);
        assert_eq!(place.name, "Arboys en Bugey");
        assert_eq!(place.departement.as_deref(), Some("Ain"));
        assert_eq!(place.region.as_deref(), Some("Auvergne-Rhône-Alpes"));
    }

    #[tokio::test]
    async fn test_current_country_wins() {
        let (_dir, pool) = setup().await;
        let code = PlaceCode::parse("99109").unwrap();
        let place = resolve_place(&pool, &code).await.unwrap().unwrap();
        assert_eq!(place.kind, PlaceKind::Country);
        assert_eq!(place.name, "Allemagne");
        assert_eq!(place.departement, None);

        let unknown = PlaceCode::parse("99999").unwrap();
        assert_eq!(resolve_place(&pool, &unknown).await.unwrap(), None);
    }
}
