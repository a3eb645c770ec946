//! Configuration resolution for deces-ingest
//!
//! Each tunable is resolved on its own with Database → ENV → TOML → default
//! priority. A value that does not parse or is out of range is skipped with a
//! warning and the next tier is consulted.

use deces_common::config::{IngestToml, TomlConfig};
use deces_common::Result;
use sqlx::{Pool, Sqlite};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Default trusted origin for archive URLs
pub const DEFAULT_TRUSTED_URL_PREFIX: &str = "https://www.insee.fr/fr/statistiques/fichier/";

/// Pipeline tunables
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Records per upsert transaction
    pub batch_size: usize,
    /// Rejected rows tolerated per inner file before it is failed
    pub error_ceiling: usize,
    /// Rows between two persisted progress updates
    pub progress_interval: u64,
    /// Share of declared rows that must land for a run to complete
    pub completion_ratio: f64,
    /// Submitted URLs must start with this
    pub trusted_url_prefix: String,
    pub fetch_timeout_secs: u64,
    /// Fail non-terminal runs older than this at startup; `None` disables the sweep
    pub stale_run_timeout_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            error_ceiling: 100,
            progress_interval: 1000,
            completion_ratio: 0.9,
            trusted_url_prefix: DEFAULT_TRUSTED_URL_PREFIX.to_string(),
            fetch_timeout_secs: 300,
            stale_run_timeout_secs: None,
        }
    }
}

impl IngestConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn stale_run_timeout(&self) -> Option<Duration> {
        self.stale_run_timeout_secs.map(Duration::from_secs)
    }
}

/// Resolve every tunable from the database settings, environment and TOML
pub async fn resolve_ingest_config(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<IngestConfig> {
    let defaults = IngestConfig::default();
    let toml = &toml_config.ingest;

    Ok(IngestConfig {
        batch_size: resolve(db, "batch_size", toml.batch_size, defaults.batch_size, |v| *v > 0).await?,
        error_ceiling: resolve(db, "error_ceiling", toml.error_ceiling, defaults.error_ceiling, |_| true)
            .await?,
        progress_interval: resolve(
            db,
            "progress_interval",
            toml.progress_interval,
            defaults.progress_interval,
            |v| *v > 0,
        )
        .await?,
        completion_ratio: resolve(
            db,
            "completion_ratio",
            toml.completion_ratio,
            defaults.completion_ratio,
            |v| *v > 0.0 && *v <= 1.0,
        )
        .await?,
        trusted_url_prefix: resolve(
            db,
            "trusted_url_prefix",
            toml.trusted_url_prefix.clone(),
            defaults.trusted_url_prefix,
            |v: &String| v.starts_with("https://") || v.starts_with("http://"),
        )
        .await?,
        fetch_timeout_secs: resolve(
            db,
            "fetch_timeout_secs",
            toml.fetch_timeout_secs,
            defaults.fetch_timeout_secs,
            |v| *v > 0,
        )
        .await?,
        stale_run_timeout_secs: resolve_optional(db, "stale_run_timeout_secs", toml).await?,
    })
}

/// Settings table key for a tunable
pub fn setting_key(name: &str) -> String {
    format!("ingest_{}", name)
}

/// Environment variable for a tunable
pub fn env_var(name: &str) -> String {
    format!("DECES_{}", name.to_ascii_uppercase())
}

async fn resolve<T, V>(
    db: &Pool<Sqlite>,
    name: &str,
    toml_value: Option<T>,
    default: T,
    valid: V,
) -> Result<T>
where
    T: FromStr + Display,
    V: Fn(&T) -> bool,
{
    let db_value = deces_common::db::get_setting(db, &setting_key(name)).await?;
    let env_value = std::env::var(env_var(name)).ok();
    Ok(pick(name, db_value, env_value, toml_value, &valid).unwrap_or(default))
}

async fn resolve_optional(db: &Pool<Sqlite>, name: &str, toml: &IngestToml) -> Result<Option<u64>> {
    let db_value = deces_common::db::get_setting(db, &setting_key(name)).await?;
    let env_value = std::env::var(env_var(name)).ok();
    Ok(pick(name, db_value, env_value, toml.stale_run_timeout_secs, &|v: &u64| *v > 0))
}

/// First valid value by tier priority
pub fn pick<T, V>(
    name: &str,
    db_value: Option<String>,
    env_value: Option<String>,
    toml_value: Option<T>,
    valid: &V,
) -> Option<T>
where
    T: FromStr + Display,
    V: Fn(&T) -> bool,
{
    let text_tiers = [("database", db_value), ("environment", env_value)];

    for (source, raw) in text_tiers {
        let Some(raw) = raw else { continue };
        if raw.trim().is_empty() {
            continue;
        }
        match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => {
                info!("{} = {} (from {})", name, value, source);
                return Some(value);
            }
            _ => warn!("Ignoring invalid {} value for {}: '{}'", source, name, raw),
        }
    }

    if let Some(value) = toml_value {
        if valid(&value) {
            info!("{} = {} (from TOML)", name, value);
            return Some(value);
        }
        warn!("Ignoring invalid TOML value for {}: '{}'", name, value);
    }

    None
}
