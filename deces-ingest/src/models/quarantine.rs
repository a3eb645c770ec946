//! Quarantined rows and operator corrections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::PartialRecord;

/// Class of a row rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionKind {
    /// Row structure could not be parsed (e.g. name field without `*`)
    Parse,
    /// Row parsed but a value breaks a domain rule
    Validation,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::Parse => "parse",
            RejectionKind::Validation => "validation",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parse" => Ok(RejectionKind::Parse),
            "validation" => Ok(RejectionKind::Validation),
            other => Err(format!("Unknown rejection kind: {}", other)),
        }
    }
}

/// Operator-editable record fields
///
/// Kept as free text so an operator can store a half-fixed row; values are
/// only validated when the error is replayed. Dates accept `YYYY-MM-DD` or
/// the packed `YYYYMMDD` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectedFields {
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub given_names: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub birth_place_code: Option<String>,
    #[serde(default)]
    pub birth_place_name: Option<String>,
    #[serde(default)]
    pub birth_country_name: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub death_place_code: Option<String>,
    #[serde(default)]
    pub death_act: Option<String>,
}

impl From<&PartialRecord> for CorrectedFields {
    fn from(partial: &PartialRecord) -> Self {
        Self {
            surname: partial.surname.clone(),
            given_names: partial.given_names.clone(),
            sex: partial.sex.map(|s| s.as_code().to_string()),
            birth_date: partial.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            birth_place_code: partial.birth_place_code.as_ref().map(|c| c.to_string()),
            birth_place_name: partial.birth_place_name.clone(),
            birth_country_name: partial.birth_country_name.clone(),
            death_date: partial.death_date.map(|d| d.format("%Y-%m-%d").to_string()),
            death_place_code: partial.death_place_code.as_ref().map(|c| c.to_string()),
            death_act: partial.death_act.clone(),
        }
    }
}

/// A row rejected by the codec, held for manual repair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedError {
    pub id: i64,
    pub import_run_id: i64,
    /// 1-based data row number within the inner file (header excluded)
    pub row_number: Option<u64>,
    /// Raw cells exactly as read
    pub raw_payload: serde_json::Value,
    pub reason: String,
    pub reason_kind: RejectionKind,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub corrections: CorrectedFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
