//! Raw row as read from an inner file
//!
//! Fixed schema of the INSEE death extract. Every field is optional: an empty
//! (or whitespace-only) cell is absent, never an empty string. The raw row is
//! only ever consumed by the row codec and, verbatim, by the quarantine audit
//! payload.

use serde::{Deserialize, Serialize};

/// Column names of the extract, in file order
pub const COLUMNS: [&str; 9] = [
    "nomprenom",
    "sexe",
    "datenaiss",
    "lieunaiss",
    "commnaiss",
    "paysnaiss",
    "datedeces",
    "lieudeces",
    "actedeces",
];

/// One undecoded record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// `SURNAME*GIVEN NAMES/`
    pub nomprenom: Option<String>,
    pub sexe: Option<String>,
    pub datenaiss: Option<String>,
    pub lieunaiss: Option<String>,
    pub commnaiss: Option<String>,
    pub paysnaiss: Option<String>,
    pub datedeces: Option<String>,
    pub lieudeces: Option<String>,
    pub actedeces: Option<String>,
}

impl RawRow {
    /// Build a row from (column name, cell) pairs
    ///
    /// Column names are matched case-insensitively, with surrounding quotes,
    /// whitespace and a leading byte-order mark ignored. Unknown columns are
    /// dropped.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut row = RawRow::default();
        for (name, value) in pairs {
            row.set(name, value);
        }
        row
    }

    /// Set one field by column name; returns false for an unknown column
    pub fn set(&mut self, column: &str, value: &str) -> bool {
        let key = normalize_column(column);
        let slot = match key.as_str() {
            "nomprenom" => &mut self.nomprenom,
            "sexe" => &mut self.sexe,
            "datenaiss" => &mut self.datenaiss,
            "lieunaiss" => &mut self.lieunaiss,
            "commnaiss" => &mut self.commnaiss,
            "paysnaiss" => &mut self.paysnaiss,
            "datedeces" => &mut self.datedeces,
            "lieudeces" => &mut self.lieudeces,
            "actedeces" => &mut self.actedeces,
            _ => return false,
        };
        *slot = present(value);
        true
    }

    /// Audit snapshot stored with a quarantined row
    pub fn to_payload(&self) -> serde_json::Value {
        // Serializing a struct of Option<String> cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild a row from a stored audit snapshot
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

fn normalize_column(column: &str) -> String {
    column
        .trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .to_ascii_lowercase()
}

fn present(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
