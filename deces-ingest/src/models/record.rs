//! Decoded death registration

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sex code of the extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "1")]
    Male,
    #[serde(rename = "2")]
    Female,
}

impl Sex {
    /// Parse the one-character code; anything but `1` or `2` is rejected
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Sex::Male),
            "2" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Sex::Male => "1",
            Sex::Female => "2",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Five-character geographic code (commune COG, or `99xxx` country code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceCode(String);

impl PlaceCode {
    pub const WIDTH: usize = 5;

    /// Normalize a raw code: trimmed, left-zero-padded to five characters
    ///
    /// Returns `None` for empty input, codes longer than five characters, or
    /// codes containing anything but ASCII letters and digits (Corsican
    /// communes use `2A`/`2B`).
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().trim_matches('"').trim();
        if code.is_empty()
            || code.len() > Self::WIDTH
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        Some(PlaceCode(format!(
            "{:0>width$}",
            code.to_ascii_uppercase(),
            width = Self::WIDTH
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `99` prefix: the code lives in the foreign-country space, not a commune
    pub fn is_foreign(&self) -> bool {
        self.0.starts_with("99")
    }
}

impl fmt::Display for PlaceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one death registration; storage primary key and upsert target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub death_date: NaiveDate,
    pub death_place_code: PlaceCode,
    pub death_act: String,
}

/// Canonical decoded row, ready for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub surname: Option<String>,
    pub given_names: Option<String>,
    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
    pub birth_place_code: Option<PlaceCode>,
    pub birth_place_name: Option<String>,
    pub birth_country_name: Option<String>,
    pub death_date: NaiveDate,
    pub death_place_code: PlaceCode,
    pub death_act: String,
}

impl NormalizedRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            death_date: self.death_date,
            death_place_code: self.death_place_code.clone(),
            death_act: self.death_act.clone(),
        }
    }
}

/// Best-effort field extraction of a rejected row
///
/// Only ever displayed or stored as quarantine corrections, never persisted
/// as a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub surname: Option<String>,
    pub given_names: Option<String>,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub birth_place_code: Option<PlaceCode>,
    pub birth_place_name: Option<String>,
    pub birth_country_name: Option<String>,
    pub death_date: Option<NaiveDate>,
    pub death_place_code: Option<PlaceCode>,
    pub death_act: Option<String>,
}

impl From<NormalizedRecord> for PartialRecord {
    fn from(record: NormalizedRecord) -> Self {
        Self {
            surname: record.surname,
            given_names: record.given_names,
            sex: Some(record.sex),
            birth_date: record.birth_date,
            birth_place_code: record.birth_place_code,
            birth_place_name: record.birth_place_name,
            birth_country_name: record.birth_country_name,
            death_date: Some(record.death_date),
            death_place_code: Some(record.death_place_code),
            death_act: Some(record.death_act),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_code_padding() {
        assert_eq!(PlaceCode::parse("75101").unwrap().as_str(), "75101");
        assert_eq!(PlaceCode::parse("1053").unwrap().as_str(), "01053");
        assert_eq!(PlaceCode::parse("\"2a004\"").unwrap().as_str(), "2A004");
        assert_eq!(PlaceCode::parse("  7 ").unwrap().as_str(), "00007");
    }

    #[test]
    fn test_place_code_rejects_garbage() {
        assert!(PlaceCode::parse("").is_none());
        assert!(PlaceCode::parse("123456").is_none());
        assert!(PlaceCode::parse("75-01").is_none());
    }

    #[test]
    fn test_foreign_classification() {
        assert!(PlaceCode::parse("99352").unwrap().is_foreign());
        assert!(!PlaceCode::parse("75101").unwrap().is_foreign());
        // Padding happens before classification
        assert!(!PlaceCode::parse("9935").unwrap().is_foreign());
    }

    #[test]
    fn test_sex_codes() {
        assert_eq!(Sex::from_code("1"), Some(Sex::Male));
        assert_eq!(Sex::from_code("2"), Some(Sex::Female));
        assert_eq!(Sex::from_code("0"), None);
        assert_eq!(Sex::from_code("M"), None);
        assert_eq!(serde_json::to_string(&Sex::Female).unwrap(), "\"2\"");
    }
}
