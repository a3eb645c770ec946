//! Row decoding and validation
//!
//! One rule set serves three callers: the import loop (`decode`, first
//! failure wins), quarantine display (`decode_lenient`, every field it can
//! get) and quarantine replay (`validate_corrected`, operator-entered
//! values). Rules are evaluated in a fixed order so the reported reason for
//! a given row never changes between runs.

use chrono::NaiveDate;
use thiserror::Error;

use super::date::{parse_corrected_date, parse_insee_date, InvalidDate};
use super::place::decode_place;
use crate::models::{
    CorrectedFields, NormalizedRecord, PartialRecord, PlaceCode, RawRow, RejectionKind, Sex,
};

/// Why a row cannot become a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("ParseError: malformed name field (no '*' separator): {value}")]
    MalformedName { value: String },

    #[error("ValidationError: invalid sex '{value}' (expected 1 or 2)")]
    InvalidSex { value: String },

    #[error("ValidationError: invalid date in {field}: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("ValidationError: missing death date")]
    MissingDeathDate,

    #[error("ValidationError: invalid place code in {field}: '{value}'")]
    InvalidPlaceCode { field: &'static str, value: String },

    #[error("ValidationError: missing death place")]
    MissingDeathPlace,

    #[error("ValidationError: missing death act")]
    MissingDeathAct,
}

impl RowRejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            RowRejection::MalformedName { .. } => RejectionKind::Parse,
            _ => RejectionKind::Validation,
        }
    }
}

/// Result of a best-effort decode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LenientDecode {
    pub partial: PartialRecord,
    /// Every rule the row breaks, in evaluation order
    pub rejections: Vec<RowRejection>,
}

impl LenientDecode {
    pub fn is_valid(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Decode a row into a record, or report the first rule it breaks
pub fn decode(raw: &RawRow) -> Result<NormalizedRecord, RowRejection> {
    let LenientDecode {
        partial,
        mut rejections,
    } = decode_lenient(raw);

    if rejections.is_empty() {
        complete(partial)
    } else {
        Err(rejections.swap_remove(0))
    }
}

/// Decode every field that can be decoded, collecting all rejections
pub fn decode_lenient(raw: &RawRow) -> LenientDecode {
    let mut out = LenientDecode::default();

    // 1. name
    match split_name(raw.nomprenom.as_deref()) {
        Ok((surname, given_names)) => {
            out.partial.surname = surname;
            out.partial.given_names = given_names;
        }
        Err(rejection) => out.rejections.push(rejection),
    }

    // 2. sex
    match decode_sex(raw.sexe.as_deref()) {
        Ok(sex) => out.partial.sex = Some(sex),
        Err(rejection) => out.rejections.push(rejection),
    }

    // 3. dates, 4. death date mandatory
    let birth = checked_date("datenaiss", raw.datenaiss.as_deref(), parse_insee_date);
    let death = checked_date("datedeces", raw.datedeces.as_deref(), parse_insee_date);
    collect_dates(&mut out, birth, death);

    // 5. places, 6. natural key
    let birth_place = checked_place("lieunaiss", raw.lieunaiss.as_deref());
    let death_place = checked_place("lieudeces", raw.lieudeces.as_deref());
    collect_places(&mut out, birth_place, death_place);

    out.partial.birth_place_name = text(raw.commnaiss.as_deref());
    out.partial.birth_country_name = text(raw.paysnaiss.as_deref());

    match text(raw.actedeces.as_deref()) {
        Some(act) => out.partial.death_act = Some(act),
        None => out.rejections.push(RowRejection::MissingDeathAct),
    }

    out
}

/// Validate operator corrections with the import rules
///
/// Names are taken as entered (no `*` marker involved); dates may be ISO or
/// packed.
pub fn validate_corrected(fields: &CorrectedFields) -> Result<NormalizedRecord, RowRejection> {
    let mut out = LenientDecode::default();
    out.partial.surname = text(fields.surname.as_deref());
    out.partial.given_names = text(fields.given_names.as_deref());

    match decode_sex(fields.sex.as_deref()) {
        Ok(sex) => out.partial.sex = Some(sex),
        Err(rejection) => out.rejections.push(rejection),
    }

    let birth = checked_date("birth_date", fields.birth_date.as_deref(), parse_corrected_date);
    let death = checked_date("death_date", fields.death_date.as_deref(), parse_corrected_date);
    collect_dates(&mut out, birth, death);

    let birth_place = checked_place("birth_place_code", fields.birth_place_code.as_deref());
    let death_place = checked_place("death_place_code", fields.death_place_code.as_deref());
    collect_places(&mut out, birth_place, death_place);

    out.partial.birth_place_name = text(fields.birth_place_name.as_deref());
    out.partial.birth_country_name = text(fields.birth_country_name.as_deref());

    match text(fields.death_act.as_deref()) {
        Some(act) => out.partial.death_act = Some(act),
        None => out.rejections.push(RowRejection::MissingDeathAct),
    }

    match out.rejections.into_iter().next() {
        Some(first) => Err(first),
        None => complete(out.partial),
    }
}

fn complete(partial: PartialRecord) -> Result<NormalizedRecord, RowRejection> {
    let PartialRecord {
        surname,
        given_names,
        sex,
        birth_date,
        birth_place_code,
        birth_place_name,
        birth_country_name,
        death_date,
        death_place_code,
        death_act,
    } = partial;

    let sex = sex.ok_or_else(|| RowRejection::InvalidSex {
        value: String::new(),
    })?;
    let death_date = death_date.ok_or(RowRejection::MissingDeathDate)?;
    let death_place_code = death_place_code.ok_or(RowRejection::MissingDeathPlace)?;
    let death_act = death_act.ok_or(RowRejection::MissingDeathAct)?;

    Ok(NormalizedRecord {
        surname,
        given_names,
        sex,
        birth_date,
        birth_place_code,
        birth_place_name,
        birth_country_name,
        death_date,
        death_place_code,
        death_act,
    })
}

/// `SURNAME*GIVEN NAMES/` → (surname, given names)
fn split_name(raw: Option<&str>) -> Result<(Option<String>, Option<String>), RowRejection> {
    let value = raw.unwrap_or_default();
    let trimmed = value.trim().trim_matches(|c: char| c == '"' || c == '/');

    match trimmed.split_once('*') {
        Some((surname, given)) => Ok((name_part(surname), name_part(given))),
        None => Err(RowRejection::MalformedName {
            value: value.to_string(),
        }),
    }
}

fn name_part(part: &str) -> Option<String> {
    let cleaned = part
        .trim()
        .trim_matches(|c: char| c == '"' || c == '/')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn decode_sex(raw: Option<&str>) -> Result<Sex, RowRejection> {
    let value = raw.map(|v| v.trim_matches('"')).unwrap_or_default();
    Sex::from_code(value).ok_or_else(|| RowRejection::InvalidSex {
        value: value.to_string(),
    })
}

type DateParser = fn(Option<&str>) -> Result<Option<NaiveDate>, InvalidDate>;

fn checked_date(
    field: &'static str,
    raw: Option<&str>,
    parse: DateParser,
) -> Result<Option<NaiveDate>, RowRejection> {
    parse(raw).map_err(|InvalidDate| RowRejection::InvalidDate {
        field,
        value: raw.unwrap_or_default().to_string(),
    })
}

fn collect_dates(
    out: &mut LenientDecode,
    birth: Result<Option<NaiveDate>, RowRejection>,
    death: Result<Option<NaiveDate>, RowRejection>,
) {
    match birth {
        Ok(date) => out.partial.birth_date = date,
        Err(rejection) => out.rejections.push(rejection),
    }
    match death {
        Ok(Some(date)) => out.partial.death_date = Some(date),
        Ok(None) => out.rejections.push(RowRejection::MissingDeathDate),
        Err(rejection) => out.rejections.push(rejection),
    }
}

fn checked_place(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<PlaceCode>, RowRejection> {
    decode_place(raw).map_err(|_| RowRejection::InvalidPlaceCode {
        field,
        value: raw.unwrap_or_default().to_string(),
    })
}

fn collect_places(
    out: &mut LenientDecode,
    birth: Result<Option<PlaceCode>, RowRejection>,
    death: Result<Option<PlaceCode>, RowRejection>,
) {
    match birth {
        Ok(code) => out.partial.birth_place_code = code,
        Err(rejection) => out.rejections.push(rejection),
    }
    match death {
        Ok(Some(code)) => out.partial.death_place_code = Some(code),
        Ok(None) => out.rejections.push(RowRejection::MissingDeathPlace),
        Err(rejection) => out.rejections.push(rejection),
    }
}

fn text(raw: Option<&str>) -> Option<String> {
    let cleaned = raw?.trim().trim_matches('"').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
