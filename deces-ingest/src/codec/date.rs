//! Packed INSEE dates (`YYYYMMDD`)
//!
//! `00000000` means unknown. Incomplete historical dates carry `00` as month
//! and/or day; INSEE documents reading those as the first month / first day.

use chrono::{Datelike, NaiveDate};

/// Marker for an unknown date
pub const UNKNOWN_DATE: &str = "00000000";

/// The value could not be read as a calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDate;

/// Decode a packed date
///
/// Absent, blank or all-zero input is `Ok(None)`. Surrounding quotes are
/// ignored; the value itself must be exactly eight digits.
pub fn parse_insee_date(raw: Option<&str>) -> Result<Option<NaiveDate>, InvalidDate> {
    let value = match raw.map(|v| v.trim_matches('"')) {
        None => return Ok(None),
        Some(v) if v.is_empty() || v == UNKNOWN_DATE => return Ok(None),
        Some(v) => v,
    };

    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidDate);
    }

    let year: i32 = value[0..4].parse().map_err(|_| InvalidDate)?;
    let month: u32 = value[4..6].parse().map_err(|_| InvalidDate)?;
    let day: u32 = value[6..8].parse().map_err(|_| InvalidDate)?;

    if year == 0 {
        return Err(InvalidDate);
    }

    let month = if month == 0 { 1 } else { month };
    let day = if day == 0 { 1 } else { day };

    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or(InvalidDate)
}

/// Encode a date in packed form; `None` becomes `00000000`
pub fn encode_insee_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()),
        None => UNKNOWN_DATE.to_string(),
    }
}

/// Decode an operator-entered date: ISO `YYYY-MM-DD` or packed `YYYYMMDD`
pub fn parse_corrected_date(raw: Option<&str>) -> Result<Option<NaiveDate>, InvalidDate> {
    match raw.map(clean) {
        Some(v) if v.contains('-') => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| InvalidDate),
        other => parse_insee_date(other),
    }
}

/// Operator input only; extract values are never trimmed
fn clean(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plain_date() {
        assert_eq!(parse_insee_date(Some("19500101")), Ok(Some(ymd(1950, 1, 1))));
        assert_eq!(parse_insee_date(Some("\"20231231\"")), Ok(Some(ymd(2023, 12, 31))));
    }

    #[test]
    fn test_unknown_date_is_absent() {
        assert_eq!(parse_insee_date(Some("00000000")), Ok(None));
        assert_eq!(parse_insee_date(Some("")), Ok(None));
        assert_eq!(parse_insee_date(None), Ok(None));
    }

    #[test]
    fn test_zero_month_and_day_become_first() {
        assert_eq!(parse_insee_date(Some("19850000")), Ok(Some(ymd(1985, 1, 1))));
        assert_eq!(parse_insee_date(Some("19850600")), Ok(Some(ymd(1985, 6, 1))));
        assert_eq!(parse_insee_date(Some("19850015")), Ok(Some(ymd(1985, 1, 15))));
    }

    #[test]
    fn test_impossible_dates() {
        assert_eq!(parse_insee_date(Some("19990230")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("19991301")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("00000512")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("1999011")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("1999-01-01")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("abcdefgh")), Err(InvalidDate));
    }

    #[test]
    fn test_padded_date_is_rejected() {
        assert_eq!(parse_insee_date(Some(" 19990101")), Err(InvalidDate));
        assert_eq!(parse_insee_date(Some("19990101 ")), Err(InvalidDate));
        assert_eq!(parse_corrected_date(Some(" 19990101 ")), Ok(Some(ymd(1999, 1, 1))));
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_insee_date(Some(ymd(1999, 1, 1))), "19990101");
        assert_eq!(encode_insee_date(Some(ymd(812, 7, 4))), "08120704");
        assert_eq!(encode_insee_date(None), "00000000");
    }

    #[test]
    fn test_corrected_date_forms() {
        assert_eq!(parse_corrected_date(Some("1950-06-01")), Ok(Some(ymd(1950, 6, 1))));
        assert_eq!(parse_corrected_date(Some("19500601")), Ok(Some(ymd(1950, 6, 1))));
        assert_eq!(parse_corrected_date(Some(" ")), Ok(None));
        assert_eq!(parse_corrected_date(Some("1950-02-30")), Err(InvalidDate));
    }
}
