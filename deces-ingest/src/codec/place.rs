//! Geographic codes of the extract

use serde::Serialize;

use crate::models::PlaceCode;

/// The value is not a usable place code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPlace;

/// Where a place code points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    /// French commune, resolved against `communes`
    Commune,
    /// Foreign country (`99xxx`), resolved against `pays`
    Country,
}

/// Decode an optional place code cell
///
/// A blank cell is `Ok(None)`; anything present must normalize to a
/// five-character code.
pub fn decode_place(raw: Option<&str>) -> Result<Option<PlaceCode>, InvalidPlace> {
    match raw.map(|v| v.trim().trim_matches('"').trim()) {
        None => Ok(None),
        Some("") => Ok(None),
        Some(value) => PlaceCode::parse(value).map(Some).ok_or(InvalidPlace),
    }
}

pub fn place_kind(code: &PlaceCode) -> PlaceKind {
    if code.is_foreign() {
        PlaceKind::Country
    } else {
        PlaceKind::Commune
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_place() {
        assert_eq!(decode_place(None), Ok(None));
        assert_eq!(decode_place(Some(" \"\" ")), Ok(None));
        assert_eq!(
            decode_place(Some("1053")).unwrap().unwrap().as_str(),
            "01053"
        );
        assert_eq!(decode_place(Some("7510199")), Err(InvalidPlace));
    }

    #[test]
    fn test_place_kind() {
        let paris = PlaceCode::parse("75101").unwrap();
        let algeria = PlaceCode::parse("99352").unwrap();
        assert_eq!(place_kind(&paris), PlaceKind::Commune);
        assert_eq!(place_kind(&algeria), PlaceKind::Country);
    }
}
