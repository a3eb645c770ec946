//! Row codec for the INSEE death extract
//!
//! Pure functions: raw cells in, typed record or rejection out.

pub mod date;
pub mod place;
pub mod row;

pub use date::{encode_insee_date, parse_corrected_date, parse_insee_date, InvalidDate};
pub use place::{decode_place, place_kind, PlaceKind};
pub use row::{decode, decode_lenient, validate_corrected, LenientDecode, RowRejection};
