//! Data models for the ingest pipeline
//!
//! - Raw rows as read from an inner file, and their decoded form
//! - Import run state machine
//! - Quarantined rows and operator corrections

pub mod import_run;
pub mod quarantine;
pub mod raw_row;
pub mod record;

pub use import_run::{failure_message, meets_completion_ratio, ImportRun, RunStatus, StateTransition};
pub use quarantine::{CorrectedFields, QuarantinedError, RejectionKind};
pub use raw_row::RawRow;
pub use record::{NaturalKey, NormalizedRecord, PartialRecord, PlaceCode, Sex};
