//! Import pipeline services
//!
//! - Archive download and extraction
//! - Dedup ledger, batch writer, error quarantine
//! - Run lifecycle tracking and the orchestrator tying them together

pub mod archive_fetcher;
pub mod archive_reader;
pub mod batch_writer;
pub mod dedup_ledger;
pub mod pipeline;
pub mod quarantine;
pub mod run_tracker;

pub use archive_fetcher::{filename_from_url, ArchiveFetcher, FetchedArchive};
pub use batch_writer::{BatchStats, BatchWriter};
pub use dedup_ledger::{Claim, DedupLedger};
pub use pipeline::{ArchiveReport, FileOutcome, InnerFileReport, PipelineOrchestrator};
pub use quarantine::{CorrectionUpdate, ErrorDetail, ErrorQuarantine, ReplayOutcome};
pub use run_tracker::RunTracker;
