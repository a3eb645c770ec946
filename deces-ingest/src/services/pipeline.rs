//! Pipeline orchestrator
//!
//! One call imports one archive:
//!
//! 1. A tracking run in `downloading` covers the download. It is deleted
//!    once the archive is on disk and readable, or failed with the cause.
//! 2. Each `.csv` entry gets its own run, created in `checking`, and is
//!    processed on its own: a failed entry does not stop its siblings.
//! 3. Per entry: extract + hash, dedup lookup and claim, row count,
//!    `processing`, decode every row into the batch writer or the
//!    quarantine, then `completed` or `failed`.
//!
//! Temp files (archive, extracted entries) are removed on every path.

use deces_common::events::EventBus;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::codec;
use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::models::{ImportRun, RunStatus};
use crate::services::archive_fetcher::ArchiveFetcher;
use crate::services::archive_reader::{
    count_rows, discard, extract_entry, list_csv_entries, stream_rows, ExtractedEntry, NumberedRow,
};
use crate::services::batch_writer::BatchWriter;
use crate::services::dedup_ledger::{Claim, DedupLedger};
use crate::services::quarantine::ErrorQuarantine;
use crate::services::run_tracker::RunTracker;
use crate::utils::DEFAULT_MAX_LOCK_WAIT_MS;

/// Rows buffered between the reader thread and the import loop
const ROW_CHANNEL_CAPACITY: usize = 1024;

/// How one inner file ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum FileOutcome {
    Completed {
        processed: u64,
        total: u64,
        rejected: usize,
    },
    /// Content already imported; the run was deleted
    Skipped { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InnerFileReport {
    pub inner_filename: String,
    /// Absent when the run was deleted or never created
    pub run_id: Option<i64>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub zip_filename: String,
    pub files: Vec<InnerFileReport>,
}

impl ArchiveReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

pub struct PipelineOrchestrator {
    db: SqlitePool,
    config: IngestConfig,
    work_dir: PathBuf,
    fetcher: ArchiveFetcher,
    tracker: RunTracker,
    ledger: DedupLedger,
    quarantine: ErrorQuarantine,
}

impl PipelineOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: IngestConfig,
        work_dir: PathBuf,
    ) -> IngestResult<Self> {
        let fetcher = ArchiveFetcher::new(config.fetch_timeout())?;
        Ok(Self {
            tracker: RunTracker::new(db.clone(), event_bus.clone(), DEFAULT_MAX_LOCK_WAIT_MS),
            ledger: DedupLedger::new(db.clone()),
            quarantine: ErrorQuarantine::new(db.clone(), event_bus),
            db,
            config,
            work_dir,
            fetcher,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Download and import every inner file of an archive
    ///
    /// Only a download or archive-level failure is an `Err`; inner-file
    /// failures are reported per file.
    pub async fn run_archive(&self, zip_url: &str, zip_filename: &str) -> IngestResult<ArchiveReport> {
        info!(zip_filename, url = zip_url, "Archive import started");

        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut tracking = self
            .tracker
            .create(zip_url, zip_filename, None, RunStatus::Downloading)
            .await?;

        let archive = match self.fetcher.fetch(zip_url, &self.work_dir).await {
            Ok(archive) => archive,
            Err(e) => {
                error!(zip_filename, error = %e, "Archive download failed");
                self.tracker.fail_quietly(&mut tracking, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let entries = match list_csv_entries(archive.path()).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => {
                warn!(zip_filename, "Archive has no .csv entry");
                self.tracker
                    .fail_quietly(&mut tracking, "Archive contains no .csv entry")
                    .await;
                discard(archive.file.into_temp_path(), "archive");
                return Ok(ArchiveReport {
                    zip_filename: zip_filename.to_string(),
                    files: Vec::new(),
                });
            }
            Err(e) => {
                error!(zip_filename, error = %e, "Archive unreadable");
                self.tracker.fail_quietly(&mut tracking, &e.to_string()).await;
                discard(archive.file.into_temp_path(), "archive");
                return Err(e);
            }
        };

        // Download handed off to the per-entry runs
        if let Err(e) = self.tracker.delete(&tracking, "archive downloaded").await {
            discard(archive.file.into_temp_path(), "archive");
            return Err(e);
        }

        let mut report = ArchiveReport {
            zip_filename: zip_filename.to_string(),
            files: Vec::with_capacity(entries.len()),
        };

        for entry_name in &entries {
            let file_report = self
                .import_inner_file(zip_url, zip_filename, archive.path(), entry_name)
                .await;
            report.files.push(file_report);
        }

        discard(archive.file.into_temp_path(), "archive");

        info!(
            zip_filename,
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Archive import finished"
        );

        Ok(report)
    }

    async fn import_inner_file(
        &self,
        zip_url: &str,
        zip_filename: &str,
        archive_path: &Path,
        entry_name: &str,
    ) -> InnerFileReport {
        let mut run = match self
            .tracker
            .create(zip_url, zip_filename, Some(entry_name), RunStatus::Checking)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(inner_file = entry_name, error = %e, "Could not create import run");
                return InnerFileReport {
                    inner_filename: entry_name.to_string(),
                    run_id: None,
                    outcome: FileOutcome::Failed {
                        message: e.to_string(),
                    },
                };
            }
        };

        let outcome = match self.process_inner_file(&mut run, archive_path, entry_name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // IncompleteImport already failed the run
                if !run.is_terminal() {
                    self.tracker.fail_quietly(&mut run, &e.to_string()).await;
                }
                FileOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        InnerFileReport {
            inner_filename: entry_name.to_string(),
            run_id: match outcome {
                FileOutcome::Skipped { .. } => None,
                _ => Some(run.id),
            },
            outcome,
        }
    }

    async fn process_inner_file(
        &self,
        run: &mut ImportRun,
        archive_path: &Path,
        entry_name: &str,
    ) -> IngestResult<FileOutcome> {
        let entry = extract_entry(archive_path, entry_name, &self.work_dir).await?;
        let result = self.check_and_import(run, &entry).await;
        discard(entry.file.into_temp_path(), "entry");
        result
    }

    async fn check_and_import(
        &self,
        run: &mut ImportRun,
        entry: &ExtractedEntry,
    ) -> IngestResult<FileOutcome> {
        if self
            .ledger
            .is_already_imported(&entry.name, &entry.content_hash)
            .await?
        {
            return self.skip(run, "content already imported").await;
        }

        match self.ledger.claim(run.id, &entry.content_hash).await? {
            Claim::Claimed => run.content_hash = Some(entry.content_hash.clone()),
            Claim::AlreadyHandled => return self.skip(run, "content claimed by another run").await,
        }

        let total = count_rows(entry.path()).await?;
        self.tracker.start_processing(run, total).await?;

        info!(run_id = run.id, inner_file = %entry.name, total, "Processing rows");

        let (processed, rejected) = self.load_rows(run, entry.path()).await?;
        self.tracker
            .finish(run, self.config.completion_ratio)
            .await?;

        info!(
            run_id = run.id,
            inner_file = %entry.name,
            processed,
            rejected,
            total,
            "Inner file imported"
        );

        Ok(FileOutcome::Completed {
            processed,
            total,
            rejected,
        })
    }

    async fn skip(&self, run: &ImportRun, reason: &str) -> IngestResult<FileOutcome> {
        self.tracker.delete(run, reason).await?;
        Ok(FileOutcome::Skipped {
            reason: reason.to_string(),
        })
    }

    /// Decode and store every row; returns (processed, rejected)
    async fn load_rows(&self, run: &mut ImportRun, path: &Path) -> IngestResult<(u64, usize)> {
        let (mut rows, reader) = stream_rows(path, ROW_CHANNEL_CAPACITY);
        let mut writer = BatchWriter::new(self.db.clone(), self.config.batch_size);
        let progress_interval = self.config.progress_interval.max(1);
        let ceiling = self.config.error_ceiling;

        let mut processed: u64 = 0;
        let mut rejected: usize = 0;

        while let Some(NumberedRow { row_number, row }) = rows.recv().await {
            match codec::decode(&row) {
                Ok(record) => {
                    writer.push(record).await?;
                    processed += 1;
                }
                Err(rejection) => {
                    rejected += 1;
                    self.quarantine
                        .capture(run.id, row_number, &row, &rejection)
                        .await?;

                    if rejected > ceiling {
                        warn!(run_id = run.id, row = row_number, rejected, ceiling, "Row error ceiling exceeded");
                        // Buffered records are dropped with the writer
                        let written = writer.stats().records_written;
                        self.tracker.record_progress(run, written).await?;
                        return Err(IngestError::RowErrorCeilingExceeded {
                            errors: rejected,
                            ceiling,
                        });
                    }
                }
            }

            if row_number % progress_interval == 0 {
                self.tracker.record_progress(run, processed).await?;
            }
        }

        let read = reader.await??;
        writer.finish().await?;
        self.tracker.record_progress(run, processed).await?;

        tracing::debug!(run_id = run.id, read, processed, rejected, "Rows loaded");

        Ok((processed, rejected))
    }
}
