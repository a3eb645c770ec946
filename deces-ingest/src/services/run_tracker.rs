//! Import run lifecycle
//!
//! Every state change goes through [`RunTracker`], which checks the edge
//! against the state machine, persists it (retrying on SQLite lock
//! contention) and announces it on the event bus.

use chrono::Utc;
use deces_common::events::{EventBus, ImportEvent};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::runs;
use crate::error::{IngestError, IngestResult};
use crate::models::{failure_message, meets_completion_ratio, ImportRun, RunStatus};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct RunTracker {
    db: SqlitePool,
    event_bus: EventBus,
    max_lock_wait_ms: u64,
}

impl RunTracker {
    pub fn new(db: SqlitePool, event_bus: EventBus, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            event_bus,
            max_lock_wait_ms,
        }
    }

    /// Create a run for an archive (`inner_filename` None) or one inner file
    pub async fn create(
        &self,
        zip_url: &str,
        zip_filename: &str,
        inner_filename: Option<&str>,
        status: RunStatus,
    ) -> IngestResult<ImportRun> {
        let run = retry_on_lock("create run", self.max_lock_wait_ms, || {
            runs::create_run(&self.db, zip_url, zip_filename, inner_filename, status)
        })
        .await?;

        info!(
            run_id = run.id,
            zip_filename,
            inner_file = inner_filename.unwrap_or("-"),
            status = %status,
            "Import run created"
        );

        self.event_bus.emit_lossy(ImportEvent::RunCreated {
            run_id: run.id,
            zip_filename: run.zip_filename.clone(),
            inner_filename: run.inner_filename.clone(),
            status: status.to_string(),
            timestamp: Utc::now(),
        });

        Ok(run)
    }

    /// Move `run` to `next` and persist it
    pub async fn transition(&self, run: &mut ImportRun, next: RunStatus) -> IngestResult<()> {
        let from = run.status;
        let mut updated = run.clone();
        if updated.transition_to(next).is_none() {
            return Err(IngestError::InvalidTransition { from, to: next });
        }

        retry_on_lock("save run status", self.max_lock_wait_ms, || {
            runs::save_status(&self.db, &updated)
        })
        .await?;
        *run = updated;

        info!(run_id = run.id, from = %from, to = %next, "Import run transition");

        self.event_bus.emit_lossy(ImportEvent::RunStatusChanged {
            run_id: run.id,
            old_status: from.to_string(),
            new_status: next.to_string(),
            error_message: run.error_message.clone(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Fix the row count and enter PROCESSING
    pub async fn start_processing(&self, run: &mut ImportRun, total_records: u64) -> IngestResult<()> {
        if !run.status.can_transition_to(RunStatus::Processing) {
            return Err(IngestError::InvalidTransition {
                from: run.status,
                to: RunStatus::Processing,
            });
        }

        let run_id = run.id;
        retry_on_lock("set total records", self.max_lock_wait_ms, || {
            runs::set_total_records(&self.db, run_id, total_records)
        })
        .await?;
        run.total_records = Some(total_records);

        self.transition(run, RunStatus::Processing).await
    }

    /// Persist the processed-row counter
    pub async fn record_progress(&self, run: &mut ImportRun, records_processed: u64) -> IngestResult<()> {
        let run_id = run.id;
        retry_on_lock("update progress", self.max_lock_wait_ms, || {
            runs::update_progress(&self.db, run_id, records_processed)
        })
        .await?;
        run.records_processed = records_processed;

        self.event_bus.emit_lossy(ImportEvent::RunProgress {
            run_id,
            records_processed,
            total_records: run.total_records,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Complete the run if enough rows landed, otherwise fail it
    ///
    /// Returns `IncompleteImport` after failing the run when the ratio is not
    /// met.
    pub async fn finish(&self, run: &mut ImportRun, completion_ratio: f64) -> IngestResult<()> {
        let processed = run.records_processed;
        let total = run.total_records.unwrap_or(0);

        if meets_completion_ratio(processed, total, completion_ratio) {
            return self.transition(run, RunStatus::Completed).await;
        }

        let err = IngestError::IncompleteImport { processed, total };
        self.fail(run, &err.to_string()).await?;
        Err(err)
    }

    /// Fail `run` with a non-empty message
    pub async fn fail(&self, run: &mut ImportRun, message: &str) -> IngestResult<()> {
        run.error_message = Some(failure_message(message));
        warn!(
            run_id = run.id,
            error = run.error_message.as_deref().unwrap_or_default(),
            "Import run failed"
        );
        self.transition(run, RunStatus::Failed).await
    }

    /// Best-effort failure used on error paths
    ///
    /// Falls back to a direct status update if the tracked transition itself
    /// fails, so the run does not stay in a live state.
    pub async fn fail_quietly(&self, run: &mut ImportRun, message: &str) {
        if let Err(e) = self.fail(run, message).await {
            warn!(run_id = run.id, error = %e, "Failed to record run failure, forcing status");
            if let Err(e) = runs::force_failed(&self.db, run.id, message).await {
                warn!(run_id = run.id, error = %e, "Could not force run to failed");
            }
        }
    }

    /// Delete a run (download handoff, duplicate content)
    pub async fn delete(&self, run: &ImportRun, reason: &str) -> IngestResult<()> {
        let run_id = run.id;
        retry_on_lock("delete run", self.max_lock_wait_ms, || {
            runs::delete_run(&self.db, run_id)
        })
        .await?;

        info!(run_id, reason, "Import run deleted");

        self.event_bus.emit_lossy(ImportEvent::RunDeleted {
            run_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, RunTracker) {
        let dir = TempDir::new().unwrap();
        let pool = deces_common::db::init_database(&dir.path().join("deces.db"))
            .await
            .unwrap();
        (dir, RunTracker::new(pool, EventBus::new(32), 1000))
    }

    #[tokio::test]
    async fn test_happy_path_is_persisted_and_announced() {
        let (_dir, tracker) = setup().await;
        let mut rx = tracker.event_bus().subscribe();

        let mut run = tracker
            .create("https://x/a.zip", "a.zip", Some("a.csv"), RunStatus::Checking)
            .await
            .unwrap();
        tracker.start_processing(&mut run, 10).await.unwrap();
        tracker.record_progress(&mut run, 10).await.unwrap();
        tracker.finish(&mut run, 0.9).await.unwrap();

        let stored = runs::load_run(tracker.db(), run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.total_records, Some(10));
        assert_eq!(stored.records_processed, 10);
        assert!(stored.completed_at.is_some());

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec!["RunCreated", "RunStatusChanged", "RunProgress", "RunStatusChanged"]
        );
    }

    #[tokio::test]
    async fn test_illegal_edge_leaves_run_untouched() {
        let (_dir, tracker) = setup().await;
        let mut run = tracker
            .create("u", "a.zip", None, RunStatus::Downloading)
            .await
            .unwrap();

        let err = tracker.transition(&mut run, RunStatus::Completed).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidTransition {
                from: RunStatus::Downloading,
                to: RunStatus::Completed
            }
        ));
        assert_eq!(run.status, RunStatus::Downloading);

        tracker.fail(&mut run, "boom").await.unwrap();
        assert!(tracker.transition(&mut run, RunStatus::Checking).await.is_err());
        let stored = runs::load_run(tracker.db(), run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_finish_below_ratio_fails_run() {
        let (_dir, tracker) = setup().await;
        let mut run = tracker
            .create("u", "a.zip", Some("a.csv"), RunStatus::Checking)
            .await
            .unwrap();
        tracker.start_processing(&mut run, 100).await.unwrap();
        tracker.record_progress(&mut run, 89).await.unwrap();

        let err = tracker.finish(&mut run, 0.9).await.unwrap_err();
        assert!(matches!(err, IngestError::IncompleteImport { processed: 89, total: 100 }));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.error_message.as_deref(),
            Some("Incomplete import: only 89/100 records processed")
        );
    }

    #[tokio::test]
    async fn test_blank_failure_message_is_replaced() {
        let (_dir, tracker) = setup().await;
        let mut run = tracker
            .create("u", "a.zip", None, RunStatus::Downloading)
            .await
            .unwrap();

        tracker.fail_quietly(&mut run, "   ").await;

        let stored = runs::load_run(tracker.db(), run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(!stored.error_message.unwrap().is_empty());
    }
}
