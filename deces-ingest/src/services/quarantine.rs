//! Error quarantine: capture of rejected rows and operator repair
//!
//! A rejected row is stored with its raw cells, the rejection reason and the
//! fields a lenient decode could recover. An operator edits those fields and
//! replays the error; replay validates with the import rules and upserts
//! through the same statement as the batch writer.

use chrono::Utc;
use deces_common::events::{EventBus, ImportEvent};
use deces_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::codec::{self, RowRejection};
use crate::db::places::{resolve_place, PlaceName};
use crate::db::{quarantine as store, records};
use crate::models::{CorrectedFields, NormalizedRecord, PartialRecord, PlaceCode, QuarantinedError, RawRow};

/// Result of replaying a quarantined error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Record upserted, error resolved
    Resolved(NormalizedRecord),
    /// Corrections still break a rule; the error stays open
    Rejected(String),
    /// Nothing done
    AlreadyResolved,
}

/// Result of editing the corrected fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionUpdate {
    Updated,
    /// Resolved errors are immutable
    AlreadyResolved,
}

/// Error with everything needed to repair it
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    #[serde(flatten)]
    pub error: QuarantinedError,
    /// Fresh lenient decode of the raw payload
    pub decoded: PartialRecord,
    /// Every rule the raw row breaks
    pub rejections: Vec<String>,
    pub birth_place: Option<PlaceName>,
    pub death_place: Option<PlaceName>,
}

#[derive(Clone)]
pub struct ErrorQuarantine {
    db: SqlitePool,
    event_bus: EventBus,
}

impl ErrorQuarantine {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Store a rejected row; returns the new error id
    pub async fn capture(
        &self,
        run_id: i64,
        row_number: u64,
        raw: &RawRow,
        rejection: &RowRejection,
    ) -> Result<i64> {
        let lenient = codec::decode_lenient(raw);
        let corrections = CorrectedFields::from(&lenient.partial);
        let payload = raw.to_payload();
        let reason = rejection.to_string();

        let error_id = store::insert_error(
            &self.db,
            &store::NewError {
                import_run_id: run_id,
                row_number: Some(row_number),
                raw_payload: &payload,
                reason: &reason,
                reason_kind: rejection.kind(),
                corrections: &corrections,
            },
        )
        .await?;

        debug!(run_id, row = row_number, error_id, reason = %reason, "Row quarantined");

        self.event_bus.emit_lossy(ImportEvent::ErrorQuarantined {
            run_id,
            error_id,
            reason,
            timestamp: Utc::now(),
        });

        Ok(error_id)
    }

    /// Replace the corrected fields of an open error
    pub async fn update_corrections(
        &self,
        error_id: i64,
        fields: &CorrectedFields,
    ) -> Result<CorrectionUpdate> {
        if store::update_corrections(&self.db, error_id, fields).await? {
            return Ok(CorrectionUpdate::Updated);
        }
        match store::load_error(&self.db, error_id).await? {
            Some(_) => Ok(CorrectionUpdate::AlreadyResolved),
            None => Err(Error::NotFound(format!("Import error {}", error_id))),
        }
    }

    /// Validate the corrected fields and, if they pass, upsert the record
    pub async fn replay(&self, error_id: i64) -> Result<ReplayOutcome> {
        let error = store::load_error(&self.db, error_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Import error {}", error_id)))?;

        if error.resolved {
            return Ok(ReplayOutcome::AlreadyResolved);
        }

        let record = match codec::validate_corrected(&error.corrections) {
            Ok(record) => record,
            Err(rejection) => {
                debug!(error_id, reason = %rejection, "Replay rejected");
                return Ok(ReplayOutcome::Rejected(rejection.to_string()));
            }
        };

        let mut tx = self.db.begin().await?;
        if !store::mark_resolved(&mut *tx, error_id).await? {
            // Resolved concurrently
            tx.rollback().await?;
            return Ok(ReplayOutcome::AlreadyResolved);
        }
        records::upsert_one(&mut *tx, &record).await?;
        tx.commit().await?;

        info!(error_id, run_id = error.import_run_id, "Quarantined row replayed");

        self.event_bus.emit_lossy(ImportEvent::ErrorResolved {
            error_id,
            timestamp: Utc::now(),
        });

        Ok(ReplayOutcome::Resolved(record))
    }

    /// Error, re-decoded raw payload and resolved place names
    pub async fn describe(&self, error_id: i64) -> Result<Option<ErrorDetail>> {
        let Some(error) = store::load_error(&self.db, error_id).await? else {
            return Ok(None);
        };

        let lenient = RawRow::from_payload(&error.raw_payload)
            .map(|raw| codec::decode_lenient(&raw))
            .unwrap_or_default();

        let birth_place = self.place_name(lenient.partial.birth_place_code.as_ref()).await?;
        let death_place = self.place_name(lenient.partial.death_place_code.as_ref()).await?;

        Ok(Some(ErrorDetail {
            error,
            rejections: lenient.rejections.iter().map(ToString::to_string).collect(),
            decoded: lenient.partial,
            birth_place,
            death_place,
        }))
    }

    pub async fn list(&self, filter: &store::ErrorFilter) -> Result<Vec<QuarantinedError>> {
        store::list_errors(&self.db, filter).await
    }

    async fn place_name(&self, code: Option<&PlaceCode>) -> Result<Option<PlaceName>> {
        match code {
            Some(code) => resolve_place(&self.db, code).await,
            None => Ok(None),
        }
    }
}
