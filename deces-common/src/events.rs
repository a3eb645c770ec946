//! Import event types and the broadcast event bus
//!
//! The ingest pipeline emits an [`ImportEvent`] for every run lifecycle step.
//! Subscribers (the SSE endpoint, tests) receive only events emitted after
//! they subscribed; slow subscribers lose the oldest events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Import lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// An archive was accepted for import
    ArchiveSubmitted {
        zip_url: String,
        zip_filename: String,
        timestamp: DateTime<Utc>,
    },

    /// A run row was created
    RunCreated {
        run_id: i64,
        zip_filename: String,
        inner_filename: Option<String>,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// A run moved to a new status
    RunStatusChanged {
        run_id: i64,
        old_status: String,
        new_status: String,
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress of a run in `processing`
    RunProgress {
        run_id: i64,
        records_processed: u64,
        total_records: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A run row was removed (download handoff or duplicate content)
    RunDeleted {
        run_id: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A row was rejected and quarantined
    ErrorQuarantined {
        run_id: i64,
        error_id: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A quarantined row was repaired and replayed into the store
    ErrorResolved {
        error_id: i64,
        timestamp: DateTime<Utc>,
    },
}

impl ImportEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ImportEvent::ArchiveSubmitted { .. } => "ArchiveSubmitted",
            ImportEvent::RunCreated { .. } => "RunCreated",
            ImportEvent::RunStatusChanged { .. } => "RunStatusChanged",
            ImportEvent::RunProgress { .. } => "RunProgress",
            ImportEvent::RunDeleted { .. } => "RunDeleted",
            ImportEvent::ErrorQuarantined { .. } => "ErrorQuarantined",
            ImportEvent::ErrorResolved { .. } => "ErrorResolved",
        }
    }
}

/// Broadcast bus for [`ImportEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ImportEvent,
    ) -> Result<usize, broadcast::error::SendError<ImportEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ImportEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
