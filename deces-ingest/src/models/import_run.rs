//! Import run state machine
//!
//! One run per (archive, inner file):
//! PENDING → DOWNLOADING → CHECKING → PROCESSING → COMPLETED | FAILED
//!
//! CHECKING computes the content hash and consults the dedup ledger before
//! any row is touched; a duplicate deletes the run instead of failing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Run status, stored lowercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, nothing started yet
    Pending,
    /// Archive download in flight
    Downloading,
    /// Content hash and duplicate check
    Checking,
    /// Rows being decoded and written
    Processing,
    /// Finished with enough rows landed
    Completed,
    /// Finished with a fatal error
    Failed,
}

impl RunStatus {
    pub const ALL: [RunStatus; 6] = [
        RunStatus::Pending,
        RunStatus::Downloading,
        RunStatus::Checking,
        RunStatus::Processing,
        RunStatus::Completed,
        RunStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Downloading => "downloading",
            RunStatus::Checking => "checking",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Legal edges of the state machine
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Pending, Downloading) | (Pending, Checking) => true,
            (Downloading, Checking) => true,
            (Checking, Processing) => true,
            (Processing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown run status: {}", s))
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: i64,
    pub old_status: RunStatus,
    pub new_status: RunStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Persistent import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: i64,
    pub zip_url: String,
    pub zip_filename: String,
    /// Absent while the archive itself is downloading
    pub inner_filename: Option<String>,
    /// Absent until computed during CHECKING
    pub content_hash: Option<String>,
    pub status: RunStatus,
    pub records_processed: u64,
    /// Row count of the inner file, fixed on entering PROCESSING
    pub total_records: Option<u64>,
    /// Only set on FAILED
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    /// Apply a transition in memory; the caller persists it
    ///
    /// Returns `None` if the edge is not part of the state machine.
    pub fn transition_to(&mut self, new_status: RunStatus) -> Option<StateTransition> {
        if !self.status.can_transition_to(new_status) {
            return None;
        }
        let now = Utc::now();
        let transition = StateTransition {
            run_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }
        Some(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Percentage of declared rows processed (0.0 when the total is unknown)
    pub fn percentage(&self) -> f64 {
        match self.total_records {
            Some(total) if total > 0 => (self.records_processed as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }
}

/// True when enough of the declared rows landed for the run to complete
///
/// Rows rejected one by one are expected; losing more than
/// `1 - ratio` of the file points at a structural problem instead.
pub fn meets_completion_ratio(records_processed: u64, total_records: u64, ratio: f64) -> bool {
    records_processed as f64 >= total_records as f64 * ratio
}

/// Message recorded on FAILED when the caller had none
pub fn failure_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        "Import failed without a reported cause".to_string()
    } else {
        trimmed.to_string()
    }
}
