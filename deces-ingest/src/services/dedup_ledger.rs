//! Content deduplication for inner files
//!
//! Two guards, both keyed on (inner filename, SHA-256 of the content):
//! a lookup before any work starts, and the claim itself, which writes the
//! hash onto the run under the partial unique index. The claim settles races
//! between workers handed the same archive.

use deces_common::Result;
use sqlx::{Pool, Sqlite};

use crate::db::runs;

/// Outcome of claiming content for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The run now owns this content
    Claimed,
    /// Another completed or live run owns it
    AlreadyHandled,
}

pub struct DedupLedger {
    db: Pool<Sqlite>,
}

impl DedupLedger {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// True when a completed or in-flight run already holds this content
    ///
    /// Failed runs do not count, so failed content can be imported again.
    pub async fn is_already_imported(&self, inner_filename: &str, content_hash: &str) -> Result<bool> {
        let imported = runs::is_already_imported(&self.db, inner_filename, content_hash).await?;
        tracing::debug!(
            inner_file = inner_filename,
            hash = content_hash,
            imported,
            "Dedup lookup"
        );
        Ok(imported)
    }

    /// Record `content_hash` on `run_id`
    pub async fn claim(&self, run_id: i64, content_hash: &str) -> Result<Claim> {
        match runs::set_content_hash(&self.db, run_id, content_hash).await {
            Ok(()) => Ok(Claim::Claimed),
            Err(e) if e.is_unique_violation() => {
                tracing::info!(run_id, hash = content_hash, "Content claimed by another run");
                Ok(Claim::AlreadyHandled)
            }
            Err(e) => Err(e),
        }
    }
}
