//! Buffered record writer
//!
//! Owned by the call processing one inner file. Records are buffered and
//! upserted `batch_size` at a time, each batch in its own transaction. A
//! failed flush is fatal for the inner file and is not retried.

use sqlx::SqlitePool;
use tracing::debug;

use crate::db::records;
use crate::error::{IngestError, IngestResult};
use crate::models::NormalizedRecord;

/// Counters returned by [`BatchWriter::finish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records_written: u64,
    pub flushes: u64,
}

pub struct BatchWriter {
    db: SqlitePool,
    batch_size: usize,
    buffer: Vec<NormalizedRecord>,
    stats: BatchStats,
}

impl BatchWriter {
    pub fn new(db: SqlitePool, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            db,
            batch_size,
            buffer: Vec::with_capacity(batch_size.min(10_000)),
            stats: BatchStats::default(),
        }
    }

    /// Buffer a record, flushing when the batch is full
    pub async fn push(&mut self, record: NormalizedRecord) -> IngestResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write everything buffered so far
    pub async fn flush(&mut self) -> IngestResult<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let written = records::upsert_batch(&self.db, &self.buffer)
            .await
            .map_err(IngestError::StorageWrite)?;
        self.buffer.clear();

        self.stats.records_written += written;
        self.stats.flushes += 1;
        debug!(
            written,
            total_written = self.stats.records_written,
            flushes = self.stats.flushes,
            "Batch flushed"
        );

        Ok(written)
    }

    /// Flush the final partial batch and return the counters
    pub async fn finish(mut self) -> IngestResult<BatchStats> {
        self.flush().await?;
        Ok(self.stats)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }
}
