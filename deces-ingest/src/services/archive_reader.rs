//! Archive extraction and row streaming
//!
//! ZIP and CSV readers are blocking, so every pass runs on
//! `spawn_blocking`. Rows reach the async side through a bounded channel;
//! when the receiver is dropped the reader stops at the next send.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::IngestResult;
use crate::models::RawRow;

/// Field delimiter of the extract
pub const DELIMITER: u8 = b';';

/// Inner file extracted to disk, removed when dropped
#[derive(Debug)]
pub struct ExtractedEntry {
    pub name: String,
    pub file: NamedTempFile,
    /// Hex SHA-256 of the uncompressed content
    pub content_hash: String,
    pub bytes: u64,
}

impl ExtractedEntry {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// One data row with its 1-based position (header excluded)
#[derive(Debug, Clone)]
pub struct NumberedRow {
    pub row_number: u64,
    pub row: RawRow,
}

/// Names of the `.csv` entries of an archive, in archive order
pub async fn list_csv_entries(archive_path: &Path) -> IngestResult<Vec<String>> {
    let path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> IngestResult<Vec<String>> {
        let mut archive = zip::ZipArchive::new(BufReader::new(File::open(&path)?))?;
        let mut names = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".csv") {
                names.push(entry.name().to_string());
            }
        }
        Ok(names)
    })
    .await?
}

/// Extract one entry into a temp file in `dest_dir`, hashing it on the way
pub async fn extract_entry(
    archive_path: &Path,
    entry_name: &str,
    dest_dir: &Path,
) -> IngestResult<ExtractedEntry> {
    let path = archive_path.to_path_buf();
    let name = entry_name.to_string();
    let dest = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&path, name, &dest)).await?
}

fn extract_blocking(archive_path: &Path, name: String, dest_dir: &Path) -> IngestResult<ExtractedEntry> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    let mut entry = archive.by_name(&name)?;

    let mut temp = tempfile::Builder::new()
        .prefix("entry-")
        .suffix(".csv")
        .tempfile_in(dest_dir)?;

    let mut writer = HashingWriter {
        inner: temp.as_file_mut(),
        hasher: Sha256::new(),
    };
    let bytes = io::copy(&mut entry, &mut writer)?;
    writer.flush()?;
    let content_hash = format!("{:x}", writer.hasher.finalize());

    debug!(entry = %name, bytes, hash = %content_hash, "Entry extracted");

    Ok(ExtractedEntry {
        name,
        file: temp,
        content_hash,
        bytes,
    })
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn csv_reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(source)
}

/// Number of data rows in an extracted file
pub async fn count_rows(path: &Path) -> IngestResult<u64> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> IngestResult<u64> {
        let mut reader = csv_reader(BufReader::new(File::open(&path)?));
        let mut record = csv::ByteRecord::new();
        let mut count = 0u64;
        while reader.read_byte_record(&mut record)? {
            count += 1;
        }
        Ok(count)
    })
    .await?
}

/// Stream the data rows of an extracted file
///
/// The handle resolves to the number of rows sent, or to the read error
/// that stopped the stream.
pub fn stream_rows(
    path: &Path,
    capacity: usize,
) -> (mpsc::Receiver<NumberedRow>, JoinHandle<IngestResult<u64>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let path: PathBuf = path.to_path_buf();

    let handle = tokio::task::spawn_blocking(move || -> IngestResult<u64> {
        let mut reader = csv_reader(BufReader::new(File::open(&path)?));
        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();

        let mut record = csv::ByteRecord::new();
        let mut row_number = 0u64;

        while reader.read_byte_record(&mut record)? {
            row_number += 1;

            // Cells are decoded lossily so a stray byte rejects one row at
            // decode time instead of aborting the file here.
            let mut row = RawRow::default();
            for (header, cell) in headers.iter().zip(record.iter()) {
                row.set(header, &String::from_utf8_lossy(cell));
            }

            if tx.blocking_send(NumberedRow { row_number, row }).is_err() {
                debug!(row_number, "Row consumer gone, stopping reader");
                return Ok(row_number - 1);
            }
        }

        Ok(row_number)
    });

    (rx, handle)
}

/// Remove a temp artifact, logging instead of failing
pub fn discard(temp_path: TempPath, what: &str) {
    let shown = temp_path.display().to_string();
    if let Err(e) = temp_path.close() {
        warn!(path = %shown, error = %e, "Failed to remove temporary {}", what);
    }
}
