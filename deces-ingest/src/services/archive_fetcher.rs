//! Archive download
//!
//! Streams the archive body chunk by chunk into a temp file so a large
//! extract never sits in memory. No retries: a failed download fails the
//! archive.

use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::FetchError;

const USER_AGENT: &str = concat!("deces-ingest/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloaded archive, removed from disk when dropped
#[derive(Debug)]
pub struct FetchedArchive {
    pub file: NamedTempFile,
    pub bytes: u64,
    /// Declared `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
}

impl FetchedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// HTTP archive fetcher
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    http_client: reqwest::Client,
}

impl ArchiveFetcher {
    /// `timeout` bounds the whole request, body included
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Download `url` into a temp file inside `dest_dir`
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedArchive, FetchError> {
        let network = |source: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            source,
        };

        let mut response = self.http_client.get(url).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let temp = tempfile::Builder::new()
            .prefix("archive-")
            .suffix(".zip")
            .tempfile_in(dest_dir)?;
        let mut out = tokio::fs::File::from_std(temp.reopen()?);

        let mut bytes: u64 = 0;
        let mut last_percent: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(network)? {
            out.write_all(&chunk).await?;
            bytes += chunk.len() as u64;

            if let Some(total) = content_length.filter(|t| *t > 0) {
                let percent = (bytes * 100 / total).min(100);
                if percent > last_percent {
                    last_percent = percent;
                    debug!(url, bytes, total, percent, "Download progress");
                }
            }
        }

        out.flush().await?;
        out.sync_all().await?;

        info!(url, bytes, "Archive downloaded");

        Ok(FetchedArchive {
            file: temp,
            bytes,
            content_length,
        })
    }
}

/// Last path segment of a URL, without query or fragment
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://www.insee.fr/fr/statistiques/fichier/4190491/deces-2024-m01.zip"),
            Some("deces-2024-m01.zip".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.test/a/b.zip?x=1#top"),
            Some("b.zip".to_string())
        );
        assert_eq!(filename_from_url("https://example.test/dir/"), None);
    }
}
