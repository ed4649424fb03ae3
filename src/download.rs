//! Streaming file downloads with periodic progress logging.
//!
//! The [`Downloader`] trait is the seam the artifact cache downloads through;
//! [`HttpDownloader`] is the `reqwest` implementation used at runtime.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::DownloadError;

/// How often byte progress is reported while a body is streaming.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Fetches a URL into a directory and reports where the file landed.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

/// [`Downloader`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        info!("Downloading");
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status();
        info!(status = %status, "Download response");
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = resp.content_length();
        let path = dest_dir.join(file_name_for(url));
        let mut file = fs::File::create(&path).await?;

        let mut transferred: u64 = 0;
        let mut last_report = Instant::now();
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                log_progress(transferred, total);
                last_report = Instant::now();
            }
        }
        file.flush().await?;
        file.sync_all().await?;

        info!(path = %path.display(), bytes = transferred, "Download saved");
        Ok(path)
    }
}

fn log_progress(transferred: u64, total: Option<u64>) {
    match total {
        Some(total) if total > 0 => {
            let pct = 100.0 * transferred as f64 / total as f64;
            debug!(transferred, total, percent = pct, "Download progress");
        }
        _ => debug!(transferred, "Download progress"),
    }
}

/// Local file name for a download: the last path segment, or `index`.
pub fn file_name_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segs| segs.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .map(|name| {
            name.chars()
                .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
                .collect()
        })
        .unwrap_or_else(|| "index".to_string())
}
