//! Keyed, time-limited cache of downloaded artifacts.
//!
//! Files live under two directories below the cache root:
//!
//! ```text
//! cache_root/
//! ├── downloads/<key>/   # staging area the downloader writes into
//! └── cache/<key>        # promoted entries, looked up by key
//! ```
//!
//! An entry is valid while its modification time is younger than the TTL.
//! A fresh download is moved into place with a single rename, so a reader
//! sees either the previous entry or the complete new one, never a partial
//! file.

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::download::Downloader;
use crate::error::CacheError;

/// Default lifetime of a cache entry.
pub const DEFAULT_TTL_HOURS: i64 = 24;

pub struct ArtifactCache {
    download_dir: PathBuf,
    cache_dir: PathBuf,
    ttl: Duration,
    downloader: Arc<dyn Downloader>,
}

impl ArtifactCache {
    pub fn new(root: impl AsRef<Path>, ttl: Duration, downloader: Arc<dyn Downloader>) -> Self {
        let root = root.as_ref();
        Self {
            download_dir: root.join("downloads"),
            cache_dir: root.join("cache"),
            ttl,
            downloader,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the staging and cache directories. Safe to call repeatedly.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.download_dir).await?;
        fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    /// Path of a still-valid entry for `key` as of `now`, if there is one.
    pub async fn lookup(&self, key: &str, now: DateTime<Utc>) -> Option<PathBuf> {
        let path = self.cache_dir.join(key);
        let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return None,
        };
        let age = now.signed_duration_since(modified);
        if age >= self.ttl {
            debug!(key, age_secs = age.num_seconds(), "Cache entry expired");
            return None;
        }
        Some(path)
    }

    /// Return the cached file for `key`, downloading `url` if the entry is
    /// missing or expired.
    ///
    /// # Arguments
    ///
    /// * `key` - File name of the entry under the cache directory
    /// * `url` - Where to download the artifact from on a miss
    ///
    /// # Returns
    ///
    /// Path of the fresh cache entry. A failed download is reported as
    /// [`CacheError::Download`] and nothing is promoted into the cache.
    pub async fn fetch_or_download(&self, key: &str, url: &str) -> Result<PathBuf, CacheError> {
        self.fetch_or_download_at(key, url, Utc::now()).await
    }

    /// [`fetch_or_download`](Self::fetch_or_download) with an explicit clock.
    #[instrument(level = "info", skip_all, fields(%key, %url))]
    pub async fn fetch_or_download_at(
        &self,
        key: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, CacheError> {
        if let Some(path) = self.lookup(key, now).await {
            info!(path = %path.display(), "Using cached file");
            return Ok(path);
        }

        let staging = self.download_dir.join(key);
        fs::create_dir_all(&staging).await?;
        let downloaded = self
            .downloader
            .download(url, &staging)
            .await
            .map_err(|source| CacheError::Download {
                key: key.to_string(),
                source,
            })?;

        let cache_path = self.cache_dir.join(key);
        if let Err(source) = fs::rename(&downloaded, &cache_path).await {
            warn!(from = %downloaded.display(), error = %source, "Could not promote download");
            return Err(CacheError::Promote {
                from: downloaded,
                source,
            });
        }
        info!(path = %cache_path.display(), "Cached download");
        Ok(cache_path)
    }
}
