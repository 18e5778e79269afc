//! Concurrent artifact downloads
//!
//! The only suspending boundary in the whole install pipeline. Fetches run
//! concurrently, per-item failures are aggregated instead of aborting the
//! batch early, and a cooperative cancel flag is observed between items.
//! Once the installer starts copying files, cancellation is no longer
//! consulted; a batch runs to completion or rolls back as a unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use brokkr_core::{Error, ModPackage, Result};

use crate::cache::DownloadCache;

/// Downloader boundary consumed by the installer. Implementations fetch
/// artifacts into the cache; the rest of the pipeline never touches the
/// network.
pub trait Downloader {
    /// Fetch every module not already cached. Partial failures surface as
    /// one aggregated `Error::Download` after all fetches settle.
    fn fetch_all(
        &self,
        packages: &[ModPackage],
        cache: &DownloadCache,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// HTTP downloader with an optional owner token for gated releases.
pub struct HttpDownloader {
    client: reqwest::Client,
    owner_token: Option<String>,
    cancel: Arc<AtomicBool>,
}

impl HttpDownloader {
    pub fn new(owner_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| Error::Download {
                errors: vec![e.to_string()],
            })?;
        Ok(Self {
            client,
            owner_token,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A flag that aborts the batch between fetches when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    async fn fetch_one(&self, package: &ModPackage, cache: &DownloadCache) -> Result<()> {
        if cache.is_cached(package) {
            debug!("{} already cached", package.standard_file_name());
            return Ok(());
        }
        if package.requires_owner_token() && self.owner_token.is_none() {
            return Err(Error::Download {
                errors: vec![format!(
                    "{} requires an owner token to download; set owner_token in brokkr.yaml",
                    package.standard_file_name()
                )],
            });
        }
        let url = package.download_urls.first().ok_or_else(|| Error::Download {
            errors: vec![format!(
                "{} has no download URL",
                package.standard_file_name()
            )],
        })?;

        info!("Downloading {}", url);
        let mut request = self.client.get(url);
        if package.requires_owner_token() {
            if let Some(token) = &self.owner_token {
                request = request.bearer_auth(token);
            }
        }
        let response = request.send().await.map_err(|e| Error::Download {
            errors: vec![format!("{url}: {e}")],
        })?;
        if !response.status().is_success() {
            return Err(Error::Download {
                errors: vec![format!("{url}: HTTP {}", response.status())],
            });
        }
        let bytes = response.bytes().await.map_err(|e| Error::Download {
            errors: vec![format!("{url}: {e}")],
        })?;

        let staged = tempfile::NamedTempFile::new_in(cache.dir())?;
        std::fs::write(staged.path(), &bytes)?;
        let (_file, staged_path) = staged.keep().map_err(|e| Error::Io(e.error))?;
        cache.store(package, &staged_path)?;
        Ok(())
    }
}

impl Downloader for HttpDownloader {
    async fn fetch_all(&self, packages: &[ModPackage], cache: &DownloadCache) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        let fetches = packages.iter().map(|package| async move {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            self.fetch_one(package, cache).await
        });

        let mut errors = Vec::new();
        let mut cancelled = false;
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(()) => {}
                Err(Error::Cancelled) => cancelled = true,
                Err(Error::Download { errors: mut item }) => errors.append(&mut item),
                Err(other) => errors.push(other.to_string()),
            }
        }

        if cancelled && errors.is_empty() {
            return Err(Error::Cancelled);
        }
        if !errors.is_empty() {
            return Err(Error::Download { errors });
        }
        Ok(())
    }
}
