//! Local artifact cache
//!
//! Downloaded mod archives are kept under the instance's downloads
//! directory, keyed by the module's standard file name. The installer
//! only ever installs out of this cache; a missing artifact at install
//! time is an error, not a trigger for an implicit download.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use brokkr_core::{Error, ModPackage, Result};

/// Cache of downloaded mod archives.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path this module's artifact lives at when cached.
    pub fn path_for(&self, package: &ModPackage) -> PathBuf {
        self.dir.join(format!("{}.zip", package.standard_file_name()))
    }

    pub fn is_cached(&self, package: &ModPackage) -> bool {
        self.path_for(package).is_file()
    }

    /// The cached artifact, if present.
    pub fn cached_path(&self, package: &ModPackage) -> Option<PathBuf> {
        let path = self.path_for(package);
        path.is_file().then_some(path)
    }

    /// Move a freshly downloaded file into the cache, checking its size
    /// against the metadata's expected byte count when one is declared.
    pub fn store(&self, package: &ModPackage, downloaded: &Path) -> Result<PathBuf> {
        let actual = fs::metadata(downloaded)?.len();
        if package.download_size > 0 && actual != package.download_size {
            return Err(Error::Download {
                errors: vec![format!(
                    "{}: expected {} bytes, got {}",
                    package.standard_file_name(),
                    package.download_size,
                    actual
                )],
            });
        }

        let target = self.path_for(package);
        // rename fails across filesystems; fall back to copy + remove.
        if fs::rename(downloaded, &target).is_err() {
            fs::copy(downloaded, &target)?;
            fs::remove_file(downloaded)?;
        }
        debug!("Cached {} at {}", package.standard_file_name(), target.display());
        Ok(target)
    }

    /// Remove a cached artifact. No error if absent.
    pub fn evict(&self, package: &ModPackage) -> Result<()> {
        let path = self.path_for(package);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
