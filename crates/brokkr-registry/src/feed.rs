//! Metadata feed ingestion
//!
//! A feed is a gzip-compressed tar archive with one `.brokkr` JSON record
//! per module version. Refreshing clears the available set and repopulates
//! it from every record found. Records that fail to parse or that target a
//! newer metadata schema are skipped with a warning; one bad record must
//! never poison a whole refresh.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};

use brokkr_core::module::SUPPORTED_SCHEMA;
use brokkr_core::{Error, ModPackage, Result, Version};

use crate::registry::Registry;

/// File extension of metadata records inside a feed archive.
const RECORD_EXTENSION: &str = ".brokkr";

/// Magic bytes identifying a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What a refresh did, for reporting back to the user.
#[derive(Debug, Default)]
pub struct FeedSummary {
    /// Records successfully ingested.
    pub modules: usize,
    /// Records skipped (bad JSON or future schema).
    pub skipped: usize,
    /// `(identifier, version)` pairs that were not available before.
    pub new_releases: Vec<(String, Version)>,
    /// Identifiers that vanished from the feed entirely.
    pub removed_modules: Vec<String>,
}

/// Refresh the available set from a feed archive on disk.
pub fn refresh_from_path(registry: &mut Registry, path: &Path) -> Result<FeedSummary> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::file_not_found(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;

    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    if read < 2 || magic != GZIP_MAGIC {
        return Err(Error::UnsupportedSchema {
            source_name: format!("{} (expected a gzip-compressed tar feed)", path.display()),
            schema: 0,
        });
    }

    let file = File::open(path)?;
    let before: BTreeSet<(String, Version)> = registry.available_releases().into_iter().collect();
    let before_ids: BTreeSet<String> = before.iter().map(|(id, _)| id.clone()).collect();

    registry.clear_available();

    let mut summary = FeedSummary::default();
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.display().to_string();
        if !name.ends_with(RECORD_EXTENSION) {
            debug!("Skipping archive entry {}", name);
            continue;
        }

        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;
        match parse_record(&contents) {
            Ok(package) => {
                info!("Found {} version {}", package.identifier(), package.version());
                registry.add_available(package);
                summary.modules += 1;
            }
            Err(reason) => {
                warn!("Skipping {}: {}", name, reason);
                summary.skipped += 1;
            }
        }
    }

    let after: BTreeSet<(String, Version)> = registry.available_releases().into_iter().collect();
    let after_ids: BTreeSet<String> = after.iter().map(|(id, _)| id.clone()).collect();
    summary.new_releases = after.difference(&before).cloned().collect();
    summary.removed_modules = before_ids.difference(&after_ids).cloned().collect();

    info!(
        "Feed refresh complete: {} modules, {} skipped",
        summary.modules, summary.skipped
    );
    Ok(summary)
}

/// Download a feed archive and refresh from it.
pub async fn refresh_from_url(registry: &mut Registry, url: &str) -> Result<FeedSummary> {
    info!("Downloading feed from {}", url);
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::path_error(url, format!("invalid repository URL: {e}")))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| Error::Download {
            errors: vec![e.to_string()],
        })?;
    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| Error::Download {
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

    let tmp = tempfile::NamedTempFile::new()?;
    std::fs::write(tmp.path(), &bytes)?;
    refresh_from_path(registry, tmp.path())
}

/// Parse one metadata record, refusing records from a future schema.
fn parse_record(contents: &str) -> std::result::Result<ModPackage, String> {
    let package: ModPackage =
        serde_json::from_str(contents).map_err(|e| format!("invalid metadata: {e}"))?;
    if package.schema > SUPPORTED_SCHEMA {
        return Err(format!(
            "metadata schema {} is newer than supported {}",
            package.schema, SUPPORTED_SCHEMA
        ));
    }
    Ok(package)
}
