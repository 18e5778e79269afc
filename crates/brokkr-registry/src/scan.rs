//! Drop-in mod autodetection
//!
//! Users (and other tools) drop `name_version.zip` archives straight into
//! the mods directory. Scanning records anything not owned by an installed
//! module as a preexisting entry so dependency checks can see it, while
//! the installer keeps its hands off it.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use brokkr_core::{GameInstance, ModInfo, Result};

use crate::registry::Registry;

fn archive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z0-9_-]+)_(?P<version>\d+(?:\.\d+){0,2})\.zip$")
            .expect("archive pattern is valid")
    })
}

/// Scan the mods directory for drop-in archives and record them as
/// preexisting. Previously autodetected entries are re-derived from disk,
/// so removed drop-ins disappear again. Returns how many were found.
pub fn scan_preexisting(instance: &GameInstance, registry: &mut Registry) -> Result<usize> {
    let mods_dir = instance.mods_dir();
    if !mods_dir.is_dir() {
        debug!("No mods directory at {}, nothing to scan", mods_dir.display());
        registry.clear_preexisting();
        return Ok(0);
    }

    registry.clear_preexisting();

    let mut found = 0;
    let mut entries: Vec<_> = std::fs::read_dir(&mods_dir)?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(".zip") {
            continue;
        }

        let relative = instance.to_relative(&path)?;
        if let Some(owner) = registry.file_owner(&relative)? {
            debug!("{} belongs to {}, skipping", relative, owner);
            continue;
        }

        let Some(captures) = archive_pattern().captures(&file_name) else {
            warn!("Ignoring unrecognized archive name {}", file_name);
            continue;
        };

        let name = captures["name"].to_string();
        let version = match captures["version"].parse() {
            Ok(version) => version,
            Err(_) => {
                warn!("Ignoring {}: unparseable version", file_name);
                continue;
            }
        };

        registry.register_preexisting(
            relative,
            ModInfo {
                name: name.clone(),
                version,
                title: name,
                author: String::new(),
                contact: None,
                homepage: None,
                description: None,
                dependencies: Vec::new(),
            },
        );
        found += 1;
    }

    debug!("Scan found {} drop-in mod(s)", found);
    Ok(found)
}
