//! Per-identifier index of available module versions
//!
//! Tracks every known release of one module, ordered so that lookups walk
//! the most recent version first. "No compatible version" is a legitimate
//! `None` answer here, never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use brokkr_core::{ModDependency, ModPackage, Version};

/// Version → metadata map for a single module identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableVersions {
    releases: BTreeMap<Version, ModPackage>,
}

impl AvailableVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a release as available, overwriting metadata for an already
    /// known version. Idempotent for identical input.
    pub fn add(&mut self, package: ModPackage) {
        self.releases.insert(package.version(), package);
    }

    /// Forget a release. Does nothing if the version was not present.
    pub fn remove(&mut self, version: Version) {
        self.releases.remove(&version);
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Releases, most recent first.
    pub fn releases(&self) -> impl Iterator<Item = &ModPackage> {
        self.releases.values().rev()
    }

    /// The release at exactly `version`, if known.
    pub fn by_version(&self, version: Version) -> Option<&ModPackage> {
        self.releases.get(&version)
    }

    /// The most recent release satisfying an optional game-version gate and
    /// an optional relationship constraint.
    ///
    /// Releases requiring an owner token are skipped unless one is
    /// configured; they cannot be downloaded, so offering them only leads
    /// to a dead end at install time.
    pub fn latest(
        &self,
        game_version: Option<Version>,
        fallback_floor: Version,
        relationship: Option<&ModDependency>,
        has_owner_token: bool,
    ) -> Option<&ModPackage> {
        let candidates = self
            .releases
            .values()
            .rev()
            .filter(|p| has_owner_token || !p.requires_owner_token());

        for package in candidates {
            if let Some(game) = game_version {
                if !package.is_compatible_with(game, fallback_floor) {
                    continue;
                }
            }
            if let Some(relationship) = relationship {
                if !relationship.is_satisfied_by(package.identifier(), package.version()) {
                    continue;
                }
            }
            return Some(package);
        }

        debug!("No matching release among {} known versions", self.releases.len());
        None
    }
}
