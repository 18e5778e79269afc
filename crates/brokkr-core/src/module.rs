//! Mod metadata model
//!
//! `ModPackage` is the one-record-per-version metadata document: the unit
//! stored in the registry's available index, snapshotted on install, and
//! shipped inside feed archives as JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dependency::{ModDependency, BASE_GAME};
use crate::error::{Error, Result};
use crate::version::Version;

/// Metadata schema version this build understands. Feed records with a
/// higher `schema` are skipped at ingestion, never treated as errors.
pub const SUPPORTED_SCHEMA: u32 = 1;

/// Aggregator flag marking releases that need an owner token to download.
pub const REQUIRES_OWNER_TOKEN: &str = "requires-owner-token";

fn default_schema() -> u32 {
    SUPPORTED_SCHEMA
}

/// What kind of content a module carries, which decides its install root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModKind {
    Mod,
    Textures,
    #[serde(rename = "metapackage")]
    Meta,
    Scenario,
}

impl fmt::Display for ModKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModKind::Mod => "mod",
            ModKind::Textures => "textures",
            ModKind::Meta => "metapackage",
            ModKind::Scenario => "scenario",
        };
        write!(f, "{name}")
    }
}

/// The inner info block as the game itself understands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModInfo {
    pub name: String,
    pub version: Version,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Mandatory and `?`-optional stanzas, base-game requirement included.
    #[serde(default)]
    pub dependencies: Vec<ModDependency>,
}

/// One module version's full metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModPackage {
    #[serde(default = "default_schema")]
    pub schema: u32,
    pub info: ModInfo,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recommends: Vec<ModDependency>,
    /// Suggestions beyond the optional stanzas already in `info.dependencies`.
    #[serde(default)]
    pub suggests_extra: Vec<ModDependency>,
    #[serde(default)]
    pub conflicts: Vec<ModDependency>,
    /// Virtual package names this module can stand in for.
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub download_urls: Vec<String>,
    #[serde(default)]
    pub download_size: u64,
    pub kind: ModKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    /// Free-form provenance and capability flags from the aggregator.
    #[serde(default)]
    pub aggregator_data: BTreeMap<String, String>,
}

impl ModPackage {
    /// Stable identifier, shared by every version of the module.
    pub fn identifier(&self) -> &str {
        &self.info.name
    }

    pub fn version(&self) -> Version {
        self.info.version
    }

    pub fn is_metapackage(&self) -> bool {
        self.kind == ModKind::Meta
    }

    /// Mandatory dependency stanzas, base game excluded.
    pub fn depends(&self) -> impl Iterator<Item = &ModDependency> {
        self.info
            .dependencies
            .iter()
            .filter(|d| d.name != BASE_GAME && !d.optional)
    }

    /// Optional stanzas plus any aggregator-supplied suggestions.
    pub fn suggests(&self) -> impl Iterator<Item = &ModDependency> {
        self.info
            .dependencies
            .iter()
            .filter(|d| d.name != BASE_GAME && d.optional)
            .chain(self.suggests_extra.iter())
    }

    pub fn recommends(&self) -> impl Iterator<Item = &ModDependency> {
        self.recommends.iter()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ModDependency> {
        self.conflicts.iter()
    }

    /// The base-game requirement stanza, if the metadata carries one.
    pub fn base_dependency(&self) -> Option<&ModDependency> {
        self.info.dependencies.iter().find(|d| d.name == BASE_GAME)
    }

    /// Whether this release works with the given game version. A module
    /// without a base-game stanza is compatible with everything.
    pub fn is_compatible_with(&self, game_version: Version, fallback_floor: Version) -> bool {
        match self.base_dependency() {
            Some(base) => {
                let (min, max) = base.game_range(fallback_floor);
                game_version >= min && game_version <= max
            }
            None => true,
        }
    }

    /// Whether this release satisfies a constraint, either directly by
    /// identifier and version or by providing the constraint's name as a
    /// virtual package. A provided alias carries no version of its own, so
    /// it only satisfies unversioned constraints.
    pub fn satisfies(&self, dependency: &ModDependency) -> bool {
        if dependency.is_satisfied_by(self.identifier(), self.version()) {
            return true;
        }
        dependency.min_version.is_none()
            && dependency.max_version.is_none()
            && self.provides.iter().any(|p| p == &dependency.name)
    }

    /// Symmetric conflict test: either side's conflicts stanza matching the
    /// other's identifier and version.
    pub fn conflicts_with(&self, other: &ModPackage) -> bool {
        let hits = |a: &ModPackage, b: &ModPackage| {
            a.conflicts
                .iter()
                .any(|c| c.name == b.identifier() && c.is_satisfied_by(b.identifier(), b.version()))
        };
        hits(self, other) || hits(other, self)
    }

    /// Canonical `{identifier}_{version}` artifact stem.
    pub fn standard_file_name(&self) -> String {
        format!("{}_{}", self.identifier(), self.version())
    }

    /// Whether downloading this release needs the owner's account token.
    pub fn requires_owner_token(&self) -> bool {
        self.aggregator_data
            .get(REQUIRES_OWNER_TOKEN)
            .map(|v| v == "1")
            .unwrap_or(false)
    }
}

impl PartialEq for ModPackage {
    fn eq(&self, other: &Self) -> bool {
        self.identifier() == other.identifier() && self.version() == other.version()
    }
}

impl Eq for ModPackage {}

impl std::hash::Hash for ModPackage {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier().hash(state);
        self.version().hash(state);
    }
}

impl fmt::Display for ModPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.standard_file_name())
    }
}

/// A user-facing `name[=version]` request, e.g. `boblibrary=0.14.2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub identifier: String,
    pub version: Option<Version>,
}

fn spec_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z0-9_-]+)(?:=(?P<version>\d+(?:\.\d+){0,2}))?$")
            .expect("spec pattern is valid")
    })
}

impl FromStr for PackageSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let captures = spec_pattern()
            .captures(s.trim())
            .ok_or_else(|| Error::bad_module_spec(s))?;
        let version = captures
            .name("version")
            .map(|v| v.as_str().parse())
            .transpose()?;
        Ok(Self {
            identifier: captures["name"].to_string(),
            version,
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}={v}", self.identifier),
            None => write!(f, "{}", self.identifier),
        }
    }
}
