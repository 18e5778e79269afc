//! Three-component mod and game versions
//!
//! Versions are ordered triples `major.minor.patch`. Mods frequently ship
//! metadata with only `major.minor` (patch defaults to 0), and the registry
//! relies on the "same minor bracket" helpers to turn such a version into an
//! inclusive compatibility range.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// An ordered `major.minor.patch` version.
///
/// Comparison is lexicographic on the numeric components, so leading zeros
/// in the textual form are irrelevant: `1.01` equals `1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The lowest version sharing this version's `major.minor`.
    pub fn floor_of_minor(&self) -> Self {
        Self::new(self.major, self.minor, 0)
    }

    /// The highest version sharing this version's `major.minor`.
    pub fn ceiling_of_minor(&self) -> Self {
        Self::new(self.major, self.minor, u64::MAX)
    }

    /// The next patch release. Used to rewrite an exclusive `>` bound as an
    /// inclusive `>=` one.
    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch.saturating_add(1))
    }

    /// The highest version strictly below this one, walking down through
    /// minor and major when the patch is already 0. Bottoms out at `0.0.0`.
    pub fn previous_patch(&self) -> Self {
        if self.patch > 0 {
            return Self::new(self.major, self.minor, self.patch - 1);
        }
        if self.minor > 0 {
            return Self::new(self.major, self.minor - 1, u64::MAX);
        }
        if self.major > 0 {
            return Self::new(self.major - 1, u64::MAX, u64::MAX);
        }
        Self::new(0, 0, 0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            return Err(Error::bad_version(s));
        }

        let mut parts = [0u64; 3];
        let mut count = 0;
        for component in text.split('.') {
            if count >= 3 {
                return Err(Error::bad_version(s));
            }
            parts[count] = component
                .parse::<u64>()
                .map_err(|_| Error::bad_version(s))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
