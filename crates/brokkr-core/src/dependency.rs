//! Dependency constraints between modules
//!
//! A `ModDependency` is one stanza of a module's requirement list: a target
//! identifier, an optional flag, and inclusive version bounds. The textual
//! form is the legacy wire format carried in mod metadata:
//!
//! ```text
//! ? boblibrary >= 0.14.0
//! ```
//!
//! Exclusive bounds (`>` / `<`) and `!=` exist only in the textual form and
//! are rewritten into inclusive bounds at parse time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::version::Version;

/// Pseudo-identifier naming the base game itself.
pub const BASE_GAME: &str = "base";

/// A single dependency constraint on another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModDependency {
    pub name: String,
    pub optional: bool,
    pub min_version: Option<Version>,
    pub max_version: Option<Version>,
}

fn dependency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<optional>\? )?(?P<name>[A-Za-z0-9_-][A-Za-z0-9_ .-]*[A-Za-z0-9_-]|[A-Za-z0-9_-])(?P<min> ?>=? ?[0-9.]+)?(?P<max> ?<=? ?[0-9.]+)?(?P<exact> ?== ?[0-9.]+)?(?P<exclude> ?!= ?[0-9.]+)?$",
        )
        .expect("dependency pattern is valid")
    })
}

impl ModDependency {
    /// Create an unbounded mandatory dependency on `name`.
    pub fn on(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            min_version: None,
            max_version: None,
        }
    }

    /// Create an unbounded optional dependency on `name`.
    pub fn optional_on(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::on(name)
        }
    }

    pub fn with_min(mut self, min: Version) -> Self {
        self.min_version = Some(min);
        self
    }

    pub fn with_max(mut self, max: Version) -> Self {
        self.max_version = Some(max);
        self
    }

    pub fn with_exact(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self.max_version = Some(version);
        self
    }

    /// Whether the candidate `(name, version)` satisfies this constraint.
    ///
    /// An unrelated name satisfies the constraint iff it is optional; an
    /// unrelated optional stanza must never block resolution.
    pub fn is_satisfied_by(&self, name: &str, version: Version) -> bool {
        if name != self.name {
            return self.optional;
        }
        self.min_version.map_or(true, |min| version >= min)
            && self.max_version.map_or(true, |max| version <= max)
    }

    /// Whether any entry in an identifier → version map satisfies this
    /// constraint. An absent identifier satisfies it iff optional.
    pub fn is_satisfied_by_set(&self, versions: &HashMap<String, Version>) -> bool {
        match versions.get(&self.name) {
            Some(version) => self.is_satisfied_by(&self.name, *version),
            None => self.optional,
        }
    }

    /// The effective inclusive compatibility range for a base-game stanza.
    ///
    /// A base-game requirement with no max historically means "works until
    /// the next minor release", so the ceiling is synthesized from the min's
    /// minor bracket. With no min either, the bracket of `fallback_floor`
    /// is used (configurable via instance settings).
    pub fn game_range(&self, fallback_floor: Version) -> (Version, Version) {
        let min = self
            .min_version
            .unwrap_or_else(|| fallback_floor.floor_of_minor());
        let max = self.max_version.unwrap_or_else(|| min.ceiling_of_minor());
        (min, max)
    }
}

impl FromStr for ModDependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let captures = dependency_pattern()
            .captures(s.trim())
            .ok_or_else(|| Error::bad_module_spec(s))?;

        // Inclusive min and max bounds may combine; `==` and `!=` stand alone.
        let has_range_bound = captures.name("min").is_some() || captures.name("max").is_some();
        let special_bounds =
            captures.name("exact").is_some() as usize + captures.name("exclude").is_some() as usize;
        if special_bounds > 1 || (special_bounds == 1 && has_range_bound) {
            return Err(Error::bad_module_spec(s));
        }

        let parse_bound = |raw: &str, operator: &str| -> Result<Version> {
            raw.replace(operator, "").trim().parse()
        };

        let mut dependency = Self {
            name: captures["name"].to_string(),
            optional: captures.name("optional").is_some(),
            min_version: None,
            max_version: None,
        };

        if let Some(raw) = captures.name("min") {
            if raw.as_str().contains(">=") {
                dependency.min_version = Some(parse_bound(raw.as_str(), ">=")?);
            } else {
                // Exclusive `>`: the lowest version above the bound.
                dependency.min_version = Some(parse_bound(raw.as_str(), ">")?.next_patch());
            }
        }
        if let Some(raw) = captures.name("max") {
            if raw.as_str().contains("<=") {
                dependency.max_version = Some(parse_bound(raw.as_str(), "<=")?);
            } else {
                dependency.max_version = Some(parse_bound(raw.as_str(), "<")?.previous_patch());
            }
        }
        if let Some(raw) = captures.name("exact") {
            let version = parse_bound(raw.as_str(), "==")?;
            dependency.min_version = Some(version);
            dependency.max_version = Some(version);
        }
        if let Some(raw) = captures.name("exclude") {
            // The wire format's `!=` has always meant "greater than" to this
            // ecosystem's metadata; kept for compatibility.
            dependency.min_version = Some(parse_bound(raw.as_str(), "!=")?.next_patch());
        }

        Ok(dependency)
    }
}

impl fmt::Display for ModDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "? ")?;
        }
        write!(f, "{}", self.name)?;
        match (self.min_version, self.max_version) {
            (Some(min), Some(max)) if min == max => write!(f, " == {min}"),
            (Some(min), Some(max)) => write!(f, " >= {min} <= {max}"),
            (Some(min), None) => write!(f, " >= {min}"),
            (None, Some(max)) => write!(f, " <= {max}"),
            (None, None) => Ok(()),
        }
    }
}

impl Serialize for ModDependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModDependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
