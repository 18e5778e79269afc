//! Global consistency checking
//!
//! Pure functions over a candidate set of modules plus the names of
//! autodetected drop-ins. Both the resolver (to vet a proposed plan) and
//! the installer (to vet the state it actually produced) call in here.

use std::collections::{HashMap, HashSet};

use brokkr_core::{Error, ModDependency, ModPackage, Result, Version};

/// Mandatory dependencies that nothing in `modules` ∪ `legacy_names`
/// satisfies, keyed by the depending module's identifier.
///
/// A legacy name satisfies any stanza naming it: autodetected drop-ins
/// carry no version Brokkr can vouch for, so bounds are not enforced
/// against them.
pub fn find_unmet_dependencies(
    modules: &[ModPackage],
    legacy_names: &HashSet<String>,
) -> Vec<(String, Vec<ModDependency>)> {
    let versions: HashMap<String, Version> = modules
        .iter()
        .map(|m| (m.identifier().to_string(), m.version()))
        .collect();

    let mut unmet = Vec::new();
    for module in modules {
        let missing: Vec<ModDependency> = module
            .depends()
            .filter(|dep| {
                !legacy_names.contains(&dep.name) && !dep.is_satisfied_by_set(&versions)
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            unmet.push((module.identifier().to_string(), missing));
        }
    }
    unmet
}

/// Every conflicting pair in the candidate set. If (a, b) is reported then
/// so is (b, a).
pub fn find_conflicts(modules: &[ModPackage]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (i, a) in modules.iter().enumerate() {
        for b in modules.iter().skip(i + 1) {
            if a.conflicts_with(b) {
                pairs.push((a.identifier().to_string(), b.identifier().to_string()));
                pairs.push((b.identifier().to_string(), a.identifier().to_string()));
            }
        }
    }
    pairs
}

/// Whether the candidate set has no unmet mandatory dependency and no
/// conflicting pair.
pub fn is_consistent(modules: &[ModPackage], legacy_names: &HashSet<String>) -> bool {
    find_unmet_dependencies(modules, legacy_names).is_empty() && find_conflicts(modules).is_empty()
}

/// Like `is_consistent`, but failing with every violation found, not just
/// the first.
pub fn enforce_consistency(modules: &[ModPackage], legacy_names: &HashSet<String>) -> Result<()> {
    let mut violations = Vec::new();

    for (identifier, missing) in find_unmet_dependencies(modules, legacy_names) {
        for dependency in missing {
            violations.push(format!("{identifier} requires {dependency} but it is not satisfied"));
        }
    }
    let mut seen = HashSet::new();
    for (a, b) in find_conflicts(modules) {
        // Each unordered pair is reported once in the error text.
        let key = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
        if seen.insert(key) {
            violations.push(format!("{a} conflicts with {b}"));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::inconsistencies(violations))
    }
}
