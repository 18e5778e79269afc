//! The Brokkr registry
//!
//! All the modules we know about or have installed live in here: the
//! available index fed by metadata refreshes, the installed records with
//! their file ownership, and the autodetected drop-ins the installer never
//! touched. The registry is the unit of persistence (one JSON document)
//! and the unit of rollback (an explicit snapshot transaction handle).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use brokkr_core::{Error, GameInstance, ModDependency, ModInfo, ModPackage, Result, Version};

use crate::available::AvailableVersions;
use crate::sanity;

/// Registry document format version.
const REGISTRY_VERSION: u32 = 1;

fn current_registry_version() -> u32 {
    REGISTRY_VERSION
}

/// Compatibility context for available-module lookups: the game version to
/// match against, the floor for unpinned mods, and whether token-gated
/// releases are reachable.
#[derive(Debug, Clone, Copy)]
pub struct GameGate {
    pub game_version: Option<Version>,
    pub fallback_floor: Version,
    pub has_owner_token: bool,
}

impl GameGate {
    pub fn new(game_version: Version, fallback_floor: Version) -> Self {
        Self {
            game_version: Some(game_version),
            fallback_floor,
            has_owner_token: false,
        }
    }

    /// A gate that matches every game version.
    pub fn any(fallback_floor: Version) -> Self {
        Self {
            game_version: None,
            fallback_floor,
            has_owner_token: false,
        }
    }

    pub fn with_owner_token(mut self, has_token: bool) -> Self {
        self.has_owner_token = has_token;
        self
    }
}

/// An installed module: the metadata snapshot taken at install time, the
/// install timestamp, and the relative paths it owns with their hashes
/// (None for directories).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledMod {
    pub package: ModPackage,
    pub installed_at: DateTime<Utc>,
    pub files: BTreeMap<String, Option<String>>,
}

impl InstalledMod {
    pub fn identifier(&self) -> &str {
        self.package.identifier()
    }

    pub fn version(&self) -> Version {
        self.package.version()
    }

    /// Relative paths owned by this module.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|s| s.as_str())
    }
}

/// A mod found on disk that was never installed through Brokkr. It takes
/// part in dependency satisfaction but owns no files and cannot be
/// uninstalled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutodetectedMod {
    pub path: String,
    pub info: ModInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryData {
    #[serde(default = "current_registry_version")]
    registry_version: u32,
    #[serde(default)]
    available_modules: BTreeMap<String, AvailableVersions>,
    #[serde(default)]
    installed_modules: BTreeMap<String, InstalledMod>,
    #[serde(default)]
    preexisting_modules: BTreeMap<String, AutodetectedMod>,
    /// Relative path → owning identifier. The single source of truth for
    /// "is this file already claimed".
    #[serde(default)]
    installed_files: BTreeMap<String, String>,
}

impl Default for RegistryData {
    fn default() -> Self {
        Self {
            registry_version: REGISTRY_VERSION,
            available_modules: BTreeMap::new(),
            installed_modules: BTreeMap::new(),
            preexisting_modules: BTreeMap::new(),
            installed_files: BTreeMap::new(),
        }
    }
}

/// The registry proper.
pub struct Registry {
    data: RegistryData,
    path: Option<PathBuf>,
    tx_active: bool,
}

impl Registry {
    /// A fresh, empty registry with no backing file.
    pub fn empty() -> Self {
        Self {
            data: RegistryData::default(),
            path: None,
            tx_active: false,
        }
    }

    /// Load the registry from `path`, or start fresh if the file does not
    /// exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let data: RegistryData = serde_json::from_str(&content)?;
            if data.registry_version > REGISTRY_VERSION {
                return Err(Error::UnsupportedSchema {
                    source_name: path.display().to_string(),
                    schema: data.registry_version,
                });
            }
            data
        } else {
            debug!("No registry at {}, starting empty", path.display());
            RegistryData::default()
        };

        let registry = Self {
            data,
            path: Some(path),
            tx_active: false,
        };
        debug!(
            "Loaded registry: {} available, {} installed, {} autodetected",
            registry.data.available_modules.len(),
            registry.data.installed_modules.len(),
            registry.data.preexisting_modules.len()
        );
        Ok(registry)
    }

    /// Persist the registry to its backing file. This is the durable save;
    /// transactions only protect the in-memory state.
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| {
            Error::path_error("<none>", "registry has no backing file to save to")
        })?;
        self.save_to(path.clone())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(path, content)?;
        debug!(
            "Saved registry with {} installed modules to {}",
            self.data.installed_modules.len(),
            path.display()
        );
        Ok(())
    }

    // ── transactions ──────────────────────────────────────────────────

    /// Begin a logical transaction: a snapshot of the whole in-memory
    /// state is taken and restored if the handle is dropped or aborted.
    ///
    /// Nested transactions are unsupported; the `&mut` borrow makes them
    /// unrepresentable in safe code, and a leaked handle is caught here.
    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        if self.tx_active {
            return Err(Error::TransactionMisuse);
        }
        self.tx_active = true;
        let snapshot = self.data.clone();
        Ok(Transaction {
            snapshot: Some(snapshot),
            registry: self,
        })
    }

    // ── available modules ─────────────────────────────────────────────

    /// Mark a module release as available. Overwrites metadata for an
    /// already known `(identifier, version)`; idempotent for identical
    /// input.
    pub fn add_available(&mut self, package: ModPackage) {
        debug!("Available: {} {}", package.identifier(), package.version());
        self.data
            .available_modules
            .entry(package.identifier().to_string())
            .or_default()
            .add(package);
    }

    /// Clear all available modules, ahead of a feed refresh.
    pub fn clear_available(&mut self) {
        self.data.available_modules.clear();
    }

    /// Forget one available release. Does nothing if absent.
    pub fn remove_available(&mut self, identifier: &str, version: Version) {
        if let Some(index) = self.data.available_modules.get_mut(identifier) {
            index.remove(version);
            if index.is_empty() {
                self.data.available_modules.remove(identifier);
            }
        }
    }

    /// Identifiers with at least one known release, sorted.
    pub fn available_identifiers(&self) -> impl Iterator<Item = &str> {
        self.data.available_modules.keys().map(|s| s.as_str())
    }

    /// Every known `(identifier, version)` pair, for feed change reports.
    pub fn available_releases(&self) -> Vec<(String, Version)> {
        self.data
            .available_modules
            .iter()
            .flat_map(|(id, index)| index.releases().map(|p| (id.clone(), p.version())))
            .collect()
    }

    /// The most recent release of `identifier` compatible with the gate and
    /// an optional relationship constraint.
    ///
    /// `Ok(None)` means the module is known but nothing matches, which is
    /// distinct from the unknown-module error.
    pub fn latest_available(
        &self,
        identifier: &str,
        gate: &GameGate,
        relationship: Option<&ModDependency>,
    ) -> Result<Option<&ModPackage>> {
        let index = self
            .data
            .available_modules
            .get(identifier)
            .ok_or_else(|| Error::module_not_found(identifier))?;
        Ok(index.latest(
            gate.game_version,
            gate.fallback_floor,
            relationship,
            gate.has_owner_token,
        ))
    }

    /// The release of `identifier` at exactly `version`, if known.
    pub fn get_by_version(&self, identifier: &str, version: Version) -> Option<&ModPackage> {
        self.data
            .available_modules
            .get(identifier)?
            .by_version(version)
    }

    /// Like `latest_available`, plus every module whose provides list names
    /// `identifier`. May return 0, 1 or many candidates; arbitration of
    /// "many" belongs to the resolver.
    pub fn latest_available_with_provides(
        &self,
        identifier: &str,
        gate: &GameGate,
        relationship: Option<&ModDependency>,
    ) -> Vec<&ModPackage> {
        let mut candidates = Vec::new();

        if let Ok(Some(direct)) = self.latest_available(identifier, gate, relationship) {
            candidates.push(direct);
        }

        for (provider_id, index) in &self.data.available_modules {
            if provider_id == identifier {
                continue;
            }
            if let Some(latest) =
                index.latest(gate.game_version, gate.fallback_floor, None, gate.has_owner_token)
            {
                if latest.provides.iter().any(|p| p == identifier) {
                    candidates.push(latest);
                }
            }
        }

        candidates
    }

    /// Every module that is itself compatible with the gate and whose
    /// mandatory dependencies are all transitively satisfiable against it.
    pub fn available(&self, gate: &GameGate) -> Vec<&ModPackage> {
        let mut compatible = Vec::new();
        for identifier in self.data.available_modules.keys() {
            let Ok(Some(latest)) = self.latest_available(identifier, gate, None) else {
                continue;
            };
            let mut assume = HashSet::new();
            if self.might_be_installable(latest, gate, &mut assume) {
                compatible.push(latest);
            } else {
                debug!(
                    "Excluding {}: a mandatory dependency cannot be satisfied",
                    identifier
                );
            }
        }
        compatible
    }

    /// Whether every mandatory dependency of `package` has at least one
    /// resolvable provider, recursively. `assume` carries the modules
    /// currently under consideration, which are treated as installable so
    /// dependency cycles terminate.
    pub fn might_be_installable(
        &self,
        package: &ModPackage,
        gate: &GameGate,
        assume: &mut HashSet<String>,
    ) -> bool {
        if assume.contains(package.identifier()) {
            return true;
        }
        assume.insert(package.identifier().to_string());

        let installable = package.depends().all(|dep| {
            self.latest_available_with_provides(&dep.name, gate, None)
                .into_iter()
                .filter(|candidate| candidate.satisfies(dep))
                .any(|candidate| self.might_be_installable(candidate, gate, assume))
        });

        assume.remove(package.identifier());
        installable
    }

    // ── installed modules ─────────────────────────────────────────────

    /// Register `package` as installed, owning `absolute_files`.
    ///
    /// Fails with an inconsistency error, claiming nothing, if any of the
    /// paths is already owned by a different module. Directories are
    /// exempt from the one-owner rule.
    pub fn register_module(
        &mut self,
        package: &ModPackage,
        absolute_files: &[PathBuf],
        instance: &GameInstance,
    ) -> Result<()> {
        if self.data.installed_modules.contains_key(package.identifier()) {
            return Err(Error::inconsistent(format!(
                "{} is already registered as installed",
                package.identifier()
            )));
        }

        let mut relative_files = Vec::new();
        for absolute in absolute_files {
            relative_files.push((instance.to_relative(absolute)?, absolute.clone()));
        }

        // First pass finds every collision so the error lists them all and
        // no partial claim is left behind.
        let mut inconsistencies = Vec::new();
        for (relative, absolute) in &relative_files {
            if absolute.is_dir() {
                continue;
            }
            if let Some(owner) = self.data.installed_files.get(relative) {
                if owner != package.identifier() {
                    inconsistencies.push(format!(
                        "{} wishes to install {}, but this file is registered to {}",
                        package.identifier(),
                        relative,
                        owner
                    ));
                }
            }
        }
        if !inconsistencies.is_empty() {
            return Err(Error::inconsistencies(inconsistencies));
        }

        let mut files = BTreeMap::new();
        for (relative, absolute) in relative_files {
            let hash = hash_file(&absolute)?;
            self.data
                .installed_files
                .insert(relative.clone(), package.identifier().to_string());
            files.insert(relative, hash);
        }

        info!(
            "Registered {} {} with {} file(s)",
            package.identifier(),
            package.version(),
            files.len()
        );
        self.data.installed_modules.insert(
            package.identifier().to_string(),
            InstalledMod {
                package: package.clone(),
                installed_at: Utc::now(),
                files,
            },
        );
        Ok(())
    }

    /// Deregister an installed module, which must already have its files
    /// removed from disk.
    pub fn deregister_module(&mut self, identifier: &str, instance: &GameInstance) -> Result<()> {
        let installed = self
            .data
            .installed_modules
            .get(identifier)
            .ok_or_else(|| Error::not_installed(identifier))?;

        let mut inconsistencies = Vec::new();
        for relative in installed.files() {
            let absolute = instance.to_absolute(relative);
            if absolute.is_file() {
                inconsistencies.push(format!(
                    "{} is registered to {} but has not been removed",
                    relative, identifier
                ));
            }
        }
        if !inconsistencies.is_empty() {
            return Err(Error::inconsistencies(inconsistencies));
        }

        if let Some(installed) = self.data.installed_modules.remove(identifier) {
            for relative in installed.files.keys() {
                self.data.installed_files.remove(relative);
            }
        }
        info!("Deregistered {}", identifier);
        Ok(())
    }

    /// Record a drop-in mod found on disk. Does nothing if the identifier
    /// is genuinely installed; overwrites a previous autodetection freely.
    pub fn register_preexisting(&mut self, path: impl Into<String>, info: ModInfo) {
        if self.data.installed_modules.contains_key(&info.name) {
            debug!("Not autodetecting {}, it is already installed", info.name);
            return;
        }
        let path = path.into();
        debug!("Autodetected {} at {}", info.name, path);
        self.data
            .preexisting_modules
            .insert(info.name.clone(), AutodetectedMod { path, info });
    }

    /// Forget every autodetected entry, ahead of a rescan.
    pub fn clear_preexisting(&mut self) {
        self.data.preexisting_modules.clear();
    }

    /// identifier → version for everything that counts as installed:
    /// autodetected drop-ins, virtual provides (when requested) and true
    /// installs, the latter taking precedence on collision.
    pub fn installed(&self, with_provides: bool) -> HashMap<String, Version> {
        let mut installed = HashMap::new();

        for (name, auto) in &self.data.preexisting_modules {
            installed.insert(name.clone(), auto.info.version);
        }
        if with_provides {
            for (name, version) in self.provided() {
                installed.insert(name, version);
            }
        }
        for (name, module) in &self.data.installed_modules {
            installed.insert(name.clone(), module.version());
        }

        installed
    }

    /// Virtual package name → version of the installed module providing it.
    pub fn provided(&self) -> HashMap<String, Version> {
        let mut provided = HashMap::new();
        for module in self.data.installed_modules.values() {
            for name in &module.package.provides {
                provided.insert(name.clone(), module.version());
            }
        }
        provided
    }

    /// Installed version of `identifier`, looking through drop-ins and
    /// (optionally) provides.
    pub fn installed_version(&self, identifier: &str, with_provides: bool) -> Option<Version> {
        if let Some(module) = self.data.installed_modules.get(identifier) {
            return Some(module.version());
        }
        if let Some(auto) = self.data.preexisting_modules.get(identifier) {
            return Some(auto.info.version);
        }
        if with_provides {
            return self.provided().get(identifier).copied();
        }
        None
    }

    pub fn installed_module(&self, identifier: &str) -> Option<&InstalledMod> {
        self.data.installed_modules.get(identifier)
    }

    /// Metadata snapshots of every truly installed module.
    pub fn installed_packages(&self) -> impl Iterator<Item = &ModPackage> {
        self.data.installed_modules.values().map(|m| &m.package)
    }

    pub fn installed_modules(&self) -> impl Iterator<Item = &InstalledMod> {
        self.data.installed_modules.values()
    }

    /// Names of autodetected drop-ins.
    pub fn preexisting_names(&self) -> HashSet<String> {
        self.data.preexisting_modules.keys().cloned().collect()
    }

    pub fn preexisting_modules(&self) -> impl Iterator<Item = &AutodetectedMod> {
        self.data.preexisting_modules.values()
    }

    /// Whether `identifier` was installed through Brokkr (drop-ins and
    /// provides do not count).
    pub fn is_installed(&self, identifier: &str) -> bool {
        self.data.installed_modules.contains_key(identifier)
    }

    pub fn is_preexisting(&self, identifier: &str) -> bool {
        self.data.preexisting_modules.contains_key(identifier)
    }

    /// The module owning this relative path, or None if unclaimed.
    pub fn file_owner(&self, relative: &str) -> Result<Option<&str>> {
        if Path::new(relative).is_absolute() {
            return Err(Error::path_error(
                relative,
                "file ownership is tracked by relative path",
            ));
        }
        Ok(self
            .data
            .installed_files
            .get(relative)
            .map(|s| s.as_str()))
    }

    /// Rebuild the file-ownership index from the installed records. Safe
    /// to run at any time.
    pub fn reindex_installed_files(&mut self) {
        self.data.installed_files.clear();
        for (identifier, module) in &self.data.installed_modules {
            for relative in module.files.keys() {
                self.data
                    .installed_files
                    .insert(relative.clone(), identifier.clone());
            }
        }
    }

    /// Enforce global consistency over the currently installed set.
    pub fn check_sanity(&self) -> Result<()> {
        let installed: Vec<ModPackage> = self.installed_packages().cloned().collect();
        sanity::enforce_consistency(&installed, &self.preexisting_names())
    }

    /// All modules that could not remain installed if `targets` were
    /// removed, including the targets themselves. Fixed-point closure:
    /// repeatedly removes the set hypothetically and folds in whatever
    /// breaks until nothing new does.
    pub fn find_reverse_dependencies(&self, targets: &[String]) -> HashSet<String> {
        let installed: Vec<ModPackage> = self.installed_packages().cloned().collect();
        let legacy = self.preexisting_names();

        let mut to_remove: HashSet<String> = targets.iter().cloned().collect();
        loop {
            let hypothetical: Vec<ModPackage> = installed
                .iter()
                .filter(|m| !to_remove.contains(m.identifier()))
                .cloned()
                .collect();

            let broken: HashSet<String> = sanity::find_unmet_dependencies(&hypothetical, &legacy)
                .into_iter()
                .map(|(identifier, _)| identifier)
                .collect();

            if broken.is_subset(&to_remove) {
                return to_remove;
            }
            to_remove.extend(broken);
        }
    }
}

/// Sha256 of a file's contents as lowercase hex; None for directories.
fn hash_file(path: &Path) -> Result<Option<String>> {
    if path.is_dir() {
        return Ok(None);
    }
    let content = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(Some(hex::encode(hasher.finalize())))
}

/// An open registry transaction. Dropping the handle (or calling `abort`)
/// restores the snapshot; `commit` keeps the mutations.
///
/// This is best-effort in-memory undo, not crash-safe durability; the
/// durable write is `Registry::save`.
pub struct Transaction<'a> {
    registry: &'a mut Registry,
    snapshot: Option<RegistryData>,
}

impl Transaction<'_> {
    /// Keep every mutation made through this handle.
    pub fn commit(mut self) {
        self.snapshot = None;
        debug!("Registry transaction committed");
    }

    /// Discard every mutation made through this handle.
    pub fn abort(self) {
        // Drop restores the snapshot.
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            warn!("Rolling back in-memory registry changes");
            self.registry.data = snapshot;
        }
        self.registry.tx_active = false;
    }
}

impl Deref for Transaction<'_> {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        self.registry
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokkr_core::ModKind;
    use tempfile::TempDir;

    fn fixture(name: &str, version: &str) -> ModPackage {
        ModPackage {
            schema: 1,
            info: ModInfo {
                name: name.to_string(),
                version: version.parse().unwrap(),
                title: name.to_string(),
                author: "test".to_string(),
                contact: None,
                homepage: None,
                description: None,
                dependencies: Vec::new(),
            },
            authors: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            recommends: Vec::new(),
            suggests_extra: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            download_urls: Vec::new(),
            download_size: 0,
            kind: ModKind::Mod,
            released_at: None,
            aggregator_data: Default::default(),
        }
    }

    fn depends_on(mut package: ModPackage, stanza: &str) -> ModPackage {
        package.info.dependencies.push(stanza.parse().unwrap());
        package
    }

    fn gate() -> GameGate {
        GameGate::any(Version::new(0, 12, 0))
    }

    fn installed_fixture(
        registry: &mut Registry,
        instance: &GameInstance,
        package: ModPackage,
    ) {
        let file = instance
            .mods_dir()
            .join(format!("{}.zip", package.standard_file_name()));
        fs::write(&file, b"payload").unwrap();
        registry
            .register_module(&package, &[file], instance)
            .unwrap();
    }

    fn temp_instance() -> (TempDir, GameInstance) {
        let tmp = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        instance.init().unwrap();
        (tmp, instance)
    }

    #[test]
    fn test_add_available_is_idempotent() {
        let mut registry = Registry::empty();
        registry.add_available(fixture("foo", "1.0.0"));
        registry.add_available(fixture("foo", "1.0.0"));
        let latest = registry.latest_available("foo", &gate(), None).unwrap();
        assert_eq!(latest.unwrap().version(), Version::new(1, 0, 0));
        assert_eq!(registry.available_releases().len(), 1);
    }

    #[test]
    fn test_unknown_module_is_an_error_not_none() {
        let registry = Registry::empty();
        assert!(matches!(
            registry.latest_available("ghost", &gate(), None),
            Err(Error::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn test_known_but_incompatible_is_none() {
        let mut registry = Registry::empty();
        registry.add_available(depends_on(fixture("foo", "1.0.0"), "base >= 0.15.0"));
        let gate = GameGate::new("0.14.0".parse().unwrap(), Version::new(0, 12, 0));
        assert!(registry.latest_available("foo", &gate, None).unwrap().is_none());
    }

    #[test]
    fn test_latest_with_provides_collects_providers() {
        let mut registry = Registry::empty();
        let mut c = fixture("c", "1.0.0");
        c.provides = vec!["x".to_string()];
        let mut d = fixture("d", "1.0.0");
        d.provides = vec!["x".to_string()];
        registry.add_available(c);
        registry.add_available(d);

        let candidates = registry.latest_available_with_provides("x", &gate(), None);
        let names: Vec<_> = candidates.iter().map(|p| p.identifier()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"c") && names.contains(&"d"));
    }

    #[test]
    fn test_available_excludes_unsatisfiable_dependents() {
        let mut registry = Registry::empty();
        registry.add_available(fixture("standalone", "1.0.0"));
        registry.add_available(depends_on(fixture("needy", "1.0.0"), "nonexistent"));

        let names: Vec<_> = registry
            .available(&gate())
            .iter()
            .map(|p| p.identifier().to_string())
            .collect();
        assert!(names.contains(&"standalone".to_string()));
        assert!(!names.contains(&"needy".to_string()));
    }

    #[test]
    fn test_available_tolerates_dependency_cycles() {
        let mut registry = Registry::empty();
        registry.add_available(depends_on(fixture("a", "1.0.0"), "b"));
        registry.add_available(depends_on(fixture("b", "1.0.0"), "a"));
        let names: Vec<_> = registry
            .available(&gate())
            .iter()
            .map(|p| p.identifier().to_string())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_register_claims_files_and_rejects_double_owners() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();

        let first = fixture("first", "1.0.0");
        installed_fixture(&mut registry, &instance, first.clone());
        assert_eq!(
            registry.file_owner("mods/first_1.0.0.zip").unwrap(),
            Some("first")
        );

        // A different module claiming the same path must fail wholesale.
        let thief = fixture("thief", "1.0.0");
        let stolen = instance.mods_dir().join("first_1.0.0.zip");
        let own = instance.mods_dir().join("thief_1.0.0.zip");
        fs::write(&own, b"thief").unwrap();
        let err = registry
            .register_module(&thief, &[stolen, own.clone()], &instance)
            .unwrap_err();
        assert!(matches!(err, Error::Inconsistent { .. }));
        // No partial claim of the second path either.
        assert_eq!(registry.file_owner("mods/thief_1.0.0.zip").unwrap(), None);
        assert!(!registry.is_installed("thief"));
    }

    #[test]
    fn test_deregister_requires_files_gone() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();
        installed_fixture(&mut registry, &instance, fixture("foo", "1.0.0"));

        let err = registry.deregister_module("foo", &instance).unwrap_err();
        assert!(matches!(err, Error::Inconsistent { .. }));
        assert!(registry.is_installed("foo"));

        fs::remove_file(instance.mods_dir().join("foo_1.0.0.zip")).unwrap();
        registry.deregister_module("foo", &instance).unwrap();
        assert!(!registry.is_installed("foo"));
        assert_eq!(registry.file_owner("mods/foo_1.0.0.zip").unwrap(), None);
    }

    #[test]
    fn test_installed_precedence() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();

        let mut provider = fixture("provider", "2.0.0");
        provider.provides = vec!["virtual-x".to_string()];
        installed_fixture(&mut registry, &instance, provider);

        registry.register_preexisting(
            "mods/dropin_0.5.0.zip",
            ModInfo {
                name: "dropin".to_string(),
                version: "0.5.0".parse().unwrap(),
                title: "dropin".to_string(),
                author: "?".to_string(),
                contact: None,
                homepage: None,
                description: None,
                dependencies: Vec::new(),
            },
        );

        let installed = registry.installed(true);
        assert_eq!(installed.get("provider"), Some(&Version::new(2, 0, 0)));
        assert_eq!(installed.get("virtual-x"), Some(&Version::new(2, 0, 0)));
        assert_eq!(installed.get("dropin"), Some(&Version::new(0, 5, 0)));

        let without = registry.installed(false);
        assert!(without.get("virtual-x").is_none());
    }

    #[test]
    fn test_register_preexisting_skips_true_installs() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();
        installed_fixture(&mut registry, &instance, fixture("foo", "1.0.0"));

        registry.register_preexisting(
            "mods/foo_0.9.0.zip",
            ModInfo {
                name: "foo".to_string(),
                version: "0.9.0".parse().unwrap(),
                title: "foo".to_string(),
                author: "?".to_string(),
                contact: None,
                homepage: None,
                description: None,
                dependencies: Vec::new(),
            },
        );
        assert!(!registry.is_preexisting("foo"));
        assert_eq!(
            registry.installed_version("foo", false),
            Some(Version::new(1, 0, 0))
        );
    }

    #[test]
    fn test_file_owner_rejects_absolute_paths() {
        let registry = Registry::empty();
        let absolute = if cfg!(windows) { "C:\\mods\\x.zip" } else { "/mods/x.zip" };
        assert!(registry.file_owner(absolute).is_err());
    }

    #[test]
    fn test_reverse_dependencies_reach_fixed_point() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();
        installed_fixture(&mut registry, &instance, fixture("a", "1.0.0"));
        installed_fixture(
            &mut registry,
            &instance,
            depends_on(fixture("z", "1.0.0"), "a"),
        );
        installed_fixture(
            &mut registry,
            &instance,
            depends_on(fixture("zz", "1.0.0"), "z"),
        );
        installed_fixture(&mut registry, &instance, fixture("bystander", "1.0.0"));

        let goners = registry.find_reverse_dependencies(&["a".to_string()]);
        let expected: HashSet<String> = ["a", "z", "zz"].iter().map(|s| s.to_string()).collect();
        assert_eq!(goners, expected);

        // The closure is a fixed point.
        let again = registry.find_reverse_dependencies(&goners.iter().cloned().collect::<Vec<_>>());
        assert_eq!(goners, again);
    }

    #[test]
    fn test_reindex_rebuilds_ownership() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::empty();
        installed_fixture(&mut registry, &instance, fixture("foo", "1.0.0"));

        // Simulate a corrupted index and repair it.
        registry.data.installed_files.clear();
        assert_eq!(registry.file_owner("mods/foo_1.0.0.zip").unwrap(), None);
        registry.reindex_installed_files();
        assert_eq!(
            registry.file_owner("mods/foo_1.0.0.zip").unwrap(),
            Some("foo")
        );
    }

    #[test]
    fn test_transaction_rollback_and_commit() {
        let mut registry = Registry::empty();
        registry.add_available(fixture("keep", "1.0.0"));

        {
            let mut tx = registry.begin().unwrap();
            tx.add_available(fixture("discard", "1.0.0"));
            tx.abort();
        }
        assert!(registry.latest_available("discard", &gate(), None).is_err());
        assert!(registry.latest_available("keep", &gate(), None).is_ok());

        {
            let mut tx = registry.begin().unwrap();
            tx.add_available(fixture("kept-too", "1.0.0"));
            tx.commit();
        }
        assert!(registry.latest_available("kept-too", &gate(), None).is_ok());
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut registry = Registry::empty();
        {
            let mut tx = registry.begin().unwrap();
            tx.add_available(fixture("ghost", "1.0.0"));
            // Dropped without commit.
        }
        assert!(registry.latest_available("ghost", &gate(), None).is_err());
        // And a new transaction can begin afterwards.
        registry.begin().unwrap().commit();
    }

    #[test]
    fn test_persistence_round_trip() {
        let (_tmp, instance) = temp_instance();
        let mut registry = Registry::load(instance.registry_path()).unwrap();
        registry.add_available(fixture("foo", "1.0.0"));
        installed_fixture(&mut registry, &instance, fixture("bar", "2.0.0"));
        registry.save().unwrap();

        let reloaded = Registry::load(instance.registry_path()).unwrap();
        assert!(reloaded.is_installed("bar"));
        assert_eq!(
            reloaded.file_owner("mods/bar_2.0.0.zip").unwrap(),
            Some("bar")
        );
        let latest = reloaded.latest_available("foo", &gate(), None).unwrap();
        assert_eq!(latest.unwrap().version(), Version::new(1, 0, 0));
    }

    #[test]
    fn test_future_registry_format_is_refused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        fs::write(&path, r#"{"registry_version": 99}"#).unwrap();
        assert!(matches!(
            Registry::load(&path),
            Err(Error::UnsupportedSchema { .. })
        ));
    }
}
