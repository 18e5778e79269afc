//! Transactional mod installation
//!
//! Orchestrates install, uninstall and upgrade as all-or-nothing batches:
//! one registry transaction plus one filesystem transaction per batch, so
//! any single module's failure unwinds every change made so far. Artifacts
//! are only ever taken from the download cache; fetching them is the
//! caller's job, ahead of the batch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use brokkr_core::{Error, GameInstance, ModPackage, PackageSpec, Result, Version};
use brokkr_registry::{GameGate, Registry, ResolveOptions, Resolver, Transaction};

use crate::cache::DownloadCache;
use crate::fsops::FsTransaction;

/// What happened to one module of an install batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { identifier: String, version: Version },
    AlreadyInstalled { identifier: String, version: Version },
}

impl std::fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallOutcome::Installed { identifier, version } => {
                write!(f, "{identifier} {version} installed")
            }
            InstallOutcome::AlreadyInstalled { identifier, version } => {
                write!(f, "{identifier} {version} already installed, skipped")
            }
        }
    }
}

/// An upgrade batch, split for display before anything mutates.
#[derive(Debug, Clone)]
pub struct UpgradePlan {
    pub to_install: Vec<ModPackage>,
    pub to_remove: Vec<String>,
    pub notes: Vec<String>,
}

/// Installer for one game instance.
pub struct ModInstaller<'a> {
    instance: &'a GameInstance,
    registry: &'a mut Registry,
    cache: &'a DownloadCache,
    gate: GameGate,
}

impl<'a> ModInstaller<'a> {
    pub fn new(
        instance: &'a GameInstance,
        registry: &'a mut Registry,
        cache: &'a DownloadCache,
        gate: GameGate,
    ) -> Self {
        Self {
            instance,
            registry,
            cache,
            gate,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// Resolve an install request into a plan without mutating anything.
    /// Returns the modules to install with a reason line for each.
    pub fn plan_install(
        &self,
        specs: &[PackageSpec],
        options: &ResolveOptions,
    ) -> Result<(Vec<ModPackage>, Vec<(String, String)>)> {
        let mut resolver = Resolver::new(self.registry, self.gate, options.clone());
        resolver.resolve_specs(specs)?;
        let plan = resolver.mod_list();
        let reasons = plan
            .iter()
            .map(|m| {
                (
                    m.identifier().to_string(),
                    resolver.reason_chain(m.identifier()),
                )
            })
            .collect();
        Ok((plan, reasons))
    }

    /// Install every module of a resolved plan as one transaction.
    ///
    /// Every artifact must already be in the cache; a missing one fails
    /// the whole batch and rolls everything back.
    pub fn install_plan(&mut self, plan: &[ModPackage]) -> Result<Vec<InstallOutcome>> {
        let mut tx = self.registry.begin()?;
        let mut fs_tx = FsTransaction::new()?;

        let mut outcomes = Vec::new();
        for module in plan {
            outcomes.push(install_one(
                self.instance,
                self.cache,
                &mut tx,
                &mut fs_tx,
                module,
            )?);
        }

        tx.check_sanity()?;
        tx.save()?;
        fs_tx.commit();
        tx.commit();
        Ok(outcomes)
    }

    /// The full set of modules an uninstall request takes with it: the
    /// targets plus everything that cannot live without them, sorted.
    ///
    /// Fails up front if a target is not installed, or is only a drop-in
    /// Brokkr cannot remove.
    pub fn plan_uninstall(&self, identifiers: &[String]) -> Result<Vec<String>> {
        for identifier in identifiers {
            if !self.registry.is_installed(identifier) {
                if self.registry.is_preexisting(identifier) {
                    return Err(Error::ModuleNotRemovable {
                        identifier: identifier.clone(),
                    });
                }
                return Err(Error::not_installed(identifier.clone()));
            }
        }
        let mut goners: Vec<String> = self
            .registry
            .find_reverse_dependencies(identifiers)
            .into_iter()
            .collect();
        goners.sort();
        Ok(goners)
    }

    /// Uninstall the given modules and their reverse-dependency closure as
    /// one transaction. Returns what was removed.
    pub fn uninstall_list(&mut self, identifiers: &[String]) -> Result<Vec<String>> {
        let goners = self.plan_uninstall(identifiers)?;
        if goners.is_empty() {
            return Ok(goners);
        }

        let mut tx = self.registry.begin()?;
        let mut fs_tx = FsTransaction::new()?;

        for identifier in &goners {
            info!("Removing {}", identifier);
            uninstall_one(self.instance, &mut tx, &mut fs_tx, identifier)?;
        }

        tx.check_sanity()?;
        tx.save()?;
        fs_tx.commit();
        tx.commit();
        Ok(goners)
    }

    /// Work out what an upgrade request means per module: a true upgrade,
    /// a reinstall, a downgrade, or a first-time install. Upgrading a mod
    /// Brokkr never installed is refused.
    pub fn plan_upgrade(&self, specs: &[PackageSpec]) -> Result<UpgradePlan> {
        let mut resolver =
            Resolver::new(self.registry, self.gate, ResolveOptions::depends_only());
        resolver.resolve_specs(specs)?;
        let to_install = resolver.mod_list();

        let mut to_remove = Vec::new();
        let mut notes = Vec::new();
        for module in &to_install {
            let identifier = module.identifier();
            match self.registry.installed_module(identifier) {
                None => {
                    if self.registry.is_preexisting(identifier) {
                        return Err(Error::ModuleNotRemovable {
                            identifier: identifier.to_string(),
                        });
                    }
                    notes.push(format!(
                        "{identifier} is not installed yet, installing {}",
                        module.version()
                    ));
                }
                Some(installed) => {
                    to_remove.push(identifier.to_string());
                    let current = installed.version();
                    if current == module.version() {
                        notes.push(format!(
                            "{identifier} is already at {current}, reinstalling"
                        ));
                    } else if current > module.version() {
                        notes.push(format!(
                            "downgrading {identifier} from {current} to {}",
                            module.version()
                        ));
                    } else {
                        notes.push(format!(
                            "upgrading {identifier} from {current} to {}",
                            module.version()
                        ));
                    }
                }
            }
        }

        Ok(UpgradePlan {
            to_install,
            to_remove,
            notes,
        })
    }

    /// Apply an upgrade plan: remove the old versions and install the new
    /// ones in a single transaction.
    pub fn apply_upgrade(&mut self, plan: &UpgradePlan) -> Result<Vec<InstallOutcome>> {
        self.add_remove(&plan.to_install, &plan.to_remove)
    }

    /// Remove then install the listed modules as one transaction. No
    /// relationship processing happens here; callers resolve first.
    pub fn add_remove(
        &mut self,
        add: &[ModPackage],
        remove: &[String],
    ) -> Result<Vec<InstallOutcome>> {
        let mut tx = self.registry.begin()?;
        let mut fs_tx = FsTransaction::new()?;

        for identifier in remove {
            uninstall_one(self.instance, &mut tx, &mut fs_tx, identifier)?;
        }
        let mut outcomes = Vec::new();
        for module in add {
            outcomes.push(install_one(
                self.instance,
                self.cache,
                &mut tx,
                &mut fs_tx,
                module,
            )?);
        }

        tx.check_sanity()?;
        tx.save()?;
        fs_tx.commit();
        tx.commit();
        Ok(outcomes)
    }
}

/// Install one module inside an open transaction pair.
fn install_one(
    instance: &GameInstance,
    cache: &DownloadCache,
    tx: &mut Transaction<'_>,
    fs_tx: &mut FsTransaction,
    module: &ModPackage,
) -> Result<InstallOutcome> {
    if let Some(installed) = tx.installed_module(module.identifier()) {
        let current = installed.version();
        if current == module.version() {
            debug!("{} {} already installed, skipping", module.identifier(), current);
            return Ok(InstallOutcome::AlreadyInstalled {
                identifier: module.identifier().to_string(),
                version: current,
            });
        }
        return Err(Error::inconsistent(format!(
            "{} {} is already installed; upgrade it instead of installing {}",
            module.identifier(),
            current,
            module.version()
        )));
    }

    // Metapackages own no files; they are recorded purely so their
    // dependents' bookkeeping holds together.
    if module.is_metapackage() {
        debug!("Recording metapackage {}", module.identifier());
        tx.register_module(module, &[], instance)?;
        return Ok(InstallOutcome::Installed {
            identifier: module.identifier().to_string(),
            version: module.version(),
        });
    }

    let cached = cache.cached_path(module).ok_or_else(|| {
        Error::file_not_found(format!(
            "{} is not downloaded or its download is corrupted",
            module.standard_file_name()
        ))
    })?;

    let files = install_archive(instance, tx, fs_tx, module, &cached)?;
    tx.register_module(module, &files, instance)?;
    info!("Installed {} {}", module.identifier(), module.version());
    Ok(InstallOutcome::Installed {
        identifier: module.identifier().to_string(),
        version: module.version(),
    })
}

/// Copy a module's archive into its kind-specific root. The physical
/// single-module step; metapackages must never reach it.
fn install_archive(
    instance: &GameInstance,
    tx: &Transaction<'_>,
    fs_tx: &mut FsTransaction,
    module: &ModPackage,
    cached: &Path,
) -> Result<Vec<PathBuf>> {
    if module.is_metapackage() {
        return Err(Error::bad_package(
            module.identifier(),
            "metapackages can not be installed",
        ));
    }

    let root = instance.kind_root(module.kind)?;
    let destination = root.join(format!("{}.zip", module.standard_file_name()));

    match fs_tx.copy_file(cached, &destination) {
        Ok(()) => Ok(vec![destination]),
        Err(Error::FileExists { path, .. }) => {
            // Decorate with both parties for diagnostics.
            let relative = instance.to_relative(&destination)?;
            let owner = tx.file_owner(&relative)?.map(|s| s.to_string());
            Err(Error::FileExists {
                path,
                installing: module.identifier().to_string(),
                owner,
            })
        }
        Err(other) => Err(other),
    }
}

/// Remove one module's files and registry record inside an open
/// transaction pair, then sweep directories it emptied.
fn uninstall_one(
    instance: &GameInstance,
    tx: &mut Transaction<'_>,
    fs_tx: &mut FsTransaction,
    identifier: &str,
) -> Result<()> {
    let module = tx
        .installed_module(identifier)
        .ok_or_else(|| Error::not_installed(identifier))?
        .clone();

    let mut parent_dirs = BTreeSet::new();
    for relative in module.files() {
        let absolute = instance.to_absolute(relative);
        if absolute.is_dir() {
            parent_dirs.insert(absolute);
        } else if absolute.is_file() {
            fs_tx.delete_file(&absolute)?;
            if let Some(parent) = absolute.parent() {
                parent_dirs.insert(parent.to_path_buf());
            }
        } else {
            warn!("{} was registered to {} but is already gone", relative, identifier);
        }
    }

    tx.deregister_module(identifier, instance)?;

    // Remove directories the module emptied, children before parents.
    // Protected roots stay, and non-empty directories are left alone.
    let protected = instance.protected_dirs();
    let mut ordered: Vec<PathBuf> = parent_dirs.into_iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    for dir in ordered {
        if protected.contains(&dir) || !dir.is_dir() {
            continue;
        }
        match std::fs::read_dir(&dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    debug!("Removing empty directory {}", dir.display());
                    if let Err(e) = std::fs::remove_dir(&dir) {
                        warn!("Could not remove {}: {}", dir.display(), e);
                    }
                }
            }
            Err(e) => warn!("Could not inspect {}: {}", dir.display(), e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use brokkr_core::{ModInfo, ModKind};

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

    struct Rig {
        _tmp: TempDir,
        instance: GameInstance,
        registry: Registry,
        cache: DownloadCache,
    }

    fn rig() -> Rig {
        let tmp = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        instance.init().unwrap();
        let registry = Registry::load(instance.registry_path()).unwrap();
        let cache = DownloadCache::new(instance.downloads_dir()).unwrap();
        Rig {
            _tmp: tmp,
            instance,
            registry,
            cache,
        }
    }

    fn gate() -> GameGate {
        GameGate::any(Version::new(0, 12, 0))
    }

    fn seed_cache(rig: &Rig, package: &ModPackage) {
        fs::write(
            rig.cache.path_for(package),
            format!("archive of {}", package.standard_file_name()),
        )
        .unwrap();
    }

    #[test]
    fn test_install_copies_and_registers() {
        let mut rig = rig();
        let package = fixture("foo", "1.0.0");
        rig.registry.add_available(package.clone());
        seed_cache(&rig, &package);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let outcomes = installer.install_plan(&[package.clone()]).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], InstallOutcome::Installed { .. }));

        assert!(rig.instance.mods_dir().join("foo_1.0.0.zip").is_file());
        assert!(rig.registry.is_installed("foo"));
        // Registry was persisted too.
        let reloaded = Registry::load(rig.instance.registry_path()).unwrap();
        assert!(reloaded.is_installed("foo"));
    }

    #[test]
    fn test_missing_artifact_fails_and_rolls_back() {
        let mut rig = rig();
        let cached = fixture("cached", "1.0.0");
        let missing = fixture("missing", "1.0.0");
        seed_cache(&rig, &cached);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let err = installer
            .install_plan(&[cached.clone(), missing.clone()])
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));

        // The first module's copy and registration were both undone.
        assert!(!rig.instance.mods_dir().join("cached_1.0.0.zip").exists());
        assert!(!rig.registry.is_installed("cached"));
    }

    #[test]
    fn test_scenario_kind_installs_into_scenarios() {
        let mut rig = rig();
        let mut package = fixture("savegame", "1.0.0");
        package.kind = ModKind::Scenario;
        seed_cache(&rig, &package);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer.install_plan(&[package]).unwrap();
        assert!(rig
            .instance
            .scenarios_dir()
            .join("savegame_1.0.0.zip")
            .is_file());
    }

    #[test]
    fn test_metapackage_owns_no_files() {
        let mut rig = rig();
        let mut meta = fixture("starter-pack", "1.0.0");
        meta.kind = ModKind::Meta;

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer.install_plan(&[meta]).unwrap();

        assert!(rig.registry.is_installed("starter-pack"));
        let installed = rig.registry.installed_module("starter-pack").unwrap();
        assert_eq!(installed.files().count(), 0);
        assert!(!rig
            .instance
            .mods_dir()
            .join("starter-pack_1.0.0.zip")
            .exists());
    }

    #[test]
    fn test_exact_version_reinstall_is_skipped() {
        let mut rig = rig();
        let package = fixture("foo", "1.0.0");
        seed_cache(&rig, &package);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer.install_plan(&[package.clone()]).unwrap();
        let outcomes = installer.install_plan(&[package]).unwrap();
        assert!(matches!(
            outcomes[0],
            InstallOutcome::AlreadyInstalled { .. }
        ));
    }

    #[test]
    fn test_occupied_destination_reports_owner() {
        let mut rig = rig();
        let package = fixture("foo", "1.0.0");
        seed_cache(&rig, &package);
        // Someone already dropped a file where we want to install.
        fs::write(rig.instance.mods_dir().join("foo_1.0.0.zip"), b"squatter").unwrap();

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let err = installer.install_plan(&[package]).unwrap_err();
        match err {
            Error::FileExists { installing, .. } => assert_eq!(installing, "foo"),
            other => panic!("expected FileExists, got {other:?}"),
        }
    }

    #[test]
    fn test_uninstall_takes_reverse_dependencies() {
        let mut rig = rig();
        let a = fixture("a", "1.0.0");
        let z = depends_on(fixture("z", "1.0.0"), "a");
        let bystander = fixture("bystander", "1.0.0");
        for p in [&a, &z, &bystander] {
            seed_cache(&rig, p);
        }

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer
            .install_plan(&[a.clone(), z.clone(), bystander.clone()])
            .unwrap();

        let planned = installer.plan_uninstall(&["a".to_string()]).unwrap();
        assert_eq!(planned, vec!["a".to_string(), "z".to_string()]);

        let removed = installer.uninstall_list(&["a".to_string()]).unwrap();
        assert_eq!(removed, planned);
        assert!(!rig.registry.is_installed("a"));
        assert!(!rig.registry.is_installed("z"));
        assert!(rig.registry.is_installed("bystander"));
        assert!(!rig.instance.mods_dir().join("a_1.0.0.zip").exists());
        // Protected roots survive even when empty.
        assert!(rig.instance.mods_dir().is_dir());
        assert!(rig.instance.scenarios_dir().is_dir());
    }

    #[test]
    fn test_uninstall_unknown_module_fails() {
        let mut rig = rig();
        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let err = installer.uninstall_list(&["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ModuleNotInstalled { .. }));
    }

    #[test]
    fn test_uninstall_refuses_dropins() {
        let mut rig = rig();
        fs::write(rig.instance.mods_dir().join("dropin_1.0.0.zip"), b"zip").unwrap();
        brokkr_registry::scan::scan_preexisting(&rig.instance, &mut rig.registry).unwrap();

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let err = installer
            .uninstall_list(&["dropin".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotRemovable { .. }));
    }

    #[test]
    fn test_upgrade_replaces_installed_version() {
        let mut rig = rig();
        let old = fixture("foo", "1.0.0");
        let new = fixture("foo", "2.0.0");
        rig.registry.add_available(old.clone());
        rig.registry.add_available(new.clone());
        seed_cache(&rig, &old);
        seed_cache(&rig, &new);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer.install_plan(&[old]).unwrap();

        let plan = installer.plan_upgrade(&["foo".parse().unwrap()]).unwrap();
        assert_eq!(plan.to_remove, vec!["foo".to_string()]);
        assert!(plan.notes[0].contains("upgrading"));
        installer.apply_upgrade(&plan).unwrap();

        assert_eq!(
            rig.registry.installed_version("foo", false),
            Some(Version::new(2, 0, 0))
        );
        assert!(rig.instance.mods_dir().join("foo_2.0.0.zip").is_file());
        assert!(!rig.instance.mods_dir().join("foo_1.0.0.zip").exists());
    }

    #[test]
    fn test_upgrade_of_dropin_is_refused() {
        let mut rig = rig();
        rig.registry.add_available(fixture("dropin", "2.0.0"));
        fs::write(rig.instance.mods_dir().join("dropin_1.0.0.zip"), b"zip").unwrap();
        brokkr_registry::scan::scan_preexisting(&rig.instance, &mut rig.registry).unwrap();

        let installer = ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let err = installer
            .plan_upgrade(&["dropin".parse().unwrap()])
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotRemovable { .. }));
    }

    #[test]
    fn test_upgrade_reinstall_note() {
        let mut rig = rig();
        let package = fixture("foo", "1.0.0");
        rig.registry.add_available(package.clone());
        seed_cache(&rig, &package);

        let mut installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        installer.install_plan(&[package]).unwrap();

        let plan = installer.plan_upgrade(&["foo".parse().unwrap()]).unwrap();
        assert!(plan.notes[0].contains("reinstalling"));
    }

    #[test]
    fn test_plan_install_reports_reasons() {
        let mut rig = rig();
        rig.registry
            .add_available(depends_on(fixture("a", "1.0.0"), "b"));
        rig.registry.add_available(fixture("b", "1.0.0"));

        let installer =
            ModInstaller::new(&rig.instance, &mut rig.registry, &rig.cache, gate());
        let (plan, reasons) = installer
            .plan_install(&["a".parse().unwrap()], &ResolveOptions::default())
            .unwrap();
        assert_eq!(plan.len(), 2);
        let b_reason = reasons.iter().find(|(id, _)| id == "b").unwrap();
        assert!(b_reason.1.contains("dependency from a"));
    }
}
