//! Game instance directory layout
//!
//! A `GameInstance` is one game installation Brokkr manages: the root
//! directory plus the conventional subdirectories mods are installed into
//! and the `.brokkr` bookkeeping area. All registry-recorded paths are
//! relative to the instance root; the mapping helpers here are the only
//! place absolute paths are produced or consumed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::module::ModKind;

/// One managed game installation.
#[derive(Debug, Clone)]
pub struct GameInstance {
    root: PathBuf,
}

impl GameInstance {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open an existing instance root, refusing paths that do not exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::path_error(
                root.display().to_string(),
                "instance root is not a directory",
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    pub fn scenarios_dir(&self) -> PathBuf {
        self.root.join("scenarios")
    }

    pub fn brokkr_dir(&self) -> PathBuf {
        self.root.join(".brokkr")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.brokkr_dir().join("downloads")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.brokkr_dir().join("registry.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("brokkr.yaml")
    }

    /// Create the managed directories if they are missing.
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.mods_dir(),
            self.scenarios_dir(),
            self.brokkr_dir(),
            self.downloads_dir(),
        ] {
            if !dir.is_dir() {
                debug!("Creating {}", dir.display());
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// The directory a module of the given kind installs into.
    ///
    /// Texture packs and metapackages have no install root of their own.
    pub fn kind_root(&self, kind: ModKind) -> Result<PathBuf> {
        match kind {
            ModKind::Mod => Ok(self.mods_dir()),
            ModKind::Scenario => Ok(self.scenarios_dir()),
            ModKind::Textures | ModKind::Meta => Err(Error::bad_package(
                kind.to_string(),
                "this module kind is not independently installable",
            )),
        }
    }

    /// Directories uninstall cleanup must never delete, even when empty.
    pub fn protected_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.mods_dir(),
            self.scenarios_dir(),
            self.brokkr_dir(),
            self.downloads_dir(),
        ]
    }

    /// Map an absolute path inside the instance to its root-relative form,
    /// normalized to forward slashes.
    pub fn to_relative(&self, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).map_err(|_| {
            Error::path_error(
                absolute.display().to_string(),
                format!("not inside instance root {}", self.root.display()),
            )
        })?;
        let mut parts = Vec::new();
        for component in relative.components() {
            parts.push(component.as_os_str().to_string_lossy().into_owned());
        }
        Ok(parts.join("/"))
    }

    /// Map a root-relative path back to an absolute one.
    pub fn to_absolute(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        instance.init().unwrap();
        assert!(instance.mods_dir().is_dir());
        assert!(instance.scenarios_dir().is_dir());
        assert!(instance.downloads_dir().is_dir());
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(GameInstance::open(tmp.path().join("nope")).is_err());
        assert!(GameInstance::open(tmp.path()).is_ok());
    }

    #[test]
    fn test_path_mapping_round_trip() {
        let tmp = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        let absolute = instance.mods_dir().join("foo_1.0.0.zip");
        let relative = instance.to_relative(&absolute).unwrap();
        assert_eq!(relative, "mods/foo_1.0.0.zip");
        assert_eq!(instance.to_absolute(&relative), absolute);
    }

    #[test]
    fn test_to_relative_rejects_outside_paths() {
        let tmp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        let result = instance.to_relative(&other.path().join("foo.zip"));
        assert!(matches!(result, Err(Error::PathError { .. })));
    }

    #[test]
    fn test_kind_roots() {
        let tmp = TempDir::new().unwrap();
        let instance = GameInstance::new(tmp.path());
        assert_eq!(instance.kind_root(ModKind::Mod).unwrap(), instance.mods_dir());
        assert_eq!(
            instance.kind_root(ModKind::Scenario).unwrap(),
            instance.scenarios_dir()
        );
        assert!(instance.kind_root(ModKind::Meta).is_err());
        assert!(instance.kind_root(ModKind::Textures).is_err());
    }
}
