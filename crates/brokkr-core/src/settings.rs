//! Instance settings (brokkr.yaml)
//!
//! Per-instance configuration lives next to the game install in
//! `brokkr.yaml`: the game version mods are matched against, the metadata
//! repository to refresh from, and the compatibility floor used for mods
//! that pin no base-game version at all.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::instance::GameInstance;
use crate::version::Version;

/// Default metadata repository archive.
pub const DEFAULT_REPOSITORY: &str = "https://repo.brokkr-mods.dev/feed/repository.tar.gz";

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_compat_floor() -> Version {
    Version::new(0, 12, 0)
}

/// Settings loaded from an instance's brokkr.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Version of the installed base game.
    pub game_version: Version,

    /// Metadata feed archive URL used by `brokkr update`.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Fallback minor bracket for mods without any base-game pin.
    #[serde(default = "default_compat_floor")]
    pub compat_floor: Version,

    /// Owner account token for releases that require authenticated
    /// downloads. Optional; most mods do not need it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_token: Option<String>,
}

impl InstanceSettings {
    pub fn new(game_version: Version) -> Self {
        Self {
            game_version,
            repository: default_repository(),
            compat_floor: default_compat_floor(),
            owner_token: None,
        }
    }

    /// Load settings from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::SettingsNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let settings: Self = serde_yaml_ng::from_str(&content)?;
        debug!(
            "Loaded settings from {}: game version {}",
            path.display(),
            settings.game_version
        );
        Ok(settings)
    }

    /// Load settings for an instance from its conventional location.
    pub fn load_for(instance: &GameInstance) -> Result<Self> {
        Self::load(&instance.settings_path())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn save_for(&self, instance: &GameInstance) -> Result<PathBuf> {
        let path = instance.settings_path();
        self.save(&path)?;
        Ok(path)
    }
}
