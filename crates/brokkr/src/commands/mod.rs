//! Command implementations

pub mod available;
pub mod compare;
pub mod install;
pub mod list;
pub mod remove;
pub mod show;
pub mod update;
pub mod upgrade;

use anyhow::{Context as _, Result};
use camino::Utf8Path;

use brokkr_core::{GameInstance, InstanceSettings};
use brokkr_install::DownloadCache;
use brokkr_registry::{GameGate, Registry};

/// Everything a command needs to act on one game instance.
pub struct Context {
    pub instance: GameInstance,
    pub settings: InstanceSettings,
    pub registry: Registry,
    pub cache: DownloadCache,
}

impl Context {
    /// Open the instance at `--instance` (or the current directory), load
    /// its settings and registry, and prepare the download cache.
    pub fn load(instance_arg: Option<&Utf8Path>) -> Result<Self> {
        let root = match instance_arg {
            Some(path) => path.as_std_path().to_path_buf(),
            None => std::env::current_dir()?,
        };
        let instance = GameInstance::open(&root)
            .with_context(|| format!("cannot open game instance at {}", root.display()))?;
        let settings = InstanceSettings::load_for(&instance).with_context(|| {
            format!(
                "no usable brokkr.yaml in {}; create one with at least game_version",
                root.display()
            )
        })?;
        instance.init()?;
        let registry = Registry::load(instance.registry_path())?;
        let cache = DownloadCache::new(instance.downloads_dir())?;
        Ok(Self {
            instance,
            settings,
            registry,
            cache,
        })
    }

    /// The compatibility gate for this instance.
    pub fn gate(&self) -> GameGate {
        GameGate::new(self.settings.game_version, self.settings.compat_floor)
            .with_owner_token(self.settings.owner_token.is_some())
    }
}

/// Ask the user to confirm, defaulting to yes. `--yes` skips the prompt.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?)
}
