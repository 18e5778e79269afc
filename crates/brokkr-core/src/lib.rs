//! # brokkr-core
//!
//! Core library for the Brokkr mod package manager providing:
//! - The version and dependency-constraint model
//! - Mod metadata types shared between the registry and the feed format
//! - Game-instance directory layout and path mapping
//! - Instance settings (brokkr.yaml) parsing
//! - The closed error enumeration used across all Brokkr crates

pub mod dependency;
pub mod error;
pub mod instance;
pub mod module;
pub mod settings;
pub mod version;

pub use dependency::{ModDependency, BASE_GAME};
pub use error::{Error, Result};
pub use instance::GameInstance;
pub use module::{ModInfo, ModKind, ModPackage, PackageSpec};
pub use settings::InstanceSettings;
pub use version::Version;
