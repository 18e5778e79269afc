//! Error types for brokkr-core
//!
//! Every failure the package manager can signal is a variant here, so
//! callers can match on the kind instead of string-sniffing messages.

use thiserror::Error;

/// Result type alias using brokkr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Brokkr
#[derive(Error, Debug)]
pub enum Error {
    /// A requested or required module is unknown to the registry
    #[error("Module not found: {identifier}{}", version.as_deref().map(|v| format!(" {v}")).unwrap_or_default())]
    ModuleNotFound {
        identifier: String,
        version: Option<String>,
    },

    /// Uninstall/upgrade target is not installed
    #[error("Module {identifier} is not installed")]
    ModuleNotInstalled { identifier: String },

    /// Target was found on disk but was never installed through Brokkr
    #[error("Module {identifier} was not installed by Brokkr; remove it manually first")]
    ModuleNotRemovable { identifier: String },

    /// One or more consistency violations; always carries every violation found
    #[error("The following inconsistencies were found:\n * {}", violations.join("\n * "))]
    Inconsistent { violations: Vec<String> },

    /// Ambiguous virtual-package resolution with no tie-break available
    #[error("Too many modules provide {identifier}:\n * {}", candidates.join("\n * "))]
    TooManyProviders {
        identifier: String,
        candidates: Vec<String>,
    },

    /// Would silently overwrite a file, possibly owned by another module
    #[error("{installing} wants to write {path}, but it already exists{}", owner.as_deref().map(|o| format!(" (owned by {o})")).unwrap_or_default())]
    FileExists {
        path: String,
        installing: String,
        owner: Option<String>,
    },

    /// A file we expected to exist does not (e.g. an uncached artifact)
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// A version string failed to parse
    #[error("'{text}' is not a valid version string")]
    BadVersion { text: String },

    /// A dependency or `name=version` string failed to parse
    #[error("'{text}' is not a valid module specification")]
    BadModuleSpec { text: String },

    /// Metadata that cannot be acted upon (e.g. installing a metapackage)
    #[error("Bad package {identifier}: {message}")]
    BadPackage { identifier: String, message: String },

    /// A persisted document targets a schema we do not understand
    #[error("Unsupported schema version {schema} in {source_name}")]
    UnsupportedSchema { source_name: String, schema: u32 },

    /// A second transaction was opened while one was still outstanding
    #[error("The registry does not support nested transactions")]
    TransactionMisuse,

    /// The user aborted a confirmable batch operation
    #[error("Operation cancelled by user")]
    Cancelled,

    /// A path could not be mapped between absolute and instance-relative form
    #[error("Path error for {path}: {message}")]
    PathError { path: String, message: String },

    /// Instance settings file is missing
    #[error("Instance settings not found: {path}")]
    SettingsNotFound { path: String },

    /// One or more downloads failed
    #[error("Downloads failed:\n * {}", errors.join("\n * "))]
    Download { errors: Vec<String> },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl Error {
    /// Create a module-not-found error without a version
    pub fn module_not_found(identifier: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            identifier: identifier.into(),
            version: None,
        }
    }

    /// Create a module-not-found error for a pinned version
    pub fn module_not_found_at(
        identifier: impl Into<String>,
        version: impl ToString,
    ) -> Self {
        Self::ModuleNotFound {
            identifier: identifier.into(),
            version: Some(version.to_string()),
        }
    }

    /// Create a module-not-installed error
    pub fn not_installed(identifier: impl Into<String>) -> Self {
        Self::ModuleNotInstalled {
            identifier: identifier.into(),
        }
    }

    /// Create an inconsistency error from a single violation
    pub fn inconsistent(violation: impl Into<String>) -> Self {
        Self::Inconsistent {
            violations: vec![violation.into()],
        }
    }

    /// Create an inconsistency error from a list of violations
    pub fn inconsistencies(violations: Vec<String>) -> Self {
        Self::Inconsistent { violations }
    }

    /// Create a bad-version error
    pub fn bad_version(text: impl Into<String>) -> Self {
        Self::BadVersion { text: text.into() }
    }

    /// Create a bad-module-spec error
    pub fn bad_module_spec(text: impl Into<String>) -> Self {
        Self::BadModuleSpec { text: text.into() }
    }

    /// Create a bad-package error
    pub fn bad_package(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadPackage {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create a file-not-found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a path error
    pub fn path_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathError {
            path: path.into(),
            message: message.into(),
        }
    }
}
