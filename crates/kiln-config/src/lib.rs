//! Kiln Configuration System
//!
//! Provides configuration management for kiln projects including:
//! - Project configuration (kiln.toml)
//! - Build directory, rpath and install settings
//! - Global compile/link flags and debug level
//! - Active feature flags consulted by target manifests
//! - Statically declared library profiles
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Project config (./kiln.toml, searched upwards)
//! 3. Environment variables (KILN_*)
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! ```

pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// File name of the project configuration
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use project::{
    BuildSettings, DebugLevel, FlagSettings, InstallSettings, ProfileSpec, ProjectConfig,
    ProjectInfo,
};
