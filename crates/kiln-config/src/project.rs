//! Project Configuration (kiln.toml)
//!
//! Handles project-level configuration stored in `kiln.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectInfo>,

    /// Build directory and artifact naming
    #[serde(default)]
    pub build: BuildSettings,

    /// Install step settings
    #[serde(default)]
    pub install: InstallSettings,

    /// Flags applied to every target
    #[serde(default)]
    pub flags: FlagSettings,

    /// Boolean configuration flags (`NAME = true` activates NAME)
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,

    /// Library profiles declared by hand instead of probed
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileSpec>,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,

    /// Project version (X.Y or X.Y.Z)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct BuildSettings {
    /// Output directory for objects and artifacts (default: ".")
    pub builddir: PathBuf,

    /// Embed profile runtime paths into linked artifacts
    pub rpath: bool,

    /// Add "." and the build directory to every target's include paths
    pub smart_includes: bool,

    /// Extra compile flags for convenience libraries
    pub convenience_flags: Vec<String>,

    /// Shared library suffix without the leading dot
    pub shared_suffix: String,

    /// Static library suffix without the leading dot
    pub static_suffix: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            builddir: PathBuf::from("."),
            rpath: true,
            smart_includes: true,
            convenience_flags: vec!["-fPIC".to_string(), "-DPIC".to_string()],
            shared_suffix: "so".to_string(),
            static_suffix: "a".to_string(),
        }
    }
}

/// Install configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    /// Run install steps after building
    pub enabled: bool,

    /// Installation prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<PathBuf>,

    /// Staging root prepended to every install directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destdir: Option<PathBuf>,
}

/// Flags shared by every target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FlagSettings {
    /// Compile flags
    pub compile: Vec<String>,

    /// Link flags
    pub link: Vec<String>,

    /// Include paths
    pub includes: Vec<String>,

    /// Debug level
    pub debug: DebugLevel,
}

impl FlagSettings {
    /// Global compile flags followed by the debug level's flags
    pub fn effective_compile_flags(&self) -> Vec<String> {
        self.compile
            .iter()
            .cloned()
            .chain(self.debug.compile_flags().iter().map(|f| f.to_string()))
            .collect()
    }
}

/// Debug level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// Leave compile flags alone
    #[default]
    None,
    /// Debug symbols and warnings
    Basic,
    /// Full debug information
    Full,
}

impl DebugLevel {
    /// Parse a debug level the way the KILN_DEBUG variable is read:
    /// "full" is full, empty/"none"/"0" disables, anything else is basic.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "full" => Self::Full,
            "" | "none" | "0" | "false" | "no" => Self::None,
            _ => Self::Basic,
        }
    }

    /// Compile flags implied by this level
    pub fn compile_flags(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Basic => &["-DDEBUG", "-g", "-Wall"],
            Self::Full => &["-DDEBUG", "-Wall", "-g3"],
        }
    }
}

/// A library profile declared in kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProfileSpec {
    pub compile_flags: Vec<String>,
    pub includes: Vec<String>,
    pub link_flags: Vec<String>,
    pub libpaths: Vec<String>,
    pub rpaths: Vec<String>,
    pub libs: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "project.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            if let Some(version) = &project.version {
                if !is_valid_version(version) {
                    return Err(ConfigError::InvalidVersion(version.clone()));
                }
            }
        }

        validate_suffix("build.shared-suffix", &self.build.shared_suffix)?;
        validate_suffix("build.static-suffix", &self.build.static_suffix)?;

        for name in self.features.keys() {
            validate_token("features", name)?;
        }
        for name in self.profiles.keys() {
            validate_token("profiles", name)?;
        }

        Ok(())
    }

    /// Get the project name, if present
    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// Names of all features switched on
    pub fn active_features(&self) -> BTreeSet<String> {
        self.features
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Version validation: X.Y or X.Y.Z with digit components
fn is_valid_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return false;
    }

    parts
        .iter()
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn validate_suffix(field: &str, suffix: &str) -> ConfigResult<()> {
    if suffix.is_empty() || suffix.starts_with('.') {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' must be a non-empty suffix without a leading dot", suffix),
        });
    }
    Ok(())
}

fn validate_token(section: &str, name: &str) -> ConfigResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            field: format!("{}.{}", section, name),
            reason: "names must be non-empty and contain no whitespace".to_string(),
        });
    }
    Ok(())
}
