//! Target manifest parsing and types (kiln.targets)

use crate::{ManifestError, ManifestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One `kiln.targets` file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetManifest {
    /// Subdirectories holding their own `kiln.targets`
    #[serde(default)]
    pub subdirs: Vec<String>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
}

impl TargetManifest {
    /// Parse manifest from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> ManifestResult<Self> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|error| ManifestError::IoError {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_str(&content).map_err(|error| ManifestError::ParseError {
            file: path.to_path_buf(),
            error,
        })
    }
}

/// A `[[target]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TargetEntry {
    pub name: String,
    /// program, shlib, staticlib, convenience or module
    pub kind: String,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub compile_flags: Vec<String>,
    #[serde(default)]
    pub link_flags: Vec<String>,
    #[serde(default)]
    pub libpaths: Vec<String>,
    /// Local library paths or global library names
    #[serde(default)]
    pub libs: Vec<String>,
    /// Library profiles to pull in
    #[serde(default)]
    pub uselib: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Absolute, or relative to the install prefix
    #[serde(default)]
    pub install_dir: Option<String>,
    /// Overrides the kind's file name prefix
    #[serde(default)]
    pub prefix: Option<String>,
    /// Unix mode of the installed program
    #[serde(default)]
    pub perms: Option<u32>,
}

/// A source file, optionally guarded by a feature condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourceEntry {
    Path(String),
    Conditional {
        file: String,
        #[serde(default)]
        condition: Option<String>,
    },
}

impl SourceEntry {
    pub fn file(&self) -> &str {
        match self {
            Self::Path(file) | Self::Conditional { file, .. } => file,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self {
            Self::Path(_) => None,
            Self::Conditional { condition, .. } => {
                condition.as_deref().filter(|c| !c.is_empty())
            }
        }
    }

    /// Unconditional sources are always included; conditional ones only when
    /// their condition is an active feature
    pub fn is_included(&self, features: &BTreeSet<String>) -> bool {
        self.condition().map_or(true, |c| features.contains(c))
    }
}
