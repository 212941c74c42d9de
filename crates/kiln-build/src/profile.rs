//! Library profile registry
//!
//! A library profile is a named bundle of compile and link settings for one
//! (usually external) library. Probe collaborators register profiles on a
//! [`ProfileRegistryBuilder`]; once built, the [`LibraryProfileRegistry`] is a
//! read-only table passed by reference into target resolution.

use crate::error::{BuildError, BuildResult};
use kiln_config::ProfileSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named bundle of flags describing one library dependency
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryProfile {
    /// Profile name (case-sensitive)
    pub name: String,
    /// Compiler flags
    pub compile_flags: Vec<String>,
    /// Include search paths
    pub include_paths: Vec<String>,
    /// Linker flags
    pub link_flags: Vec<String>,
    /// Library search paths
    pub lib_paths: Vec<String>,
    /// Runtime library search paths (rpath)
    pub runtime_paths: Vec<String>,
    /// Raw library names to link
    pub libraries: Vec<String>,
}

impl LibraryProfile {
    /// Create an empty profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a profile from a kiln.toml `[profiles.NAME]` table
    pub fn from_spec(name: impl Into<String>, spec: &ProfileSpec) -> Self {
        Self {
            name: name.into(),
            compile_flags: spec.compile_flags.clone(),
            include_paths: spec.includes.clone(),
            link_flags: spec.link_flags.clone(),
            lib_paths: spec.libpaths.clone(),
            runtime_paths: spec.rpaths.clone(),
            libraries: spec.libs.clone(),
        }
    }

    pub fn with_compile_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.compile_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_include_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.include_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_link_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.link_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_lib_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.lib_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_runtime_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.runtime_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_libraries<S: Into<String>>(mut self, libraries: impl IntoIterator<Item = S>) -> Self {
        self.libraries.extend(libraries.into_iter().map(Into::into));
        self
    }
}

/// Mutable staging area used while probing for libraries
#[derive(Debug, Default)]
pub struct ProfileRegistryBuilder {
    profiles: HashMap<String, LibraryProfile>,
}

impl ProfileRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile. A name may only be registered once.
    pub fn register_profile(&mut self, profile: LibraryProfile) -> BuildResult<&mut Self> {
        if profile.name.is_empty() || profile.name.chars().any(char::is_whitespace) {
            return Err(BuildError::configuration(
                &profile.name,
                "profile names must be non-empty and contain no whitespace",
            ));
        }
        if self.profiles.contains_key(&profile.name) {
            return Err(BuildError::configuration(
                &profile.name,
                "library profile registered twice",
            ));
        }
        tracing::debug!(profile = %profile.name, "registered library profile");
        self.profiles.insert(profile.name.clone(), profile);
        Ok(self)
    }

    /// Register every `[profiles.NAME]` table of a project configuration
    pub fn register_from_config(&mut self, config: &kiln_config::ProjectConfig) -> BuildResult<&mut Self> {
        for (name, spec) in &config.profiles {
            self.register_profile(LibraryProfile::from_spec(name.clone(), spec))?;
        }
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> LibraryProfileRegistry {
        LibraryProfileRegistry {
            profiles: self.profiles,
        }
    }
}

/// Read-only table of library profiles
#[derive(Debug, Clone, Default)]
pub struct LibraryProfileRegistry {
    profiles: HashMap<String, LibraryProfile>,
}

impl LibraryProfileRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a profile. Absence models an optional dependency that was not
    /// detected, so it is not an error.
    pub fn get(&self, name: &str) -> Option<&LibraryProfile> {
        self.profiles.get(name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profile names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
