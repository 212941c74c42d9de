//! Configuration Loader
//!
//! Handles loading configuration and applying environment overrides.

use crate::project::{DebugLevel, ProjectConfig};
use crate::{ConfigResult, CONFIG_FILE_NAME};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads `kiln.toml` and layers environment variables on top:
/// 1. Project config (./kiln.toml) - lowest priority
/// 2. Environment variables (KILN_*) - override project
pub struct ConfigLoader {
    /// Skip KILN_* environment overrides
    ignore_env: bool,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where kiln.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Do not read KILN_* environment variables
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml. A missing file yields
    /// the default configuration with no project root.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let project_config = self.apply_env_overrides(project_config);

        Ok(Config {
            project: project_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project_config = self.apply_env_overrides(project_config);

        Ok(Config {
            project: project_config,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading project configuration");
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides to project config
    ///
    /// KILN_BUILDDIR, KILN_PREFIX, KILN_DESTDIR and KILN_DEBUG are honored.
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ProjectConfig {
        if self.ignore_env {
            return config;
        }

        if let Some(builddir) = non_empty_var("KILN_BUILDDIR") {
            config.build.builddir = PathBuf::from(builddir);
        }

        if let Some(prefix) = non_empty_var("KILN_PREFIX") {
            config.install.prefix = Some(PathBuf::from(prefix));
        }

        if let Some(destdir) = non_empty_var("KILN_DESTDIR") {
            config.install.destdir = Some(PathBuf::from(destdir));
        }

        if let Ok(level) = env::var("KILN_DEBUG") {
            tracing::debug!(value = %level, "KILN_DEBUG override");
            config.flags.debug = DebugLevel::parse_lenient(&level);
        }

        config
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Get the project name
    pub fn project_name(&self) -> Option<&str> {
        self.project.project_name()
    }

    /// Check if this is a project (has kiln.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Build directory, anchored at the project root when relative
    pub fn build_dir(&self) -> PathBuf {
        let builddir = &self.project.build.builddir;
        match &self.project_root {
            Some(root) if builddir.is_relative() => root.join(builddir),
            _ => builddir.clone(),
        }
    }

    /// Active configuration flag set
    pub fn active_features(&self) -> BTreeSet<String> {
        self.project.active_features()
    }
}
