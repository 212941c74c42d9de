//! Build orchestration
//!
//! [`Builder`] executes target descriptors one at a time: resolve, emit,
//! then install when enabled. The first fatal error stops the run; install
//! failures are collected and the run continues.

use crate::build_order::TargetGraph;
use crate::emitter::{ArtifactEmitter, ArtifactNaming};
use crate::error::{BuildError, BuildResult};
use crate::install::{install_artifact, FsInstaller, Installer};
use crate::profile::LibraryProfileRegistry;
use crate::resolver::{normalize_path, ResolvedBuildConfig, TargetResolver};
use crate::targets::{TargetDescriptor, TargetOutcome};
use crate::toolchain::{CommandToolchain, Toolchain};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Build configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Root of build outputs; target directories are relative to it
    pub build_dir: PathBuf,
    /// Take runtime paths from library profiles
    pub want_rpath: bool,
    /// Add `.` and the build directory to every include path list
    pub smart_includes: bool,
    /// Extra compile flags for convenience libraries
    pub convenience_flags: Vec<String>,
    /// Flags prepended to every target
    pub global_compile_flags: Vec<String>,
    pub global_link_flags: Vec<String>,
    pub global_include_paths: Vec<String>,
    /// Artifact suffixes
    pub naming: ArtifactNaming,
    /// Run install steps
    pub install: bool,
    /// Staging root prepended to install directories
    pub destdir: Option<PathBuf>,
    /// Resolve only and write every configuration here as JSON
    pub dump_path: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("."),
            want_rpath: true,
            smart_includes: true,
            convenience_flags: vec!["-fPIC".to_string(), "-DPIC".to_string()],
            global_compile_flags: Vec::new(),
            global_link_flags: Vec::new(),
            global_include_paths: Vec::new(),
            naming: ArtifactNaming::default(),
            install: false,
            destdir: None,
            dump_path: None,
        }
    }
}

impl BuildConfig {
    /// Derive the build configuration from a loaded `kiln.toml`
    pub fn from_config(config: &kiln_config::Config) -> Self {
        let project = &config.project;
        Self {
            build_dir: config.build_dir(),
            want_rpath: project.build.rpath,
            smart_includes: project.build.smart_includes,
            convenience_flags: project.build.convenience_flags.clone(),
            global_compile_flags: project.flags.effective_compile_flags(),
            global_link_flags: project.flags.link.clone(),
            global_include_paths: project.flags.includes.clone(),
            naming: ArtifactNaming {
                shared_suffix: project.build.shared_suffix.clone(),
                static_suffix: project.build.static_suffix.clone(),
            },
            install: project.install.enabled,
            destdir: project.install.destdir.clone(),
            dump_path: None,
        }
    }

    /// Resolve only, writing configurations to `path`
    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }
}

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Targets resolved
    pub resolved: usize,
    /// Targets compiled and linked
    pub built: usize,
    /// Targets installed
    pub installed: usize,
    /// Targets skipped because they were already executed
    pub skipped: usize,
    /// Total run time
    pub total_time: Duration,
}

/// Result of a run
#[derive(Debug, Default)]
pub struct BuildReport {
    pub stats: BuildStats,
    /// Targets executed by this run, in execution order
    pub executed: Vec<String>,
    /// Install failures; the targets themselves were built
    pub install_failures: Vec<BuildError>,
    /// Dump file written by this run
    pub dump_file: Option<PathBuf>,
}

impl BuildReport {
    /// Whether every install step succeeded
    pub fn is_success(&self) -> bool {
        self.install_failures.is_empty()
    }
}

/// Main builder for executing targets
pub struct Builder<'a> {
    config: BuildConfig,
    registry: &'a LibraryProfileRegistry,
    toolchain: Box<dyn Toolchain + 'a>,
    installer: Box<dyn Installer + 'a>,
    /// Names executed by this builder
    executed: HashSet<String>,
    /// Normalized artifact paths to the target that produced them
    producers: HashMap<PathBuf, String>,
    dumped: Vec<ResolvedBuildConfig>,
}

impl<'a> Builder<'a> {
    /// Create a builder using the command toolchain and filesystem installer
    pub fn new(config: BuildConfig, registry: &'a LibraryProfileRegistry) -> Self {
        let installer = match &config.destdir {
            Some(destdir) => FsInstaller::with_destdir(destdir),
            None => FsInstaller::new(),
        };
        Self {
            config,
            registry,
            toolchain: Box::new(CommandToolchain::default()),
            installer: Box::new(installer),
            executed: HashSet::new(),
            producers: HashMap::new(),
            dumped: Vec::new(),
        }
    }

    /// Replace the compile/link primitive
    pub fn with_toolchain(mut self, toolchain: impl Toolchain + 'a) -> Self {
        self.toolchain = Box::new(toolchain);
        self
    }

    /// Replace the install collaborator
    pub fn with_installer(mut self, installer: impl Installer + 'a) -> Self {
        self.installer = Box::new(installer);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn emitter(&self) -> ArtifactEmitter {
        ArtifactEmitter::new(&self.config.build_dir, self.config.naming.clone())
    }

    /// Execute descriptors in the given order
    pub fn run(&mut self, descriptors: &mut [TargetDescriptor]) -> BuildResult<BuildReport> {
        let order: Vec<usize> = (0..descriptors.len()).collect();
        self.run_in(descriptors, &order)
    }

    /// Execute descriptors in dependency order
    pub fn run_ordered(&mut self, descriptors: &mut [TargetDescriptor]) -> BuildResult<BuildReport> {
        let graph = TargetGraph::from_descriptors(descriptors, &self.emitter())?;
        let names = graph.compute_build_order()?;

        let positions: HashMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.name.as_str(), idx))
            .collect();
        let order: Vec<usize> = names
            .iter()
            .filter_map(|name| positions.get(name.as_str()).copied())
            .collect();

        self.run_in(descriptors, &order)
    }

    fn run_in(
        &mut self,
        descriptors: &mut [TargetDescriptor],
        order: &[usize],
    ) -> BuildResult<BuildReport> {
        let start = Instant::now();
        self.check_unique_names(descriptors)?;

        let mut report = BuildReport::default();
        for &idx in order {
            let descriptor = &mut descriptors[idx];
            if descriptor.is_executed() {
                tracing::debug!(target_name = %descriptor.name, "already executed, skipping");
                report.stats.skipped += 1;
                continue;
            }

            let outcome = self.execute(descriptor)?;
            report.stats.resolved += 1;
            report.executed.push(descriptor.name.clone());

            let Some(artifact) = outcome.artifact else {
                continue;
            };
            report.stats.built += 1;

            if self.config.install && descriptor.kind.is_installable() && descriptor.install_dir.is_some() {
                match install_artifact(descriptor, &artifact, self.installer.as_mut()) {
                    Ok(_) => report.stats.installed += 1,
                    Err(e) => {
                        tracing::warn!(target_name = %descriptor.name, error = %e, "install failed");
                        report.install_failures.push(e);
                    }
                }
            }
        }

        report.dump_file = self.write_dump()?;
        report.stats.total_time = start.elapsed();
        tracing::info!(
            built = report.stats.built,
            installed = report.stats.installed,
            elapsed = ?report.stats.total_time,
            "build finished"
        );
        Ok(report)
    }

    /// Target names must be unique within a run, including targets
    /// executed by earlier runs of this builder
    fn check_unique_names(&self, descriptors: &[TargetDescriptor]) -> BuildResult<()> {
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(BuildError::configuration(
                    &descriptor.name,
                    "target name is not unique within the run",
                ));
            }
            if !descriptor.is_executed() && self.executed.contains(&descriptor.name) {
                return Err(BuildError::configuration(
                    &descriptor.name,
                    "a different target with this name was already executed",
                ));
            }
        }
        Ok(())
    }

    /// Resolve and emit one descriptor. A descriptor that was already
    /// executed returns its previous outcome without side effects.
    pub fn execute(&mut self, descriptor: &mut TargetDescriptor) -> BuildResult<TargetOutcome> {
        if let Some(outcome) = descriptor.outcome() {
            return Ok(outcome.clone());
        }

        let config = TargetResolver::new(self.registry, &self.config).resolve(descriptor)?;
        if self.executed.contains(&descriptor.name) {
            return Err(BuildError::configuration(
                &descriptor.name,
                "a different target with this name was already executed",
            ));
        }
        self.check_producers(&config);

        let artifact = if self.config.dump_path.is_some() {
            self.dumped.push(config.clone());
            None
        } else {
            let emitter = self.emitter();
            let artifact = emitter.emit(descriptor, &config, self.toolchain.as_mut())?;
            for path in emitter.plan(descriptor)?.produced_paths() {
                self.producers
                    .insert(normalize_path(&path), descriptor.name.clone());
            }
            tracing::info!(
                target_name = %descriptor.name,
                kind = %descriptor.kind,
                artifact = %artifact.path.display(),
                "built"
            );
            Some(artifact)
        };

        let outcome = TargetOutcome { config, artifact };
        self.executed.insert(descriptor.name.clone());
        descriptor.mark_executed(outcome.clone());
        Ok(outcome)
    }

    /// Warn about local libraries no target of this builder produced and
    /// that do not exist on disk either
    fn check_producers(&self, config: &ResolvedBuildConfig) {
        for dependency in &config.local_dependencies {
            if self.producers.contains_key(&normalize_path(dependency)) {
                continue;
            }
            if dependency.exists() {
                tracing::debug!(
                    target_name = %config.target,
                    file = %dependency.display(),
                    "local library built outside this run"
                );
            } else {
                tracing::warn!(
                    target_name = %config.target,
                    file = %dependency.display(),
                    "local library has no producer in this run"
                );
            }
        }
    }

    /// Write collected configurations in dump mode
    fn write_dump(&mut self) -> BuildResult<Option<PathBuf>> {
        let Some(path) = self.config.dump_path.clone() else {
            return Ok(None);
        };
        let json = serde_json::to_string_pretty(&self.dumped)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&path, json).map_err(|e| BuildError::io(&path, e))?;
        tracing::info!(path = %path.display(), targets = self.dumped.len(), "wrote configuration dump");
        Ok(Some(path))
    }
}
