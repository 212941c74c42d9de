//! Manifest to descriptor adaptation
//!
//! Paths in a manifest are relative to the directory holding it. The adapter
//! rebases them:
//!
//! - sources become `<root>/<dir>/<src>`
//! - relative includes expand to `<builddir>/<dir>/<inc>` and `<root>/<dir>/<inc>`
//! - relative libpaths and local library references land under `<builddir>/<dir>`
//! - a leading `#` anchors at the project root (the build tree root for
//!   libpaths and library references); absolute paths are kept

use crate::manifest::{TargetEntry, TargetManifest};
use crate::{ManifestError, ManifestResult, MANIFEST_FILE_NAME};
use kiln_build::{
    classify_reference, ArtifactNaming, LibraryReference, TargetDescriptor, TargetKind,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Turns `kiln.targets` manifests into target descriptors
#[derive(Debug, Clone)]
pub struct ManifestAdapter {
    project_root: PathBuf,
    build_dir: PathBuf,
    features: BTreeSet<String>,
    install_prefix: Option<PathBuf>,
    naming: ArtifactNaming,
}

impl ManifestAdapter {
    pub fn new(project_root: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            build_dir: build_dir.into(),
            features: BTreeSet::new(),
            install_prefix: None,
            naming: ArtifactNaming::default(),
        }
    }

    /// Adapter for a loaded project: its root, build directory, active
    /// features, install prefix and artifact suffixes
    pub fn from_config(config: &kiln_config::Config) -> Self {
        let root = config
            .project_root()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let build = &config.project.build;
        Self {
            project_root: root,
            build_dir: config.build_dir(),
            features: config.active_features(),
            install_prefix: config.project.install.prefix.clone(),
            naming: ArtifactNaming {
                shared_suffix: build.shared_suffix.clone(),
                static_suffix: build.static_suffix.clone(),
            },
        }
    }

    /// Active configuration flags for source conditions
    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_install_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.install_prefix = Some(prefix.into());
        self
    }

    pub fn with_naming(mut self, naming: ArtifactNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Load `kiln.targets` in `dir` (relative to the project root) and every
    /// listed subdirectory, parents before children
    pub fn load(&self, dir: &Path) -> ManifestResult<Vec<TargetDescriptor>> {
        let mut descriptors = Vec::new();
        let mut visited = HashSet::new();
        self.load_into(dir, &mut visited, &mut descriptors)?;
        Ok(descriptors)
    }

    fn load_into(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        descriptors: &mut Vec<TargetDescriptor>,
    ) -> ManifestResult<()> {
        let dir = kiln_build::resolver::normalize_path(dir);
        if !visited.insert(dir.clone()) {
            return Err(ManifestError::RecursiveSubdir(dir));
        }

        let path = self.project_root.join(&dir).join(MANIFEST_FILE_NAME);
        tracing::debug!(manifest = %path.display(), "loading target manifest");
        let manifest = TargetManifest::from_file(&path)?;

        descriptors.extend(self.adapt(&manifest, &dir)?);
        for subdir in &manifest.subdirs {
            self.load_into(&dir.join(subdir), visited, descriptors)?;
        }
        Ok(())
    }

    /// Adapt the targets of one manifest located in `dir`
    pub fn adapt(&self, manifest: &TargetManifest, dir: &Path) -> ManifestResult<Vec<TargetDescriptor>> {
        manifest
            .targets
            .iter()
            .map(|entry| self.adapt_target(entry, dir))
            .collect()
    }

    /// Adapt one `[[target]]` entry located in `dir`
    pub fn adapt_target(&self, entry: &TargetEntry, dir: &Path) -> ManifestResult<TargetDescriptor> {
        let kind = TargetKind::parse(&entry.kind).ok_or_else(|| ManifestError::UnknownKind {
            target: entry.name.clone(),
            kind: entry.kind.clone(),
        })?;

        let sources: Vec<PathBuf> = entry
            .sources
            .iter()
            .filter(|source| {
                let included = source.is_included(&self.features);
                if !included {
                    tracing::debug!(target_name = %entry.name, file = source.file(), "condition not met, skipping source");
                }
                included
            })
            .map(|source| self.source_path(dir, source.file()))
            .collect();

        let includes: Vec<String> = entry
            .includes
            .iter()
            .flat_map(|inc| self.include_paths(dir, inc))
            .collect();
        let libpaths: Vec<String> = entry
            .libpaths
            .iter()
            .map(|p| self.build_path(dir, p))
            .collect();
        let libs: Vec<String> = entry
            .libs
            .iter()
            .map(|reference| self.library_reference(&entry.name, dir, reference))
            .collect();

        let mut descriptor = TargetDescriptor::new(&entry.name, kind)
            .in_directory(dir)
            .with_sources(sources)
            .with_include_paths(includes)
            .with_compile_flags(entry.compile_flags.iter().cloned())
            .with_link_flags(entry.link_flags.iter().cloned())
            .with_lib_paths(libpaths)
            .with_libraries(libs)
            .with_profiles(entry.uselib.iter().cloned())
            .with_dependencies(entry.depends_on.iter().cloned());

        if let Some(version) = &entry.version {
            descriptor = descriptor.with_version(version);
        }
        if let Some(install_dir) = &entry.install_dir {
            descriptor = descriptor.with_install_dir(self.install_path(install_dir));
        }
        if let Some(prefix) = &entry.prefix {
            descriptor = descriptor.with_prefix(prefix);
        }
        if let Some(mode) = entry.perms {
            if mode > 0o7777 {
                return Err(ManifestError::InvalidField {
                    target: entry.name.clone(),
                    field: "perms".to_string(),
                    reason: format!("{:o} is not a file mode", mode),
                });
            }
            descriptor = descriptor.with_permissions(mode);
        }

        Ok(descriptor)
    }

    fn source_path(&self, dir: &Path, file: &str) -> PathBuf {
        match project_relative(file) {
            Some(rest) => self.project_root.join(rest),
            None => self.project_root.join(dir).join(file),
        }
    }

    fn include_paths(&self, dir: &Path, include: &str) -> Vec<String> {
        if let Some(rest) = project_relative(include) {
            return vec![display(&self.project_root.join(rest))];
        }
        if Path::new(include).is_absolute() {
            return vec![include.to_string()];
        }
        vec![
            display(&self.build_dir.join(dir).join(include)),
            display(&self.project_root.join(dir).join(include)),
        ]
    }

    fn build_path(&self, dir: &Path, path: &str) -> String {
        if let Some(rest) = project_relative(path) {
            return display(&self.build_dir.join(rest));
        }
        if Path::new(path).is_absolute() {
            return path.to_string();
        }
        display(&self.build_dir.join(dir).join(path))
    }

    /// Local references are rebased into the build tree; global names and
    /// references that do not classify are passed through unchanged
    fn library_reference(&self, target: &str, dir: &Path, reference: &str) -> String {
        match classify_reference(target, reference, &self.naming) {
            Ok(LibraryReference::LocalShared(_)) | Ok(LibraryReference::LocalStatic(_)) => {
                self.build_path(dir, reference)
            }
            Ok(LibraryReference::Global { .. }) | Err(_) => reference.to_string(),
        }
    }

    fn install_path(&self, install_dir: &str) -> PathBuf {
        let path = Path::new(install_dir);
        match &self.install_prefix {
            Some(prefix) if path.is_relative() => prefix.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Path after a leading `#`, which marks project-root relative paths
fn project_relative(path: &str) -> Option<&str> {
    path.strip_prefix('#').map(|rest| rest.trim_start_matches('/'))
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
