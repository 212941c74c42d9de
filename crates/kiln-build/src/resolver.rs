//! Target resolution
//!
//! [`TargetResolver`] turns a [`TargetDescriptor`] into a
//! [`ResolvedBuildConfig`]: global settings first, then the target's own
//! flags, then every used library profile, each list deduplicated while
//! keeping the first occurrence in place. Library references are classified
//! as local shared, local static or global (see [`classify_reference`]).

use crate::builder::BuildConfig;
use crate::emitter::{ArtifactNaming, LinkMetadata, METADATA_SUFFIX};
use crate::error::{BuildError, BuildResult};
use crate::profile::{LibraryProfile, LibraryProfileRegistry};
use crate::targets::{TargetDescriptor, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Component, Path, PathBuf};

/// Conventional prefix of library file names
const LIBRARY_PREFIX: &str = "lib";

/// A library built earlier in the same project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalLibrary {
    /// Containing directory as written in the reference, with a trailing
    /// separator (`./` when the reference has none)
    pub directory: String,
    /// Base name with prefix and suffixes stripped
    pub name: String,
    /// File the consuming target depends on
    pub file: PathBuf,
}

/// A classified library reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LibraryReference {
    /// Linked by name from the system search path
    Global { name: String },
    LocalShared(LocalLibrary),
    LocalStatic(LocalLibrary),
}

impl LibraryReference {
    /// Local library this reference points at, if any
    pub fn local(&self) -> Option<&LocalLibrary> {
        match self {
            Self::Global { .. } => None,
            Self::LocalShared(lib) | Self::LocalStatic(lib) => Some(lib),
        }
    }
}

/// Classify a library reference written on `target`.
///
/// Shared patterns (`lib<name>.<so>`, `lib<name>.<so>.<version>`,
/// `lib<name>.la`) are tried before the static pattern (`lib<name>.<a>`).
/// A bare name without separators or library suffix is global. Anything
/// else is rejected.
pub fn classify_reference(
    target: &str,
    reference: &str,
    naming: &ArtifactNaming,
) -> BuildResult<LibraryReference> {
    let (directory, file) = match reference.rfind(['/', '\\']) {
        Some(idx) => (&reference[..=idx], &reference[idx + 1..]),
        None => ("", reference),
    };

    if let Some(stem) = shared_stem(file, &naming.shared_suffix) {
        if let Some(name) = library_name(stem) {
            let file = local_dependency(target, reference, directory, name, naming)?;
            return Ok(LibraryReference::LocalShared(local(directory, name, file)));
        }
    } else if let Some(stem) = file.strip_suffix(&format!(".{}", naming.static_suffix)) {
        if let Some(name) = library_name(stem) {
            let file = PathBuf::from(reference);
            return Ok(LibraryReference::LocalStatic(local(directory, name, file)));
        }
    } else if directory.is_empty() && !file.is_empty() {
        return Ok(LibraryReference::Global {
            name: reference.to_string(),
        });
    }

    Err(BuildError::unrecognized_reference(target, reference))
}

fn local(directory: &str, name: &str, file: PathBuf) -> LocalLibrary {
    LocalLibrary {
        directory: if directory.is_empty() {
            "./".to_string()
        } else {
            directory.to_string()
        },
        name: name.to_string(),
        file,
    }
}

/// File stem when `file` carries a shared-library or metadata suffix
fn shared_stem<'a>(file: &'a str, suffix: &str) -> Option<&'a str> {
    if let Some(stem) = file.strip_suffix(&format!(".{}", METADATA_SUFFIX)) {
        return Some(stem);
    }
    if let Some(stem) = file.strip_suffix(&format!(".{}", suffix)) {
        return Some(stem);
    }
    let marker = format!(".{}.", suffix);
    let idx = file.rfind(&marker)?;
    let version = &file[idx + marker.len()..];
    let is_version = version
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    is_version.then(|| &file[..idx])
}

fn library_name(stem: &str) -> Option<&str> {
    stem.strip_prefix(LIBRARY_PREFIX).filter(|name| !name.is_empty())
}

/// File a local shared reference depends on. Metadata references resolve to
/// the physical file the metadata names, when the metadata exists already.
fn local_dependency(
    target: &str,
    reference: &str,
    directory: &str,
    name: &str,
    naming: &ArtifactNaming,
) -> BuildResult<PathBuf> {
    let path = Path::new(reference);
    if !reference.ends_with(&format!(".{}", METADATA_SUFFIX)) {
        return Ok(path.to_path_buf());
    }
    if path.is_file() {
        let metadata = LinkMetadata::read(path).map_err(|e| e.with_target(target))?;
        return Ok(Path::new(directory).join(metadata.physical));
    }
    Ok(Path::new(directory).join(format!(
        "{}{}.{}",
        LIBRARY_PREFIX, name, naming.shared_suffix
    )))
}

/// Remove later duplicates, keeping every first occurrence in place
pub fn stable_dedup<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding normal component
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Fully merged compile and link configuration of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBuildConfig {
    pub target: String,
    pub kind: TargetKind,
    pub sources: Vec<PathBuf>,
    pub include_paths: Vec<String>,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub lib_paths: Vec<String>,
    pub runtime_paths: Vec<String>,
    /// Libraries linked by name, in link order
    pub libraries: Vec<LibraryReference>,
    /// Local static archives, linked by path
    pub static_libraries: Vec<LocalLibrary>,
    /// Files of local libraries that must be built first
    pub local_dependencies: Vec<PathBuf>,
    /// Used profiles absent from the registry
    pub missing_profiles: Vec<String>,
}

impl ResolvedBuildConfig {
    pub fn new(target: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            target: target.into(),
            kind,
            sources: Vec::new(),
            include_paths: Vec::new(),
            compile_flags: Vec::new(),
            link_flags: Vec::new(),
            lib_paths: Vec::new(),
            runtime_paths: Vec::new(),
            libraries: Vec::new(),
            static_libraries: Vec::new(),
            local_dependencies: Vec::new(),
            missing_profiles: Vec::new(),
        }
    }

    /// Append a library reference to the list it belongs to
    pub fn add_reference(&mut self, reference: LibraryReference) {
        match reference {
            LibraryReference::Global { .. } => self.libraries.push(reference),
            LibraryReference::LocalShared(lib) => {
                self.lib_paths.push(lib.directory.clone());
                self.local_dependencies.push(lib.file.clone());
                self.libraries.push(LibraryReference::LocalShared(lib));
            }
            LibraryReference::LocalStatic(lib) => {
                self.local_dependencies.push(lib.file.clone());
                self.static_libraries.push(lib);
            }
        }
    }

    /// Append a profile's contribution. Runtime paths are only taken when
    /// `want_rpath` is set.
    pub fn merge_profile(&mut self, profile: &LibraryProfile, want_rpath: bool) {
        self.compile_flags.extend(profile.compile_flags.iter().cloned());
        self.include_paths.extend(profile.include_paths.iter().cloned());
        self.link_flags.extend(profile.link_flags.iter().cloned());
        self.lib_paths.extend(profile.lib_paths.iter().cloned());
        if want_rpath {
            self.runtime_paths.extend(profile.runtime_paths.iter().cloned());
        }
        self.libraries.extend(
            profile
                .libraries
                .iter()
                .map(|name| LibraryReference::Global { name: name.clone() }),
        );
        self.dedup();
    }

    /// Stable-dedup every list
    pub fn dedup(&mut self) {
        self.include_paths = stable_dedup(std::mem::take(&mut self.include_paths));
        self.compile_flags = stable_dedup(std::mem::take(&mut self.compile_flags));
        self.link_flags = stable_dedup(std::mem::take(&mut self.link_flags));
        self.lib_paths = stable_dedup(std::mem::take(&mut self.lib_paths));
        self.runtime_paths = stable_dedup(std::mem::take(&mut self.runtime_paths));
        self.libraries = stable_dedup(std::mem::take(&mut self.libraries));
        self.static_libraries = stable_dedup(std::mem::take(&mut self.static_libraries));
        self.local_dependencies = stable_dedup(std::mem::take(&mut self.local_dependencies));
        self.missing_profiles = stable_dedup(std::mem::take(&mut self.missing_profiles));
    }

    /// Names passed to the linker as `-l<name>`, in link order
    pub fn library_names(&self) -> Vec<String> {
        let names = self
            .libraries
            .iter()
            .map(|lib| match lib {
                LibraryReference::Global { name } => name.clone(),
                LibraryReference::LocalShared(local) | LibraryReference::LocalStatic(local) => {
                    local.name.clone()
                }
            })
            .collect();
        stable_dedup(names)
    }

    /// Paths of the static archives to link
    pub fn static_library_paths(&self) -> Vec<PathBuf> {
        self.static_libraries.iter().map(|lib| lib.file.clone()).collect()
    }
}

/// Resolves descriptors against a frozen profile registry
#[derive(Debug)]
pub struct TargetResolver<'a> {
    registry: &'a LibraryProfileRegistry,
    config: &'a BuildConfig,
}

impl<'a> TargetResolver<'a> {
    pub fn new(registry: &'a LibraryProfileRegistry, config: &'a BuildConfig) -> Self {
        Self { registry, config }
    }

    /// Resolve one descriptor
    pub fn resolve(&self, descriptor: &TargetDescriptor) -> BuildResult<ResolvedBuildConfig> {
        descriptor.validate()?;

        let config = self.config;
        let mut resolved = ResolvedBuildConfig::new(&descriptor.name, descriptor.kind);
        resolved.sources = descriptor.effective_sources();

        if config.smart_includes {
            resolved.include_paths.push(".".to_string());
            resolved
                .include_paths
                .push(config.build_dir.display().to_string());
        }
        resolved
            .include_paths
            .extend(config.global_include_paths.iter().cloned());
        resolved
            .include_paths
            .extend(descriptor.include_paths.iter().cloned());

        resolved
            .compile_flags
            .extend(config.global_compile_flags.iter().cloned());
        resolved
            .compile_flags
            .extend(descriptor.compile_flags.iter().cloned());
        if descriptor.kind == TargetKind::ConvenienceLibrary {
            resolved
                .compile_flags
                .extend(config.convenience_flags.iter().cloned());
        }

        resolved
            .link_flags
            .extend(config.global_link_flags.iter().cloned());
        resolved
            .link_flags
            .extend(descriptor.link_flags.iter().cloned());
        resolved
            .lib_paths
            .extend(descriptor.lib_paths.iter().cloned());

        for reference in &descriptor.libraries {
            let classified = classify_reference(&descriptor.name, reference, &config.naming)?;
            tracing::debug!(target_name = %descriptor.name, %reference, ?classified, "classified library reference");
            resolved.add_reference(classified);
        }
        resolved.dedup();

        for name in &descriptor.used_profiles {
            match self.registry.get(name) {
                Some(profile) => {
                    tracing::debug!(target_name = %descriptor.name, profile = %name, "merging library profile");
                    resolved.merge_profile(profile, config.want_rpath);
                }
                None => {
                    tracing::debug!(target_name = %descriptor.name, profile = %name, "library profile not registered, skipping");
                    resolved.missing_profiles.push(name.clone());
                }
            }
        }
        resolved.dedup();

        Ok(resolved)
    }
}
