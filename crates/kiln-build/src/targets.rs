/// Target descriptors and target kinds
use crate::emitter::EmittedArtifact;
use crate::error::{BuildError, BuildResult};
use crate::resolver::ResolvedBuildConfig;
use crate::toolchain::OutputKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Kind of build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Executable program
    Program,
    /// Shared library, optionally versioned
    SharedLibrary,
    /// Static archive
    StaticLibrary,
    /// Static, never-installed helper library
    ConvenienceLibrary,
    /// Shared object loaded at runtime (plugin)
    LoadableModule,
}

impl TargetKind {
    /// Parse a kind name as written in manifests
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "program" => Some(Self::Program),
            "shlib" | "shared-library" => Some(Self::SharedLibrary),
            "staticlib" | "static-library" => Some(Self::StaticLibrary),
            "convenience" | "convenience-library" => Some(Self::ConvenienceLibrary),
            "module" | "loadable-module" => Some(Self::LoadableModule),
            _ => None,
        }
    }

    /// Conventional file name prefix
    pub fn default_prefix(&self) -> &'static str {
        match self {
            Self::SharedLibrary | Self::StaticLibrary | Self::ConvenienceLibrary => "lib",
            Self::Program | Self::LoadableModule => "",
        }
    }

    /// Whether the artifact is a shared object
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::SharedLibrary | Self::LoadableModule)
    }

    /// Whether the artifact is a static archive
    pub fn is_static(&self) -> bool {
        matches!(self, Self::StaticLibrary | Self::ConvenienceLibrary)
    }

    /// Whether an install directory is honored for this kind
    pub fn is_installable(&self) -> bool {
        !matches!(self, Self::ConvenienceLibrary)
    }

    /// Output kind requested from the linker
    pub fn output_kind(&self) -> OutputKind {
        match self {
            Self::Program => OutputKind::Executable,
            Self::SharedLibrary | Self::LoadableModule => OutputKind::SharedLibrary,
            Self::StaticLibrary | Self::ConvenienceLibrary => OutputKind::StaticArchive,
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Program => write!(f, "program"),
            Self::SharedLibrary => write!(f, "shared library"),
            Self::StaticLibrary => write!(f, "static library"),
            Self::ConvenienceLibrary => write!(f, "convenience library"),
            Self::LoadableModule => write!(f, "loadable module"),
        }
    }
}

/// Dotted version number such as "1.2.3"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNumber {
    raw: String,
}

impl VersionNumber {
    /// Parse a dotted version; every component must be a non-empty run of digits
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let valid = s
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        valid.then(|| Self { raw: s.to_string() })
    }

    /// First component
    pub fn major(&self) -> &str {
        self.raw.split('.').next().unwrap_or(&self.raw)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Result of executing a descriptor, kept for repeated calls
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    /// Resolved configuration
    pub config: ResolvedBuildConfig,
    /// Emitted artifact (absent in dump mode)
    pub artifact: Option<EmittedArtifact>,
}

/// A requested build target and its declared attributes
///
/// Created and mutated by the caller, handed to the builder, executed once.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    /// Target name
    pub name: String,
    /// Target kind
    pub kind: TargetKind,
    /// Output subdirectory relative to the build directory
    pub directory: PathBuf,
    /// Source files, in order
    pub sources: Vec<PathBuf>,
    /// Caller-supplied sources used when `sources` is empty
    pub fallback_sources: Option<Vec<PathBuf>>,
    /// Target-local include paths
    pub include_paths: Vec<String>,
    /// Target-local compile flags
    pub compile_flags: Vec<String>,
    /// Target-local link flags
    pub link_flags: Vec<String>,
    /// Target-local library search paths
    pub lib_paths: Vec<String>,
    /// Library references: local library paths or bare global names
    pub libraries: Vec<String>,
    /// Library profiles pulled in wholesale
    pub used_profiles: Vec<String>,
    /// Dotted version for shared libraries
    pub version: Option<String>,
    /// Install directory; no install step when absent
    pub install_dir: Option<PathBuf>,
    /// Overrides the kind's conventional prefix
    pub library_prefix: Option<String>,
    /// Targets that must be executed before this one
    pub depends_on: Vec<String>,
    /// Unix mode applied to an installed program
    pub permissions: Option<u32>,
    outcome: Option<TargetOutcome>,
}

impl TargetDescriptor {
    /// Create a new target descriptor
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            directory: PathBuf::new(),
            sources: Vec::new(),
            fallback_sources: None,
            include_paths: Vec::new(),
            compile_flags: Vec::new(),
            link_flags: Vec::new(),
            lib_paths: Vec::new(),
            libraries: Vec::new(),
            used_profiles: Vec::new(),
            version: None,
            install_dir: None,
            library_prefix: None,
            depends_on: Vec::new(),
            permissions: None,
            outcome: None,
        }
    }

    pub fn with_sources<P: Into<PathBuf>>(mut self, sources: impl IntoIterator<Item = P>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback_sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.fallback_sources = Some(sources);
        self
    }

    pub fn in_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_include_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.include_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_compile_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.compile_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.link_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lib_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.lib_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_libraries<S: Into<String>>(mut self, libraries: impl IntoIterator<Item = S>) -> Self {
        self.libraries = libraries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profiles<S: Into<String>>(mut self, profiles: impl IntoIterator<Item = S>) -> Self {
        self.used_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.library_prefix = Some(prefix.into());
        self
    }

    pub fn with_dependencies<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode);
        self
    }

    /// File name prefix in effect
    pub fn prefix(&self) -> &str {
        self.library_prefix
            .as_deref()
            .unwrap_or_else(|| self.kind.default_prefix())
    }

    /// Parsed version number, if one was declared
    pub fn version_number(&self) -> BuildResult<Option<VersionNumber>> {
        match &self.version {
            None => Ok(None),
            Some(raw) => VersionNumber::parse(raw).map(Some).ok_or_else(|| {
                BuildError::configuration(
                    &self.name,
                    format!("invalid version string '{}'", raw),
                )
            }),
        }
    }

    /// Sources to compile: declared sources, else the fallback list,
    /// deduplicated in first-seen order
    pub fn effective_sources(&self) -> Vec<PathBuf> {
        let sources = if self.sources.is_empty() {
            self.fallback_sources.as_deref().unwrap_or(&[])
        } else {
            &self.sources
        };
        let mut seen = HashSet::new();
        sources
            .iter()
            .filter(|s| seen.insert(s.as_path()))
            .cloned()
            .collect()
    }

    /// Validate the descriptor
    pub fn validate(&self) -> BuildResult<()> {
        if self.name.is_empty() {
            return Err(BuildError::configuration(&self.name, "target name is empty"));
        }

        if self.name.contains(['/', '\\']) || self.name.chars().any(char::is_whitespace) {
            return Err(BuildError::configuration(
                &self.name,
                "target name must not contain path separators or whitespace",
            ));
        }

        if self.effective_sources().is_empty() {
            return Err(BuildError::configuration(
                &self.name,
                "no source files given and no fallback source list supplied",
            ));
        }

        self.version_number()?;
        Ok(())
    }

    /// Whether the descriptor has already been executed
    pub fn is_executed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Outcome of the execution, once executed
    pub fn outcome(&self) -> Option<&TargetOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn mark_executed(&mut self, outcome: TargetOutcome) {
        debug_assert!(self.outcome.is_none(), "descriptor executed twice");
        self.outcome = Some(outcome);
    }
}

/// Collect source files under `dir` whose extension is one of `extensions`,
/// sorted by path. Suitable as a fallback source list.
pub fn discover_sources(dir: &Path, extensions: &[&str]) -> BuildResult<Vec<PathBuf>> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            let error = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
            BuildError::io(path, error)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if matches {
            sources.push(entry.into_path());
        }
    }

    sources.sort();
    Ok(sources)
}
