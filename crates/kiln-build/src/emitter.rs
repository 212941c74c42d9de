//! Artifact emission
//!
//! Turns a resolved configuration into compile/link calls and, for shared
//! libraries, handles the versioned naming scheme:
//!
//! - physical file `<prefix><name>.<suffix>.<version>`
//! - aliases `<prefix><name>.<suffix>` and `<prefix><name>.<suffix>.<major>`
//! - soname `<prefix><name>.<suffix>.<major>`
//! - a `<prefix><name>.la` link-metadata file next to the artifact
//!
//! Unversioned shared libraries get neither aliases nor a metadata file.

use crate::error::{BuildError, BuildResult};
use crate::install::replace_symlink;
use crate::resolver::ResolvedBuildConfig;
use crate::targets::{TargetDescriptor, TargetKind, VersionNumber};
use crate::toolchain::{CompileRequest, LinkRequest, Toolchain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of link-metadata files
pub const METADATA_SUFFIX: &str = "la";

/// File suffixes used when naming artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactNaming {
    /// Shared library suffix without the dot
    pub shared_suffix: String,
    /// Static library suffix without the dot
    pub static_suffix: String,
}

impl Default for ArtifactNaming {
    fn default() -> Self {
        Self {
            shared_suffix: "so".to_string(),
            static_suffix: "a".to_string(),
        }
    }
}

/// File names of one shared library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedLibraryNames {
    /// Name of the real file
    pub physical: String,
    /// Symlink names pointing at the physical file
    pub aliases: Vec<String>,
    /// Run-time linker identity
    pub soname: String,
}

impl ArtifactNaming {
    /// Names for a shared library, versioned when `version` is given
    pub fn shared_library(
        &self,
        prefix: &str,
        name: &str,
        version: Option<&VersionNumber>,
    ) -> SharedLibraryNames {
        let base = format!("{}{}.{}", prefix, name, self.shared_suffix);
        match version {
            None => SharedLibraryNames {
                physical: base.clone(),
                aliases: Vec::new(),
                soname: base,
            },
            Some(version) => {
                let physical = format!("{}.{}", base, version);
                let soname = format!("{}.{}", base, version.major());
                let aliases = [base, soname.clone()]
                    .into_iter()
                    .filter(|alias| *alias != physical)
                    .collect();
                SharedLibraryNames {
                    physical,
                    aliases,
                    soname,
                }
            }
        }
    }

    /// File name of a static archive
    pub fn static_library(&self, prefix: &str, name: &str) -> String {
        format!("{}{}.{}", prefix, name, self.static_suffix)
    }

    /// File name of a link-metadata file
    pub fn metadata_file(&self, prefix: &str, name: &str) -> String {
        format!("{}{}.{}", prefix, name, METADATA_SUFFIX)
    }
}

/// Content of a link-metadata (`.la`-style) file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    /// Physical file name
    pub physical: String,
    /// Alias (symlink) names
    pub aliases: Vec<String>,
    /// Run-time linker identity
    pub soname: String,
    /// Install directory, when the library is installed
    pub install_dir: Option<PathBuf>,
}

impl LinkMetadata {
    /// Render as libtool-compatible `key='value'` lines
    pub fn render(&self) -> String {
        let mut names = vec![self.physical.as_str()];
        names.extend(self.aliases.iter().map(String::as_str));
        let libdir = self
            .install_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();

        format!(
            "# {} - link metadata generated by kiln\n\
             dlname={}\n\
             library_names={}\n\
             old_library=''\n\
             dependency_libs=''\n\
             installed={}\n\
             libdir={}\n",
            self.physical,
            quote(&self.soname),
            quote(&names.join(" ")),
            if self.install_dir.is_some() { "yes" } else { "no" },
            quote(&libdir)
        )
    }

    /// Parse rendered metadata. Returns `None` when `library_names` is
    /// missing or empty.
    pub fn parse(content: &str) -> Option<Self> {
        let mut soname = None;
        let mut names = None;
        let mut libdir = None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim() {
                "dlname" => soname = Some(value),
                "library_names" => names = Some(value),
                "libdir" => libdir = Some(value),
                _ => {}
            }
        }

        let names = names?;
        let mut names = names.split_whitespace().map(str::to_string);
        let physical = names.next()?;
        let aliases: Vec<String> = names.collect();

        Some(Self {
            soname: soname.unwrap_or_else(|| physical.clone()),
            physical,
            aliases,
            install_dir: libdir.filter(|d| !d.is_empty()).map(PathBuf::from),
        })
    }

    /// Read a metadata file from disk
    pub fn read(path: &Path) -> BuildResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::parse(&content).ok_or_else(|| {
            BuildError::io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "link metadata has no library_names entry",
                ),
            )
        })
    }
}

/// Single-quote a value the way a shell would read it back
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Inverse of [`quote`]: drop quotes and honor backslash escapes outside them
fn unquote(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut quoted = false;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => quoted = !quoted,
            '\\' if !quoted => value.extend(chars.next()),
            c => value.push(c),
        }
    }
    value
}

/// Where and under which names a target's artifact will be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlan {
    /// Directory receiving the artifact
    pub output_dir: PathBuf,
    /// Physical file name
    pub file_name: String,
    /// Symlink names created next to the artifact
    pub aliases: Vec<String>,
    /// Soname for shared objects
    pub soname: Option<String>,
    /// Metadata file name and content for versioned shared objects
    pub metadata: Option<(String, LinkMetadata)>,
}

impl ArtifactPlan {
    /// Path of the physical artifact
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }

    /// Every path this plan produces: artifact, aliases and metadata file
    pub fn produced_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.artifact_path()];
        paths.extend(self.aliases.iter().map(|a| self.output_dir.join(a)));
        if let Some((file, _)) = &self.metadata {
            paths.push(self.output_dir.join(file));
        }
        paths
    }
}

/// An artifact written by the emitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedArtifact {
    pub kind: TargetKind,
    /// Physical artifact path
    pub path: PathBuf,
    /// Symlinks created next to the artifact
    pub aliases: Vec<PathBuf>,
    /// Metadata file, for versioned shared objects
    pub metadata: Option<PathBuf>,
    pub soname: Option<String>,
    /// Object files produced by the compile step
    pub objects: Vec<PathBuf>,
}

/// Produces compile/link invocations and artifact side files
#[derive(Debug, Clone)]
pub struct ArtifactEmitter {
    build_dir: PathBuf,
    naming: ArtifactNaming,
}

impl ArtifactEmitter {
    pub fn new(build_dir: impl Into<PathBuf>, naming: ArtifactNaming) -> Self {
        Self {
            build_dir: build_dir.into(),
            naming,
        }
    }

    pub fn naming(&self) -> &ArtifactNaming {
        &self.naming
    }

    /// Plan file names for a descriptor without touching the filesystem
    pub fn plan(&self, descriptor: &TargetDescriptor) -> BuildResult<ArtifactPlan> {
        let output_dir = self.build_dir.join(&descriptor.directory);
        let prefix = descriptor.prefix();
        let name = descriptor.name.as_str();

        let plan = match descriptor.kind {
            TargetKind::Program => ArtifactPlan {
                output_dir,
                file_name: name.to_string(),
                aliases: Vec::new(),
                soname: None,
                metadata: None,
            },
            TargetKind::StaticLibrary | TargetKind::ConvenienceLibrary => ArtifactPlan {
                output_dir,
                file_name: self.naming.static_library(prefix, name),
                aliases: Vec::new(),
                soname: None,
                metadata: None,
            },
            TargetKind::SharedLibrary | TargetKind::LoadableModule => {
                let version = descriptor.version_number()?;
                let names = self.naming.shared_library(prefix, name, version.as_ref());
                let metadata = version.map(|_| {
                    (
                        self.naming.metadata_file(prefix, name),
                        LinkMetadata {
                            physical: names.physical.clone(),
                            aliases: names.aliases.clone(),
                            soname: names.soname.clone(),
                            install_dir: descriptor.install_dir.clone(),
                        },
                    )
                });
                ArtifactPlan {
                    output_dir,
                    file_name: names.physical,
                    aliases: names.aliases,
                    soname: Some(names.soname),
                    metadata,
                }
            }
        };

        Ok(plan)
    }

    /// Compile, link and write side files for one target
    pub fn emit(
        &self,
        descriptor: &TargetDescriptor,
        config: &ResolvedBuildConfig,
        toolchain: &mut dyn Toolchain,
    ) -> BuildResult<EmittedArtifact> {
        let plan = self.plan(descriptor)?;

        let compile = CompileRequest {
            target: descriptor.name.clone(),
            sources: config.sources.clone(),
            compile_flags: config.compile_flags.clone(),
            include_paths: config.include_paths.clone(),
            object_dir: plan.output_dir.join("objs").join(&descriptor.name),
            position_independent: descriptor.kind.is_shared(),
        };
        let objects = toolchain.compile(&compile).map_err(|e| BuildError::Compile {
            target: descriptor.name.clone(),
            reason: e.to_string(),
        })?;

        let link = LinkRequest {
            target: descriptor.name.clone(),
            objects: objects.clone(),
            output: plan.artifact_path(),
            kind: descriptor.kind.output_kind(),
            link_flags: config.link_flags.clone(),
            lib_paths: config.lib_paths.clone(),
            libraries: config.library_names(),
            static_archives: config.static_library_paths(),
            runtime_paths: config.runtime_paths.clone(),
            soname: plan.soname.clone(),
        };
        let path = toolchain.link(&link).map_err(|e| BuildError::Link {
            target: descriptor.name.clone(),
            reason: e.to_string(),
        })?;

        let mut aliases = Vec::with_capacity(plan.aliases.len());
        for alias in &plan.aliases {
            let link_path = plan.output_dir.join(alias);
            tracing::debug!(link = %link_path.display(), points_to = %plan.file_name, "symlinking");
            replace_symlink(&link_path, &plan.file_name)
                .map_err(|e| BuildError::target_io(&descriptor.name, &link_path, e))?;
            aliases.push(link_path);
        }

        let metadata = match &plan.metadata {
            Some((file, content)) => {
                let metadata_path = plan.output_dir.join(file);
                fs::write(&metadata_path, content.render())
                    .map_err(|e| BuildError::target_io(&descriptor.name, &metadata_path, e))?;
                Some(metadata_path)
            }
            None => None,
        };

        Ok(EmittedArtifact {
            kind: descriptor.kind,
            path,
            aliases,
            metadata,
            soname: plan.soname,
            objects,
        })
    }
}
