//! Compile/link primitives
//!
//! The builder hands each target's fully resolved configuration to a
//! [`Toolchain`] exactly once: one compile call, one link call, no retries.
//! [`CommandToolchain`] drives a `cc`/`ar` style toolchain through
//! `std::process::Command`.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Failure reported by a toolchain primitive
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ToolchainError(pub String);

/// Kind of artifact the linker produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Executable,
    SharedLibrary,
    StaticArchive,
}

/// Inputs of one compile call
#[derive(Debug, Clone, PartialEq)]
pub struct CompileRequest {
    pub target: String,
    pub sources: Vec<PathBuf>,
    pub compile_flags: Vec<String>,
    pub include_paths: Vec<String>,
    /// Directory receiving object files
    pub object_dir: PathBuf,
    /// Objects end up in a shared object
    pub position_independent: bool,
}

/// Inputs of one link call
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub target: String,
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
    pub kind: OutputKind,
    pub link_flags: Vec<String>,
    pub lib_paths: Vec<String>,
    /// Names passed as `-l<name>`
    pub libraries: Vec<String>,
    /// Archives linked by path
    pub static_archives: Vec<PathBuf>,
    pub runtime_paths: Vec<String>,
    /// Run-time identity of a shared library
    pub soname: Option<String>,
}

/// Compile and link primitives
pub trait Toolchain {
    /// Compile every source, returning the object files in source order
    fn compile(&mut self, request: &CompileRequest) -> Result<Vec<PathBuf>, ToolchainError>;

    /// Link objects into the requested output, returning its path
    fn link(&mut self, request: &LinkRequest) -> Result<PathBuf, ToolchainError>;
}

impl<T: Toolchain + ?Sized> Toolchain for &mut T {
    fn compile(&mut self, request: &CompileRequest) -> Result<Vec<PathBuf>, ToolchainError> {
        (**self).compile(request)
    }

    fn link(&mut self, request: &LinkRequest) -> Result<PathBuf, ToolchainError> {
        (**self).link(request)
    }
}

/// Toolchain backed by external `cc` and `ar` commands
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    /// C/C++ compiler driver, also used for linking
    pub compiler: String,
    /// Archiver
    pub archiver: String,
}

impl Default for CommandToolchain {
    fn default() -> Self {
        Self {
            compiler: "cc".to_string(),
            archiver: "ar".to_string(),
        }
    }
}

impl CommandToolchain {
    /// Toolchain using the given compiler driver and archiver
    pub fn new(compiler: impl Into<String>, archiver: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            archiver: archiver.into(),
        }
    }

    /// Arguments compiling `source` into `object`
    pub fn compile_args(request: &CompileRequest, source: &Path, object: &Path) -> Vec<String> {
        let mut args = Vec::new();
        args.extend(request.compile_flags.iter().cloned());
        if request.position_independent && !request.compile_flags.iter().any(|f| f == "-fPIC") {
            args.push("-fPIC".to_string());
        }
        args.extend(request.include_paths.iter().map(|p| format!("-I{}", p)));
        args.push("-c".to_string());
        args.push(source.display().to_string());
        args.push("-o".to_string());
        args.push(object.display().to_string());
        args
    }

    /// Program and arguments performing the link
    pub fn link_command(&self, request: &LinkRequest) -> (String, Vec<String>) {
        if request.kind == OutputKind::StaticArchive {
            let mut args = vec!["rcs".to_string(), request.output.display().to_string()];
            args.extend(request.objects.iter().map(|o| o.display().to_string()));
            return (self.archiver.clone(), args);
        }

        let mut args = Vec::new();
        if request.kind == OutputKind::SharedLibrary {
            args.push("-shared".to_string());
            if let Some(soname) = &request.soname {
                args.push(format!("-Wl,-soname,{}", soname));
            }
        }
        args.push("-o".to_string());
        args.push(request.output.display().to_string());
        args.extend(request.objects.iter().map(|o| o.display().to_string()));
        args.extend(request.link_flags.iter().cloned());
        args.extend(request.lib_paths.iter().map(|p| format!("-L{}", p)));
        args.extend(request.runtime_paths.iter().map(|p| format!("-Wl,-rpath,{}", p)));
        args.extend(request.static_archives.iter().map(|a| a.display().to_string()));
        args.extend(request.libraries.iter().map(|l| format!("-l{}", l)));
        (self.compiler.clone(), args)
    }

    fn run(program: &str, args: &[String]) -> Result<(), ToolchainError> {
        tracing::debug!(program, ?args, "running tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| ToolchainError(format!("failed to run {}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolchainError(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Object file path for a source: the source path mirrored under
/// `object_dir` with `.o` appended to the full file name. `..` components
/// become `__`; root and `.` components are dropped.
pub fn object_path(object_dir: &Path, source: &Path) -> PathBuf {
    let mut object = object_dir.to_path_buf();
    for component in source.components() {
        match component {
            Component::Normal(part) => object.push(part),
            Component::ParentDir => object.push("__"),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut file_name = object.file_name().map(OsString::from).unwrap_or_default();
    file_name.push(".o");
    object.set_file_name(file_name);
    object
}

impl Toolchain for CommandToolchain {
    fn compile(&mut self, request: &CompileRequest) -> Result<Vec<PathBuf>, ToolchainError> {
        std::fs::create_dir_all(&request.object_dir).map_err(|e| {
            ToolchainError(format!("cannot create {}: {}", request.object_dir.display(), e))
        })?;

        let mut objects = Vec::with_capacity(request.sources.len());
        for source in &request.sources {
            let object = object_path(&request.object_dir, source);
            if let Some(parent) = object.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ToolchainError(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
            Self::run(&self.compiler, &Self::compile_args(request, source, &object))?;
            objects.push(object);
        }
        Ok(objects)
    }

    fn link(&mut self, request: &LinkRequest) -> Result<PathBuf, ToolchainError> {
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolchainError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let (program, args) = self.link_command(request);
        Self::run(&program, &args)?;
        Ok(request.output.clone())
    }
}
