//! Install collaborator
//!
//! [`Installer`] abstracts the copy/symlink mechanics of the install step;
//! [`FsInstaller`] performs them on the local filesystem, staging every
//! destination under an optional DESTDIR root.

use crate::emitter::EmittedArtifact;
use crate::error::{BuildError, BuildResult};
use crate::targets::TargetDescriptor;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Failure reported by an installer primitive
#[derive(Debug, Error)]
#[error("{path}: {reason}")]
pub struct InstallError {
    pub path: PathBuf,
    pub reason: String,
}

impl InstallError {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Copy and symlink primitives used by the install step
pub trait Installer {
    /// Copy `source` into `dest_dir`, optionally renaming it. Returns the
    /// installed path.
    fn install_file(
        &mut self,
        source: &Path,
        dest_dir: &Path,
        new_name: Option<&str>,
    ) -> Result<PathBuf, InstallError>;

    /// (Re)create `link_path` as a symlink to `target_name`
    fn create_symlink(&mut self, link_path: &Path, target_name: &str) -> Result<(), InstallError>;

    /// Apply a unix mode to an installed file
    fn set_permissions(&mut self, _path: &Path, _mode: u32) -> Result<(), InstallError> {
        Ok(())
    }
}

impl<T: Installer + ?Sized> Installer for &mut T {
    fn install_file(
        &mut self,
        source: &Path,
        dest_dir: &Path,
        new_name: Option<&str>,
    ) -> Result<PathBuf, InstallError> {
        (**self).install_file(source, dest_dir, new_name)
    }

    fn create_symlink(&mut self, link_path: &Path, target_name: &str) -> Result<(), InstallError> {
        (**self).create_symlink(link_path, target_name)
    }

    fn set_permissions(&mut self, path: &Path, mode: u32) -> Result<(), InstallError> {
        (**self).set_permissions(path, mode)
    }
}

/// Installer writing to the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsInstaller {
    destdir: Option<PathBuf>,
}

impl FsInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage every destination under `destdir`
    pub fn with_destdir(destdir: impl Into<PathBuf>) -> Self {
        Self {
            destdir: Some(destdir.into()),
        }
    }

    /// Where `path` actually lands once DESTDIR is applied
    pub fn staged(&self, path: &Path) -> PathBuf {
        match &self.destdir {
            None => path.to_path_buf(),
            Some(root) => {
                let relative: PathBuf = path
                    .components()
                    .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                    .collect();
                root.join(relative)
            }
        }
    }
}

impl Installer for FsInstaller {
    fn install_file(
        &mut self,
        source: &Path,
        dest_dir: &Path,
        new_name: Option<&str>,
    ) -> Result<PathBuf, InstallError> {
        let dir = self.staged(dest_dir);
        fs::create_dir_all(&dir).map_err(|e| InstallError::new(&dir, e))?;

        let file_name = match new_name {
            Some(name) => name.into(),
            None => source
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| InstallError::new(source, "source has no file name"))?,
        };
        let dest = dir.join(file_name);

        tracing::debug!(from = %source.display(), to = %dest.display(), "installing file");
        fs::copy(source, &dest).map_err(|e| InstallError::new(&dest, e))?;
        Ok(dest)
    }

    fn create_symlink(&mut self, link_path: &Path, target_name: &str) -> Result<(), InstallError> {
        let link = self.staged(link_path);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallError::new(parent, e))?;
        }
        replace_symlink(&link, target_name).map_err(|e| InstallError::new(&link, e))
    }

    #[cfg(unix)]
    fn set_permissions(&mut self, path: &Path, mode: u32) -> Result<(), InstallError> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| InstallError::new(path, e))
    }
}

/// Replace whatever sits at `link_path` with a relative symlink to
/// `target_name`. A missing old link is fine.
pub fn replace_symlink(link_path: &Path, target_name: &str) -> io::Result<()> {
    match fs::symlink_metadata(link_path) {
        Ok(_) => fs::remove_file(link_path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    make_symlink(target_name, link_path)
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Install an emitted artifact into the descriptor's install directory:
/// the physical file, its aliases recreated next to it, and the metadata
/// file. Returns the installed paths.
pub fn install_artifact(
    descriptor: &TargetDescriptor,
    artifact: &EmittedArtifact,
    installer: &mut dyn Installer,
) -> BuildResult<Vec<PathBuf>> {
    let Some(install_dir) = descriptor.install_dir.as_deref() else {
        return Ok(Vec::new());
    };
    let fail = |e: InstallError| BuildError::install(&descriptor.name, e.path, e.reason);

    let mut installed = Vec::new();
    let dest = installer
        .install_file(&artifact.path, install_dir, None)
        .map_err(fail)?;
    if let Some(mode) = descriptor.permissions {
        installer.set_permissions(&dest, mode).map_err(fail)?;
    }
    installed.push(dest);

    let physical = artifact
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BuildError::install(&descriptor.name, &artifact.path, "artifact has no file name"))?;
    for alias in &artifact.aliases {
        let Some(alias_name) = alias.file_name() else {
            continue;
        };
        let link_path = install_dir.join(alias_name);
        installer
            .create_symlink(&link_path, &physical)
            .map_err(fail)?;
        installed.push(link_path);
    }

    if let Some(metadata) = &artifact.metadata {
        installed.push(
            installer
                .install_file(metadata, install_dir, None)
                .map_err(fail)?,
        );
    }

    tracing::info!(target_name = %descriptor.name, dir = %install_dir.display(), "installed");
    Ok(installed)
}
