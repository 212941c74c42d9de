//! Install step tests

use kiln_build::{
    BuildConfig, BuildError, Builder, CompileRequest, InstallError, Installer,
    LibraryProfileRegistry, LinkRequest, TargetDescriptor, TargetKind, Toolchain, ToolchainError,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Toolchain writing an empty file per link output
struct TouchToolchain;

impl Toolchain for TouchToolchain {
    fn compile(&mut self, request: &CompileRequest) -> Result<Vec<PathBuf>, ToolchainError> {
        Ok(request
            .sources
            .iter()
            .map(|s| request.object_dir.join(s).with_extension("o"))
            .collect())
    }

    fn link(&mut self, request: &LinkRequest) -> Result<PathBuf, ToolchainError> {
        fs::create_dir_all(request.output.parent().unwrap()).unwrap();
        fs::write(&request.output, b"").unwrap();
        Ok(request.output.clone())
    }
}

/// Installer recording calls; fails for one destination directory
#[derive(Default)]
struct RecordingInstaller {
    files: Vec<(PathBuf, PathBuf)>,
    links: Vec<(PathBuf, String)>,
    broken_dir: Option<PathBuf>,
}

impl Installer for RecordingInstaller {
    fn install_file(
        &mut self,
        source: &Path,
        dest_dir: &Path,
        new_name: Option<&str>,
    ) -> Result<PathBuf, InstallError> {
        if self.broken_dir.as_deref() == Some(dest_dir) {
            return Err(InstallError::new(dest_dir, "permission denied"));
        }
        let name = new_name
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(source.file_name().unwrap()));
        let dest = dest_dir.join(name);
        self.files.push((source.to_path_buf(), dest.clone()));
        Ok(dest)
    }

    fn create_symlink(&mut self, link_path: &Path, target_name: &str) -> Result<(), InstallError> {
        self.links.push((link_path.to_path_buf(), target_name.to_string()));
        Ok(())
    }
}

fn install_config(dir: &Path) -> BuildConfig {
    BuildConfig {
        build_dir: dir.join("build"),
        install: true,
        ..BuildConfig::default()
    }
}

#[test]
fn test_install_copies_artifact_aliases_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut installer = RecordingInstaller::default();
    let mut targets = vec![TargetDescriptor::new("bar", TargetKind::SharedLibrary)
        .with_sources(["bar.c"])
        .with_version("1.2.3")
        .with_install_dir("/usr/lib")];

    let report = Builder::new(install_config(dir.path()), &registry)
        .with_toolchain(TouchToolchain)
        .with_installer(&mut installer)
        .run(&mut targets)
        .unwrap();

    assert_eq!(report.stats.installed, 1);
    let installed: Vec<&Path> = installer.files.iter().map(|(_, d)| d.as_path()).collect();
    assert_eq!(
        installed,
        vec![
            Path::new("/usr/lib/libbar.so.1.2.3"),
            Path::new("/usr/lib/libbar.la")
        ]
    );
    assert_eq!(
        installer.links,
        vec![
            (PathBuf::from("/usr/lib/libbar.so"), "libbar.so.1.2.3".to_string()),
            (PathBuf::from("/usr/lib/libbar.so.1"), "libbar.so.1.2.3".to_string()),
        ]
    );
}

#[test]
fn test_install_failure_does_not_abort_other_targets() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut installer = RecordingInstaller {
        broken_dir: Some(PathBuf::from("/broken")),
        ..RecordingInstaller::default()
    };
    let mut targets = vec![
        TargetDescriptor::new("first", TargetKind::Program)
            .with_sources(["first.c"])
            .with_install_dir("/broken"),
        TargetDescriptor::new("second", TargetKind::Program)
            .with_sources(["second.c"])
            .with_install_dir("/usr/bin"),
    ];

    let report = Builder::new(install_config(dir.path()), &registry)
        .with_toolchain(TouchToolchain)
        .with_installer(&mut installer)
        .run(&mut targets)
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.stats.built, 2);
    assert_eq!(report.stats.installed, 1);
    match &report.install_failures[..] {
        [BuildError::Install { target, path, .. }] => {
            assert_eq!(target, "first");
            assert_eq!(path, &PathBuf::from("/broken"));
        }
        other => panic!("expected one install failure, got {:?}", other),
    }
    assert!(targets.iter().all(|t| t.is_executed()));
}

#[test]
fn test_convenience_library_never_installed() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut installer = RecordingInstaller::default();
    let mut targets = vec![TargetDescriptor::new("util", TargetKind::ConvenienceLibrary)
        .with_sources(["util.c"])
        .with_install_dir("/usr/lib")];

    let report = Builder::new(install_config(dir.path()), &registry)
        .with_toolchain(TouchToolchain)
        .with_installer(&mut installer)
        .run(&mut targets)
        .unwrap();

    assert_eq!(report.stats.installed, 0);
    assert!(installer.files.is_empty());
}

#[test]
fn test_install_disabled_skips_install_step() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut installer = RecordingInstaller::default();
    let config = BuildConfig {
        install: false,
        ..install_config(dir.path())
    };
    let mut targets = vec![TargetDescriptor::new("app", TargetKind::Program)
        .with_sources(["main.c"])
        .with_install_dir("/usr/bin")];

    Builder::new(config, &registry)
        .with_toolchain(TouchToolchain)
        .with_installer(&mut installer)
        .run(&mut targets)
        .unwrap();

    assert!(installer.files.is_empty());
}

#[cfg(unix)]
#[test]
fn test_destdir_staging_with_filesystem_installer() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let stage = dir.path().join("stage");
    let registry = LibraryProfileRegistry::empty();
    let config = BuildConfig {
        destdir: Some(stage.clone()),
        ..install_config(dir.path())
    };
    let mut targets = vec![
        TargetDescriptor::new("bar", TargetKind::SharedLibrary)
            .with_sources(["bar.c"])
            .with_version("1.2.3")
            .with_install_dir("/usr/lib"),
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_install_dir("/usr/bin")
            .with_permissions(0o755),
    ];

    let report = Builder::new(config, &registry)
        .with_toolchain(TouchToolchain)
        .run(&mut targets)
        .unwrap();

    assert!(report.is_success());
    let lib = stage.join("usr/lib");
    assert!(lib.join("libbar.so.1.2.3").is_file());
    assert!(lib.join("libbar.la").is_file());
    assert_eq!(
        fs::read_link(lib.join("libbar.so.1")).unwrap(),
        PathBuf::from("libbar.so.1.2.3")
    );
    let mode = fs::metadata(stage.join("usr/bin/app"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
}
