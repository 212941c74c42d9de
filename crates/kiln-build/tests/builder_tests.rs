//! Builder integration tests
//!
//! Drives complete runs against a recording toolchain that writes fake
//! artifacts into a scratch build directory.

use kiln_build::toolchain::object_path;
use kiln_build::{
    BuildConfig, BuildError, Builder, CompileRequest, LibraryProfileRegistry, LinkMetadata,
    LinkRequest, OutputKind, ResolvedBuildConfig, TargetDescriptor, TargetKind, Toolchain,
    ToolchainError,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Toolchain that records every request and writes the link output
#[derive(Default)]
struct RecordingToolchain {
    compiles: Vec<CompileRequest>,
    links: Vec<LinkRequest>,
    fail_compile: Option<String>,
}

impl RecordingToolchain {
    fn failing_on(target: &str) -> Self {
        Self {
            fail_compile: Some(target.to_string()),
            ..Self::default()
        }
    }

    fn linked_targets(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.target.as_str()).collect()
    }
}

impl Toolchain for RecordingToolchain {
    fn compile(&mut self, request: &CompileRequest) -> Result<Vec<PathBuf>, ToolchainError> {
        self.compiles.push(request.clone());
        if self.fail_compile.as_deref() == Some(request.target.as_str()) {
            return Err(ToolchainError("main.c:1: syntax error".to_string()));
        }
        Ok(request
            .sources
            .iter()
            .map(|s| object_path(&request.object_dir, s))
            .collect())
    }

    fn link(&mut self, request: &LinkRequest) -> Result<PathBuf, ToolchainError> {
        self.links.push(request.clone());
        if let Some(parent) = request.output.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&request.output, request.target.as_bytes()).unwrap();
        Ok(request.output.clone())
    }
}

fn config_in(dir: &TempDir) -> BuildConfig {
    BuildConfig {
        build_dir: dir.path().to_path_buf(),
        ..BuildConfig::default()
    }
}

fn reference(dir: &Path, file: &str) -> String {
    format!("{}/{}", dir.display(), file)
}

#[cfg(unix)]
#[test]
fn test_versioned_shared_library_emission() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![TargetDescriptor::new("bar", TargetKind::SharedLibrary)
        .with_sources(["bar.c"])
        .with_version("1.2.3")];

    let report = Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap();
    assert_eq!(report.stats.built, 1);

    let out = dir.path();
    assert!(out.join("libbar.so.1.2.3").is_file());
    assert_eq!(
        fs::read_link(out.join("libbar.so")).unwrap(),
        PathBuf::from("libbar.so.1.2.3")
    );
    assert_eq!(
        fs::read_link(out.join("libbar.so.1")).unwrap(),
        PathBuf::from("libbar.so.1.2.3")
    );

    let metadata =
        LinkMetadata::parse(&fs::read_to_string(out.join("libbar.la")).unwrap()).unwrap();
    assert_eq!(metadata.physical, "libbar.so.1.2.3");
    assert_eq!(metadata.aliases, vec!["libbar.so", "libbar.so.1"]);

    let link = &toolchain.links[0];
    assert_eq!(link.kind, OutputKind::SharedLibrary);
    assert_eq!(link.soname.as_deref(), Some("libbar.so.1"));
    assert!(toolchain.compiles[0].position_independent);
}

#[cfg(unix)]
#[test]
fn test_rebuild_replaces_stale_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    std::os::unix::fs::symlink("libbar.so.0.9.0", dir.path().join("libbar.so")).unwrap();

    let mut targets = vec![TargetDescriptor::new("bar", TargetKind::SharedLibrary)
        .with_sources(["bar.c"])
        .with_version("1.2.3")];
    Builder::new(config_in(&dir), &registry)
        .with_toolchain(RecordingToolchain::default())
        .run(&mut targets)
        .unwrap();

    assert_eq!(
        fs::read_link(dir.path().join("libbar.so")).unwrap(),
        PathBuf::from("libbar.so.1.2.3")
    );
}

#[test]
fn test_unversioned_shared_library_has_no_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets =
        vec![TargetDescriptor::new("bar", TargetKind::SharedLibrary).with_sources(["bar.c"])];

    Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap();

    let artifact = targets[0].outcome().unwrap().artifact.clone().unwrap();
    assert_eq!(artifact.path, dir.path().join("libbar.so"));
    assert!(artifact.aliases.is_empty());
    assert!(artifact.metadata.is_none());
    assert!(!dir.path().join("libbar.la").exists());
    assert_eq!(toolchain.links[0].soname.as_deref(), Some("libbar.so"));
}

#[test]
fn test_second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![TargetDescriptor::new("app", TargetKind::Program)
        .with_sources(["main.c"])
        .with_libraries(["m"])];

    let mut builder = Builder::new(config_in(&dir), &registry).with_toolchain(&mut toolchain);
    let first = builder.run(&mut targets).unwrap();
    let config_after_first = targets[0].outcome().unwrap().config.clone();
    let second = builder.run(&mut targets).unwrap();
    let again = builder.execute(&mut targets[0]).unwrap();
    drop(builder);

    assert_eq!(first.executed, vec!["app"]);
    assert!(second.executed.is_empty());
    assert_eq!(second.stats.skipped, 1);
    assert_eq!(again.config, config_after_first);
    assert_eq!(toolchain.linked_targets(), vec!["app"]);
}

#[test]
fn test_local_shared_library_links_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_libraries([reference(dir.path(), "libfoo.so"), "m".to_string()]),
        TargetDescriptor::new("foo", TargetKind::SharedLibrary)
            .with_sources(["foo.c"])
            .with_version("2.0.1"),
    ];

    Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run_ordered(&mut targets)
        .unwrap();

    assert_eq!(toolchain.linked_targets(), vec!["foo", "app"]);
    let app_link = &toolchain.links[1];
    assert_eq!(app_link.libraries, vec!["foo", "m"]);
    assert!(app_link.lib_paths.contains(&format!("{}/", dir.path().display())));
}

#[test]
fn test_metadata_reference_depends_on_physical_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut targets = vec![
        TargetDescriptor::new("foo", TargetKind::SharedLibrary)
            .with_sources(["foo.c"])
            .with_version("1.2.3"),
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_libraries([reference(dir.path(), "libfoo.la")]),
    ];

    Builder::new(config_in(&dir), &registry)
        .with_toolchain(RecordingToolchain::default())
        .run(&mut targets)
        .unwrap();

    let app = &targets[1].outcome().unwrap().config;
    assert_eq!(
        app.local_dependencies,
        vec![dir.path().join("libfoo.so.1.2.3")]
    );
    assert_eq!(app.library_names(), vec!["foo"]);
}

#[test]
fn test_static_library_linked_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![
        TargetDescriptor::new("util", TargetKind::ConvenienceLibrary)
            .in_directory("util")
            .with_sources(["util.c"]),
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_libraries([reference(dir.path(), "util/libutil.a")]),
    ];

    Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap();

    assert_eq!(toolchain.links[0].kind, OutputKind::StaticArchive);
    assert_eq!(toolchain.links[0].output, dir.path().join("util/libutil.a"));
    assert!(toolchain.compiles[0].compile_flags.contains(&"-DPIC".to_string()));
    assert_eq!(
        toolchain.links[1].static_archives,
        vec![PathBuf::from(reference(dir.path(), "util/libutil.a"))]
    );
    assert!(toolchain.links[1].libraries.is_empty());
}

#[test]
fn test_compile_failure_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::failing_on("core");
    let mut targets = vec![
        TargetDescriptor::new("core", TargetKind::SharedLibrary).with_sources(["core.c"]),
        TargetDescriptor::new("app", TargetKind::Program).with_sources(["main.c"]),
    ];

    let err = Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap_err();

    match err {
        BuildError::Compile { target, reason } => {
            assert_eq!(target, "core");
            assert!(reason.contains("syntax error"));
        }
        other => panic!("expected compile error, got {:?}", other),
    }
    assert!(!targets[0].is_executed());
    assert!(!targets[1].is_executed());
    assert!(toolchain.links.is_empty());
}

#[test]
fn test_unrecognized_reference_names_the_string() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut targets = vec![TargetDescriptor::new("app", TargetKind::Program)
        .with_sources(["main.c"])
        .with_libraries(["weird/../path.xyz"])];

    let err = Builder::new(config_in(&dir), &registry)
        .with_toolchain(RecordingToolchain::default())
        .run(&mut targets)
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::UnrecognizedLibraryReference { ref reference, .. } if reference == "weird/../path.xyz"
    ));
}

#[test]
fn test_missing_sources_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![
        TargetDescriptor::new("empty", TargetKind::Program),
        TargetDescriptor::new("app", TargetKind::Program).with_sources(["main.c"]),
    ];

    let err = Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap_err();

    assert_eq!(err.target(), Some("empty"));
    assert!(toolchain.compiles.is_empty());
}

#[test]
fn test_dump_mode_resolves_without_building() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump/config.json");
    let registry = LibraryProfileRegistry::empty();
    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![
        TargetDescriptor::new("foo", TargetKind::SharedLibrary)
            .with_sources(["foo.c"])
            .with_version("1.0.0"),
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_compile_flags(["-O2"]),
    ];

    let report = Builder::new(config_in(&dir).with_dump_path(&dump), &registry)
        .with_toolchain(&mut toolchain)
        .run(&mut targets)
        .unwrap();

    assert!(toolchain.compiles.is_empty());
    assert_eq!(report.dump_file.as_deref(), Some(dump.as_path()));
    assert!(targets.iter().all(|t| t.is_executed()));
    assert!(targets[0].outcome().unwrap().artifact.is_none());

    let dumped: Vec<ResolvedBuildConfig> =
        serde_json::from_str(&fs::read_to_string(&dump).unwrap()).unwrap();
    assert_eq!(dumped.len(), 2);
    assert_eq!(dumped[1].target, "app");
    assert!(dumped[1].compile_flags.contains(&"-O2".to_string()));
}

#[test]
fn test_stale_metadata_does_not_reorder_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    let stale = LinkMetadata {
        physical: "libfoo.so.1.0.0".to_string(),
        aliases: vec!["libfoo.so".to_string(), "libfoo.so.1".to_string()],
        soname: "libfoo.so.1".to_string(),
        install_dir: None,
    };
    fs::write(dir.path().join("libfoo.la"), stale.render()).unwrap();

    let mut toolchain = RecordingToolchain::default();
    let mut targets = vec![
        TargetDescriptor::new("app", TargetKind::Program)
            .with_sources(["main.c"])
            .with_libraries([reference(dir.path(), "libfoo.la")]),
        TargetDescriptor::new("foo", TargetKind::SharedLibrary)
            .with_sources(["foo.c"])
            .with_version("1.2.3"),
    ];

    Builder::new(config_in(&dir), &registry)
        .with_toolchain(&mut toolchain)
        .run_ordered(&mut targets)
        .unwrap();

    assert_eq!(toolchain.linked_targets(), vec!["foo", "app"]);
}

#[cfg(unix)]
#[test]
fn test_alias_failure_names_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let registry = LibraryProfileRegistry::empty();
    fs::create_dir(dir.path().join("libbar.so")).unwrap();

    let mut targets = vec![TargetDescriptor::new("bar", TargetKind::SharedLibrary)
        .with_sources(["bar.c"])
        .with_version("1.2.3")];

    let err = Builder::new(config_in(&dir), &registry)
        .with_toolchain(RecordingToolchain::default())
        .run(&mut targets)
        .unwrap_err();

    assert!(matches!(err, BuildError::TargetIo { ref path, .. } if path == &dir.path().join("libbar.so")));
    assert_eq!(err.target(), Some("bar"));
    assert!(!targets[0].is_executed());
}
