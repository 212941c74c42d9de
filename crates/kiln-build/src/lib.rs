//! Kiln build core
//!
//! Resolves declarative build targets into concrete compile/link
//! configurations and emits the resulting artifacts:
//! - Library profiles registered before resolution and read-only afterwards
//! - Target descriptors for programs, libraries and loadable modules
//! - Local vs. global library reference classification
//! - Versioned shared libraries with symlink aliases and link metadata
//! - Install steps and an optional dependency-ordered run

pub mod build_order;
pub mod builder;
pub mod emitter;
pub mod error;
pub mod install;
pub mod profile;
pub mod resolver;
pub mod targets;
pub mod toolchain;

// Re-export main types
pub use build_order::{TargetGraph, TargetNode};
pub use builder::{BuildConfig, BuildReport, BuildStats, Builder};
pub use emitter::{
    ArtifactEmitter, ArtifactNaming, ArtifactPlan, EmittedArtifact, LinkMetadata,
    SharedLibraryNames,
};
pub use error::{BuildError, BuildResult};
pub use install::{install_artifact, FsInstaller, InstallError, Installer};
pub use profile::{LibraryProfile, LibraryProfileRegistry, ProfileRegistryBuilder};
pub use resolver::{
    classify_reference, stable_dedup, LibraryReference, LocalLibrary, ResolvedBuildConfig,
    TargetResolver,
};
pub use targets::{discover_sources, TargetDescriptor, TargetKind, TargetOutcome, VersionNumber};
pub use toolchain::{
    CommandToolchain, CompileRequest, LinkRequest, OutputKind, Toolchain, ToolchainError,
};
