//! Kiln target manifests (kiln.targets)
//!
//! Declarative target lists read from `kiln.targets` files and adapted into
//! build descriptors: conditional sources, path rebasing against the build
//! directory, and recursive `subdirs`.

pub mod adapter;
pub mod manifest;

pub use adapter::ManifestAdapter;
pub use manifest::{SourceEntry, TargetEntry, TargetManifest};

use std::path::PathBuf;

/// Name of a target manifest file
pub const MANIFEST_FILE_NAME: &str = "kiln.targets";

/// Manifest errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Failed to parse {file}: {error}")]
    ParseError {
        file: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Target '{target}': unknown kind '{kind}'")]
    UnknownKind { target: String, kind: String },

    #[error("Target '{target}': invalid {field} - {reason}")]
    InvalidField {
        target: String,
        field: String,
        reason: String,
    },

    #[error("Subdirectory visited twice: {0}")]
    RecursiveSubdir(PathBuf),
}

pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
