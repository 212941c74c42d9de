/// Build system error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// Placeholder used in messages when a descriptor has no name yet
const UNNAMED_TARGET: &str = "<unnamed>";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid target '{target}': {reason}")]
    Configuration { target: String, reason: String },

    #[error("Target '{target}': unrecognized library reference '{reference}'")]
    UnrecognizedLibraryReference { target: String, reference: String },

    #[error("Compilation failed for target '{target}': {reason}")]
    Compile { target: String, reason: String },

    #[error("Linking failed for target '{target}': {reason}")]
    Link { target: String, reason: String },

    #[error("Install failed for target '{target}' at {path}: {reason}")]
    Install {
        target: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Target not found: {target}")]
    TargetNotFound { target: String },

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Target '{target}': I/O error at {path}: {error}")]
    TargetIo {
        target: String,
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    /// Create a configuration error for a target
    pub fn configuration(target: &str, reason: impl ToString) -> Self {
        let target = if target.is_empty() {
            UNNAMED_TARGET
        } else {
            target
        };
        Self::Configuration {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an unrecognized library reference error
    pub fn unrecognized_reference(target: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnrecognizedLibraryReference {
            target: target.into(),
            reference: reference.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create an I/O error attributed to a target
    pub fn target_io(target: impl Into<String>, path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::TargetIo {
            target: target.into(),
            path: path.into(),
            error,
        }
    }

    /// Attribute a plain I/O error to `target`; other errors are returned as is
    pub fn with_target(self, target: &str) -> Self {
        match self {
            Self::Io { path, error } => Self::target_io(target, path, error),
            other => other,
        }
    }

    /// Create an install error
    pub fn install(target: impl Into<String>, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Install {
            target: target.into(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Name of the target this error is attributed to, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Configuration { target, .. }
            | Self::UnrecognizedLibraryReference { target, .. }
            | Self::Compile { target, .. }
            | Self::Link { target, .. }
            | Self::Install { target, .. }
            | Self::TargetIo { target, .. }
            | Self::TargetNotFound { target } => Some(target),
            _ => None,
        }
    }
}
