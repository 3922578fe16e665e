//! Error types for the januskey library

use std::path::PathBuf;
use thiserror::Error;

use crate::hash::ContentHash;

/// Errors surfaced at the engine boundary
#[derive(Error, Debug)]
pub enum JanusError {
    #[error("Directory not managed: {0}. Run 'jk init' first.")]
    NotInitialized(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Operation {id} is missing required field '{field}' for its kind")]
    InsufficientMetadata { id: u64, field: &'static str },

    #[error("Content {0} is unavailable (never stored, or obliterated)")]
    ContentUnavailable(ContentHash),

    #[error("Managed state is invalid: {0}")]
    InvalidState(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceExhausted(String),

    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl JanusError {
    /// Wrap an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable exit-code category for the CLI.
    ///
    /// 0 is success; each error kind maps to its own non-zero code so
    /// external tooling can distinguish failure categories.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 2,
            Self::AlreadyExists(_) => 3,
            Self::InsufficientMetadata { .. } => 4,
            Self::ContentUnavailable(_) => 5,
            Self::InvalidState(_) => 6,
            Self::ResourceExhausted(_) => 7,
            Self::Io { .. } => 8,
            Self::Conflict(_) => 9,
            Self::NotInitialized(_) => 10,
        }
    }
}

/// Result type alias for januskey operations
pub type Result<T> = std::result::Result<T, JanusError>;
