//! Error types for the store
//!
//! Absence of a cache, log line or stats record is not an error here; those
//! surface as `None` or as counted exclusions. These variants cover what
//! stops a run: unreadable or unwritable paths and undecodable metadata.

use std::path::PathBuf;
use tabench_artifact::ArtifactError;

/// Errors raised by the cache store, logs and corpus loader
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on a store path
    #[error("io error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Sidecar or log line could not be encoded
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Cache metadata exists but does not describe the blob next to it
    #[error("corrupt cache metadata at {path}: {message}")]
    CorruptMeta {
        /// Metadata file
        path: PathBuf,
        /// What was wrong
        message: String,
    },

    /// Record failed validation
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
