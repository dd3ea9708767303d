//! Driver errors
//!
//! Per-program outcomes (non-zero exit, timeout, missing cache, bad diff)
//! are values recorded in the result log. A [`DriverError`] stops the run:
//! an invalid command, an unwritable log or a broken configuration.

use crate::config::ConfigError;
use std::path::PathBuf;
use tabench_store::StoreError;

/// Errors that abort a benchmark run
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Input file named in a command does not exist
    #[error("command input not found: {0}")]
    MissingInput(PathBuf),

    /// Timeout is not a positive duration of at most a week
    #[error("invalid timeout: {0} seconds")]
    InvalidTimeout(f64),

    /// Argv prefix is empty
    #[error("empty command for {0}")]
    EmptyCommand(&'static str),

    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Log or cache write failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// IO error outside the store
    #[error("io error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// No calibration sample completed for a mode
    #[error("calibration failed: no completed {0} run on the empty program")]
    Calibration(&'static str),

    /// A worker task panicked or was cancelled
    #[error("worker task failed: {0}")]
    Join(String),
}

impl DriverError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_pass_through() {
        let err: DriverError = StoreError::io_error(
            "experiments/jse_base",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert_eq!(err.to_string(), "io error on experiments/jse_base: denied");
    }
}
