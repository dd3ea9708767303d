//! Report errors
//!
//! Dropped ids are not errors; they are counted in a [`crate::DropTally`].
//! A report fails only when its inputs cannot be read or its output cannot
//! be written.

use tabench_store::StoreError;

/// Errors raised while building or writing a report
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A result log, coverage log or cache could not be read, or the output
    /// could not be written
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rows could not be encoded
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The comparison needs at least one budget
    #[error("coverage report needs at least one fuzz budget")]
    NoBudgets,
}

/// Result type alias for report operations
pub type ReportResult<T> = Result<T, ReportError>;
