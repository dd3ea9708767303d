//! Diff extraction errors

use std::path::PathBuf;

/// Errors raised while computing or persisting a diff
///
/// Any of these aborts the targeted path for one program only.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Base or modified file does not exist
    #[error("missing input file: {path}")]
    MissingInput {
        /// Path that was looked up
        path: PathBuf,
    },

    /// IO error while reading inputs or writing the result
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Input is not valid JavaScript
    #[error("unparsable program {path} at {line}:{column}")]
    Unparsable {
        /// File that failed to parse
        path: PathBuf,
        /// 1-based line of the first error
        line: usize,
        /// 1-based column of the first error
        column: usize,
    },

    /// Parser could not be set up
    #[error("parser error: {0}")]
    Parser(String),

    /// Document could not be encoded or decoded
    #[error("diff encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Document is structurally invalid
    #[error("malformed diff document: {0}")]
    Malformed(String),
}

impl DiffError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DiffError::Unparsable {
            path: PathBuf::from("randjs/4.jse.diff.js"),
            line: 12,
            column: 3,
        };
        assert_eq!(err.to_string(), "unparsable program randjs/4.jse.diff.js at 12:3");
    }
}
