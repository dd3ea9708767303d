//! Errors for record validation

/// Errors raised while building or parsing typed records
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Program ids start at one
    #[error("invalid program id: {0}")]
    InvalidProgramId(u32),

    /// Stats record missing a key or holding a non-finite value
    #[error("invalid static metrics: {0}")]
    InvalidMetrics(String),

    /// Result or coverage record outside its valid range
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// JSON decoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
