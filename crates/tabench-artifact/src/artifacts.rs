//! Persisted artifacts derived from a program: cache, diff, coverage and
//! skipped steps

use crate::error::ArtifactError;
use crate::hash::ContentHash;
use crate::program::ProgramId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Exploration state persisted by a full run
///
/// The blob at `path` is opaque to the harness; only its size and digest
/// are recorded, at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheArtifact {
    /// Program the cache belongs to
    pub program_id: ProgramId,
    /// Size of the blob in bytes
    pub byte_size: u64,
    /// Location of the blob
    pub path: PathBuf,
    /// Digest of the blob
    pub digest: ContentHash,
    /// Digest of the base program the cache was explored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_digest: Option<ContentHash>,
}

impl CacheArtifact {
    /// Whether this cache was built from the program with `digest`
    ///
    /// A cache without a recorded base digest is accepted as-is.
    #[must_use]
    pub fn matches_base(&self, digest: &ContentHash) -> bool {
        self.base_digest.map_or(true, |base| base == *digest)
    }
}

/// Structural diff persisted for one targeted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffArtifact {
    /// Program the diff belongs to
    pub program_id: ProgramId,
    /// Base program
    pub base_path: PathBuf,
    /// Modified variant
    pub modified_path: PathBuf,
    /// Where the diff was written
    pub result_path: PathBuf,
    /// Digest of the written diff
    pub digest: ContentHash,
    /// Number of change entries
    pub change_count: usize,
}

impl DiffArtifact {
    /// Diff file location
    #[inline]
    #[must_use]
    pub fn result_path(&self) -> &Path {
        &self.result_path
    }
}

/// Branch coverage reached by one fuzz run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSample {
    /// Program fuzzed
    pub program_id: ProgramId,
    /// Budget the fuzzer was given
    pub time_budget_seconds: f64,
    /// Distinct branches exercised
    pub branches_reached: u64,
}

impl CoverageSample {
    /// Create sample
    ///
    /// # Errors
    /// Returns error if the budget is not a positive finite number
    pub fn new(program_id: ProgramId, time_budget_seconds: f64, branches_reached: u64) -> Result<Self, ArtifactError> {
        if !time_budget_seconds.is_finite() || time_budget_seconds <= 0.0 {
            return Err(ArtifactError::InvalidRecord(format!(
                "program {program_id}: fuzz budget {time_budget_seconds} must be positive"
            )));
        }
        Ok(Self {
            program_id,
            time_budget_seconds,
            branches_reached,
        })
    }

    /// Budget key with millisecond resolution, used to group samples
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn budget_millis(&self) -> u64 {
        (self.time_budget_seconds * 1000.0).round() as u64
    }
}

/// Why a program was passed over without running an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Skip {
    /// A corpus file the step needs does not exist
    MissingSource(PathBuf),
    /// The diff could not be computed; the targeted step was abandoned
    DiffFailed(String),
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSource(path) => write!(f, "missing {}", path.display()),
            Self::DiffFailed(message) => write!(f, "diff failed: {message}"),
        }
    }
}

/// One line of the skip log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    /// Program passed over
    pub program_id: ProgramId,
    /// Workflow that skipped it
    pub workflow: String,
    /// What went wrong
    pub skip: Skip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_base_matching() {
        let base = ContentHash::compute(b"base");
        let mut cache = CacheArtifact {
            program_id: ProgramId::new(1).unwrap(),
            byte_size: 3,
            path: PathBuf::from("results/JSE1/cache"),
            digest: ContentHash::compute(b"abc"),
            base_digest: None,
        };
        assert!(cache.matches_base(&base));
        cache.base_digest = Some(ContentHash::compute(b"other"));
        assert!(!cache.matches_base(&base));
        cache.base_digest = Some(base);
        assert!(cache.matches_base(&base));
    }

    #[test]
    fn coverage_budget_validation() {
        let id = ProgramId::new(7).unwrap();
        assert!(CoverageSample::new(id, 0.0, 3).is_err());
        assert!(CoverageSample::new(id, f64::NAN, 3).is_err());
        assert_eq!(CoverageSample::new(id, 0.1, 3).unwrap().budget_millis(), 100);
    }

    #[test]
    fn skip_lines_name_reason_and_detail() {
        let record = SkipRecord {
            program_id: ProgramId::new(2).unwrap(),
            workflow: "experiment2".into(),
            skip: Skip::DiffFailed("syntax error at 1:8".into()),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert_eq!(
            line,
            r#"{"program_id":2,"workflow":"experiment2","skip":{"reason":"diff_failed","detail":"syntax error at 1:8"}}"#
        );
        assert_eq!(serde_json::from_str::<SkipRecord>(&line).unwrap(), record);
        assert_eq!(record.skip.to_string(), "diff failed: syntax error at 1:8");
    }
}
