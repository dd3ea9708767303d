//! Corpus programs and their static metrics

use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

/// Identifier of one corpus program (1-based)
///
/// Every derived artifact is keyed by this id; joins compare it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ProgramId(NonZeroU32);

impl ProgramId {
    /// Create id, rejecting zero
    ///
    /// # Errors
    /// Returns [`ArtifactError::InvalidProgramId`] for `0`
    pub fn new(raw: u32) -> Result<Self, ArtifactError> {
        NonZeroU32::new(raw)
            .map(Self)
            .ok_or(ArtifactError::InvalidProgramId(raw))
    }

    /// Raw numeric value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for ProgramId {
    type Error = ArtifactError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ProgramId> for u32 {
    fn from(id: ProgramId) -> Self {
        id.get()
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural properties of a generated program
///
/// Field names on the wire are the generator's flat keys. The four averaged
/// metrics are required; the remaining generator knobs are carried when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMetrics {
    /// Total number of branches (two per conditional)
    #[serde(rename = "NUM_BRANCHES")]
    pub branch_count: u64,
    /// Mean nesting depth of conditionals
    #[serde(rename = "AVE_AST_DEPTH")]
    pub average_ast_depth: f64,
    /// Mean number of statements per branch
    #[serde(rename = "AVE_BRANCH_LENGTH")]
    pub average_branch_length: f64,
    /// Mean number of conditionals per branch
    #[serde(rename = "AVE_CONDITIONALS_PER_BRANCH")]
    pub average_conditionals_per_branch: f64,
    /// Number of symbolic inputs
    #[serde(rename = "NUM_SYMBOLIC_VARS", default, skip_serializing_if = "Option::is_none")]
    pub symbolic_vars: Option<u64>,
    /// Number of conditionals
    #[serde(rename = "NUM_CONDITIONALS", default, skip_serializing_if = "Option::is_none")]
    pub conditional_count: Option<u64>,
    /// Generator ceiling on branch length
    #[serde(rename = "MAX_BRANCH_LENGTH", default, skip_serializing_if = "Option::is_none")]
    pub max_branch_length: Option<u64>,
    /// Generator ceiling on conditionals per branch
    #[serde(rename = "MAX_CONDITIONALS_PER_BRANCH", default, skip_serializing_if = "Option::is_none")]
    pub max_conditionals_per_branch: Option<u64>,
    /// Generator ceiling on nesting depth
    #[serde(rename = "MAX_AST_DEPTH", default, skip_serializing_if = "Option::is_none")]
    pub max_ast_depth: Option<u64>,
}

impl StaticMetrics {
    /// Create metrics with only the required fields set
    #[must_use]
    pub fn new(
        branch_count: u64,
        average_ast_depth: f64,
        average_branch_length: f64,
        average_conditionals_per_branch: f64,
    ) -> Self {
        Self {
            branch_count,
            average_ast_depth,
            average_branch_length,
            average_conditionals_per_branch,
            symbolic_vars: None,
            conditional_count: None,
            max_branch_length: None,
            max_conditionals_per_branch: None,
            max_ast_depth: None,
        }
    }

    /// Parse the first non-empty line of a stats file
    ///
    /// # Errors
    /// Returns error if the text holds no JSON object, the object lacks a
    /// required key, or a metric is negative or not finite
    pub fn from_stats_text(text: &str) -> Result<Self, ArtifactError> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| ArtifactError::InvalidMetrics("empty stats file".to_string()))?;
        let metrics: Self = serde_json::from_str(line)?;
        metrics.validate()?;
        Ok(metrics)
    }

    /// Check that every averaged metric is a finite, non-negative number
    ///
    /// # Errors
    /// Returns [`ArtifactError::InvalidMetrics`] naming the offending key
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let averages = [
            ("AVE_AST_DEPTH", self.average_ast_depth),
            ("AVE_BRANCH_LENGTH", self.average_branch_length),
            ("AVE_CONDITIONALS_PER_BRANCH", self.average_conditionals_per_branch),
        ];
        for (key, value) in averages {
            if !value.is_finite() || value < 0.0 {
                return Err(ArtifactError::InvalidMetrics(format!("{key} = {value}")));
            }
        }
        Ok(())
    }

    /// Branches reached normalized by total branch count
    ///
    /// Zero when the program has no branches.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn normalized_coverage(&self, branches_reached: u64) -> f64 {
        if self.branch_count == 0 {
            0.0
        } else {
            branches_reached as f64 / self.branch_count as f64
        }
    }
}

/// One program of the corpus, as loaded for a benchmark run
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    id: ProgramId,
    source_path: PathBuf,
    diff_source_path: Option<PathBuf>,
    fuzz_source_path: Option<PathBuf>,
    source_lines: Option<usize>,
    static_metrics: StaticMetrics,
}

impl ProgramRecord {
    /// Create record for a base program
    #[must_use]
    pub fn new(id: ProgramId, source_path: impl Into<PathBuf>, static_metrics: StaticMetrics) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            diff_source_path: None,
            fuzz_source_path: None,
            source_lines: None,
            static_metrics,
        }
    }

    /// Attach the modified variant used by targeted analysis
    #[must_use]
    pub fn with_diff_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.diff_source_path = Some(path.into());
        self
    }

    /// Attach the fuzz harness variant
    #[must_use]
    pub fn with_fuzz_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.fuzz_source_path = Some(path.into());
        self
    }

    /// Attach the line count of the base program
    #[must_use]
    pub fn with_source_lines(mut self, lines: usize) -> Self {
        self.source_lines = Some(lines);
        self
    }

    /// Program id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Base program path
    #[inline]
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Modified variant path, if the corpus has one
    #[inline]
    #[must_use]
    pub fn diff_source_path(&self) -> Option<&Path> {
        self.diff_source_path.as_deref()
    }

    /// Fuzz harness path, if the corpus has one
    #[inline]
    #[must_use]
    pub fn fuzz_source_path(&self) -> Option<&Path> {
        self.fuzz_source_path.as_deref()
    }

    /// Line count of the base program
    #[inline]
    #[must_use]
    pub fn source_lines(&self) -> Option<usize> {
        self.source_lines
    }

    /// Static metrics
    #[inline]
    #[must_use]
    pub fn static_metrics(&self) -> &StaticMetrics {
        &self.static_metrics
    }
}
