//! Result Aggregator
//!
//! Filters failed runs out of a result log, inner-joins the survivors with
//! the corpus records on program id, and derives the per-program row. Each
//! id that does not make it into a row is recorded with the reason.

use crate::stats::Summary;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tabench_artifact::{ExecutionMode, ExecutionResult, ProgramId, ProgramRecord, RunStatus, StaticMetrics};
use tabench_store::{CorpusScan, RecordIssue};
use tracing::debug;

/// Why an id is absent from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The run exited non-zero or could not be launched
    Failed,
    /// The run was killed at its ceiling
    TimedOut,
    /// The targeted step was abandoned because no diff could be computed
    DiffFailed,
    /// No program record (source or stats file missing)
    MissingRecord,
    /// Stats file present but unusable
    MalformedStats,
    /// Source or stats file present but not readable as text
    UnreadableRecord,
    /// Succeeded in one compared mode only
    MissingInOtherMode,
}

impl DropReason {
    /// Human-readable name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::DiffFailed => "diff failed",
            Self::MissingRecord => "missing record",
            Self::MalformedStats => "malformed stats",
            Self::UnreadableRecord => "unreadable record",
            Self::MissingInOtherMode => "missing in other mode",
        }
    }
}

/// Every dropped id with its first drop reason, plus unreadable log lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropTally {
    dropped: BTreeMap<ProgramId, DropReason>,
    malformed_lines: usize,
}

impl DropTally {
    /// Record `id` as dropped; an id keeps the first reason it was given
    pub fn record(&mut self, id: ProgramId, reason: DropReason) {
        self.dropped.entry(id).or_insert(reason);
    }

    /// Count log lines that did not parse
    pub fn add_malformed_lines(&mut self, n: usize) {
        self.malformed_lines += n;
    }

    /// Fold `other` into this tally
    pub fn merge(&mut self, other: &Self) {
        for (&id, &reason) in &other.dropped {
            self.record(id, reason);
        }
        self.malformed_lines += other.malformed_lines;
    }

    /// Whether `id` was dropped
    #[must_use]
    pub fn contains(&self, id: ProgramId) -> bool {
        self.dropped.contains_key(&id)
    }

    /// Reason `id` was dropped
    #[must_use]
    pub fn reason(&self, id: ProgramId) -> Option<DropReason> {
        self.dropped.get(&id).copied()
    }

    /// Ids dropped for `reason`
    #[must_use]
    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.values().filter(|r| **r == reason).count()
    }

    /// Ids dropped for any reason
    #[must_use]
    pub fn total(&self) -> usize {
        self.dropped.len()
    }

    /// Log lines that did not parse
    #[must_use]
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    fn by_reason(&self) -> BTreeMap<DropReason, usize> {
        let mut counts = BTreeMap::new();
        for reason in self.dropped.values() {
            *counts.entry(*reason).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for DropTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dropped {} ids", self.total())?;
        let counts = self.by_reason();
        if !counts.is_empty() {
            let parts: Vec<String> = counts.iter().map(|(r, n)| format!("{}: {n}", r.as_str())).collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        if self.malformed_lines > 0 {
            write!(f, "; {} malformed log lines skipped", self.malformed_lines)?;
        }
        Ok(())
    }
}

/// One surviving program in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRow {
    /// Program
    pub program_id: ProgramId,
    /// Mode of the run the row was built from
    pub mode: ExecutionMode,
    /// Measured wall-clock time
    pub elapsed_seconds: f64,
    /// Line count of the base program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lines: Option<usize>,
    /// Structural metrics from the stats file
    pub static_metrics: StaticMetrics,
    /// Size of the stored cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_bytes: Option<u64>,
    /// Branches a fuzz run reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches_reached: Option<u64>,
    /// `branches_reached / branch_count`, zero for branch-free programs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

/// Per-id values attached to rows when present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowExtras {
    /// Cache sizes by program
    pub cache_bytes: BTreeMap<ProgramId, u64>,
    /// Fuzz coverage by program
    pub branches_reached: BTreeMap<ProgramId, u64>,
}

/// Rows in ascending id order, plus what was dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Surviving rows
    pub rows: Vec<AnalysisRow>,
    /// Dropped ids
    pub dropped: DropTally,
}

impl Aggregate {
    /// Row for `id`
    #[must_use]
    pub fn row(&self, id: ProgramId) -> Option<&AnalysisRow> {
        self.rows
            .binary_search_by_key(&id, |row| row.program_id)
            .ok()
            .map(|i| &self.rows[i])
    }
}

impl fmt::Display for Aggregate {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "timing: {} programs", self.rows.len())?;
        let columns = [
            ("elapsed seconds", Summary::of(self.rows.iter().map(|r| r.elapsed_seconds))),
            (
                "cache bytes",
                Summary::of(self.rows.iter().filter_map(|r| r.cache_bytes).map(|b| b as f64)),
            ),
            (
                "source lines",
                Summary::of(self.rows.iter().filter_map(|r| r.source_lines).map(|l| l as f64)),
            ),
        ];
        for (label, summary) in columns {
            if let Some(s) = summary {
                writeln!(f, "  {label:<16} {s}")?;
            }
        }
        write!(f, "  {}", self.dropped)
    }
}

/// Last result per id in log order
///
/// Logs are appended across runs, so a re-run supersedes earlier lines for
/// the same program.
#[must_use]
pub fn latest_per_id(results: &[ExecutionResult]) -> BTreeMap<ProgramId, &ExecutionResult> {
    results.iter().map(|r| (r.program_id(), r)).collect()
}

/// Filter, join and derive one row per surviving id
#[must_use]
pub fn aggregate(results: &[ExecutionResult], programs: &CorpusScan, extras: &RowExtras) -> Aggregate {
    let records: BTreeMap<ProgramId, &ProgramRecord> = programs.records.iter().map(|r| (r.id(), r)).collect();
    let issues: BTreeMap<ProgramId, &RecordIssue> = programs.excluded.iter().map(|(id, issue)| (*id, issue)).collect();

    let mut out = Aggregate::default();
    for (id, result) in latest_per_id(results) {
        if result.exit_code() != 0 || result.status() != RunStatus::Ok {
            let reason = if result.status() == RunStatus::Timeout {
                DropReason::TimedOut
            } else {
                DropReason::Failed
            };
            out.dropped.record(id, reason);
            continue;
        }
        let Some(record) = records.get(&id) else {
            let reason = match issues.get(&id) {
                Some(RecordIssue::Malformed(_)) => DropReason::MalformedStats,
                Some(RecordIssue::Unreadable(..)) => DropReason::UnreadableRecord,
                Some(RecordIssue::Missing(_)) | None => DropReason::MissingRecord,
            };
            debug!(program_id = %id, reason = reason.as_str(), "id dropped from report");
            out.dropped.record(id, reason);
            continue;
        };

        let metrics = record.static_metrics();
        let branches_reached = extras.branches_reached.get(&id).copied();
        out.rows.push(AnalysisRow {
            program_id: id,
            mode: result.mode(),
            elapsed_seconds: result.elapsed_seconds(),
            source_lines: record.source_lines(),
            static_metrics: metrics.clone(),
            cache_bytes: extras.cache_bytes.get(&id).copied(),
            branches_reached,
            coverage: branches_reached.map(|b| metrics.normalized_coverage(b)),
        });
    }
    out
}
