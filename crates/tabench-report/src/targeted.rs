//! Full vs targeted comparison

use crate::aggregate::{aggregate, latest_per_id, Aggregate, DropReason, DropTally, RowExtras};
use crate::stats::Summary;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tabench_artifact::{ExecutionMode, ExecutionResult, ProgramId, Skip, SkipRecord};
use tabench_store::{CorpusScan, Overhead};

/// One program that succeeded in both modes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetedRow {
    /// Program
    pub program_id: ProgramId,
    /// `targeted`, or `cold` when no cache was reusable
    pub mode: ExecutionMode,
    /// Full-run time
    pub full_seconds: f64,
    /// Targeted (or cold) run time
    pub targeted_seconds: f64,
    /// Full-run time minus launcher overhead
    pub adjusted_full_seconds: f64,
    /// Targeted time minus launcher overhead
    pub adjusted_targeted_seconds: f64,
    /// Adjusted full time over adjusted targeted time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,
    /// Size of the cache the targeted run consumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_bytes: Option<u64>,
    /// Line count of the base program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lines: Option<usize>,
    /// Branch count of the base program
    pub branch_count: u64,
}

/// Rows over ids that succeeded in both modes, with per-mode summaries
#[derive(Debug, Clone, PartialEq)]
pub struct TargetedComparison {
    /// Joined rows in ascending id order
    pub rows: Vec<TargetedRow>,
    /// Dropped ids across both modes
    pub dropped: DropTally,
    /// Overhead subtracted, if measured
    pub overhead: Option<Overhead>,
}

impl TargetedComparison {
    /// Summary of raw full-run times
    #[must_use]
    pub fn full(&self) -> Option<Summary> {
        Summary::of(self.rows.iter().map(|r| r.full_seconds))
    }

    /// Summary of raw targeted-run times
    #[must_use]
    pub fn targeted(&self) -> Option<Summary> {
        Summary::of(self.rows.iter().map(|r| r.targeted_seconds))
    }

    /// Summary of overhead-adjusted targeted-run times
    #[must_use]
    pub fn adjusted_targeted(&self) -> Option<Summary> {
        Summary::of(self.rows.iter().map(|r| r.adjusted_targeted_seconds))
    }

    /// Summary of speedups
    #[must_use]
    pub fn speedup(&self) -> Option<Summary> {
        Summary::of(self.rows.iter().filter_map(|r| r.speedup))
    }

    /// Rows answered by a cold run
    #[must_use]
    pub fn cold_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.mode == ExecutionMode::Cold).count()
    }
}

impl fmt::Display for TargetedComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "targeted comparison: {} programs ({} cold)",
            self.rows.len(),
            self.cold_rows()
        )?;
        let lines = [
            ("full", self.full()),
            ("targeted", self.targeted()),
            ("targeted (adjusted)", self.adjusted_targeted()),
            ("speedup", self.speedup()),
        ];
        for (label, summary) in lines {
            match summary {
                Some(s) => writeln!(f, "  {label:<20} {s}")?,
                None => writeln!(f, "  {label:<20} no data")?,
            }
        }
        match &self.overhead {
            Some(o) => writeln!(
                f,
                "  overhead subtracted: full {:.3}s, targeted {:.3}s, cold {:.3}s",
                o.full, o.targeted, o.cold
            )?,
            None => writeln!(f, "  no overhead measurement; times are unadjusted")?,
        }
        write!(f, "  {}", self.dropped)
    }
}

/// Join full and targeted results for ids that succeeded in both
///
/// Only `targeted` and `cold` results are taken from `targeted`. An id with
/// no such result whose diff failed (per `skips`) is dropped as
/// [`DropReason::DiffFailed`] unless its full run already failed.
#[must_use]
pub fn compare_targeted(
    full: &[ExecutionResult],
    targeted: &[ExecutionResult],
    skips: &[SkipRecord],
    programs: &CorpusScan,
    cache_bytes: &BTreeMap<ProgramId, u64>,
    overhead: Option<&Overhead>,
) -> TargetedComparison {
    let extras = RowExtras {
        cache_bytes: cache_bytes.clone(),
        ..RowExtras::default()
    };
    let incremental: Vec<ExecutionResult> = targeted
        .iter()
        .filter(|r| r.mode().is_incremental_request())
        .cloned()
        .collect();
    let full = aggregate(full, programs, &extras);
    let targeted = aggregate(&incremental, programs, &extras);

    let mut dropped = full.dropped.clone();
    dropped.merge(&targeted.dropped);
    let answered = latest_per_id(&incremental);
    for skip in skips {
        if matches!(skip.skip, Skip::DiffFailed(_)) && !answered.contains_key(&skip.program_id) {
            dropped.record(skip.program_id, DropReason::DiffFailed);
        }
    }
    mark_unpaired(&full, &targeted, &mut dropped);
    mark_unpaired(&targeted, &full, &mut dropped);

    let adjust = |mode: ExecutionMode, secs: f64| overhead.map_or(secs, |o| o.adjust(mode, secs));
    let rows = full
        .rows
        .iter()
        .filter_map(|f| targeted.row(f.program_id).map(|t| (f, t)))
        .map(|(f, t)| {
            let adjusted_full_seconds = adjust(ExecutionMode::Full, f.elapsed_seconds);
            let adjusted_targeted_seconds = adjust(t.mode, t.elapsed_seconds);
            TargetedRow {
                program_id: f.program_id,
                mode: t.mode,
                full_seconds: f.elapsed_seconds,
                targeted_seconds: t.elapsed_seconds,
                adjusted_full_seconds,
                adjusted_targeted_seconds,
                speedup: (adjusted_targeted_seconds > 0.0).then(|| adjusted_full_seconds / adjusted_targeted_seconds),
                cache_bytes: f.cache_bytes,
                source_lines: f.source_lines,
                branch_count: f.static_metrics.branch_count,
            }
        })
        .collect();

    TargetedComparison {
        rows,
        dropped,
        overhead: overhead.cloned(),
    }
}

fn mark_unpaired(side: &Aggregate, other: &Aggregate, dropped: &mut DropTally) {
    for row in &side.rows {
        if other.row(row.program_id).is_none() {
            dropped.record(row.program_id, DropReason::MissingInOtherMode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabench_artifact::{ProgramRecord, StaticMetrics};

    fn measured(full: f64, targeted: f64, cold: f64) -> Overhead {
        serde_json::from_value(serde_json::json!({
            "full": full,
            "targeted": targeted,
            "cold": cold,
            "samples": 3,
            "measured_at": "2024-03-01T12:00:00Z",
        }))
        .unwrap()
    }

    fn id(n: u32) -> ProgramId {
        ProgramId::new(n).unwrap()
    }

    fn programs(ids: &[u32]) -> CorpusScan {
        CorpusScan {
            records: ids
                .iter()
                .map(|n| {
                    ProgramRecord::new(id(*n), format!("{n}.jse.js"), StaticMetrics::new(8, 1.0, 1.0, 1.0))
                        .with_source_lines(12)
                })
                .collect(),
            excluded: Vec::new(),
        }
    }

    fn run(n: u32, mode: ExecutionMode, secs: f64) -> ExecutionResult {
        ExecutionResult::completed(id(n), mode, secs, 0)
    }

    #[test]
    fn joins_ids_present_in_both_modes() {
        let full = vec![
            run(1, ExecutionMode::Full, 6.0),
            run(2, ExecutionMode::Full, 4.0),
            ExecutionResult::completed(id(3), ExecutionMode::Full, 1.0, 1),
        ];
        let targeted = vec![
            run(1, ExecutionMode::Targeted, 4.0),
            run(3, ExecutionMode::Cold, 2.0),
        ];
        let mut caches = BTreeMap::new();
        caches.insert(id(1), 512);

        let cmp = compare_targeted(&full, &targeted, &[], &programs(&[1, 2, 3]), &caches, None);
        assert_eq!(cmp.rows.len(), 1);
        assert_eq!(cmp.rows[0].speedup, Some(1.5));
        assert_eq!(cmp.rows[0].cache_bytes, Some(512));
        assert_eq!(cmp.rows[0].source_lines, Some(12));
        assert_eq!(cmp.dropped.reason(id(2)), Some(DropReason::MissingInOtherMode));
        assert_eq!(cmp.dropped.reason(id(3)), Some(DropReason::Failed));
        assert_eq!(cmp.dropped.total(), 2);
    }

    #[test]
    fn overhead_is_subtracted_per_mode() {
        let full = vec![run(1, ExecutionMode::Full, 5.0), run(2, ExecutionMode::Full, 5.0)];
        let targeted = vec![run(1, ExecutionMode::Targeted, 4.1), run(2, ExecutionMode::Cold, 0.5)];
        let overhead = measured(1.0, 3.1, 1.0);

        let cmp = compare_targeted(&full, &targeted, &[], &programs(&[1, 2]), &BTreeMap::new(), Some(&overhead));
        let first = &cmp.rows[0];
        assert!((first.adjusted_targeted_seconds - 1.0).abs() < 1e-9);
        assert!((first.speedup.unwrap() - 4.0).abs() < 1e-9);
        let second = &cmp.rows[1];
        assert_eq!(second.adjusted_targeted_seconds, 0.0);
        assert_eq!(second.speedup, None);
        assert_eq!(cmp.cold_rows(), 1);
        assert!(cmp.to_string().contains("overhead subtracted"));
    }

    #[test]
    fn full_mode_lines_in_targeted_log_are_ignored() {
        let full = vec![run(1, ExecutionMode::Full, 5.0)];
        let targeted = vec![run(1, ExecutionMode::Full, 5.0)];
        let cmp = compare_targeted(&full, &targeted, &[], &programs(&[1]), &BTreeMap::new(), None);
        assert!(cmp.rows.is_empty());
        assert_eq!(cmp.dropped.reason(id(1)), Some(DropReason::MissingInOtherMode));
    }

    fn diff_failed(n: u32) -> SkipRecord {
        SkipRecord {
            program_id: id(n),
            workflow: "experiment2".into(),
            skip: Skip::DiffFailed("unexpected token".into()),
        }
    }

    #[test]
    fn abandoned_targeted_step_reports_the_diff_failure() {
        let full = vec![
            run(1, ExecutionMode::Full, 5.0),
            run(2, ExecutionMode::Full, 5.0),
            ExecutionResult::completed(id(3), ExecutionMode::Full, 1.0, 1),
        ];
        // Id 2 was retried later and answered cold.
        let targeted = vec![run(2, ExecutionMode::Cold, 2.0)];
        let skips = vec![diff_failed(1), diff_failed(2), diff_failed(3)];

        let cmp = compare_targeted(&full, &targeted, &skips, &programs(&[1, 2, 3]), &BTreeMap::new(), None);
        assert_eq!(cmp.rows.len(), 1);
        assert_eq!(cmp.dropped.reason(id(1)), Some(DropReason::DiffFailed));
        assert_eq!(cmp.dropped.reason(id(3)), Some(DropReason::Failed));
        assert!(cmp.to_string().ends_with("dropped 2 ids (failed: 1, diff failed: 1)"));
    }
}
