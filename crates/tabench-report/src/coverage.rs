//! Symbolic engine vs fuzzer coverage comparison
//!
//! The symbolic engine is taken to reach every branch, so its rate is
//! `branch_count / elapsed`. The fuzzer's rate at a budget is
//! `branches_reached / budget`.

use crate::aggregate::{aggregate, DropReason, DropTally, RowExtras};
use crate::error::{ReportError, ReportResult};
use crate::stats::{per_second, Summary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tabench_artifact::{CoverageSample, ExecutionResult, ProgramId};
use tabench_store::CorpusScan;

/// Fuzz result of one program at one budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetPoint {
    /// Budget in seconds
    pub budget_seconds: f64,
    /// Branches reached
    pub branches_reached: u64,
    /// Normalized coverage
    pub coverage: f64,
    /// `branches_reached / budget_seconds`
    pub branches_per_second: f64,
}

/// One program with a JSE result and a sample at every budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    /// Program
    pub program_id: ProgramId,
    /// Branch count from the stats file
    pub branch_count: u64,
    /// JSE full-run time
    pub jse_seconds: f64,
    /// `branch_count / jse_seconds`
    pub jse_branches_per_second: f64,
    /// Line count of the base program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lines: Option<usize>,
    /// One point per budget, in budget order
    pub budgets: Vec<BudgetPoint>,
}

/// Means over all rows at one budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetSummary {
    /// Budget in seconds
    pub budget_seconds: f64,
    /// Mean normalized coverage
    pub mean_coverage: f64,
    /// Mean fuzzer rate
    pub mean_branches_per_second: f64,
}

/// Coverage rows, per-budget means and drop accounting
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageComparison {
    /// Rows in ascending id order
    pub rows: Vec<CoverageRow>,
    /// Means per budget, in budget order
    pub per_budget: Vec<BudgetSummary>,
    /// Dropped ids
    pub dropped: DropTally,
}

impl CoverageComparison {
    /// Summary of JSE rates
    #[must_use]
    pub fn jse_branches_per_second(&self) -> Option<Summary> {
        Summary::of(self.rows.iter().map(|r| r.jse_branches_per_second))
    }
}

impl fmt::Display for CoverageComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "coverage comparison: {} programs", self.rows.len())?;
        match self.jse_branches_per_second() {
            Some(s) => writeln!(f, "  jse branches/s        {s}")?,
            None => writeln!(f, "  jse branches/s        no data")?,
        }
        for budget in &self.per_budget {
            writeln!(
                f,
                "  fuzz {:>6.2}s          coverage {:.3}, branches/s {:.3}",
                budget.budget_seconds, budget.mean_coverage, budget.mean_branches_per_second
            )?;
        }
        write!(f, "  {}", self.dropped)
    }
}

/// Budget key with millisecond resolution
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn budget_key(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}

/// Compare JSE full runs with fuzz samples at each of `budgets`
///
/// Ids must have succeeded in the JSE run and have a sample for every
/// budget; the last sample per (id, budget) wins.
///
/// # Errors
/// Returns [`ReportError::NoBudgets`] when `budgets` is empty
#[allow(clippy::cast_precision_loss)]
pub fn compare_coverage(
    jse: &[ExecutionResult],
    samples: &[CoverageSample],
    programs: &CorpusScan,
    budgets: &[f64],
) -> ReportResult<CoverageComparison> {
    if budgets.is_empty() {
        return Err(ReportError::NoBudgets);
    }
    let mut index: BTreeMap<ProgramId, BTreeMap<u64, u64>> = BTreeMap::new();
    for sample in samples {
        index
            .entry(sample.program_id)
            .or_default()
            .insert(sample.budget_millis(), sample.branches_reached);
    }

    let base = aggregate(jse, programs, &RowExtras::default());
    let mut dropped = base.dropped.clone();
    let mut rows = Vec::with_capacity(base.rows.len());
    for row in &base.rows {
        let reached: Option<Vec<u64>> = budgets
            .iter()
            .map(|b| index.get(&row.program_id)?.get(&budget_key(*b)).copied())
            .collect();
        let Some(reached) = reached else {
            dropped.record(row.program_id, DropReason::MissingInOtherMode);
            continue;
        };
        let metrics = &row.static_metrics;
        rows.push(CoverageRow {
            program_id: row.program_id,
            branch_count: metrics.branch_count,
            jse_seconds: row.elapsed_seconds,
            jse_branches_per_second: per_second(metrics.branch_count, row.elapsed_seconds),
            source_lines: row.source_lines,
            budgets: budgets
                .iter()
                .zip(reached)
                .map(|(&budget_seconds, branches_reached)| BudgetPoint {
                    budget_seconds,
                    branches_reached,
                    coverage: metrics.normalized_coverage(branches_reached),
                    branches_per_second: per_second(branches_reached, budget_seconds),
                })
                .collect(),
        });
    }

    // Ids that were fuzzed but have no JSE result at all.
    for &id in index.keys() {
        if base.row(id).is_none() && !dropped.contains(id) {
            dropped.record(id, DropReason::MissingInOtherMode);
        }
    }

    let per_budget = budgets
        .iter()
        .enumerate()
        .map(|(i, &budget_seconds)| {
            let n = rows.len().max(1) as f64;
            BudgetSummary {
                budget_seconds,
                mean_coverage: rows.iter().map(|r| r.budgets[i].coverage).sum::<f64>() / n,
                mean_branches_per_second: rows.iter().map(|r| r.budgets[i].branches_per_second).sum::<f64>() / n,
            }
        })
        .collect();

    Ok(CoverageComparison {
        rows,
        per_budget,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabench_artifact::{ExecutionMode, ProgramRecord, StaticMetrics};

    fn id(n: u32) -> ProgramId {
        ProgramId::new(n).unwrap()
    }

    fn programs(counts: &[(u32, u64)]) -> CorpusScan {
        CorpusScan {
            records: counts
                .iter()
                .map(|(n, c)| ProgramRecord::new(id(*n), format!("{n}.jse.js"), StaticMetrics::new(*c, 1.0, 1.0, 1.0)))
                .collect(),
            excluded: Vec::new(),
        }
    }

    fn sample(n: u32, budget: f64, reached: u64) -> CoverageSample {
        CoverageSample::new(id(n), budget, reached).unwrap()
    }

    #[test]
    fn one_second_budget_reaching_a_quarter() {
        let jse = vec![ExecutionResult::completed(id(7), ExecutionMode::Full, 2.0, 0)];
        let cmp = compare_coverage(&jse, &[sample(7, 1.0, 10)], &programs(&[(7, 40)]), &[1.0]).unwrap();
        let point = cmp.rows[0].budgets[0];
        assert_eq!(point.coverage, 0.25);
        assert_eq!(point.branches_per_second, 10.0);
        assert_eq!(cmp.rows[0].jse_branches_per_second, 20.0);
        assert_eq!(cmp.per_budget[0].mean_coverage, 0.25);
    }

    #[test]
    fn ids_need_every_budget_and_a_jse_success() {
        let jse = vec![
            ExecutionResult::completed(id(1), ExecutionMode::Full, 1.0, 0),
            ExecutionResult::completed(id(2), ExecutionMode::Full, 1.0, 0),
            ExecutionResult::timed_out(id(3), ExecutionMode::Full, 10.0),
        ];
        let samples = vec![
            sample(1, 0.1, 2),
            sample(1, 0.5, 3),
            sample(2, 0.1, 1),
            sample(3, 0.1, 1),
            sample(3, 0.5, 1),
            sample(4, 0.1, 1),
        ];
        let cmp = compare_coverage(&jse, &samples, &programs(&[(1, 4), (2, 4), (3, 4)]), &[0.1, 0.5]).unwrap();
        let ids: Vec<u32> = cmp.rows.iter().map(|r| r.program_id.get()).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(cmp.dropped.reason(id(2)), Some(DropReason::MissingInOtherMode));
        assert_eq!(cmp.dropped.reason(id(3)), Some(DropReason::TimedOut));
        assert_eq!(cmp.dropped.reason(id(4)), Some(DropReason::MissingInOtherMode));
    }

    #[test]
    fn zero_branch_programs_have_zero_coverage() {
        let jse = vec![ExecutionResult::completed(id(1), ExecutionMode::Full, 0.0, 0)];
        let cmp = compare_coverage(&jse, &[sample(1, 1.0, 5)], &programs(&[(1, 0)]), &[1.0]).unwrap();
        assert_eq!(cmp.rows[0].budgets[0].coverage, 0.0);
        assert_eq!(cmp.rows[0].jse_branches_per_second, 0.0);
    }

    #[test]
    fn empty_budget_list_is_rejected() {
        assert!(matches!(
            compare_coverage(&[], &[], &programs(&[]), &[]),
            Err(ReportError::NoBudgets)
        ));
    }
}
