//! tabench Reports
//!
//! Aggregation of result logs into comparable per-program rows:
//!
//! - [`aggregate`]: filter failed runs, join with corpus records, derive rows
//! - [`compare_targeted`]: full vs targeted times with overhead subtracted
//! - [`compare_coverage`]: JSE vs fuzzer coverage per time budget
//!
//! Every id left out of a report is counted in a [`DropTally`] with the
//! reason, so summaries always state how much of the corpus they cover.

#![warn(unreachable_pub)]

mod aggregate;
mod coverage;
mod error;
mod io;
mod stats;
mod targeted;

pub use aggregate::{aggregate, latest_per_id, Aggregate, AnalysisRow, DropReason, DropTally, RowExtras};
pub use coverage::{compare_coverage, BudgetPoint, BudgetSummary, CoverageComparison, CoverageRow};
pub use error::{ReportError, ReportResult};
pub use io::{cache_sizes, load_programs, write_rows};
pub use stats::{per_second, Summary};
pub use targeted::{compare_targeted, TargetedComparison, TargetedRow};
