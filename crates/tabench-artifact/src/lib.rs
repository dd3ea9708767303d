//! tabench Artifact Records
//!
//! Typed records shared by every stage of the harness. Each derived record is
//! keyed by [`ProgramId`] and validated when it is built or parsed.
//!
//! # Core Concepts
//!
//! - [`ProgramRecord`] / [`StaticMetrics`]: one corpus program and its structure
//! - [`ExecutionResult`] / [`LogRecord`]: one engine invocation and its log line
//! - [`CacheArtifact`], [`DiffArtifact`], [`CoverageSample`]: per-program outputs
//! - [`SkipRecord`]: a workflow step passed over, and why
//! - [`ContentHash`]: Blake3 digest tying artifacts to program text

#![warn(unreachable_pub)]

mod artifacts;
mod error;
mod execution;
mod hash;
mod program;

pub use artifacts::{CacheArtifact, CoverageSample, DiffArtifact, Skip, SkipRecord};
pub use error::ArtifactError;
pub use execution::{
    ExecutionMode, ExecutionResult, LogRecord, RunStatus, LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
pub use hash::{ContentHash, DigestError};
pub use program::{ProgramId, ProgramRecord, StaticMetrics};
