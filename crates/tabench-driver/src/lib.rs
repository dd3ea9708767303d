//! tabench Execution Driver
//!
//! Runs the symbolic engine, the fuzzer and external differs as bounded
//! subprocesses and records one result per invocation.
//!
//! # Core Concepts
//!
//! - [`HarnessConfig`]: `tabench.toml`, validated at load
//! - [`EngineCommand`]: typed argv with its wall-clock ceiling
//! - [`ProcessRunner`] / [`TokioRunner`]: the subprocess seam
//! - [`ExecutionDriver`]: one command in, one logged [`tabench_artifact::ExecutionResult`] out
//! - [`Harness`]: the full, targeted, fuzz and experiment workflows
//! - [`calibrate`]: per-mode launcher overhead

#![warn(unreachable_pub)]

mod calibrate;
mod command;
mod config;
mod driver;
mod error;
mod fuzz;
mod runner;
mod workflow;

pub use calibrate::calibrate;
pub use command::EngineCommand;
pub use config::{
    ConfigError, DifferConfig, EngineConfig, HarnessConfig, Timeouts, COVERAGE_LOG, DEFAULT_CONFIG_FILE, FULL_LOG,
    FUZZ_LOG, MAX_DURATION_SECS, OVERHEAD_FILE, SKIP_LOG, TARGETED_LOG, TIMING_LOG,
};
pub use driver::{ExecutionDriver, Invocation};
pub use error::{DriverError, DriverResult};
pub use fuzz::branches_reached;
pub use runner::{ProcessExit, ProcessOutcome, ProcessRunner, TokioRunner};
pub use tabench_artifact::Skip;
pub use workflow::{BatchSummary, Harness, ProgramReport};
