//! Execution results and their result-log wire form

use crate::error::ArtifactError;
use crate::program::ProgramId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code recorded for a run killed at its wall-clock ceiling
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when the engine could not be launched at all
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// How an engine was invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// From-scratch symbolic execution
    Full,
    /// Incremental run over a cache and a diff
    Targeted,
    /// Targeted request degraded to a from-scratch run on the modified source
    Cold,
    /// Coverage-guided fuzzing under a time budget
    Fuzz,
}

impl ExecutionMode {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Targeted => "targeted",
            Self::Cold => "cold",
            Self::Fuzz => "fuzz",
        }
    }

    /// Whether the mode answers a targeted-analysis request
    #[must_use]
    pub fn is_incremental_request(&self) -> bool {
        matches!(self, Self::Targeted | Self::Cold)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Exited with code zero
    Ok,
    /// Exited non-zero or could not be launched
    Failed,
    /// Killed at the wall-clock ceiling
    Timeout,
}

impl RunStatus {
    /// Infer status from a bare return code
    ///
    /// Logs written by older shell drivers store `os.system` wait statuses,
    /// where the `timeout` utility's 124 shows up shifted left by eight bits.
    #[must_use]
    pub fn from_return_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            TIMEOUT_EXIT_CODE => Self::Timeout,
            c if c == TIMEOUT_EXIT_CODE << 8 => Self::Timeout,
            _ => Self::Failed,
        }
    }
}

/// Result of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    program_id: ProgramId,
    elapsed_seconds: f64,
    exit_code: i32,
    status: RunStatus,
    mode: ExecutionMode,
    time_budget_seconds: Option<f64>,
}

impl ExecutionResult {
    /// Result of a process that ran to completion
    #[must_use]
    pub fn completed(program_id: ProgramId, mode: ExecutionMode, elapsed_seconds: f64, exit_code: i32) -> Self {
        let status = if exit_code == 0 { RunStatus::Ok } else { RunStatus::Failed };
        Self::with_status(program_id, mode, elapsed_seconds, exit_code, status)
    }

    /// Result of a process killed at its deadline
    #[must_use]
    pub fn timed_out(program_id: ProgramId, mode: ExecutionMode, elapsed_seconds: f64) -> Self {
        Self::with_status(program_id, mode, elapsed_seconds, TIMEOUT_EXIT_CODE, RunStatus::Timeout)
    }

    /// Result of a process that could not be spawned or awaited
    #[must_use]
    pub fn launch_failed(program_id: ProgramId, mode: ExecutionMode, elapsed_seconds: f64) -> Self {
        Self::with_status(
            program_id,
            mode,
            elapsed_seconds,
            LAUNCH_FAILURE_EXIT_CODE,
            RunStatus::Failed,
        )
    }

    fn with_status(
        program_id: ProgramId,
        mode: ExecutionMode,
        elapsed_seconds: f64,
        exit_code: i32,
        status: RunStatus,
    ) -> Self {
        Self {
            program_id,
            elapsed_seconds: if elapsed_seconds.is_finite() { elapsed_seconds.max(0.0) } else { 0.0 },
            exit_code,
            status,
            mode,
            time_budget_seconds: None,
        }
    }

    /// Attach the fuzz time budget this run was given
    #[must_use]
    pub fn with_time_budget(mut self, seconds: f64) -> Self {
        self.time_budget_seconds = Some(seconds);
        self
    }

    /// Program id
    #[inline]
    #[must_use]
    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// Wall-clock seconds, never negative
    #[inline]
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Process exit code
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Outcome class
    #[inline]
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Invocation mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Fuzz budget, for fuzz runs
    #[inline]
    #[must_use]
    pub fn time_budget_seconds(&self) -> Option<f64> {
        self.time_budget_seconds
    }

    /// Only successful runs take part in aggregation
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.status == RunStatus::Ok
    }

    /// Build from a parsed log line
    ///
    /// `fallback_mode` applies to lines written without a `mode` field.
    ///
    /// # Errors
    /// Returns error if the id is zero or the time is negative or not finite
    pub fn from_record(record: LogRecord, fallback_mode: ExecutionMode) -> Result<Self, ArtifactError> {
        let program_id = ProgramId::new(record.id)?;
        if !record.time.is_finite() || record.time < 0.0 {
            return Err(ArtifactError::InvalidRecord(format!(
                "program {}: time {} is not a non-negative number",
                record.id, record.time
            )));
        }
        let status = record
            .status
            .unwrap_or_else(|| RunStatus::from_return_code(record.return_code));
        Ok(Self {
            program_id,
            elapsed_seconds: record.time,
            exit_code: record.return_code,
            status,
            mode: record.mode.unwrap_or(fallback_mode),
            time_budget_seconds: record.budget,
        })
    }

    /// Wire form for the result log
    #[must_use]
    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            id: self.program_id.get(),
            time: self.elapsed_seconds,
            return_code: self.exit_code,
            status: Some(self.status),
            mode: Some(self.mode),
            budget: self.time_budget_seconds,
        }
    }
}

/// One line of a result log
///
/// `id`, `time` and `return_code` are always present; the rest is optional so
/// logs written by earlier drivers still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Program id
    pub id: u32,
    /// Elapsed wall-clock seconds
    pub time: f64,
    /// Process exit code
    pub return_code: i32,
    /// Outcome class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    /// Invocation mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    /// Fuzz time budget in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
}
