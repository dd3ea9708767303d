//! Execution Driver
//!
//! Turns one [`EngineCommand`] into exactly one [`ExecutionResult`] and
//! appends it to the result log handed in by the caller. The subprocess
//! itself is delegated to a [`ProcessRunner`] so tests can drive scripted
//! outcomes.

use crate::command::EngineCommand;
use crate::error::DriverResult;
use crate::runner::{ProcessExit, ProcessRunner};
use std::sync::Arc;
use tabench_artifact::{ExecutionMode, ExecutionResult, ProgramId, RunStatus};
use tabench_store::AppendLog;
use tracing::{info, instrument, warn};

/// One recorded invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Result as appended to the log
    pub result: ExecutionResult,
    /// Captured standard output
    pub stdout: String,
}

/// Bounded engine execution bound to one result log
#[derive(Clone)]
pub struct ExecutionDriver {
    runner: Arc<dyn ProcessRunner>,
    log: Arc<AppendLog>,
}

impl std::fmt::Debug for ExecutionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionDriver").field("log", &self.log.path()).finish_non_exhaustive()
    }
}

impl ExecutionDriver {
    /// Create driver writing to `log`
    pub fn new(runner: Arc<dyn ProcessRunner>, log: Arc<AppendLog>) -> Self {
        Self { runner, log }
    }

    /// Result log this driver appends to
    #[must_use]
    pub fn log(&self) -> &AppendLog {
        &self.log
    }

    /// Run `command` for program `id` in `mode`
    ///
    /// # Errors
    /// Returns [`crate::DriverError`] only if the result cannot be appended;
    /// engine failures and timeouts are recorded in the result
    pub async fn run(&self, command: &EngineCommand, id: ProgramId, mode: ExecutionMode) -> DriverResult<Invocation> {
        self.execute(command, id, mode, None).await
    }

    /// Run a fuzz command and record the budget it was given
    ///
    /// # Errors
    /// Same as [`Self::run`]
    pub async fn run_fuzz(&self, command: &EngineCommand, id: ProgramId, budget_secs: f64) -> DriverResult<Invocation> {
        self.execute(command, id, ExecutionMode::Fuzz, Some(budget_secs)).await
    }

    #[instrument(skip_all, fields(program_id = %id, mode = mode.as_str()))]
    async fn execute(
        &self,
        command: &EngineCommand,
        id: ProgramId,
        mode: ExecutionMode,
        budget_secs: Option<f64>,
    ) -> DriverResult<Invocation> {
        let outcome = self.runner.run(command).await;
        let elapsed = outcome.elapsed.as_secs_f64();

        let mut result = match &outcome.exit {
            ProcessExit::Exited(code) => ExecutionResult::completed(id, mode, elapsed, *code),
            ProcessExit::TimedOut => ExecutionResult::timed_out(id, mode, elapsed),
            ProcessExit::LaunchFailed(message) => {
                warn!(command = %command, error = %message, "engine could not be launched");
                ExecutionResult::launch_failed(id, mode, elapsed)
            }
        };
        if let Some(budget) = budget_secs {
            result = result.with_time_budget(budget);
        }
        self.log.append_result(&result)?;

        match result.status() {
            RunStatus::Ok => info!(elapsed, status = "ok", "engine run finished"),
            RunStatus::Timeout => warn!(
                elapsed,
                status = "timeout",
                limit = command.timeout().as_secs_f64(),
                "engine run timed out"
            ),
            RunStatus::Failed => warn!(
                elapsed,
                status = "failed",
                exit_code = result.exit_code(),
                stderr = %tail(&outcome.stderr),
                "engine run failed"
            ),
        }

        Ok(Invocation {
            result,
            stdout: outcome.stdout,
        })
    }
}

/// Last non-empty line of captured output, for log context
fn tail(output: &str) -> &str {
    output.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessOutcome;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tabench_artifact::{LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
    use tabench_store::read_results;

    /// Runner returning queued outcomes in order
    struct Scripted(Mutex<Vec<ProcessExit>>);

    #[async_trait::async_trait]
    impl ProcessRunner for Scripted {
        async fn run(&self, command: &EngineCommand) -> ProcessOutcome {
            let exit = self.0.lock().remove(0);
            let elapsed = if exit == ProcessExit::TimedOut {
                command.timeout()
            } else {
                Duration::from_millis(250)
            };
            ProcessOutcome {
                exit,
                elapsed,
                stdout: "branch: 4\n".into(),
                stderr: "Error: boom\n".into(),
            }
        }
    }

    fn command(dir: &std::path::Path) -> EngineCommand {
        let source = dir.join("3.jse.js");
        std::fs::write(&source, "").unwrap();
        EngineCommand::full(&["node".to_string()], &source, true, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn appends_one_record_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AppendLog::create(dir.path().join("jse_base")).unwrap());
        let runner = Scripted(Mutex::new(vec![
            ProcessExit::Exited(0),
            ProcessExit::Exited(2),
            ProcessExit::TimedOut,
            ProcessExit::LaunchFailed("no such file".into()),
        ]));
        let driver = ExecutionDriver::new(Arc::new(runner), log.clone());
        let cmd = command(dir.path());
        let id = ProgramId::new(3).unwrap();

        let mut codes = Vec::new();
        for _ in 0..4 {
            let inv = driver.run(&cmd, id, ExecutionMode::Full).await.unwrap();
            codes.push(inv.result.exit_code());
        }
        assert_eq!(codes, vec![0, 2, TIMEOUT_EXIT_CODE, LAUNCH_FAILURE_EXIT_CODE]);

        let contents = read_results(log.path(), ExecutionMode::Full).unwrap();
        assert_eq!(contents.records.len(), 4);
        assert_eq!(contents.malformed, 0);
        let timed_out = &contents.records[2];
        assert_eq!(timed_out.status(), RunStatus::Timeout);
        assert!((timed_out.elapsed_seconds() - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fuzz_runs_carry_budget_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AppendLog::create(dir.path().join("jazzer_runs")).unwrap());
        let driver = ExecutionDriver::new(Arc::new(Scripted(Mutex::new(vec![ProcessExit::Exited(0)]))), log);
        let inv = driver
            .run_fuzz(&command(dir.path()), ProgramId::new(3).unwrap(), 0.5)
            .await
            .unwrap();
        assert_eq!(inv.result.mode(), ExecutionMode::Fuzz);
        assert_eq!(inv.result.time_budget_seconds(), Some(0.5));
        assert_eq!(inv.stdout, "branch: 4\n");
    }

    #[test]
    fn tail_picks_last_line() {
        assert_eq!(tail("a\nb\n\n"), "b");
        assert_eq!(tail(""), "");
    }
}
