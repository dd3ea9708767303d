//! Bounded subprocess execution
//!
//! [`ProcessRunner`] is the seam between the driver and the operating
//! system. [`TokioRunner`] launches the command with `tokio::process`, waits
//! under `tokio::time::timeout`, and kills the child when the ceiling
//! expires. On unix each child leads its own process group and the whole
//! group is killed, so engine workers cannot outlive the ceiling. Output is
//! captured so fuzz runs can be scanned for coverage.

use crate::command::EngineCommand;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long captured pipes may keep draining after a kill
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own; signal deaths report `-1`
    Exited(i32),
    /// Killed at its wall-clock ceiling
    TimedOut,
    /// Could not be spawned or awaited
    LaunchFailed(String),
}

/// Everything observed about one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit classification
    pub exit: ProcessExit,
    /// Wall-clock time from spawn to exit (or kill)
    pub elapsed: Duration,
    /// Captured standard output, lossily decoded
    pub stdout: String,
    /// Captured standard error, lossily decoded
    pub stderr: String,
}

impl ProcessOutcome {
    fn launch_failed(message: String, elapsed: Duration) -> Self {
        Self {
            exit: ProcessExit::LaunchFailed(message),
            elapsed,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Runs one command to completion or to its ceiling
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command`; never fails, every outcome is a value
    async fn run(&self, command: &EngineCommand) -> ProcessOutcome;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct TokioRunner {
    working_dir: Option<std::path::PathBuf>,
}

impl TokioRunner {
    /// Runner launching in the current directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner launching in `dir`
    #[must_use]
    pub fn in_dir(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "pipe read ended early");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(handle: JoinHandle<String>, bounded: bool) -> String {
    if bounded {
        match tokio::time::timeout(DRAIN_WINDOW, handle).await {
            Ok(Ok(text)) => text,
            Ok(Err(_)) | Err(_) => String::new(),
        }
    } else {
        handle.await.unwrap_or_default()
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// SIGKILL the child's process group, then kill and reap the child itself
async fn kill_tree(child: &mut Child) {
    kill_group(child);
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed-out engine");
    }
}

#[async_trait::async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, command: &EngineCommand) -> ProcessOutcome {
        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        own_process_group(&mut cmd);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = command.program(), error = %e, "engine launch failed");
                return ProcessOutcome::launch_failed(e.to_string(), start.elapsed());
            }
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (exit, elapsed) = match tokio::time::timeout(command.timeout(), child.wait()).await {
            Ok(Ok(status)) => (ProcessExit::Exited(status.code().unwrap_or(-1)), start.elapsed()),
            Ok(Err(e)) => (ProcessExit::LaunchFailed(e.to_string()), start.elapsed()),
            Err(_) => {
                let elapsed = start.elapsed();
                kill_tree(&mut child).await;
                (ProcessExit::TimedOut, elapsed)
            }
        };

        // Grandchildren may still hold the pipes after a kill.
        let bounded = exit == ProcessExit::TimedOut;
        ProcessOutcome {
            exit,
            elapsed,
            stdout: collect(stdout, bounded).await,
            stderr: collect(stderr, bounded).await,
        }
    }
}
