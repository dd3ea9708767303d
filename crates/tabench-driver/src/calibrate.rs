//! Launcher overhead calibration
//!
//! Runs the engine against an empty program in each mode and takes the
//! median elapsed time. Reports subtract these medians instead of a fixed
//! correction. Calibration runs are not appended to any result log.

use crate::command::EngineCommand;
use crate::config::{HarnessConfig, OVERHEAD_FILE};
use crate::error::{DriverError, DriverResult};
use crate::runner::{ProcessExit, ProcessRunner};
use chrono::Utc;
use tabench_artifact::ExecutionMode;
use tabench_store::Overhead;
use tracing::{debug, info, instrument, warn};

/// Measure per-mode overhead and store it under the log directory
///
/// A targeted sample is taken over an empty cache and an empty diff; any
/// exit counts, since only the launch cost is of interest. Timed-out and
/// unlaunchable samples are dropped.
///
/// # Errors
/// Returns [`DriverError::Calibration`] if a mode produced no sample, or a
/// store error if the result cannot be written
#[instrument(skip_all, fields(samples = config.calibration_samples))]
pub async fn calibrate(config: &HarnessConfig, runner: &dyn ProcessRunner) -> DriverResult<Overhead> {
    let scratch = tempfile::tempdir().map_err(|e| DriverError::io_error(std::env::temp_dir(), e))?;
    let program = scratch.path().join("empty.jse.js");
    let cache = scratch.path().join("cache");
    let diff = scratch.path().join("empty.diff");
    for path in [&program, &cache, &diff] {
        std::fs::write(path, b"").map_err(|e| DriverError::io_error(path, e))?;
    }

    let commands = [
        (
            ExecutionMode::Full,
            EngineCommand::full(&config.engine.full, &program, false, config.full_timeout())?,
        ),
        (
            ExecutionMode::Targeted,
            EngineCommand::targeted(&config.engine.targeted, &cache, &diff, config.targeted_timeout())?,
        ),
        (
            ExecutionMode::Cold,
            EngineCommand::cold(&config.engine.full, &program, config.targeted_timeout())?,
        ),
    ];

    let mut medians = [0.0; 3];
    for (slot, (mode, command)) in medians.iter_mut().zip(&commands) {
        let mut samples = Vec::with_capacity(config.calibration_samples);
        for _ in 0..config.calibration_samples {
            let outcome = runner.run(command).await;
            match outcome.exit {
                ProcessExit::Exited(code) => {
                    debug!(mode = mode.as_str(), code, elapsed = outcome.elapsed.as_secs_f64(), "sample");
                    samples.push(outcome.elapsed.as_secs_f64());
                }
                ProcessExit::TimedOut => warn!(mode = mode.as_str(), "calibration sample timed out"),
                ProcessExit::LaunchFailed(message) => {
                    warn!(mode = mode.as_str(), error = %message, "calibration sample did not launch");
                }
            }
        }
        *slot = median(&mut samples).ok_or(DriverError::Calibration(mode.as_str()))?;
    }

    let [full, targeted, cold] = medians;
    let overhead = Overhead {
        full,
        targeted,
        cold,
        samples: config.calibration_samples,
        measured_at: Utc::now(),
    };
    overhead.save(&config.log_path(OVERHEAD_FILE))?;
    info!(full, targeted, cold, "launcher overhead measured");
    Ok(overhead)
}

fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    let mid = samples.len() / 2;
    Some(if samples.len() % 2 == 0 {
        (samples[mid - 1] + samples[mid]) / 2.0
    } else {
        samples[mid]
    })
}
