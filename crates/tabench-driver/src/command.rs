//! Typed engine invocations
//!
//! Every command is validated when it is built: the argv prefix names a
//! program, the timeout is a positive duration, and every input file exists.
//! Arguments are kept as a vector and handed to the OS directly, never to a
//! shell.

use crate::config::MAX_DURATION_SECS;
use crate::error::{DriverError, DriverResult};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A validated engine command line with its wall-clock ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl EngineCommand {
    /// Generic command: `prefix` followed by `args`, with `inputs` checked
    ///
    /// # Errors
    /// Returns [`DriverError`] if the prefix is empty, the timeout is not
    /// positive, or an input file is missing
    pub fn new(
        what: &'static str,
        prefix: &[String],
        args: impl IntoIterator<Item = String>,
        inputs: &[&Path],
        timeout: Duration,
    ) -> DriverResult<Self> {
        let (program, rest) = prefix.split_first().ok_or(DriverError::EmptyCommand(what))?;
        if program.trim().is_empty() {
            return Err(DriverError::EmptyCommand(what));
        }
        if timeout.is_zero() {
            return Err(DriverError::InvalidTimeout(timeout.as_secs_f64()));
        }
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            return Err(DriverError::MissingInput(missing.to_path_buf()));
        }
        Ok(Self {
            program: program.clone(),
            args: rest.iter().cloned().chain(args).collect(),
            timeout,
        })
    }

    /// `<engine> --file=<source> [--writecache]`
    ///
    /// # Errors
    /// See [`Self::new`]
    pub fn full(prefix: &[String], source: &Path, write_cache: bool, timeout: Duration) -> DriverResult<Self> {
        let mut args = vec![flag("file", source)];
        if write_cache {
            args.push("--writecache".to_string());
        }
        Self::new("full run", prefix, args, &[source], timeout)
    }

    /// `<engine> --diff --cache=<cache> --diffFile=<diff>`
    ///
    /// # Errors
    /// See [`Self::new`]
    pub fn targeted(prefix: &[String], cache: &Path, diff: &Path, timeout: Duration) -> DriverResult<Self> {
        let args = vec!["--diff".to_string(), flag("cache", cache), flag("diffFile", diff)];
        Self::new("targeted run", prefix, args, &[cache, diff], timeout)
    }

    /// `<engine> --file=<modified>`: a targeted request without usable state
    ///
    /// # Errors
    /// See [`Self::new`]
    pub fn cold(prefix: &[String], modified: &Path, timeout: Duration) -> DriverResult<Self> {
        Self::new("cold run", prefix, vec![flag("file", modified)], &[modified], timeout)
    }

    /// `<fuzzer> <harness> -- -max_total_time=<t> -print_final_stats=1`
    ///
    /// The ceiling is the budget plus `grace`, so the fuzzer normally stops
    /// itself and prints its final stats.
    ///
    /// # Errors
    /// See [`Self::new`]; the budget must also be positive and at most a week
    pub fn fuzz(prefix: &[String], harness: &Path, budget_secs: f64, grace: Duration) -> DriverResult<Self> {
        if !budget_secs.is_finite() || budget_secs <= 0.0 || budget_secs > MAX_DURATION_SECS {
            return Err(DriverError::InvalidTimeout(budget_secs));
        }
        let args = vec![
            harness.display().to_string(),
            "--".to_string(),
            format!("-max_total_time={budget_secs}"),
            "-print_final_stats=1".to_string(),
        ];
        let ceiling = Duration::from_secs_f64(budget_secs).saturating_add(grace);
        Self::new("fuzz run", prefix, args, &[harness], ceiling)
    }

    /// `<differ> --a=<base> --b=<modified> --resultFilePath=<out>`
    ///
    /// # Errors
    /// See [`Self::new`]
    pub fn differ(
        prefix: &[String],
        base: &Path,
        modified: &Path,
        result: &Path,
        timeout: Duration,
    ) -> DriverResult<Self> {
        let args = vec![flag("a", base), flag("b", modified), flag("resultFilePath", result)];
        Self::new("diff", prefix, args, &[base, modified], timeout)
    }

    /// Executable
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the executable
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Wall-clock ceiling
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn flag(name: &str, path: &Path) -> String {
    format!("--{name}={}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split_prefix(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn engine() -> Vec<String> {
        split_prefix("node --max-old-space-size=34359 build/driver.js")
    }

    #[test]
    fn full_command_matches_engine_interface() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("1.jse.js");
        std::fs::write(&source, "").unwrap();

        let cmd = EngineCommand::full(&engine(), &source, true, Duration::from_secs(10)).unwrap();
        assert_eq!(cmd.program(), "node");
        assert_eq!(cmd.args().len(), 4);
        assert_eq!(cmd.args()[2], format!("--file={}", source.display()));
        assert_eq!(cmd.args()[3], "--writecache");
    }

    #[test]
    fn targeted_and_fuzz_commands() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let diff = dir.path().join("3.diff");
        let harness = dir.path().join("3.jazzer.js");
        for p in [&cache, &diff, &harness] {
            std::fs::write(p, "").unwrap();
        }

        let cmd = EngineCommand::targeted(&engine(), &cache, &diff, Duration::from_secs(10)).unwrap();
        assert_eq!(cmd.args()[2], "--diff");
        assert!(cmd.to_string().contains("--diffFile="));

        let fuzz = EngineCommand::fuzz(&split_prefix("npx jazzer"), &harness, 0.5, Duration::from_secs(2)).unwrap();
        assert_eq!(
            fuzz.args()[2..],
            ["--".to_string(), "-max_total_time=0.5".to_string(), "-print_final_stats=1".to_string()]
        );
        assert_eq!(fuzz.timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn validation_happens_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("1.jse.js");
        std::fs::write(&source, "").unwrap();

        assert!(matches!(
            EngineCommand::full(&[], &source, false, Duration::from_secs(1)),
            Err(DriverError::EmptyCommand(_))
        ));
        assert!(matches!(
            EngineCommand::full(&engine(), &source, false, Duration::ZERO),
            Err(DriverError::InvalidTimeout(_))
        ));
        assert!(matches!(
            EngineCommand::cold(&engine(), &dir.path().join("absent.js"), Duration::from_secs(1)),
            Err(DriverError::MissingInput(_))
        ));
        assert!(matches!(
            EngineCommand::fuzz(&engine(), &source, 0.0, Duration::ZERO),
            Err(DriverError::InvalidTimeout(_))
        ));
        assert!(matches!(
            EngineCommand::fuzz(&engine(), &source, 1e30, Duration::ZERO),
            Err(DriverError::InvalidTimeout(_))
        ));
        assert!(matches!(
            EngineCommand::fuzz(&engine(), &source, 1.0, Duration::MAX),
            Ok(cmd) if cmd.timeout() == Duration::MAX
        ));
    }
}
