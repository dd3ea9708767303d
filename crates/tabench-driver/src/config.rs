//! Harness configuration
//!
//! Loaded from `tabench.toml`; every field has a default, so an empty file or
//! no file at all describes the stock experiment layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabench_artifact::ProgramId;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "tabench.toml";

/// Result log of full runs with cache writing
pub const FULL_LOG: &str = "jse_base";
/// Result log of targeted (and cold) runs
pub const TARGETED_LOG: &str = "jse_diff_analysis";
/// Result log of full runs without cache writing
pub const TIMING_LOG: &str = "jse_results";
/// Result log of fuzz runs
pub const FUZZ_LOG: &str = "jazzer_runs";
/// Coverage samples of fuzz runs
pub const COVERAGE_LOG: &str = "jazzer_cov.jsonl";
/// Steps passed over, with the reason
pub const SKIP_LOG: &str = "skipped.jsonl";
/// Measured launcher overhead
pub const OVERHEAD_FILE: &str = "overhead.json";

/// Longest accepted timeout, grace period or fuzz budget: one week
pub const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Configuration errors; all of them are fatal to a run
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),

    /// An engine program file named in an argv prefix does not exist
    #[error("engine program file not found: {0}")]
    MissingProgramFile(PathBuf),
}

/// Argv prefixes of the symbolic engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Prefix for full (and cold) runs
    pub full: Vec<String>,
    /// Prefix for targeted runs
    pub targeted: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let node = vec![
            "node".to_string(),
            "--max-old-space-size=34359".to_string(),
            "build/driver.js".to_string(),
        ];
        Self {
            full: node.clone(),
            targeted: node,
        }
    }
}

/// Diff backend selection
///
/// `differ = "builtin"` uses the in-process extractor; an array is the argv
/// prefix of an external tool taking `--a= --b= --resultFilePath=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DifferConfig {
    /// Named backend; only `builtin` is known
    Named(String),
    /// External tool argv prefix
    External(Vec<String>),
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self::Named("builtin".to_string())
    }
}

impl DifferConfig {
    /// External argv prefix, if one is configured
    #[must_use]
    pub fn external(&self) -> Option<&[String]> {
        match self {
            Self::Named(_) => None,
            Self::External(argv) => Some(argv),
        }
    }
}

/// Wall-clock ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// Ceiling for full runs
    pub full_secs: f64,
    /// Ceiling for targeted and cold runs
    pub targeted_secs: f64,
    /// Slack added on top of each fuzz budget
    pub grace_secs: f64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            full_secs: 10.0,
            targeted_secs: 10.0,
            grace_secs: 2.0,
        }
    }
}

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directory holding the generated corpus
    pub corpus_dir: PathBuf,
    /// Directory the engine writes its per-run output into
    pub results_dir: PathBuf,
    /// Directory for result logs, diffs and calibration
    pub log_dir: PathBuf,
    /// Prefix of the engine's output directories
    pub engine_label: String,
    /// Symbolic engine argv prefixes
    pub engine: EngineConfig,
    /// Fuzzer argv prefix
    pub fuzzer: Vec<String>,
    /// Diff backend
    pub differ: DifferConfig,
    /// Wall-clock ceilings
    pub timeouts: Timeouts,
    /// Fuzz time budgets in seconds
    pub fuzz_budgets_secs: Vec<f64>,
    /// Run ids `1..=programs`; all base programs in the corpus when unset
    pub programs: Option<u32>,
    /// Programs processed concurrently
    pub jobs: usize,
    /// Samples per mode when measuring launcher overhead
    pub calibration_samples: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("randjs"),
            results_dir: PathBuf::from("results"),
            log_dir: PathBuf::from("experiments"),
            engine_label: "JSE".to_string(),
            engine: EngineConfig::default(),
            fuzzer: vec!["npx".to_string(), "jazzer".to_string()],
            differ: DifferConfig::default(),
            timeouts: Timeouts::default(),
            fuzz_budgets_secs: vec![0.1, 0.5, 1.0],
            programs: None,
            jobs: 1,
            calibration_samples: 3,
        }
    }
}

impl HarnessConfig {
    /// Load `path`, or `tabench.toml` if present, or the defaults
    ///
    /// # Errors
    /// Returns [`ConfigError`] if an explicitly named file cannot be read, the
    /// TOML does not match the schema, or a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text without validating
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on schema mismatch
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Check ranges and shapes
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("timeouts.full_secs", self.timeouts.full_secs),
            ("timeouts.targeted_secs", self.timeouts.targeted_secs),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 || value > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive and at most {MAX_DURATION_SECS}, got {value}"
                )));
            }
        }
        let grace = self.timeouts.grace_secs;
        if !grace.is_finite() || !(0.0..=MAX_DURATION_SECS).contains(&grace) {
            return Err(ConfigError::Invalid(format!(
                "timeouts.grace_secs must be between 0 and {MAX_DURATION_SECS}, got {grace}"
            )));
        }
        if let Some(bad) = self
            .fuzz_budgets_secs
            .iter()
            .find(|b| !b.is_finite() || **b <= 0.0 || **b > MAX_DURATION_SECS)
        {
            return Err(ConfigError::Invalid(format!(
                "fuzz budget {bad} must be positive and at most {MAX_DURATION_SECS}"
            )));
        }

        let prefixes = [
            ("engine.full", self.engine.full.as_slice()),
            ("engine.targeted", self.engine.targeted.as_slice()),
            ("fuzzer", self.fuzzer.as_slice()),
        ];
        for (name, argv) in prefixes {
            if argv.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{name} must name a program")));
            }
        }
        match &self.differ {
            DifferConfig::Named(name) if name != "builtin" => {
                return Err(ConfigError::Invalid(format!("unknown differ '{name}'")));
            }
            DifferConfig::External(argv) if argv.first().map_or(true, |p| p.trim().is_empty()) => {
                return Err(ConfigError::Invalid("differ must name a program".into()));
            }
            _ => {}
        }

        if self.engine_label.is_empty() || self.engine_label.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "engine_label '{}' must be a plain directory prefix",
                self.engine_label
            )));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".into()));
        }
        if self.calibration_samples == 0 {
            return Err(ConfigError::Invalid("calibration_samples must be at least 1".into()));
        }
        if self.programs == Some(0) {
            return Err(ConfigError::Invalid("programs must be at least 1".into()));
        }
        Ok(())
    }

    /// Check that script files named in the engine prefixes exist
    ///
    /// Only arguments that look like JavaScript files are checked; bare
    /// program names are resolved on `PATH` at launch.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingProgramFile`] for the first missing file
    pub fn check_engine_files(&self) -> Result<(), ConfigError> {
        let prefixes = self.engine.full.iter().chain(&self.engine.targeted);
        for arg in prefixes {
            let is_script = Path::new(arg)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "js" | "mjs" | "cjs"));
            if is_script && !Path::new(arg).is_file() {
                return Err(ConfigError::MissingProgramFile(PathBuf::from(arg)));
            }
        }
        Ok(())
    }

    /// Ceiling for full runs
    #[must_use]
    pub fn full_timeout(&self) -> Duration {
        seconds(self.timeouts.full_secs)
    }

    /// Ceiling for targeted and cold runs
    #[must_use]
    pub fn targeted_timeout(&self) -> Duration {
        seconds(self.timeouts.targeted_secs)
    }

    /// Slack on top of fuzz budgets
    #[must_use]
    pub fn grace(&self) -> Duration {
        seconds(self.timeouts.grace_secs)
    }

    /// Log file `name` under the log directory
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir.join(name)
    }

    /// Where the diff for `id` is written
    #[must_use]
    pub fn diff_path(&self, id: ProgramId) -> PathBuf {
        self.log_dir.join("diffs").join(format!("{id}.diff"))
    }
}

/// Out-of-range values (only possible without [`HarnessConfig::validate`])
/// become zero, which command construction rejects
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
