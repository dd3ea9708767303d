//! Measured launcher overhead per mode

use crate::cache::write_atomic;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tabench_artifact::ExecutionMode;

/// Median seconds the engine spends on an empty program, per mode
///
/// Subtracted from measured times so that full and targeted runs are
/// compared on analysis work alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overhead {
    /// Full-run overhead
    pub full: f64,
    /// Targeted-run overhead
    pub targeted: f64,
    /// Cold-run overhead
    pub cold: f64,
    /// Samples taken per mode
    pub samples: usize,
    /// When the measurement was taken
    pub measured_at: DateTime<Utc>,
}

impl Overhead {
    /// Overhead for `mode`; fuzz runs are budgeted, so they carry none
    #[must_use]
    pub fn for_mode(&self, mode: ExecutionMode) -> f64 {
        match mode {
            ExecutionMode::Full => self.full,
            ExecutionMode::Targeted => self.targeted,
            ExecutionMode::Cold => self.cold,
            ExecutionMode::Fuzz => 0.0,
        }
    }

    /// `elapsed` minus the overhead of `mode`, floored at zero
    #[must_use]
    pub fn adjust(&self, mode: ExecutionMode, elapsed: f64) -> f64 {
        (elapsed - self.for_mode(mode)).max(0.0)
    }

    /// Load a stored measurement; a missing file is `Ok(None)`
    ///
    /// # Errors
    /// Returns [`StoreError`] if the file exists but cannot be read or decoded
    pub fn load(path: &Path) -> StoreResult<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io_error(path, e)),
        }
    }

    /// Store the measurement at `path`, replacing any previous one
    ///
    /// # Errors
    /// Returns [`StoreError`] if the file cannot be written
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)
    }
}
