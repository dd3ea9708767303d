//! Append-only NDJSON logs
//!
//! One [`AppendLog`] handle is opened per run and passed to whoever produces
//! records. Each record is encoded up front and written with a single locked
//! `write_all`, so concurrent producers never interleave within a line and a
//! log cut short by a crash is still valid input for readers.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tabench_artifact::{CoverageSample, ExecutionMode, ExecutionResult, LogRecord, SkipRecord};
use tracing::{trace, warn};

/// Append-only log file
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AppendLog {
    /// Open `path` for appending, creating parent directories and the file
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the path is not writable
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(path.into(), false)
    }

    /// Open `path` after truncating it
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the path is not writable
    pub fn create(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(path.into(), true)
    }

    fn open_with(path: PathBuf, truncate: bool) -> StoreResult<Self> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&path).map_err(|e| StoreError::io_error(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Log location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one serializable record as a line
    ///
    /// # Errors
    /// Returns error if the record cannot be encoded or written
    pub fn append<T: Serialize>(&self, record: &T) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|e| StoreError::io_error(&self.path, e))?;
        trace!(path = %self.path.display(), bytes = line.len(), "record appended");
        Ok(())
    }

    /// Append an execution result in its log-line form
    ///
    /// # Errors
    /// Same as [`Self::append`]
    pub fn append_result(&self, result: &ExecutionResult) -> StoreResult<()> {
        self.append(&result.to_record())
    }

    /// Append a coverage sample
    ///
    /// # Errors
    /// Same as [`Self::append`]
    pub fn append_sample(&self, sample: &CoverageSample) -> StoreResult<()> {
        self.append(sample)
    }

    /// Append a skipped step
    ///
    /// # Errors
    /// Same as [`Self::append`]
    pub fn append_skip(&self, skip: &SkipRecord) -> StoreResult<()> {
        self.append(skip)
    }
}

/// Records read from a log, plus the count of lines that did not parse
#[derive(Debug, Clone, PartialEq)]
pub struct LogContents<T> {
    /// Valid records in file order
    pub records: Vec<T>,
    /// Non-empty lines that were skipped
    pub malformed: usize,
}

impl<T> Default for LogContents<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: 0,
        }
    }
}

/// Parse NDJSON text, skipping and counting lines that fail `parse`
pub fn parse_lines<T, F>(text: &str, mut parse: F) -> LogContents<T>
where
    F: FnMut(&str) -> Option<T>,
{
    let mut contents = LogContents::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse(line) {
            Some(record) => contents.records.push(record),
            None => contents.malformed += 1,
        }
    }
    contents
}

/// Log text; a log no run has written yet reads as empty
fn read_text(path: &Path) -> StoreResult<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "log not found, reading as empty");
            Ok(String::new())
        }
        Err(e) => Err(StoreError::io_error(path, e)),
    }
}

fn decode<T: DeserializeOwned>(path: &Path, line: &str) -> Option<T> {
    serde_json::from_str(line)
        .map_err(|e| warn!(path = %path.display(), error = %e, "skipping malformed log line"))
        .ok()
}

/// Read execution results; lines without a `mode` get `fallback_mode`
///
/// # Errors
/// Returns [`StoreError::Io`] if the log exists but cannot be read. A missing
/// log is empty. Malformed lines are counted, not raised.
pub fn read_results(path: &Path, fallback_mode: ExecutionMode) -> StoreResult<LogContents<ExecutionResult>> {
    let text = read_text(path)?;
    Ok(parse_lines(&text, |line| {
        let record: LogRecord = decode(path, line)?;
        ExecutionResult::from_record(record, fallback_mode)
            .map_err(|e| warn!(path = %path.display(), error = %e, "skipping invalid result"))
            .ok()
    }))
}

/// Read coverage samples
///
/// # Errors
/// Returns [`StoreError::Io`] if the log exists but cannot be read
pub fn read_samples(path: &Path) -> StoreResult<LogContents<CoverageSample>> {
    let text = read_text(path)?;
    Ok(parse_lines(&text, |line| {
        let sample: CoverageSample = decode(path, line)?;
        CoverageSample::new(sample.program_id, sample.time_budget_seconds, sample.branches_reached)
            .map_err(|e| warn!(path = %path.display(), error = %e, "skipping invalid sample"))
            .ok()
    }))
}

/// Read skipped steps
///
/// # Errors
/// Returns [`StoreError::Io`] if the log exists but cannot be read
pub fn read_skips(path: &Path) -> StoreResult<LogContents<SkipRecord>> {
    let text = read_text(path)?;
    Ok(parse_lines(&text, |line| decode(path, line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tabench_artifact::{ProgramId, RunStatus};

    fn id(n: u32) -> ProgramId {
        ProgramId::new(n).unwrap()
    }

    #[test]
    fn appended_results_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments/jse_base");
        let log = AppendLog::open(&path).unwrap();
        log.append_result(&ExecutionResult::completed(id(1), ExecutionMode::Full, 1.5, 0)).unwrap();
        log.append_result(&ExecutionResult::timed_out(id(2), ExecutionMode::Full, 10.0)).unwrap();

        let contents = read_results(&path, ExecutionMode::Full).unwrap();
        assert_eq!(contents.malformed, 0);
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.records[1].status(), RunStatus::Timeout);
        assert_eq!(contents.records[1].exit_code(), 124);
    }

    #[test]
    fn legacy_lines_and_garbage_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jse_diff_analysis");
        std::fs::write(
            &path,
            concat!(
                "{\"id\": 1, \"time\": 2.25, \"return_code\": 0}\n",
                "{\"id\": 2, \"time\": 10.01, \"return_code\": 31744, \"extra\": true}\n",
                "not json\n",
                "\n",
                "{\"id\": 0, \"time\": 1.0, \"return_code\": 0}\n",
                "{\"id\": 3, \"time\": 1.0, \"ret",
            ),
        )
        .unwrap();

        let contents = read_results(&path, ExecutionMode::Targeted).unwrap();
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.malformed, 3);
        assert_eq!(contents.records[0].mode(), ExecutionMode::Targeted);
        assert_eq!(contents.records[1].status(), RunStatus::Timeout);
    }

    #[test]
    fn create_truncates_and_open_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, "old\n").unwrap();
        AppendLog::create(&path).unwrap().append(&serde_json::json!({"a": 1})).unwrap();
        AppendLog::open(&path).unwrap().append(&serde_json::json!({"a": 2})).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jazzer_runs");
        let log = AppendLog::open(&path).unwrap();
        std::thread::scope(|scope| {
            for worker in 0..4u32 {
                let log = &log;
                scope.spawn(move || {
                    for n in 1..=25u32 {
                        let result = ExecutionResult::completed(id(worker * 100 + n), ExecutionMode::Fuzz, 0.1, 0);
                        log.append_result(&result).unwrap();
                    }
                });
            }
        });
        let contents = read_results(&path, ExecutionMode::Fuzz).unwrap();
        assert_eq!(contents.records.len(), 100);
        assert_eq!(contents.malformed, 0);
    }

    #[test]
    fn samples_read_back_and_invalid_budget_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jazzer_cov.jsonl");
        let log = AppendLog::open(&path).unwrap();
        log.append_sample(&CoverageSample::new(id(7), 1.0, 10).unwrap()).unwrap();
        log.append(&serde_json::json!({"program_id": 7, "time_budget_seconds": 0.0, "branches_reached": 1}))
            .unwrap();
        let contents = read_samples(&path).unwrap();
        assert_eq!(contents.records.len(), 1);
        assert_eq!(contents.malformed, 1);
    }

    #[test]
    fn skips_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipped.jsonl");
        let record = SkipRecord {
            program_id: id(4),
            workflow: "targeted".into(),
            skip: tabench_artifact::Skip::DiffFailed("parse error".into()),
        };
        let log = AppendLog::open(&path).unwrap();
        log.append_skip(&record).unwrap();
        log.append(&serde_json::json!({"program_id": 4})).unwrap();
        let contents = read_skips(&path).unwrap();
        assert_eq!(contents.records, vec![record]);
        assert_eq!(contents.malformed, 1);
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let results = read_results(&dir.path().join("absent"), ExecutionMode::Full).unwrap();
        assert_eq!(results, LogContents::default());
        let samples = read_samples(&dir.path().join("jazzer_cov.jsonl")).unwrap();
        assert!(samples.records.is_empty());
    }

    #[test]
    fn unreadable_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_results(dir.path(), ExecutionMode::Full), Err(StoreError::Io { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn appended_results_read_back_in_order(
            runs in proptest::collection::vec((1u32..10_000, 0.0f64..1e4, -1i32..256), 0..40),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("jse_results");
            let log = AppendLog::open(&path).unwrap();
            for &(n, elapsed, code) in &runs {
                log.append_result(&ExecutionResult::completed(id(n), ExecutionMode::Full, elapsed, code)).unwrap();
            }
            let contents = read_results(&path, ExecutionMode::Full).unwrap();
            prop_assert_eq!(contents.malformed, 0);
            let read: Vec<(u32, i32)> = contents.records.iter().map(|r| (r.program_id().get(), r.exit_code())).collect();
            let expected: Vec<(u32, i32)> = runs.iter().map(|&(n, _, code)| (n, code)).collect();
            prop_assert_eq!(read, expected);
        }

        #[test]
        fn every_non_blank_line_is_a_record_or_counted(lines in proptest::collection::vec("[^\\n\\r]{0,40}", 0..30)) {
            let text = lines.join("\n");
            let contents = parse_lines(&text, |line| line.parse::<i64>().ok());
            let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
            prop_assert_eq!(contents.records.len() + contents.malformed, non_blank);
        }
    }
}
