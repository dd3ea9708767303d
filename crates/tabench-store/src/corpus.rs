//! Corpus loading
//!
//! Programs live flat in one directory, numbered from one:
//! `{id}.jse.js`, `{id}.jse.diff.js`, `{id}.jazzer.js`, `{id}.stats.json`.
//! Stats files are parsed once per path and kept in a small moka cache, since
//! a single report may resolve the same id for several modes.

use moka::sync::Cache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabench_artifact::{ProgramId, ProgramRecord, StaticMetrics};
use tracing::warn;

/// Why a program could not be turned into a [`ProgramRecord`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordIssue {
    /// Source or stats file does not exist
    #[error("missing {0}")]
    Missing(PathBuf),
    /// Stats file exists but does not hold valid metrics
    #[error("malformed stats: {0}")]
    Malformed(String),
    /// File exists but cannot be read as text
    #[error("cannot read {0}: {1}")]
    Unreadable(PathBuf, String),
}

impl RecordIssue {
    fn from_io(path: &Path, e: &std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::Missing(path.to_path_buf()),
            _ => Self::Unreadable(path.to_path_buf(), e.to_string()),
        }
    }
}

/// Outcome of loading a batch of ids
#[derive(Debug, Clone, Default)]
pub struct CorpusScan {
    /// Loaded records, in requested order
    pub records: Vec<ProgramRecord>,
    /// Ids that could not be loaded, with the reason
    pub excluded: Vec<(ProgramId, RecordIssue)>,
}

/// Read-only view over a corpus directory
#[derive(Debug, Clone)]
pub struct Corpus {
    dir: PathBuf,
    stats: Cache<PathBuf, Arc<StaticMetrics>>,
}

impl Corpus {
    /// Default number of stats records kept in memory
    pub const STATS_CAPACITY: u64 = 4_096;

    /// Create a view over `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stats: Cache::new(Self::STATS_CAPACITY),
        }
    }

    /// Corpus directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base program path
    #[must_use]
    pub fn source_path(&self, id: ProgramId) -> PathBuf {
        self.dir.join(format!("{id}.jse.js"))
    }

    /// Modified variant path
    #[must_use]
    pub fn diff_source_path(&self, id: ProgramId) -> PathBuf {
        self.dir.join(format!("{id}.jse.diff.js"))
    }

    /// Fuzz harness path
    #[must_use]
    pub fn fuzz_source_path(&self, id: ProgramId) -> PathBuf {
        self.dir.join(format!("{id}.jazzer.js"))
    }

    /// Stats file path
    #[must_use]
    pub fn stats_path(&self, id: ProgramId) -> PathBuf {
        self.dir.join(format!("{id}.stats.json"))
    }

    /// Static metrics for `id`, parsed at most once per corpus view
    ///
    /// # Errors
    /// Returns [`RecordIssue`] if the stats file is missing, unreadable or
    /// malformed
    pub fn metrics(&self, id: ProgramId) -> Result<Arc<StaticMetrics>, RecordIssue> {
        let path = self.stats_path(id);
        self.stats
            .try_get_with(path.clone(), || {
                let text = std::fs::read_to_string(&path).map_err(|e| RecordIssue::from_io(&path, &e))?;
                StaticMetrics::from_stats_text(&text)
                    .map(Arc::new)
                    .map_err(|e| RecordIssue::Malformed(e.to_string()))
            })
            .map_err(|e| (*e).clone())
    }

    /// Load one program
    ///
    /// Optional variants are attached only when their files exist.
    ///
    /// # Errors
    /// Returns [`RecordIssue`] if the base source or stats are unusable
    pub fn load(&self, id: ProgramId) -> Result<ProgramRecord, RecordIssue> {
        let source = self.source_path(id);
        let text = std::fs::read_to_string(&source).map_err(|e| RecordIssue::from_io(&source, &e))?;
        let metrics = self.metrics(id)?;

        let mut record = ProgramRecord::new(id, source, (*metrics).clone()).with_source_lines(text.lines().count());
        let diff = self.diff_source_path(id);
        if diff.is_file() {
            record = record.with_diff_source(diff);
        }
        let fuzz = self.fuzz_source_path(id);
        if fuzz.is_file() {
            record = record.with_fuzz_source(fuzz);
        }
        Ok(record)
    }

    /// Load every id, collecting exclusions instead of failing
    pub fn load_all(&self, ids: impl IntoIterator<Item = ProgramId>) -> CorpusScan {
        let mut scan = CorpusScan::default();
        for id in ids {
            match self.load(id) {
                Ok(record) => scan.records.push(record),
                Err(issue) => {
                    warn!(program_id = %id, reason = %issue, "program excluded");
                    scan.excluded.push((id, issue));
                }
            }
        }
        scan
    }

    /// Ids `1..=n` for which a base program exists, ascending
    #[must_use]
    pub fn discover(&self) -> Vec<ProgramId> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<ProgramId> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".jse.js")?;
                ProgramId::new(stem.parse().ok()?).ok()
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATS: &str = r#"{"NUM_BRANCHES":40,"AVE_AST_DEPTH":1.5,"AVE_BRANCH_LENGTH":10.0,"AVE_CONDITIONALS_PER_BRANCH":0.5}"#;

    fn id(n: u32) -> ProgramId {
        ProgramId::new(n).unwrap()
    }

    fn corpus() -> (tempfile::TempDir, Corpus) {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 3] {
            std::fs::write(dir.path().join(format!("{n}.jse.js")), "let a = 1;\nif (a) {}\n").unwrap();
        }
        std::fs::write(dir.path().join("1.stats.json"), STATS).unwrap();
        std::fs::write(dir.path().join("1.jse.diff.js"), "let a = 2;\n").unwrap();
        std::fs::write(dir.path().join("3.stats.json"), "{\"NUM_BRANCHES\": 4}").unwrap();
        let corpus = Corpus::new(dir.path());
        (dir, corpus)
    }

    #[test]
    fn load_attaches_existing_variants() {
        let (_dir, corpus) = corpus();
        let record = corpus.load(id(1)).unwrap();
        assert_eq!(record.static_metrics().branch_count, 40);
        assert_eq!(record.source_lines(), Some(2));
        assert!(record.diff_source_path().is_some());
        assert!(record.fuzz_source_path().is_none());
    }

    #[test]
    fn load_all_reports_missing_and_malformed() {
        let (_dir, corpus) = corpus();
        let scan = corpus.load_all([id(1), id(2), id(3), id(4)]);
        assert_eq!(scan.records.len(), 1);
        let reasons: Vec<(u32, bool)> = scan
            .excluded
            .iter()
            .map(|(id, issue)| (id.get(), matches!(issue, RecordIssue::Missing(_))))
            .collect();
        assert_eq!(reasons, vec![(2, true), (3, false), (4, true)]);
    }

    #[test]
    fn undecodable_files_are_unreadable_not_missing() {
        let (dir, corpus) = corpus();
        std::fs::write(dir.path().join("2.jse.js"), [0x66, 0x6f, 0xff, 0xfe, 0x0a]).unwrap();
        std::fs::write(dir.path().join("2.stats.json"), STATS).unwrap();
        std::fs::write(dir.path().join("3.stats.json"), [0xc3, 0x28]).unwrap();

        let source = dir.path().join("2.jse.js");
        assert!(matches!(corpus.load(id(2)), Err(RecordIssue::Unreadable(path, _)) if path == source));
        let stats = dir.path().join("3.stats.json");
        assert!(matches!(corpus.load(id(3)), Err(RecordIssue::Unreadable(path, _)) if path == stats));
    }

    #[test]
    fn metrics_are_cached() {
        let (dir, corpus) = corpus();
        let first = corpus.metrics(id(1)).unwrap();
        std::fs::remove_file(dir.path().join("1.stats.json")).unwrap();
        let second = corpus.metrics(id(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn discover_lists_base_programs() {
        let (dir, corpus) = corpus();
        std::fs::write(dir.path().join("10.jse.js"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let ids: Vec<u32> = corpus.discover().into_iter().map(ProgramId::get).collect();
        assert_eq!(ids, vec![1, 2, 3, 10]);
    }
}
