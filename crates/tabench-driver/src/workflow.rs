//! Benchmark workflows
//!
//! A [`Harness`] owns the configuration, the corpus view and the cache store
//! for one run and drives the per-program steps:
//!
//! | workflow      | per id                                  | result log          |
//! |---------------|-----------------------------------------|---------------------|
//! | `full`        | full run with cache writing             | `jse_base`          |
//! | `timing`      | full run without cache writing          | `jse_results`       |
//! | `targeted`    | diff, cache lookup, targeted or cold    | `jse_diff_analysis` |
//! | `fuzz`        | one fuzz run per budget                 | `jazzer_runs`       |
//! | `experiment1` | timing, then fuzz                       | both of the above   |
//! | `experiment2` | full, then targeted                     | both of the above   |
//!
//! Every skipped step is also appended to `skipped.jsonl`, so reports can
//! tell an abandoned targeted step from a missing one.
//!
//! Ids run in ascending order. With `jobs > 1` several ids run at once but
//! the steps of one id stay in order. Engine invocations never overlap: the
//! engine claims `JSE<max+1>` under the results directory with a
//! non-recursive `mkdir`, and a new cache is located the same way. Diffing
//! and fuzzing are what `jobs` parallelizes.

use crate::command::EngineCommand;
use crate::config::{HarnessConfig, COVERAGE_LOG, FULL_LOG, FUZZ_LOG, SKIP_LOG, TARGETED_LOG, TIMING_LOG};
use crate::driver::ExecutionDriver;
use crate::error::{DriverError, DriverResult};
use crate::fuzz::branches_reached;
use crate::runner::{ProcessExit, ProcessRunner};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabench_artifact::{
    ContentHash, CoverageSample, ExecutionMode, ExecutionResult, ProgramId, RunStatus, Skip, SkipRecord,
};
use tabench_store::{AppendLog, CacheLookup, CacheStore, Corpus, StoreError};
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Everything one workflow did for one program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramReport {
    /// Results appended, in invocation order
    pub results: Vec<ExecutionResult>,
    /// Steps that were skipped
    pub skipped: Vec<Skip>,
    /// Coverage samples appended
    pub samples: usize,
}

impl ProgramReport {
    fn skipped(skip: Skip) -> Self {
        Self {
            skipped: vec![skip],
            ..Self::default()
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.results.extend(other.results);
        self.skipped.extend(other.skipped);
        self.samples += other.samples;
        self
    }
}

/// Tally of one workflow over all requested ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Identifier of this batch in the logs
    pub run_id: Ulid,
    /// Workflow name
    pub workflow: &'static str,
    /// Ids requested
    pub programs: usize,
    /// Invocations that exited zero
    pub ok: usize,
    /// Invocations that exited non-zero or did not launch
    pub failed: usize,
    /// Invocations killed at their ceiling
    pub timed_out: usize,
    /// Targeted requests that ran cold
    pub cold: usize,
    /// Coverage samples recorded
    pub samples: usize,
    /// Skipped steps by program
    pub skipped: Vec<(ProgramId, Skip)>,
}

impl BatchSummary {
    fn new(run_id: Ulid, workflow: &'static str, reports: Vec<(ProgramId, ProgramReport)>) -> Self {
        let mut summary = Self {
            run_id,
            workflow,
            programs: reports.len(),
            ok: 0,
            failed: 0,
            timed_out: 0,
            cold: 0,
            samples: 0,
            skipped: Vec::new(),
        };
        let mut reports = reports;
        reports.sort_by_key(|(id, _)| *id);
        for (id, report) in reports {
            for result in &report.results {
                match result.status() {
                    RunStatus::Ok => summary.ok += 1,
                    RunStatus::Failed => summary.failed += 1,
                    RunStatus::Timeout => summary.timed_out += 1,
                }
                if result.mode() == ExecutionMode::Cold {
                    summary.cold += 1;
                }
            }
            summary.samples += report.samples;
            summary.skipped.extend(report.skipped.into_iter().map(|skip| (id, skip)));
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {} programs, {} ok, {} failed, {} timed out",
            self.workflow, self.run_id, self.programs, self.ok, self.failed, self.timed_out
        )?;
        if self.cold > 0 {
            write!(f, ", {} cold", self.cold)?;
        }
        if self.samples > 0 {
            write!(f, ", {} coverage samples", self.samples)?;
        }
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
            for (id, skip) in &self.skipped {
                write!(f, "\n  {id}: {skip}")?;
            }
        }
        Ok(())
    }
}

/// Result logs of the workflows, opened on demand
struct Drivers {
    full: Option<ExecutionDriver>,
    timing: Option<ExecutionDriver>,
    targeted: Option<ExecutionDriver>,
    fuzz: Option<(ExecutionDriver, Arc<AppendLog>)>,
    skipped: AppendLog,
}

/// One benchmark run over a corpus
pub struct Harness {
    config: HarnessConfig,
    corpus: Corpus,
    store: CacheStore,
    runner: Arc<dyn ProcessRunner>,
    engine_slot: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("corpus", &self.corpus.dir())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Create harness from a validated configuration
    pub fn new(config: HarnessConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let corpus = Corpus::new(&config.corpus_dir);
        let store = CacheStore::new(&config.results_dir, config.engine_label.clone());
        Self {
            config,
            corpus,
            store,
            runner,
            engine_slot: tokio::sync::Mutex::new(()),
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Cache store in use
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Ids `1..=programs` when configured, else every base program found
    #[must_use]
    pub fn program_ids(&self) -> Vec<ProgramId> {
        match self.config.programs {
            Some(n) => (1..=n).filter_map(|raw| ProgramId::new(raw).ok()).collect(),
            None => self.corpus.discover(),
        }
    }

    /// Full runs with cache writing
    ///
    /// # Errors
    /// Returns [`DriverError`] if a log or the cache store cannot be written
    pub async fn full(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[FULL_LOG])?;
        self.batch("full", ids, &drivers, |id| self.full_step(&drivers, id)).await
    }

    /// Full runs without cache writing
    ///
    /// # Errors
    /// Returns [`DriverError`] if the log cannot be written
    pub async fn timing(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[TIMING_LOG])?;
        self.batch("timing", ids, &drivers, |id| self.timing_step(&drivers, id)).await
    }

    /// Targeted runs, falling back to cold runs without a usable cache
    ///
    /// # Errors
    /// Returns [`DriverError`] if a log, the diff directory or the cache store
    /// cannot be accessed
    pub async fn targeted(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[TARGETED_LOG])?;
        self.batch("targeted", ids, &drivers, |id| self.targeted_step(&drivers, id)).await
    }

    /// One fuzz run per configured budget
    ///
    /// # Errors
    /// Returns [`DriverError`] if a log cannot be written
    pub async fn fuzz(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[FUZZ_LOG])?;
        self.batch("fuzz", ids, &drivers, |id| self.fuzz_step(&drivers, id)).await
    }

    /// Timing runs and fuzz runs, per id in that order
    ///
    /// # Errors
    /// Same as [`Self::timing`] and [`Self::fuzz`]
    pub async fn experiment1(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[TIMING_LOG, FUZZ_LOG])?;
        self.batch("experiment1", ids, &drivers, |id| {
            let drivers = &drivers;
            async move {
                let timing = self.timing_step(drivers, id).await?;
                Ok::<_, DriverError>(timing.merge(self.fuzz_step(drivers, id).await?))
            }
        })
        .await
    }

    /// Full run then targeted run, per id in that order
    ///
    /// # Errors
    /// Same as [`Self::full`] and [`Self::targeted`]
    pub async fn experiment2(&self, ids: &[ProgramId]) -> DriverResult<BatchSummary> {
        let drivers = self.drivers(&[FULL_LOG, TARGETED_LOG])?;
        self.batch("experiment2", ids, &drivers, |id| {
            let drivers = &drivers;
            async move {
                let full = self.full_step(drivers, id).await?;
                Ok::<_, DriverError>(full.merge(self.targeted_step(drivers, id).await?))
            }
        })
        .await
    }

    async fn batch<F, Fut>(
        &self,
        workflow: &'static str,
        ids: &[ProgramId],
        drivers: &Drivers,
        step: F,
    ) -> DriverResult<BatchSummary>
    where
        F: Fn(ProgramId) -> Fut,
        Fut: Future<Output = DriverResult<ProgramReport>>,
    {
        let run_id = Ulid::new();
        let span = info_span!("batch", %run_id, workflow);
        async {
            info!(programs = ids.len(), jobs = self.config.jobs, "batch started");
            let reports: Vec<(ProgramId, ProgramReport)> = stream::iter(ids.iter().copied())
                .map(|id| {
                    let fut = step(id);
                    async move { fut.await.map(|report| (id, report)) }
                })
                .buffer_unordered(self.config.jobs)
                .try_collect()
                .await?;
            let summary = BatchSummary::new(run_id, workflow, reports);
            for (id, skip) in &summary.skipped {
                drivers.skipped.append_skip(&SkipRecord {
                    program_id: *id,
                    workflow: workflow.to_string(),
                    skip: skip.clone(),
                })?;
            }
            info!(
                ok = summary.ok,
                failed = summary.failed,
                timed_out = summary.timed_out,
                skipped = summary.skipped.len(),
                "batch finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    fn drivers(&self, logs: &[&str]) -> DriverResult<Drivers> {
        let open = |name: &str| -> DriverResult<ExecutionDriver> {
            let log = AppendLog::open(self.config.log_path(name))?;
            Ok(ExecutionDriver::new(self.runner.clone(), Arc::new(log)))
        };
        let mut drivers = Drivers {
            full: None,
            timing: None,
            targeted: None,
            fuzz: None,
            skipped: AppendLog::open(self.config.log_path(SKIP_LOG))?,
        };
        for &name in logs {
            match name {
                FULL_LOG => drivers.full = Some(open(FULL_LOG)?),
                TIMING_LOG => drivers.timing = Some(open(TIMING_LOG)?),
                TARGETED_LOG => drivers.targeted = Some(open(TARGETED_LOG)?),
                FUZZ_LOG => {
                    let coverage = Arc::new(AppendLog::open(self.config.log_path(COVERAGE_LOG))?);
                    drivers.fuzz = Some((open(FUZZ_LOG)?, coverage));
                }
                _ => {}
            }
        }
        Ok(drivers)
    }

    fn source_or_skip(path: PathBuf) -> Result<PathBuf, ProgramReport> {
        if path.is_file() {
            Ok(path)
        } else {
            warn!(path = %path.display(), "program input missing, step skipped");
            Err(ProgramReport::skipped(Skip::MissingSource(path)))
        }
    }

    async fn full_step(&self, drivers: &Drivers, id: ProgramId) -> DriverResult<ProgramReport> {
        let Some(driver) = &drivers.full else {
            return Ok(ProgramReport::default());
        };
        let source = match Self::source_or_skip(self.corpus.source_path(id)) {
            Ok(path) => path,
            Err(report) => return Ok(report),
        };
        let base_digest = ContentHash::of_file(&source).map_err(|e| DriverError::io_error(&source, e))?;
        let command = EngineCommand::full(&self.config.engine.full, &source, true, self.config.full_timeout())?;

        let _slot = self.engine_slot.lock().await;
        self.store.discard(id)?;
        let before = self.store.engine_dirs();
        let invocation = driver.run(&command, id, ExecutionMode::Full).await?;
        let produced = self.store.produced_since(&before);

        if invocation.result.is_success() {
            let artifact = match produced.split_last() {
                Some((&newest, older)) => {
                    for &n in older {
                        warn!(program_id = %id, dir = n, "extra cache from one run discarded");
                        self.store.discard_produced(n)?;
                    }
                    self.store.adopt(id, newest, Some(base_digest))?
                }
                None => self.store.register(id, Some(base_digest))?,
            };
            match artifact {
                Some(cache) => debug!(program_id = %id, byte_size = cache.byte_size, "cache stored"),
                None => warn!(program_id = %id, "full run wrote no cache"),
            }
        } else {
            for n in produced {
                self.store.discard_produced(n)?;
            }
            if self.store.discard(id)? {
                debug!(program_id = %id, "partial cache discarded");
            }
        }
        Ok(ProgramReport {
            results: vec![invocation.result],
            ..ProgramReport::default()
        })
    }

    async fn timing_step(&self, drivers: &Drivers, id: ProgramId) -> DriverResult<ProgramReport> {
        let Some(driver) = &drivers.timing else {
            return Ok(ProgramReport::default());
        };
        let source = match Self::source_or_skip(self.corpus.source_path(id)) {
            Ok(path) => path,
            Err(report) => return Ok(report),
        };
        let command = EngineCommand::full(&self.config.engine.full, &source, false, self.config.full_timeout())?;
        let invocation = {
            let _slot = self.engine_slot.lock().await;
            driver.run(&command, id, ExecutionMode::Full).await?
        };
        Ok(ProgramReport {
            results: vec![invocation.result],
            ..ProgramReport::default()
        })
    }

    async fn targeted_step(&self, drivers: &Drivers, id: ProgramId) -> DriverResult<ProgramReport> {
        let Some(driver) = &drivers.targeted else {
            return Ok(ProgramReport::default());
        };
        let base = match Self::source_or_skip(self.corpus.source_path(id)) {
            Ok(path) => path,
            Err(report) => return Ok(report),
        };
        let modified = match Self::source_or_skip(self.corpus.diff_source_path(id)) {
            Ok(path) => path,
            Err(report) => return Ok(report),
        };

        let diff_path = self.config.diff_path(id);
        if let Err(message) = self.extract_diff(id, &base, &modified, &diff_path).await? {
            warn!(program_id = %id, error = %message, "diff failed, targeted run abandoned");
            return Ok(ProgramReport::skipped(Skip::DiffFailed(message)));
        }

        let base_digest = ContentHash::of_file(&base).map_err(|e| DriverError::io_error(&base, e))?;
        let lookup = match self.store.lookup(id, &base_digest) {
            Ok(lookup) => lookup,
            Err(StoreError::CorruptMeta { path, message }) => {
                warn!(program_id = %id, path = %path.display(), %message, "unreadable cache sidecar ignored");
                CacheLookup::Absent
            }
            Err(e) => return Err(e.into()),
        };

        let timeout = self.config.targeted_timeout();
        let (command, mode) = match lookup.into_valid() {
            Some(cache) => (
                EngineCommand::targeted(&self.config.engine.targeted, &cache.path, &diff_path, timeout)?,
                ExecutionMode::Targeted,
            ),
            None => {
                info!(program_id = %id, "no reusable cache, running cold");
                (
                    EngineCommand::cold(&self.config.engine.full, &modified, timeout)?,
                    ExecutionMode::Cold,
                )
            }
        };
        let invocation = {
            let _slot = self.engine_slot.lock().await;
            driver.run(&command, id, mode).await?
        };
        Ok(ProgramReport {
            results: vec![invocation.result],
            ..ProgramReport::default()
        })
    }

    /// Write the diff for `id`; the inner error aborts only this program
    async fn extract_diff(
        &self,
        id: ProgramId,
        base: &Path,
        modified: &Path,
        diff_path: &Path,
    ) -> DriverResult<Result<(), String>> {
        let Some(prefix) = self.config.differ.external() else {
            let (base, modified, result) = (base.to_path_buf(), modified.to_path_buf(), diff_path.to_path_buf());
            let computed =
                tokio::task::spawn_blocking(move || tabench_diff::compute_diff(id, &base, &modified, &result))
                    .await
                    .map_err(|e| DriverError::Join(e.to_string()))?;
            return Ok(computed
                .map(|artifact| debug!(program_id = %id, changes = artifact.change_count, "diff written"))
                .map_err(|e| e.to_string()));
        };

        if let Some(dir) = diff_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| DriverError::io_error(dir, e))?;
        }
        match std::fs::remove_file(diff_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DriverError::io_error(diff_path, e)),
        }
        let command = EngineCommand::differ(prefix, base, modified, diff_path, self.config.targeted_timeout())?;
        let outcome = self.runner.run(&command).await;
        Ok(match outcome.exit {
            ProcessExit::Exited(0) if diff_path.is_file() => Ok(()),
            ProcessExit::Exited(0) => Err("differ wrote no result".to_string()),
            ProcessExit::Exited(code) => Err(format!("differ exited with {code}")),
            ProcessExit::TimedOut => Err("differ timed out".to_string()),
            ProcessExit::LaunchFailed(message) => Err(message),
        })
    }

    async fn fuzz_step(&self, drivers: &Drivers, id: ProgramId) -> DriverResult<ProgramReport> {
        let Some((driver, coverage)) = &drivers.fuzz else {
            return Ok(ProgramReport::default());
        };
        let harness = match Self::source_or_skip(self.corpus.fuzz_source_path(id)) {
            Ok(path) => path,
            Err(report) => return Ok(report),
        };

        let mut report = ProgramReport::default();
        for &budget in &self.config.fuzz_budgets_secs {
            let command = EngineCommand::fuzz(&self.config.fuzzer, &harness, budget, self.config.grace())?;
            let invocation = driver.run_fuzz(&command, id, budget).await?;
            match branches_reached(&invocation.stdout) {
                Some(reached) => {
                    let sample = CoverageSample::new(id, budget, reached).map_err(StoreError::from)?;
                    coverage.append_sample(&sample)?;
                    report.samples += 1;
                }
                None => warn!(program_id = %id, budget, "fuzzer reported no branch coverage"),
            }
            report.results.push(invocation.result);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TokioRunner;
    use pretty_assertions::assert_eq;
    use tabench_artifact::TIMEOUT_EXIT_CODE;
    use tabench_store::{read_results, read_samples, read_skips};
    use tabench_test_utils::{FakeEngine, Workspace};

    fn ids(raw: &[u32]) -> Vec<ProgramId> {
        raw.iter().map(|n| ProgramId::new(*n).unwrap()).collect()
    }

    fn harness(ws: &Workspace, engine: &FakeEngine) -> Harness {
        let prefix = ws.install("engine.sh", engine);
        let config = HarnessConfig {
            corpus_dir: ws.corpus_dir(),
            results_dir: ws.results_dir(),
            log_dir: ws.log_dir(),
            engine: crate::config::EngineConfig {
                full: prefix.clone(),
                targeted: prefix.clone(),
            },
            fuzzer: prefix,
            fuzz_budgets_secs: vec![0.1, 0.2],
            timeouts: crate::config::Timeouts {
                full_secs: 1.0,
                targeted_secs: 1.0,
                grace_secs: 0.5,
            },
            ..HarnessConfig::default()
        };
        config.validate().unwrap();
        Harness::new(config, Arc::new(TokioRunner::new()))
    }

    #[tokio::test]
    async fn full_then_targeted_reuses_cache() {
        let ws = Workspace::new();
        for n in 1..=3 {
            ws.add_program(n, 8);
        }
        // Results dir already holds unrelated engine output.
        std::fs::create_dir_all(ws.results_dir().join("JSE1")).unwrap();
        let h = harness(&ws, &FakeEngine::new());

        let summary = h.experiment2(&ids(&[1, 2, 3])).await.unwrap();
        assert_eq!((summary.ok, summary.failed, summary.cold), (6, 0, 0));

        for id in ids(&[1, 2, 3]) {
            let cache = h.store().read(id).unwrap().unwrap();
            assert_eq!(cache.path, h.store().cache_path(id));
            assert!(cache.base_digest.is_some());
            assert!(h.config().diff_path(id).is_file());
        }
        let targeted = read_results(&h.config().log_path(TARGETED_LOG), ExecutionMode::Targeted).unwrap();
        let modes: Vec<ExecutionMode> = targeted.records.iter().map(ExecutionResult::mode).collect();
        assert_eq!(modes, vec![ExecutionMode::Targeted; 3]);
        assert!(ws.engine_calls().iter().any(|c| c.contains("--diff --cache=")));
    }

    #[tokio::test]
    async fn timed_out_full_run_leaves_no_cache_and_targeted_goes_cold() {
        let ws = Workspace::new();
        ws.add_program(3, 8);
        let h = harness(&ws, &FakeEngine::new().hang_on("3.jse.js"));
        let id = ids(&[3]);

        let full = h.full(&id).await.unwrap();
        assert_eq!(full.timed_out, 1);
        let base = read_results(&h.config().log_path(FULL_LOG), ExecutionMode::Full).unwrap();
        assert_eq!(base.records[0].exit_code(), TIMEOUT_EXIT_CODE);
        assert!(base.records[0].elapsed_seconds() < 1.0 + 2.0);
        assert_eq!(h.store().read(id[0]).unwrap(), None);
        assert!(h.store().produced_since(&std::collections::BTreeSet::new()).is_empty());

        let targeted = h.targeted(&id).await.unwrap();
        assert_eq!(targeted.cold, 1);
        let log = read_results(&h.config().log_path(TARGETED_LOG), ExecutionMode::Targeted).unwrap();
        assert_eq!(log.records[0].mode(), ExecutionMode::Cold);
    }

    #[tokio::test]
    async fn stale_cache_runs_cold() {
        let ws = Workspace::new();
        ws.add_program(1, 8);
        let h = harness(&ws, &FakeEngine::new());
        let id = ids(&[1]);
        h.full(&id).await.unwrap();
        ws.write_corpus_file("1.jse.js", "let changed = 1;\n");

        let summary = h.targeted(&id).await.unwrap();
        assert_eq!(summary.cold, 1);
    }

    #[tokio::test]
    async fn unparsable_variant_skips_only_targeted_step() {
        let ws = Workspace::new();
        ws.add_program(2, 8);
        ws.write_corpus_file("2.jse.diff.js", "if (x > {\n");
        let h = harness(&ws, &FakeEngine::new());

        let summary = h.experiment2(&ids(&[2])).await.unwrap();
        assert_eq!(summary.ok, 1);
        assert!(matches!(summary.skipped[0].1, Skip::DiffFailed(_)));
        assert!(h.store().read(ProgramId::new(2).unwrap()).unwrap().is_some());

        let logged = read_skips(&h.config().log_path(SKIP_LOG)).unwrap();
        assert_eq!(logged.records.len(), 1);
        assert_eq!(logged.records[0].workflow, "experiment2");
        assert_eq!(logged.records[0].skip, summary.skipped[0].1);
    }

    #[tokio::test]
    async fn missing_programs_are_skipped_not_fatal() {
        let ws = Workspace::new();
        ws.add_program(1, 8);
        let h = harness(&ws, &FakeEngine::new());
        let summary = h.full(&ids(&[1, 2])).await.unwrap();
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].0.get(), 2);
    }

    #[tokio::test]
    async fn fuzz_records_run_and_sample_per_budget() {
        let ws = Workspace::new();
        ws.add_program(7, 40);
        let h = harness(&ws, &FakeEngine::new().branches(10));

        let summary = h.fuzz(&ids(&[7])).await.unwrap();
        assert_eq!((summary.ok, summary.samples), (2, 2));
        let samples = read_samples(&h.config().log_path(COVERAGE_LOG)).unwrap();
        let budgets: Vec<u64> = samples.records.iter().map(CoverageSample::budget_millis).collect();
        assert_eq!(budgets, vec![100, 200]);
        assert!(samples.records.iter().all(|s| s.branches_reached == 10));
        let runs = read_results(&h.config().log_path(FUZZ_LOG), ExecutionMode::Fuzz).unwrap();
        assert_eq!(runs.records[1].time_budget_seconds(), Some(0.2));
    }

    #[tokio::test]
    async fn parallel_jobs_keep_every_cache() {
        let ws = Workspace::new();
        for n in 1..=4 {
            ws.add_program(n, 8);
        }
        let mut h = harness(&ws, &FakeEngine::new());
        h.config.jobs = 3;
        let summary = h.experiment2(&ids(&[1, 2, 3, 4])).await.unwrap();
        assert_eq!((summary.ok, summary.cold), (8, 0));
        let full = read_results(&h.config().log_path(FULL_LOG), ExecutionMode::Full).unwrap();
        assert_eq!(full.records.len(), 4);
        assert_eq!(full.malformed, 0);
    }

    #[tokio::test]
    async fn parallel_jobs_never_share_an_output_directory() {
        let ws = Workspace::new();
        for n in 1..=6 {
            ws.add_program(n, 8);
        }
        // Ids 2 and 5 have no usable cache, so their targeted step runs cold
        // while other ids are still in their full step.
        let mut h = harness(&ws, &FakeEngine::new().fail_on("2.jse.js").fail_on("5.jse.js"));
        h.config.jobs = 3;
        let summary = h.experiment2(&ids(&[1, 2, 3, 4, 5, 6])).await.unwrap();
        assert_eq!((summary.ok, summary.failed, summary.cold), (10, 2, 2));

        let timing = h.timing(&ids(&[1, 2, 3, 4, 5, 6])).await.unwrap();
        assert_eq!((timing.ok, timing.failed), (4, 2));
        let targeted = read_results(&h.config().log_path(TARGETED_LOG), ExecutionMode::Targeted).unwrap();
        assert!(targeted.records.iter().all(ExecutionResult::is_success));
    }

    #[test]
    fn summary_display_lists_skips() {
        let id = ProgramId::new(4).unwrap();
        let summary = BatchSummary::new(
            Ulid::nil(),
            "full",
            vec![(id, ProgramReport::skipped(Skip::MissingSource(PathBuf::from("randjs/4.jse.js"))))],
        );
        let text = summary.to_string();
        assert!(text.contains("1 skipped"));
        assert!(text.contains("4: missing randjs/4.jse.js"));
    }
}
