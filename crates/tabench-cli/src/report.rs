//! `tabench report`

use anyhow::{Context, Result};
use clap::ArgMatches;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabench_artifact::{ExecutionMode, ExecutionResult, ProgramId};
use tabench_driver::{HarnessConfig, COVERAGE_LOG, FULL_LOG, OVERHEAD_FILE, SKIP_LOG, TARGETED_LOG, TIMING_LOG};
use tabench_report::{
    aggregate, cache_sizes, compare_coverage, compare_targeted, load_programs, write_rows, RowExtras,
};
use tabench_store::{read_results, read_samples, read_skips, CacheStore, Corpus, LogContents, Overhead};
use tracing::info;

pub(crate) fn run(config: &HarnessConfig, args: &ArgMatches) -> Result<()> {
    let kind = args.get_one::<String>("kind").map_or("timing", String::as_str);
    let out = args
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| config.log_path(&format!("{kind}_rows.jsonl")));
    let corpus = Corpus::new(&config.corpus_dir);
    let store = CacheStore::new(&config.results_dir, config.engine_label.clone());

    let rows = match kind {
        "targeted" => {
            let full = results(config, FULL_LOG, ExecutionMode::Full)?;
            let targeted = results(config, TARGETED_LOG, ExecutionMode::Targeted)?;
            let skips = read_skips(&config.log_path(SKIP_LOG)).context("reading skipped steps")?;
            let programs = load_programs(&corpus, full.records.iter().chain(&targeted.records));
            let caches = cache_sizes(&store, ids(&full.records));
            let overhead = Overhead::load(&config.log_path(OVERHEAD_FILE)).context("reading overhead")?;

            let mut cmp = compare_targeted(
                &full.records,
                &targeted.records,
                &skips.records,
                &programs,
                &caches,
                overhead.as_ref(),
            );
            cmp.dropped.add_malformed_lines(full.malformed + targeted.malformed + skips.malformed);
            println!("{cmp}");
            write_rows(&out, &cmp.rows)
        }
        "coverage" => {
            let jse = results(config, TIMING_LOG, ExecutionMode::Full)?;
            let samples = read_samples(&config.log_path(COVERAGE_LOG)).context("reading coverage samples")?;
            let programs = load_programs(&corpus, &jse.records);

            let mut cmp = compare_coverage(&jse.records, &samples.records, &programs, &config.fuzz_budgets_secs)?;
            cmp.dropped.add_malformed_lines(jse.malformed + samples.malformed);
            println!("{cmp}");
            write_rows(&out, &cmp.rows)
        }
        _ => {
            let log = args.get_one::<String>("log").map_or(TIMING_LOG, String::as_str);
            let timing = results(config, log, ExecutionMode::Full)?;
            let programs = load_programs(&corpus, &timing.records);
            let extras = RowExtras {
                cache_bytes: cache_sizes(&store, ids(&timing.records)),
                branches_reached: widest_budget_coverage(config)?,
            };

            let mut agg = aggregate(&timing.records, &programs, &extras);
            agg.dropped.add_malformed_lines(timing.malformed);
            println!("{agg}");
            write_rows(&out, &agg.rows)
        }
    };
    rows.with_context(|| format!("writing {}", out.display()))?;
    info!(kind, out = %out.display(), "report written");
    Ok(())
}

fn results(config: &HarnessConfig, log: &str, fallback: ExecutionMode) -> Result<LogContents<ExecutionResult>> {
    let path = config.log_path(log);
    read_results(&path, fallback).with_context(|| format!("reading {}", path.display()))
}

fn ids(results: &[ExecutionResult]) -> Vec<ProgramId> {
    let mut ids: Vec<ProgramId> = results.iter().map(ExecutionResult::program_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Latest coverage per id at the largest configured budget, if fuzzing ran
fn widest_budget_coverage(config: &HarnessConfig) -> Result<BTreeMap<ProgramId, u64>> {
    let path = config.log_path(COVERAGE_LOG);
    let Some(widest) = config.fuzz_budgets_secs.iter().copied().reduce(f64::max) else {
        return Ok(BTreeMap::new());
    };
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let samples = read_samples(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(samples
        .records
        .into_iter()
        .filter(|s| (s.time_budget_seconds - widest).abs() < 5e-4)
        .map(|s| (s.program_id, s.branches_reached))
        .collect())
}
