//! End-to-end runs of the `tabench` binary against scripted engines

use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tabench_test_utils::{FakeEngine, Workspace};

fn toml_list(argv: &[String]) -> String {
    let quoted: Vec<String> = argv.iter().map(|a| format!("{a:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Write `tabench.toml` into the workspace with every tool pointed at `engine`
fn write_config(ws: &Workspace, engine: &FakeEngine, budgets: &str, timeout_secs: f64) -> PathBuf {
    let argv = toml_list(&ws.install("engine.sh", engine));
    let text = format!(
        r#"
corpus_dir = {corpus:?}
results_dir = {results:?}
log_dir = {logs:?}
fuzzer = {argv}
fuzz_budgets_secs = {budgets}

[engine]
full = {argv}
targeted = {argv}

[timeouts]
full_secs = {timeout_secs:?}
targeted_secs = {timeout_secs:?}
grace_secs = 0.5
"#,
        corpus = ws.corpus_dir().display().to_string(),
        results = ws.results_dir().display().to_string(),
        logs = ws.log_dir().display().to_string(),
    );
    let path = ws.root().join("tabench.toml");
    std::fs::write(&path, text).unwrap();
    path
}

fn tabench(config: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_tabench"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "tabench {args:?} failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn ndjson(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn row_ids(rows: &[Value]) -> Vec<u64> {
    rows.iter().map(|r| r["program_id"].as_u64().unwrap()).collect()
}

#[test]
fn fuzzer_reaching_a_quarter_of_the_branches() {
    let ws = Workspace::new();
    ws.add_program(1, 40);
    let config = write_config(&ws, &FakeEngine::new().branches(10), "[1.0]", 5.0);

    let run = tabench(&config, &["experiment1"]);
    let summary = String::from_utf8_lossy(&run.stdout);
    assert!(summary.contains("1 coverage samples"), "{summary}");

    let out = ws.root().join("coverage.jsonl");
    let report = tabench(&config, &["report", "--kind", "coverage", "--out", out.to_str().unwrap()]);
    assert!(String::from_utf8_lossy(&report.stdout).contains("coverage comparison: 1 programs"));

    let rows = ndjson(&out);
    assert_eq!(row_ids(&rows), vec![1]);
    let point = &rows[0]["budgets"][0];
    assert_eq!(point["budget_seconds"].as_f64(), Some(1.0));
    assert_eq!(point["branches_reached"].as_u64(), Some(10));
    assert_eq!(point["coverage"].as_f64(), Some(0.25));
}

#[test]
fn hanging_full_run_times_out_and_targeted_runs_cold() {
    let ws = Workspace::new();
    ws.add_program(3, 8);
    let config = write_config(&ws, &FakeEngine::new().hang_on("3.jse.js"), "[0.1]", 1.0);

    let run = tabench(&config, &["experiment2"]);
    let summary = String::from_utf8_lossy(&run.stdout);
    assert!(summary.contains("1 timed out"), "{summary}");
    assert!(summary.contains("1 cold"), "{summary}");

    let full = ndjson(&ws.log_dir().join("jse_base"));
    assert_eq!(full.len(), 1);
    assert_eq!(full[0]["id"].as_u64(), Some(3));
    assert_eq!(full[0]["return_code"].as_i64(), Some(124));
    assert_eq!(full[0]["status"].as_str(), Some("timeout"));
    assert!(!ws.results_dir().join("JSE3").join("cache").exists());

    let targeted = ndjson(&ws.log_dir().join("jse_diff_analysis"));
    assert_eq!(targeted.len(), 1);
    assert_eq!(targeted[0]["mode"].as_str(), Some("cold"));
    assert_eq!(targeted[0]["return_code"].as_i64(), Some(0));
    assert!(ws.log_dir().join("diffs").join("3.diff").is_file());

    let out = ws.root().join("targeted.jsonl");
    let report = tabench(&config, &["report", "--kind", "targeted", "--out", out.to_str().unwrap()]);
    let text = String::from_utf8_lossy(&report.stdout);
    assert!(text.contains("dropped 1 ids (timed out: 1)"), "{text}");
    assert!(ndjson(&out).is_empty());
}

#[test]
fn unparsable_variant_is_reported_as_a_diff_failure() {
    let ws = Workspace::new();
    ws.add_program(1, 8);
    ws.add_program(2, 8);
    ws.write_corpus_file("2.jse.diff.js", "if (x > {\n");
    let config = write_config(&ws, &FakeEngine::new(), "[0.1]", 5.0);

    let run = tabench(&config, &["experiment2"]);
    let summary = String::from_utf8_lossy(&run.stdout);
    assert!(summary.contains("2: diff failed"), "{summary}");

    let out = ws.root().join("targeted.jsonl");
    let report = tabench(&config, &["report", "--kind", "targeted", "--out", out.to_str().unwrap()]);
    let text = String::from_utf8_lossy(&report.stdout);
    assert!(text.contains("dropped 1 ids (diff failed: 1)"), "{text}");
    assert_eq!(row_ids(&ndjson(&out)), vec![1]);
}

#[test]
fn reports_before_any_run_are_empty() {
    let ws = Workspace::new();
    ws.add_program(1, 8);
    let config = write_config(&ws, &FakeEngine::new(), "[0.1]", 5.0);

    for (kind, headline) in [
        ("timing", "timing: 0 programs"),
        ("targeted", "targeted comparison: 0 programs"),
        ("coverage", "coverage comparison: 0 programs"),
    ] {
        let out = ws.root().join(format!("{kind}.jsonl"));
        let report = tabench(&config, &["report", "--kind", kind, "--out", out.to_str().unwrap()]);
        let text = String::from_utf8_lossy(&report.stdout);
        assert!(text.contains(headline), "{text}");
        assert!(ndjson(&out).is_empty());
    }
}

#[test]
fn ids_without_stats_are_dropped_from_the_timing_report() {
    let ws = Workspace::new();
    for n in 1..=3 {
        ws.add_program(n, 8);
    }
    ws.remove_corpus_file("2.stats.json");
    let config = write_config(&ws, &FakeEngine::new().branches(4), "[0.1]", 5.0);

    tabench(&config, &["experiment1", "--jobs", "2"]);

    let out = ws.root().join("timing.jsonl");
    let report = tabench(&config, &["report", "--kind", "timing", "--out", out.to_str().unwrap()]);
    let text = String::from_utf8_lossy(&report.stdout);
    assert!(text.contains("timing: 2 programs"), "{text}");
    assert!(text.contains("dropped 1 ids"), "{text}");

    let rows = ndjson(&out);
    assert_eq!(row_ids(&rows), vec![1, 3]);
    assert_eq!(rows[0]["branches_reached"].as_u64(), Some(4));
    assert_eq!(rows[0]["coverage"].as_f64(), Some(0.5));
    assert!(rows[0]["source_lines"].as_u64().is_some());
}

#[test]
fn diff_subcommand_writes_the_document() {
    let ws = Workspace::new();
    ws.add_program(5, 8);
    let result = ws.root().join("out").join("5.diff");
    let config = write_config(&ws, &FakeEngine::new(), "[0.1]", 5.0);

    let a = format!("--a={}", ws.corpus_dir().join("5.jse.js").display());
    let b = format!("--b={}", ws.corpus_dir().join("5.jse.diff.js").display());
    let r = format!("--resultFilePath={}", result.display());
    let run = tabench(&config, &["diff", &a, &b, &r]);

    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.starts_with("5: ") && stdout.contains("changes written to"), "{stdout}");
    let lines = ndjson(&result);
    assert!(lines.len() >= 2, "header plus at least one change");
}

#[test]
fn missing_config_file_is_fatal() {
    let output = Command::new(env!("CARGO_BIN_EXE_tabench"))
        .args(["--config", "/definitely/not/here.toml", "full"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("loading configuration"));
}
