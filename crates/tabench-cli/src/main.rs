//! `tabench` command-line entry point
//!
//! Engine workflows, the standalone diff tool, overhead calibration and
//! reports over the result logs. Logs go to stderr; summaries to stdout.

mod report;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tabench_artifact::ProgramId;
use tabench_driver::{calibrate, Harness, HarnessConfig, TokioRunner, OVERHEAD_FILE};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn workflow_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            Arg::new("programs")
                .long("programs")
                .value_parser(value_parser!(u32))
                .help("Run ids 1..=N instead of the configured set"),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .value_parser(value_parser!(usize))
                .help("Programs processed concurrently"),
        )
}

fn cli() -> Command {
    Command::new("tabench")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Full, targeted and fuzz benchmark harness for synthetic JavaScript programs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ./tabench.toml if present)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(workflow_command("full", "Full engine runs with cache writing"))
        .subcommand(workflow_command(
            "targeted",
            "Targeted runs over stored caches, cold where no cache is usable",
        ))
        .subcommand(workflow_command("fuzz", "Fuzzer runs at every configured budget"))
        .subcommand(workflow_command(
            "experiment1",
            "Full runs without cache writing, then fuzz runs",
        ))
        .subcommand(workflow_command("experiment2", "Full then targeted runs, per program"))
        .subcommand(
            Command::new("diff")
                .about("Write the structural diff of two programs")
                .arg(
                    Arg::new("a")
                        .long("a")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Base program"),
                )
                .arg(
                    Arg::new("b")
                        .long("b")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Modified program"),
                )
                .arg(
                    Arg::new("resultFilePath")
                        .long("resultFilePath")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Where the diff is written"),
                )
                .arg(
                    Arg::new("id")
                        .long("id")
                        .value_parser(value_parser!(u32))
                        .help("Program id (default: leading number of the base file name)"),
                ),
        )
        .subcommand(Command::new("calibrate").about("Measure per-mode launcher overhead"))
        .subcommand(
            Command::new("report")
                .about("Aggregate result logs into a summary and NDJSON rows")
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .required(true)
                        .value_parser(["timing", "targeted", "coverage"])
                        .help("Report to build"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Rows output (default: <log_dir>/<kind>_rows.jsonl)"),
                )
                .arg(
                    Arg::new("log")
                        .long("log")
                        .help("Result log under the log directory (timing only; default: jse_results)"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let Some((name, args)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };
    init_tracing(args.get_flag("json-logs"));

    match run(name, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(command = name, "{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(name: &str, args: &ArgMatches) -> Result<()> {
    if name == "diff" {
        return diff(args);
    }
    let config_path = args.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let config = HarnessConfig::load(config_path).context("loading configuration")?;
    match name {
        "calibrate" => {
            config.check_engine_files()?;
            let overhead = calibrate(&config, &TokioRunner::new()).await?;
            println!(
                "overhead over {} samples: full {:.3}s, targeted {:.3}s, cold {:.3}s ({})",
                overhead.samples,
                overhead.full,
                overhead.targeted,
                overhead.cold,
                config.log_path(OVERHEAD_FILE).display()
            );
            Ok(())
        }
        "report" => report::run(&config, args),
        _ => workflow(config, name, args).await,
    }
}

async fn workflow(mut config: HarnessConfig, name: &str, args: &ArgMatches) -> Result<()> {
    if let Some(&programs) = args.get_one::<u32>("programs") {
        config.programs = Some(programs);
    }
    if let Some(&jobs) = args.get_one::<usize>("jobs") {
        config.jobs = jobs;
    }
    config.validate().context("invalid command-line override")?;
    config.check_engine_files()?;

    let harness = Harness::new(config, Arc::new(TokioRunner::new()));
    let ids = harness.program_ids();
    if ids.is_empty() {
        bail!("no programs found in {}", harness.config().corpus_dir.display());
    }
    info!(workflow = name, programs = ids.len(), "starting");

    let summary = match name {
        "full" => harness.full(&ids).await,
        "targeted" => harness.targeted(&ids).await,
        "fuzz" => harness.fuzz(&ids).await,
        "experiment1" => harness.experiment1(&ids).await,
        "experiment2" => harness.experiment2(&ids).await,
        other => bail!("unknown command '{other}'"),
    }
    .with_context(|| format!("{name} aborted"))?;
    println!("{summary}");
    Ok(())
}

fn diff(args: &ArgMatches) -> Result<()> {
    let path = |name: &str| args.get_one::<PathBuf>(name).with_context(|| format!("--{name} is required"));
    let (base, modified, result) = (path("a")?, path("b")?, path("resultFilePath")?);
    let id = match args.get_one::<u32>("id") {
        Some(&raw) => ProgramId::new(raw)?,
        None => id_from_file_name(base)
            .with_context(|| format!("cannot infer a program id from {}; pass --id", base.display()))?,
    };

    let artifact = tabench_diff::compute_diff(id, base, modified, result)
        .with_context(|| format!("diffing {} against {}", modified.display(), base.display()))?;
    println!(
        "{}: {} changes written to {}",
        artifact.program_id,
        artifact.change_count,
        artifact.result_path().display()
    );
    Ok(())
}

/// `12.jse.js` is program 12
fn id_from_file_name(path: &Path) -> Option<ProgramId> {
    let name = path.file_name()?.to_str()?;
    let raw = name.split('.').next()?.parse().ok()?;
    ProgramId::new(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn program_id_comes_from_leading_number() {
        assert_eq!(id_from_file_name(Path::new("randjs/12.jse.js")).map(ProgramId::get), Some(12));
        assert_eq!(id_from_file_name(Path::new("base.js")), None);
        assert_eq!(id_from_file_name(Path::new("0.jse.js")), None);
    }

    #[test]
    fn diff_takes_the_differ_flags() {
        let matches = cli()
            .try_get_matches_from(["tabench", "diff", "--a=x.js", "--b=y.js", "--resultFilePath=out.diff"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "diff");
        assert_eq!(args.get_one::<PathBuf>("resultFilePath"), Some(&PathBuf::from("out.diff")));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let matches = cli()
            .try_get_matches_from(["tabench", "--config", "bench.toml", "full", "--jobs", "4", "--json-logs"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<PathBuf>("config"), Some(&PathBuf::from("bench.toml")));
        assert!(args.get_flag("json-logs"));
        assert_eq!(args.get_one::<usize>("jobs"), Some(&4));
    }

    #[test]
    fn unknown_report_kind_is_rejected() {
        assert!(cli().try_get_matches_from(["tabench", "report", "--kind", "plots"]).is_err());
    }
}
