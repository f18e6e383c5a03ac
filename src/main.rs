use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use picsift::cluster::{LaunchConfig, LaunchMode, run_processes, run_threads, serve_stdio};
use picsift::logging::{self, LogConfig, LogFormat};
use picsift::output::{self, RunSummary};
use picsift::search::ReferenceMatcher;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "picsift")]
#[command(about = "Distributed template search across a pool of workers")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log filter, e.g. "picsift=debug" (overrides -v and PICSIFT_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: pretty, compact, json (overrides PICSIFT_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Args)]
struct RunArgs {
    /// Batch file to read
    #[arg(short, long, default_value = "input.txt")]
    input: PathBuf,

    /// Report file to write
    #[arg(short, long, default_value = "output.txt")]
    output: PathBuf,

    /// Number of worker ranks (defaults to one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Search threads per worker (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// How workers are hosted: threads or processes
    #[arg(short, long, default_value_t = LaunchMode::Threads)]
    mode: LaunchMode,

    /// Also write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve as a worker rank over stdin/stdout (started by `--mode processes`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        rank: usize,

        #[arg(long)]
        size: usize,

        #[arg(short, long, default_value_t = 0)]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Worker ranks share one process only in thread mode
    let thread_names = cli.command.is_none() && cli.run.mode == LaunchMode::Threads;
    let log_config = log_config(&cli, thread_names);
    logging::init(log_config.clone());

    match cli.command {
        Some(Commands::Worker {
            rank,
            size,
            threads,
        }) => {
            let summary = serve_stdio(rank, size, threads, Arc::new(ReferenceMatcher))
                .with_context(|| format!("worker rank {} failed", rank))?;
            tracing::debug!(rank, jobs = summary.jobs, "worker exiting");
        }
        None => run(cli.run, &log_config)?,
    }

    Ok(())
}

fn log_config(cli: &Cli, thread_names: bool) -> LogConfig {
    let mut config = LogConfig::default().with_thread_names(thread_names);
    if let Some(filter) = &cli.log_level {
        config = config.with_filter(filter.clone());
    } else if cli.verbose > 0 {
        let level = match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        config = config.with_level(level);
    }
    let config = config.with_env_overrides();
    match cli.log_format {
        Some(format) => config.with_format(format),
        None => config,
    }
}

fn run(args: RunArgs, log_config: &LogConfig) -> Result<()> {
    let batch = picsift::input::load(&args.input)
        .with_context(|| format!("failed to load batch from {}", args.input.display()))?;
    let tolerance = batch.tolerance;

    let mut config = LaunchConfig::default()
        .with_threads_per_worker(args.threads)
        .with_mode(args.mode)
        .with_progress(!args.no_progress);
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    tracing::info!(
        workers = config.workers,
        mode = %config.mode,
        jobs = batch.jobs.len(),
        patterns = batch.patterns.len(),
        "starting run"
    );

    let outcome = match config.mode {
        LaunchMode::Threads => run_threads(batch, &config, Arc::new(ReferenceMatcher))?,
        LaunchMode::Processes => {
            let program = std::env::current_exe().context("failed to locate picsift binary")?;
            let base_args: Vec<OsString> = vec![
                "worker".into(),
                "--threads".into(),
                config.threads_per_worker.to_string().into(),
                "--log-level".into(),
                log_config.directive().into(),
                "--log-format".into(),
                log_config.format.to_string().into(),
            ];
            run_processes(batch, &config, &program, &base_args)?
        }
    };

    output::write_report(&args.output, &outcome.coordinator.jobs)
        .with_context(|| format!("failed to write report to {}", args.output.display()))?;

    let summary = RunSummary::new(&outcome, tolerance, config.mode.to_string());
    if let Some(path) = &args.summary_json {
        output::write_summary_json(path, &summary)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }
    output::print_summary(&summary, &args.output, !args.no_color)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("picsift").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_verbosity_sets_level() {
        let cli = parse(&["-vv", "--log-format", "compact"]);
        let config = log_config(&cli, true);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.show_thread_names);
        if config.filter.is_none() && std::env::var_os("PICSIFT_LOG_LEVEL").is_none() {
            assert_eq!(config.level, Level::DEBUG);
        }
    }

    #[test]
    fn test_log_level_flag_is_a_filter() {
        let cli = parse(&["--log-level", "picsift=trace", "-v"]);
        let config = log_config(&cli, false);
        assert_eq!(config.directive(), "picsift=trace");
        assert!(!config.show_thread_names);
    }

    #[test]
    fn test_worker_subcommand_takes_log_flags() {
        let cli = parse(&[
            "worker", "--rank", "2", "--size", "3", "--log-level", "warn", "--log-format", "json",
        ]);
        assert!(matches!(cli.command, Some(Commands::Worker { rank: 2, size: 3, .. })));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }
}
