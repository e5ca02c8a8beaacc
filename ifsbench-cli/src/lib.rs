#![warn(missing_docs)]
//! ifsbench CLI Library
//!
//! Command-line front end shared by the `ifs-bench` and `nml-diff` binaries:
//! - `run`: load specs, execute them as a batch, collect results, report
//! - `validate`: check specs and show their effective namelists
//! - `compare`: structural diff of two namelists or run directories
//!
//! Every command returns a process exit code; see [`Outcome`].

mod compare;
mod config;
mod interrupt;
mod outcome;
mod planner;

pub use compare::{EXIT_DIFFERENT, EXIT_SAME, EXIT_UNREADABLE, compare_paths, print_report};
pub use config::*;
pub use interrupt::cancel_on_interrupt;
pub use outcome::{EXIT_ERROR, Outcome, error_code};
pub use planner::{ExecutionPlan, build_plan, tag_counts};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ifsbench_namelist::{ArrayDiffMode, DiffOptions, GroupMergeStrategy, NamelistOverride, ParseOptions};
use ifsbench_report::{
    Baseline, Collection, OutputFormat, RegressionCheck, ResultCollector, build_report, check_regression, render,
};
use ifsbench_run::{BatchOptions, BatchRunner, RunResult, workdir_for};
use ifsbench_spec::{BenchmarkSpec, SpecContext, SpecError, format_duration, load_specs};
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// ifs-bench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "ifs-bench")]
#[command(author, version, about = "ifs-bench - run and compare IFS benchmark experiments")]
pub struct Cli {
    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: nearest ifsbench.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run benchmarks from a spec file
    Run(RunArgs),
    /// Validate a spec file without running anything
    Validate {
        /// Spec file
        #[arg(name = "SPEC")]
        spec: PathBuf,
        /// Print each effective namelist
        #[arg(long)]
        show: bool,
    },
    /// Compare two namelist files or run directories
    Compare {
        /// Reference namelist or run directory
        #[arg(name = "A")]
        before: PathBuf,
        /// Namelist or run directory to compare
        #[arg(name = "B")]
        after: PathBuf,
        #[command(flatten)]
        diff: DiffArgs,
    },
}

/// Arguments of `ifs-bench run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Spec file
    #[arg(name = "SPEC")]
    pub spec: PathBuf,

    /// Run only experiments whose id matches this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Run only experiments with this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Skip experiments with this tag
    #[arg(long)]
    pub skip_tag: Option<String>,

    /// Concurrent runs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Parent directory of the working directories
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Runs per experiment
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Namelist override applied to every experiment (GROUP/KEY=VALUE, GROUP/KEY+=VALUE, GROUP/KEY-)
    #[arg(long = "set", value_name = "OVERRIDE")]
    pub set: Vec<String>,

    /// Baseline namelist or run directory (overrides each spec's baseline)
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Timing regression threshold in percent
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Output format: human, json
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show the plan without running anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Namelist comparison flags
#[derive(Args, Debug, Default, Clone)]
pub struct DiffArgs {
    /// Relative float tolerance
    #[arg(long)]
    pub tolerance: Option<f64>,
    /// List unchanged keys too
    #[arg(long)]
    pub include_unchanged: bool,
    /// Compare arrays element by element
    #[arg(long)]
    pub per_element: bool,
}

impl DiffArgs {
    /// Diff options from these flags on top of `base`
    pub fn options(&self, base: &DiffConfig) -> DiffOptions {
        let mut options = base.options();
        if let Some(tolerance) = self.tolerance {
            options.tolerance = tolerance;
        }
        options.include_unchanged |= self.include_unchanged;
        if self.per_element {
            options.array_mode = ArrayDiffMode::PerElement;
        }
        options
    }
}

/// Run the ifs-bench CLI and return the process exit code
pub fn run() -> i32 {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the ifs-bench CLI with pre-parsed arguments
pub fn run_with_cli(cli: Cli) -> i32 {
    if let Err(e) = init_logging(cli.verbose, cli.log.as_deref()) {
        eprintln!("Warning: {:#}", e);
    }

    // Only `run` depends on the config file; `compare` borrows its [diff] defaults
    match cli.command {
        Commands::Run(ref args) => match load_config(cli.config.as_deref()) {
            Ok(config) => finish(run_benchmarks(args, &config)),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_ERROR
            }
        },
        Commands::Validate { ref spec, show } => finish(validate_specs(spec, show)),
        Commands::Compare {
            ref before,
            ref after,
            ref diff,
        } => {
            let defaults = match load_config(cli.config.as_deref()) {
                Ok(config) => config.diff,
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "Ignoring unreadable config, using default diff settings");
                    DiffConfig::default()
                }
            };
            let options = diff.options(&defaults);
            match compare_paths(before, after, GroupMergeStrategy::Reject, &options) {
                Ok(report) => print_report(&report, &mut std::io::stdout().lock()).unwrap_or(EXIT_UNREADABLE),
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    EXIT_UNREADABLE
                }
            }
        }
    }
}

fn finish(result: anyhow::Result<Outcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            error_code(&e)
        }
    }
}

/// Install the `tracing` subscriber.
///
/// `RUST_LOG` wins over the default `ifsbench=info` (`ifsbench=debug` when
/// verbose). Logs go to stderr, or to `log` when given.
pub fn init_logging(verbose: bool, log: Option<&Path>) -> anyhow::Result<()> {
    let default = if verbose { "ifsbench=debug" } else { "ifsbench=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match log {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Cannot create log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path),
        None => Ok(BenchConfig::discover()?.unwrap_or_default()),
    }
}

fn run_benchmarks(args: &RunArgs, config: &BenchConfig) -> anyhow::Result<Outcome> {
    let context = SpecContext::from_process();
    let specs = load_specs(&args.spec, &context)?;
    let all_tags: Vec<String> = tag_counts(&specs).into_keys().map(str::to_string).collect();

    let overrides = args
        .set
        .iter()
        .map(|s| s.parse::<NamelistOverride>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(SpecError::from)?;
    let specs = if overrides.is_empty() {
        specs
    } else {
        specs
            .iter()
            .map(|s| s.with_overrides(&overrides))
            .collect::<Result<Vec<_>, _>>()?
    };

    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --filter pattern")?;
    let plan = build_plan(specs, filter.as_ref(), args.tag.as_deref(), args.skip_tag.as_deref());

    if plan.is_empty() {
        if let Some(tag) = &args.tag {
            if !all_tags.contains(tag) {
                eprintln!("Warning: tag '{}' not found. Available tags: {}", tag, all_tags.join(", "));
            }
        }
        println!("No benchmarks selected.");
        return Ok(Outcome::Completed);
    }

    let runs_dir = args.runs_dir.clone().unwrap_or_else(|| config.runner.runs_dir.clone());
    let repeat = args.repeat.unwrap_or(config.runner.repeat).max(1);

    if args.dry_run {
        print_plan(&plan, &runs_dir, repeat);
        return Ok(Outcome::Completed);
    }

    let format: OutputFormat = match &args.format {
        Some(f) => f.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        None => config.output.format,
    };
    let threshold = args.threshold.unwrap_or(config.regression.threshold);

    let runner = BatchRunner::new(BatchOptions {
        runs_dir,
        jobs: args.jobs.unwrap_or(config.runner.jobs).max(1),
        repeat,
        orchestrator: config.runner_options()?,
        progress: true,
    });
    cancel_on_interrupt(runner.cancellation().clone());

    info!(benchmarks = plan.specs.len(), repeat, "Running benchmarks");
    let results = runner.run(&plan.specs)?;

    let by_id: HashMap<&str, &BenchmarkSpec> = plan.specs.iter().map(|s| (s.id(), s)).collect();
    let mut collections = Vec::with_capacity(results.len());
    let mut checks = Vec::new();
    let mut baselines: HashMap<PathBuf, Option<Baseline>> = HashMap::new();
    let diff_options = config.diff.options();

    for result in &results {
        let Some(spec) = by_id.get(result.experiment.as_str()).copied() else {
            continue;
        };
        let collection = ResultCollector::new(spec).collect(result);
        if let Err(e) = collection.write_timings() {
            warn!(run = %result.label(), error = %e, "Could not save timings");
        }
        for missing in &collection.missing {
            warn!("{}", missing);
        }

        let baseline_path = args.baseline.as_deref().or(spec.baseline());
        if let Some(path) = baseline_path {
            let baseline = baselines
                .entry(path.to_path_buf())
                .or_insert_with(|| match Baseline::load(path, &ParseOptions::default()) {
                    Ok(b) => Some(b),
                    Err(e) => {
                        warn!(error = %e, "Skipping regression check");
                        None
                    }
                });
            if let Some(check) = baseline
                .as_ref()
                .and_then(|b| regression_check(spec, result, &collection, b, &diff_options, threshold))
            {
                checks.push(check);
            }
        }
        collections.push(collection);
    }

    let report = build_report(&results, &collections, checks);
    let rendered = render(&report, format)?;
    match args.output.as_ref().or(config.output.report_path.as_ref()) {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("Cannot write report {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(Outcome::worst(results.iter().map(|r| r.state)))
}

fn regression_check(
    spec: &BenchmarkSpec,
    result: &RunResult,
    collection: &Collection,
    baseline: &Baseline,
    options: &DiffOptions,
    threshold: f64,
) -> Option<RegressionCheck> {
    let config = match &result.config {
        Some(config) => config.clone(),
        None => spec.compose().ok()?,
    };
    debug!(run = %result.label(), baseline = %baseline.path().display(), "Checking regression");
    Some(check_regression(collection, &config, baseline, options, threshold))
}

fn print_plan(plan: &ExecutionPlan, runs_dir: &Path, repeat: u32) {
    println!("ifsbench Plan:");
    for spec in &plan.specs {
        let tags = if spec.tags().is_empty() {
            String::new()
        } else {
            format!(" [{}]", spec.tags().join(", "))
        };
        let resources = spec.resources();
        println!("├── {}{}", spec.id(), tags);
        println!("│   ├── command: {}", spec.launch_command().display());
        println!(
            "│   ├── resources: {} task(s) x {} thread(s), wall time {}",
            resources.tasks,
            resources.threads_per_task,
            format_duration(resources.wall_time)
        );
        let rep = (repeat > 1).then_some(1);
        println!("│   └── workdir: {}", workdir_for(runs_dir, spec.id(), rep).display());
    }
    println!("{} benchmarks x {} repetition(s).", plan.specs.len(), repeat);
}

fn validate_specs(path: &Path, show: bool) -> anyhow::Result<Outcome> {
    let specs = load_specs(path, &SpecContext::from_process())?;
    for spec in &specs {
        let effective = spec.compose()?;
        println!(
            "✓ {} ({} layer(s), {} override(s), digest {})",
            spec.id(),
            effective.layers().len(),
            effective.overrides().len(),
            &effective.digest()[..12.min(effective.digest().len())]
        );
        if show {
            println!("{}", "-".repeat(60));
            print!("{}", effective.to_text());
            println!("{}", "-".repeat(60));
        }
    }
    println!("{} benchmark spec(s) valid.", specs.len());
    Ok(Outcome::Completed)
}

/// `nml-diff` arguments
#[derive(Parser, Debug)]
#[command(name = "nml-diff")]
#[command(author, version, about = "nml-diff - structural diff of two Fortran namelist files")]
pub struct NmlDiffCli {
    /// Reference namelist
    #[arg(name = "A")]
    pub before: PathBuf,
    /// Namelist to compare
    #[arg(name = "B")]
    pub after: PathBuf,
    #[command(flatten)]
    pub diff: DiffArgs,
    /// Duplicate group handling: reject, first, last, merge-first, merge-last
    #[arg(long, default_value = "first")]
    pub duplicate_groups: GroupMergeStrategy,
}

/// Run `nml-diff` and return the process exit code
pub fn nml_diff() -> i32 {
    let cli = NmlDiffCli::parse();
    nml_diff_with_cli(&cli)
}

/// Run `nml-diff` with pre-parsed arguments
pub fn nml_diff_with_cli(cli: &NmlDiffCli) -> i32 {
    let options = cli.diff.options(&DiffConfig::default());
    match compare_paths(&cli.before, &cli.after, cli.duplicate_groups, &options) {
        Ok(report) => print_report(&report, &mut std::io::stdout().lock()).unwrap_or(EXIT_UNREADABLE),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_UNREADABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "ifs-bench", "-v", "run", "bench.toml", "--set", "NAMCT0/NSTOP=48", "--set", "NAMPAR0/NPROC=4",
            "--jobs", "2", "--dry-run",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.spec, PathBuf::from("bench.toml"));
        assert_eq!(args.set.len(), 2);
        assert_eq!(args.jobs, Some(2));
        assert!(args.dry_run);
    }

    #[test]
    fn test_diff_flags_override_config() {
        let args = DiffArgs {
            tolerance: Some(1e-3),
            include_unchanged: false,
            per_element: true,
        };
        let base = DiffConfig {
            tolerance: 0.5,
            include_unchanged: true,
            array_mode: ArrayDiffMode::Whole,
        };
        let options = args.options(&base);
        assert_eq!(options.tolerance, 1e-3);
        assert!(options.include_unchanged);
        assert_eq!(options.array_mode, ArrayDiffMode::PerElement);
    }

    #[test]
    fn test_nml_diff_defaults_to_first() {
        let cli = NmlDiffCli::try_parse_from(["nml-diff", "a.nml", "b.nml"]).unwrap();
        assert_eq!(cli.duplicate_groups, GroupMergeStrategy::First);
        let cli = NmlDiffCli::try_parse_from(["nml-diff", "a.nml", "b.nml", "--duplicate-groups", "merge-last"]).unwrap();
        assert_eq!(cli.duplicate_groups, GroupMergeStrategy::MergeLast);
    }
}
