//! Configuration loading from ifsbench.toml
//!
//! Tool-wide defaults live in an `ifsbench.toml` file, discovered by walking
//! up from the current directory unless `--config` names one. Command-line
//! flags always win over file values.

use ifsbench_namelist::{ArrayDiffMode, DiffOptions};
use ifsbench_report::{DEFAULT_THRESHOLD, OutputFormat};
use ifsbench_run::{DEFAULT_POLL_INTERVAL, OrchestratorOptions, STDERR_TAIL_LINES};
use ifsbench_spec::{format_duration, parse_duration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file
pub const CONFIG_FILE: &str = "ifsbench.toml";

/// ifsbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Namelist comparison configuration
    #[serde(default)]
    pub diff: DiffConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Regression check configuration
    #[serde(default)]
    pub regression: RegressionConfig,
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Parent directory of every run's working directory
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// Concurrent runs
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// How often running processes are polled (e.g., "100ms")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Overrides every spec's grace period when set (e.g., "30s")
    #[serde(default)]
    pub grace_period: Option<String>,
    /// Runs per spec
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            jobs: default_jobs(),
            poll_interval: default_poll_interval(),
            grace_period: None,
            repeat: default_repeat(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}
fn default_jobs() -> usize {
    1
}
fn default_poll_interval() -> String {
    format_duration(DEFAULT_POLL_INTERVAL)
}
fn default_repeat() -> u32 {
    1
}

/// Namelist comparison configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Relative float tolerance (0 means exact)
    #[serde(default)]
    pub tolerance: f64,
    /// Also list keys that did not change
    #[serde(default)]
    pub include_unchanged: bool,
    /// "whole" or "per-element"
    #[serde(default)]
    pub array_mode: ArrayDiffMode,
}

impl DiffConfig {
    /// Diff options carrying these settings
    pub fn options(&self) -> DiffOptions {
        DiffOptions {
            tolerance: self.tolerance,
            include_unchanged: self.include_unchanged,
            array_mode: self.array_mode,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default report format: "human" or "json"
    #[serde(default)]
    pub format: OutputFormat,
    /// Write the report here instead of stdout
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

/// Regression check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Timing change in percent that counts as a regression
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| anyhow::anyhow!("Invalid {}: {}", path.display(), e))?;
        config.runner_options()?;
        Ok(config)
    }

    /// Find the nearest `ifsbench.toml` walking up from the current directory
    pub fn find() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Discover and load configuration; a broken file is an error, a missing one is not
    pub fn discover() -> anyhow::Result<Option<Self>> {
        Self::find().map(Self::load).transpose()
    }

    /// Orchestrator tunables from `[runner]`
    pub fn runner_options(&self) -> anyhow::Result<OrchestratorOptions> {
        let poll_interval = parse_duration(&self.runner.poll_interval)
            .map_err(|e| anyhow::anyhow!("runner.poll_interval: {}", e))?;
        let grace_period = self
            .runner
            .grace_period
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| anyhow::anyhow!("runner.grace_period: {}", e))?;
        Ok(OrchestratorOptions {
            poll_interval,
            grace_period,
            stderr_tail_lines: STDERR_TAIL_LINES,
        })
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# ifsbench configuration

[runner]
# Parent directory of run working directories
runs_dir = "runs"
# Concurrent runs
jobs = 1
# Process poll interval
poll_interval = "100ms"
# Override every spec's grace period (uncomment to enable)
# grace_period = "30s"
# Runs per benchmark
repeat = 1

[diff]
# Relative float tolerance, 0 compares exactly
tolerance = 0.0
# List unchanged keys too
include_unchanged = false
# Array comparison: "whole" or "per-element"
array_mode = "whole"

[output]
# Report format: human or json
format = "human"
# Report file (uncomment to enable, stdout otherwise)
# report_path = "ifsbench-report.json"

[regression]
# Timing change in percent that counts as a regression
threshold = 5.0
"#
        .to_string()
    }
}
