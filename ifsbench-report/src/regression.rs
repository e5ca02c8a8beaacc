//! Regression Check
//!
//! Compares a run against a baseline: the effective namelist structurally,
//! and, when the baseline is a previous run directory with saved timings, each
//! timer against a percentage threshold.

use crate::collector::{Collection, SavedTimings, WALL_CLOCK};
use ifsbench_namelist::{
    ConfigError, DEFAULT_NAMELIST_FILE, DiffOptions, DiffReport, EffectiveConfig, Namelist, ParseOptions,
    diff,
};
use ifsbench_run::{MANIFEST_FILE, RunManifest, RunState};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default timing regression threshold in percent
pub const DEFAULT_THRESHOLD: f64 = 5.0;

/// Baseline could not be loaded
#[derive(Debug, Error)]
pub enum RegressionError {
    /// Baseline namelist is unreadable or malformed
    #[error("Baseline {path}: {source}")]
    Config {
        /// Baseline path
        path: String,
        /// Underlying error
        #[source]
        source: ConfigError,
    },
}

/// What a run is compared against
#[derive(Debug, Clone)]
pub enum Baseline {
    /// A namelist file
    Namelist {
        /// File path
        path: PathBuf,
        /// Parsed namelist
        namelist: Namelist,
    },
    /// A previous run directory
    Run {
        /// Directory path
        path: PathBuf,
        /// Namelist materialized for that run
        namelist: Namelist,
        /// Saved timings, if the run was collected
        timings: Option<SavedTimings>,
    },
}

impl Baseline {
    /// Load a namelist file or a run directory
    pub fn load(path: &Path, options: &ParseOptions) -> Result<Self, RegressionError> {
        let config_err = |source| RegressionError::Config {
            path: path.display().to_string(),
            source,
        };

        if !path.is_dir() {
            let namelist = Namelist::from_file(path, options).map_err(config_err)?;
            return Ok(Baseline::Namelist {
                path: path.to_path_buf(),
                namelist,
            });
        }

        let namelist_file = RunManifest::load(&path.join(MANIFEST_FILE))
            .map(|m| m.namelist_file)
            .unwrap_or_else(|_| DEFAULT_NAMELIST_FILE.to_string());
        let namelist = Namelist::from_file(&path.join(&namelist_file), options).map_err(config_err)?;
        let timings = SavedTimings::load(path).ok();
        debug!(path = %path.display(), timings = timings.is_some(), "Loaded baseline run");
        Ok(Baseline::Run {
            path: path.to_path_buf(),
            namelist,
            timings,
        })
    }

    /// Baseline namelist
    pub fn namelist(&self) -> &Namelist {
        match self {
            Baseline::Namelist { namelist, .. } | Baseline::Run { namelist, .. } => namelist,
        }
    }

    /// Saved timings, if any
    pub fn timings(&self) -> Option<&SavedTimings> {
        match self {
            Baseline::Namelist { .. } => None,
            Baseline::Run { timings, .. } => timings.as_ref(),
        }
    }

    /// Where the baseline was loaded from
    pub fn path(&self) -> &Path {
        match self {
            Baseline::Namelist { path, .. } | Baseline::Run { path, .. } => path,
        }
    }
}

/// Relative change of one timer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingChange {
    /// Timer name
    pub name: String,
    /// Baseline seconds
    pub baseline: f64,
    /// Current seconds
    pub current: f64,
    /// Change in percent (positive is slower)
    pub relative_change: f64,
    /// Slower by more than the threshold
    pub regressed: bool,
    /// Faster by more than the threshold
    pub improved: bool,
}

/// Result of comparing one run against its baseline
#[derive(Debug, Clone, Serialize)]
pub struct RegressionCheck {
    /// Experiment identifier
    pub experiment: String,
    /// Repetition number, for repeated runs
    pub repetition: Option<u32>,
    /// Baseline location
    pub baseline: PathBuf,
    /// Threshold in percent
    pub threshold: f64,
    /// Baseline namelist versus effective namelist
    pub diff: DiffReport,
    /// Timer comparisons (wall clock first, then by name)
    pub timings: Vec<TimingChange>,
}

impl RegressionCheck {
    /// Whether the effective namelist differs from the baseline
    pub fn config_changed(&self) -> bool {
        self.diff.has_differences()
    }

    /// Number of timers slower than the threshold allows
    pub fn regressions(&self) -> usize {
        self.timings.iter().filter(|t| t.regressed).count()
    }

    /// Number of timers faster by more than the threshold
    pub fn improvements(&self) -> usize {
        self.timings.iter().filter(|t| t.improved).count()
    }
}

/// Compare a collected run with `baseline`.
///
/// Timings are only compared for completed runs.
pub fn check_regression(
    collection: &Collection,
    config: &EffectiveConfig,
    baseline: &Baseline,
    options: &DiffOptions,
    threshold: f64,
) -> RegressionCheck {
    let report = diff(baseline.namelist(), config.namelist(), options);

    let mut timings = Vec::new();
    if let (Some(saved), RunState::Completed) = (baseline.timings(), collection.state) {
        let mut current: Vec<(&str, f64)> = collection.all_timers().collect();
        current.sort_by(|a, b| (a.0 != WALL_CLOCK, a.0).cmp(&(b.0 != WALL_CLOCK, b.0)));

        for (name, value) in current {
            let Some(base) = saved.get(name) else {
                continue;
            };
            let relative_change = if base > 0.0 {
                (value - base) / base * 100.0
            } else {
                0.0
            };
            timings.push(TimingChange {
                name: name.to_string(),
                baseline: base,
                current: value,
                relative_change,
                regressed: relative_change > threshold,
                improved: relative_change < -threshold,
            });
        }
    }

    RegressionCheck {
        experiment: collection.experiment.clone(),
        repetition: collection.repetition,
        baseline: baseline.path().to_path_buf(),
        threshold,
        diff: report,
        timings,
    }
}
