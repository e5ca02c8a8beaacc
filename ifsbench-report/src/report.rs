//! Report Data Structures

use crate::collector::{Collection, WALL_CLOCK};
use crate::regression::RegressionCheck;
use crate::summary::{TimingSummary, summarize};
use chrono::{DateTime, Utc};
use ifsbench_run::{ExitInfo, HostInfo, RunResult, RunState};
use serde::Serialize;
use std::collections::BTreeMap;

/// Complete batch report
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub meta: ReportMeta,
    pub runs: Vec<RunReport>,
    pub experiments: Vec<ExperimentSummary>,
    pub regressions: Vec<RegressionCheck>,
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub host: HostInfo,
}

/// One run in the report
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment: String,
    pub repetition: Option<u32>,
    pub state: RunState,
    pub exit: Option<ExitInfo>,
    pub duration_secs: f64,
    pub workdir: String,
    pub failure: Option<String>,
    pub artifacts: usize,
    pub missing_artifacts: Vec<String>,
    pub timers: BTreeMap<String, f64>,
}

/// Timing statistics of one experiment across its repetitions
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSummary {
    pub experiment: String,
    /// Timer name to summary; `wall_clock` is always present
    pub timers: BTreeMap<String, TimingSummary>,
}

/// Batch totals
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub missing_artifacts: usize,
    pub config_changes: usize,
    pub regressions: usize,
    pub improvements: usize,
}

impl ReportSummary {
    fn count(&mut self, state: RunState) {
        self.total += 1;
        match state {
            RunState::Completed => self.completed += 1,
            RunState::Failed => self.failed += 1,
            RunState::TimedOut => self.timed_out += 1,
            RunState::Cancelled => self.cancelled += 1,
            _ => {}
        }
    }
}

/// Build a report from run results and their collections.
///
/// `collections` pairs with `results` by position; statistics only use
/// completed runs.
pub fn build_report(results: &[RunResult], collections: &[Collection], regressions: Vec<RegressionCheck>) -> BatchReport {
    let mut summary = ReportSummary::default();
    let mut runs = Vec::with_capacity(results.len());
    let mut samples: BTreeMap<&str, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();

    for (result, collection) in results.iter().zip(collections) {
        summary.count(result.state);
        summary.missing_artifacts += collection.missing.len();

        if result.state == RunState::Completed {
            let timers = samples.entry(result.experiment.as_str()).or_default();
            for (name, value) in collection.all_timers() {
                timers.entry(name).or_default().push(value);
            }
        }

        runs.push(RunReport {
            experiment: result.experiment.clone(),
            repetition: result.repetition,
            state: result.state,
            exit: result.exit,
            duration_secs: result.duration.as_secs_f64(),
            workdir: result.workdir.display().to_string(),
            failure: result.failure.as_ref().map(ToString::to_string),
            artifacts: collection.artifacts.len(),
            missing_artifacts: collection.missing.iter().map(|m| m.artifact.clone()).collect(),
            timers: collection.timers.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        });
    }

    let experiments = samples
        .into_iter()
        .map(|(experiment, timers)| ExperimentSummary {
            experiment: experiment.to_string(),
            timers: timers
                .into_iter()
                .filter_map(|(name, values)| summarize(&values).map(|s| (name.to_string(), s)))
                .collect(),
        })
        .collect();

    for check in &regressions {
        if check.config_changed() {
            summary.config_changes += 1;
        }
        summary.regressions += check.regressions();
        summary.improvements += check.improvements();
    }

    BatchReport {
        meta: ReportMeta {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            host: HostInfo::collect(),
        },
        runs,
        experiments,
        regressions,
        summary,
    }
}

impl ExperimentSummary {
    /// Wall-clock summary
    pub fn wall_clock(&self) -> Option<&TimingSummary> {
        self.timers.get(WALL_CLOCK)
    }
}
