//! Result Collection
//!
//! Reads what a finished run left behind: artifacts matched against the
//! working directory tree, timers scraped from the captured output, and the
//! wall-clock duration. Collection never modifies the [`RunResult`].

use fxhash::FxHashMap;
use ifsbench_run::{RunResult, RunState};
use ifsbench_spec::{ArtifactPattern, BenchmarkSpec, TimerPattern, TimerSource};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File timings are saved to in each working directory
pub const TIMINGS_FILE: &str = "timings.json";

/// Timer name under which the wall-clock duration is saved
pub const WALL_CLOCK: &str = "wall_clock";

/// A required artifact was not produced
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Required artifact '{artifact}' (/{pattern}/) not found for {experiment}")]
pub struct ArtifactMissingError {
    /// Experiment identifier
    pub experiment: String,
    /// Artifact name
    pub artifact: String,
    /// Pattern that matched nothing
    pub pattern: String,
}

/// Artifact file found in a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundArtifact {
    /// Artifact name
    pub name: String,
    /// Path relative to the working directory
    pub path: String,
}

fn sorted<S: Serializer>(map: &FxHashMap<String, f64>, serializer: S) -> Result<S::Ok, S::Error> {
    map.iter().collect::<BTreeMap<_, _>>().serialize(serializer)
}

/// Everything collected from one run
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    /// Experiment identifier
    pub experiment: String,
    /// Repetition number, for repeated runs
    pub repetition: Option<u32>,
    /// Terminal state of the run
    pub state: RunState,
    /// Working directory
    pub workdir: PathBuf,
    /// Wall-clock seconds from launch to exit
    pub wall_clock_secs: f64,
    /// Artifacts found, in walk order
    pub artifacts: Vec<FoundArtifact>,
    /// Required artifacts that were not found
    pub missing: Vec<ArtifactMissingError>,
    /// Extracted timers in seconds
    #[serde(serialize_with = "sorted")]
    pub timers: FxHashMap<String, f64>,
    /// Declared timers that matched nothing
    pub missing_timers: Vec<String>,
}

impl Collection {
    /// Saved form of the timings
    pub fn timings(&self) -> SavedTimings {
        SavedTimings {
            experiment: self.experiment.clone(),
            wall_clock_secs: self.wall_clock_secs,
            timers: self.timers.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Write `timings.json` into the working directory
    pub fn write_timings(&self) -> Result<PathBuf, std::io::Error> {
        let path = self.workdir.join(TIMINGS_FILE);
        let json = serde_json::to_string_pretty(&self.timings()).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Every timer plus the wall clock
    pub fn all_timers(&self) -> impl Iterator<Item = (&str, f64)> {
        std::iter::once((WALL_CLOCK, self.wall_clock_secs)).chain(self.timers.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

/// Contents of `timings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTimings {
    /// Experiment identifier
    pub experiment: String,
    /// Wall-clock seconds
    pub wall_clock_secs: f64,
    /// Timers in seconds
    pub timers: BTreeMap<String, f64>,
}

impl SavedTimings {
    /// Read `timings.json` from a run directory
    pub fn load(run_dir: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(run_dir.join(TIMINGS_FILE))?;
        serde_json::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Timer value, with [`WALL_CLOCK`] naming the wall clock
    pub fn get(&self, name: &str) -> Option<f64> {
        if name == WALL_CLOCK {
            Some(self.wall_clock_secs)
        } else {
            self.timers.get(name).copied()
        }
    }
}

/// Collects results according to a spec's declarations
pub struct ResultCollector<'a> {
    experiment: &'a str,
    artifacts: &'a [ArtifactPattern],
    timers: &'a [TimerPattern],
}

impl<'a> ResultCollector<'a> {
    /// Collector for runs of `spec`
    pub fn new(spec: &'a BenchmarkSpec) -> Self {
        Self {
            experiment: spec.id(),
            artifacts: spec.artifacts(),
            timers: spec.timers(),
        }
    }

    /// Collect from a finished run
    pub fn collect(&self, result: &RunResult) -> Collection {
        let files = walk(&result.workdir);

        let mut artifacts = Vec::new();
        let mut missing = Vec::new();
        for artifact in self.artifacts {
            let before = artifacts.len();
            artifacts.extend(files.iter().filter(|f| artifact.matches(f)).map(|f| FoundArtifact {
                name: artifact.name.clone(),
                path: f.clone(),
            }));
            if artifacts.len() == before && artifact.required {
                missing.push(ArtifactMissingError {
                    experiment: self.experiment.to_string(),
                    artifact: artifact.name.clone(),
                    pattern: artifact.pattern.as_str().to_string(),
                });
            }
        }

        let mut sources: FxHashMap<PathBuf, String> = FxHashMap::default();
        let mut timers = FxHashMap::default();
        let mut missing_timers = Vec::new();
        for timer in self.timers {
            let path = match &timer.source {
                TimerSource::Stdout => result.stdout_path(),
                TimerSource::Stderr => result.stderr_path(),
                TimerSource::File(file) => result.workdir.join(file),
            };
            let text = sources
                .entry(path)
                .or_insert_with_key(|p| std::fs::read_to_string(p).unwrap_or_default());
            match timer.extract(text) {
                Some(value) => {
                    timers.insert(timer.name.clone(), value);
                }
                None => missing_timers.push(timer.name.clone()),
            }
        }

        debug!(
            id = %self.experiment,
            artifacts = artifacts.len(),
            missing = missing.len(),
            timers = timers.len(),
            "Collected run results"
        );

        Collection {
            experiment: result.experiment.clone(),
            repetition: result.repetition,
            state: result.state,
            workdir: result.workdir.clone(),
            wall_clock_secs: result.duration.as_secs_f64(),
            artifacts,
            missing,
            timers,
            missing_timers,
        }
    }
}

/// Every file below `root` as a sorted list of `/`-separated relative paths
fn walk(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => pending.push(path),
                Ok(_) => {
                    if let Ok(rel) = path.strip_prefix(root) {
                        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                        files.push(parts.join("/"));
                    }
                }
                Err(_) => {}
            }
        }
    }
    files.sort();
    files
}
