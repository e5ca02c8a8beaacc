//! Batch Runner
//!
//! Runs many specs on a bounded thread pool. Each run gets its own working
//! directory, `<runs_dir>/<id>` or `<runs_dir>/<id>/rep-NNN` when repeating,
//! and one failing run never stops the others.

use crate::cancel::CancellationToken;
use crate::error::OrchestrationError;
use crate::orchestrator::{OrchestratorOptions, RunOrchestrator, RunResult};
use ifsbench_namelist::ConfigCache;
use ifsbench_spec::BenchmarkSpec;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Settings for a batch
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Parent of every working directory
    pub runs_dir: PathBuf,
    /// Concurrent runs
    pub jobs: usize,
    /// Runs per spec
    pub repeat: u32,
    /// Per-run tunables
    pub orchestrator: OrchestratorOptions,
    /// Show a progress bar
    pub progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            jobs: 1,
            repeat: 1,
            orchestrator: OrchestratorOptions::default(),
            progress: false,
        }
    }
}

/// Working directory of one run
pub fn workdir_for(runs_dir: &Path, id: &str, repetition: Option<u32>) -> PathBuf {
    match repetition {
        Some(rep) => runs_dir.join(id).join(format!("rep-{:03}", rep)),
        None => runs_dir.join(id),
    }
}

/// Runs specs concurrently, sharing one config cache
pub struct BatchRunner {
    options: BatchOptions,
    cancel: CancellationToken,
    cache: Arc<ConfigCache>,
}

impl BatchRunner {
    /// Runner with its own cancellation token and cache
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
            cache: Arc::new(ConfigCache::new()),
        }
    }

    /// Observe `token` in every run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token observed by every run
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shared config cache
    pub fn cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    /// Run every spec `repeat` times; results keep spec order
    pub fn run(&self, specs: &[BenchmarkSpec]) -> Result<Vec<RunResult>, OrchestrationError> {
        let repeat = self.options.repeat.max(1);
        let jobs: Vec<(&BenchmarkSpec, Option<u32>)> = specs
            .iter()
            .flat_map(|spec| {
                (1..=repeat).map(move |rep| (spec, (repeat > 1).then_some(rep)))
            })
            .collect();
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let pb = if self.options.progress {
            let pb = ProgressBar::new(jobs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let workers = self.options.jobs.max(1).min(jobs.len());
        info!(runs = jobs.len(), workers, runs_dir = %self.options.runs_dir.display(), "Starting batch");

        let results = if workers == 1 {
            jobs.iter().map(|&(spec, rep)| self.run_one(spec, rep, &pb)).collect()
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| OrchestrationError::Pool(e.to_string()))?;
            pool.install(|| {
                jobs.par_iter()
                    .map(|&(spec, rep)| self.run_one(spec, rep, &pb))
                    .collect()
            })
        };

        pb.finish_with_message("Complete");
        Ok(results)
    }

    fn run_one(&self, spec: &BenchmarkSpec, repetition: Option<u32>, pb: &ProgressBar) -> RunResult {
        let workdir = workdir_for(&self.options.runs_dir, spec.id(), repetition);
        let mut orchestrator = RunOrchestrator::new(spec, workdir)
            .with_options(self.options.orchestrator.clone())
            .with_cancellation(self.cancel.clone())
            .with_cache(Arc::clone(&self.cache));
        if let Some(rep) = repetition {
            orchestrator = orchestrator.with_repetition(rep);
        }
        let result = orchestrator.run();
        pb.set_message(format!("{} {}", result.label(), result.state));
        pb.inc(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_naming() {
        let root = Path::new("/scratch/runs");
        assert_eq!(workdir_for(root, "t21", None), Path::new("/scratch/runs/t21"));
        assert_eq!(
            workdir_for(root, "t21", Some(7)),
            Path::new("/scratch/runs/t21/rep-007")
        );
    }

    #[test]
    fn test_empty_batch() {
        let runner = BatchRunner::new(BatchOptions::default());
        assert!(runner.run(&[]).unwrap().is_empty());
    }
}
