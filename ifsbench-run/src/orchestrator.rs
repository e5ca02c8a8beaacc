//! Run Orchestrator
//!
//! Drives one [`BenchmarkSpec`] through the run state machine:
//!
//! 1. **Materializing**: create the working directory, write the effective
//!    namelist and an initial manifest
//! 2. **Launched**: spawn the launch command in its own process group
//! 3. **Monitoring**: poll for exit, the wall time and cancellation
//!
//! Every path ends in exactly one terminal state, one [`RunResult`] and a final
//! `manifest.json`. Nothing is retried.

use crate::cancel::CancellationToken;
use crate::error::OrchestrationError;
use crate::manifest::{MANIFEST_FILE, RunManifest};
use crate::metadata::HostInfo;
use crate::process::{ExitInfo, ProcessHandle, STDERR_FILE, STDOUT_FILE, tail};
use crate::state::{RunState, StateChange, StateMachine};
use chrono::{DateTime, Utc};
use ifsbench_namelist::{ConfigCache, EffectiveConfig};
use ifsbench_spec::BenchmarkSpec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default interval between process polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of stderr attached to a failed run
pub const STDERR_TAIL_LINES: usize = 20;

/// Tunables shared by every run of a batch
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Interval between process polls
    pub poll_interval: Duration,
    /// Overrides each spec's grace period when set
    pub grace_period: Option<Duration>,
    /// Lines of stderr kept for failed runs
    pub stderr_tail_lines: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: None,
            stderr_tail_lines: STDERR_TAIL_LINES,
        }
    }
}

/// Why a run ended in `Failed`
#[derive(Debug)]
pub enum FailureCause {
    /// Setup or launch went wrong
    Orchestration(OrchestrationError),
    /// The process exited unsuccessfully
    Exit {
        /// Exit status
        exit: ExitInfo,
        /// Last lines of `stderr.log`
        stderr_tail: String,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Orchestration(e) => write!(f, "{}", e),
            FailureCause::Exit { exit, stderr_tail } => {
                write!(f, "process ended with {}", exit)?;
                if !stderr_tail.is_empty() {
                    write!(f, "\n{}", stderr_tail)?;
                }
                Ok(())
            }
        }
    }
}

/// Outcome of one run
#[derive(Debug)]
pub struct RunResult {
    /// Experiment identifier
    pub experiment: String,
    /// Repetition number when a spec is run several times
    pub repetition: Option<u32>,
    /// Terminal state
    pub state: RunState,
    /// Exit status, if a process ran
    pub exit: Option<ExitInfo>,
    /// Wall-clock time from launch to exit (zero if never launched)
    pub duration: Duration,
    /// Working directory
    pub workdir: PathBuf,
    /// Materialized namelist
    pub namelist_path: PathBuf,
    /// Effective configuration used, if it was composed
    pub config: Option<Arc<EffectiveConfig>>,
    /// Every state entered
    pub history: Vec<StateChange>,
    /// Cause of a `Failed` run
    pub failure: Option<FailureCause>,
}

impl RunResult {
    /// Captured standard output
    pub fn stdout_path(&self) -> PathBuf {
        self.workdir.join(STDOUT_FILE)
    }

    /// Captured standard error
    pub fn stderr_path(&self) -> PathBuf {
        self.workdir.join(STDERR_FILE)
    }

    /// Final manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.workdir.join(MANIFEST_FILE)
    }

    /// Whether the run completed
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Label used in reports (`id` or `id#rep`)
    pub fn label(&self) -> String {
        match self.repetition {
            Some(rep) => format!("{}#{}", self.experiment, rep),
            None => self.experiment.clone(),
        }
    }

    /// Surface a setup or launch failure as an error
    pub fn into_result(self) -> Result<RunResult, OrchestrationError> {
        match self.failure {
            Some(FailureCause::Orchestration(e)) => Err(e),
            failure => Ok(RunResult { failure, ..self }),
        }
    }
}

/// Runs one spec in one working directory
pub struct RunOrchestrator<'a> {
    spec: &'a BenchmarkSpec,
    workdir: PathBuf,
    options: OrchestratorOptions,
    cancel: CancellationToken,
    cache: Option<Arc<ConfigCache>>,
    repetition: Option<u32>,
    machine: StateMachine,
    started_at: DateTime<Utc>,
    config: Option<Arc<EffectiveConfig>>,
}

impl<'a> RunOrchestrator<'a> {
    /// Orchestrator for `spec` in `workdir`
    pub fn new(spec: &'a BenchmarkSpec, workdir: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            workdir: workdir.into(),
            options: OrchestratorOptions::default(),
            cancel: CancellationToken::new(),
            cache: None,
            repetition: None,
            machine: StateMachine::new(),
            started_at: Utc::now(),
            config: None,
        }
    }

    /// Use these options
    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Observe `token` for cancellation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Compose through a shared cache
    pub fn with_cache(mut self, cache: Arc<ConfigCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Mark the run as repetition `rep`
    pub fn with_repetition(mut self, rep: u32) -> Self {
        self.repetition = Some(rep);
        self
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.machine.state()
    }

    /// Execute the run to a terminal state
    pub fn run(mut self) -> RunResult {
        self.started_at = Utc::now();
        info!(id = %self.spec.id(), workdir = %self.workdir.display(), "Starting run");

        if self.cancel.is_cancelled() {
            return self.finish(RunState::Cancelled, None, None, None);
        }

        self.enter(RunState::Materializing);
        if let Err(e) = self.materialize() {
            return self.finish(RunState::Failed, None, None, Some(FailureCause::Orchestration(e)));
        }
        if self.cancel.is_cancelled() {
            return self.finish(RunState::Cancelled, None, None, None);
        }

        let command = self.spec.launch_command();
        let mut handle = match ProcessHandle::spawn(&command, &self.workdir) {
            Ok(handle) => handle,
            Err(source) => {
                let e = OrchestrationError::Launch {
                    program: command.program.clone(),
                    source,
                };
                return self.finish(RunState::Failed, None, None, Some(FailureCause::Orchestration(e)));
            }
        };
        self.enter(RunState::Launched);
        info!(id = %self.spec.id(), pid = handle.id(), command = %command.display(), "Launched");

        self.enter(RunState::Monitoring);
        self.monitor(&mut handle)
    }

    fn monitor(self, handle: &mut ProcessHandle) -> RunResult {
        let wall_time = self.spec.resources().wall_time;
        let grace = self.options.grace_period.unwrap_or(self.spec.resources().grace_period);
        let poll = self.options.poll_interval;

        loop {
            match handle.try_wait() {
                Ok(Some(exit)) => {
                    let duration = handle.elapsed();
                    if exit.success() {
                        return self.finish(RunState::Completed, Some(exit), Some(duration), None);
                    }
                    let stderr_tail = tail(&self.workdir.join(STDERR_FILE), self.options.stderr_tail_lines);
                    let cause = FailureCause::Exit { exit, stderr_tail };
                    return self.finish(RunState::Failed, Some(exit), Some(duration), Some(cause));
                }
                Ok(None) => {}
                Err(e) => {
                    error!(id = %self.spec.id(), error = %e, "Lost track of run process");
                    let exit = handle.terminate(grace, poll);
                    let cause = FailureCause::Orchestration(OrchestrationError::Launch {
                        program: self.spec.executable().display().to_string(),
                        source: e,
                    });
                    return self.finish(RunState::Failed, Some(exit), Some(handle.elapsed()), Some(cause));
                }
            }

            if self.cancel.is_cancelled() {
                info!(id = %self.spec.id(), "Cancelling run");
                let exit = handle.terminate(grace, poll);
                return self.finish(RunState::Cancelled, Some(exit), Some(handle.elapsed()), None);
            }

            let elapsed = handle.elapsed();
            if elapsed >= wall_time {
                warn!(id = %self.spec.id(), wall_time = ?wall_time, "Wall time exceeded, terminating");
                let exit = handle.terminate(grace, poll);
                return self.finish(RunState::TimedOut, Some(exit), Some(handle.elapsed()), None);
            }

            std::thread::sleep(poll.min(wall_time - elapsed));
        }
    }

    fn materialize(&mut self) -> Result<(), OrchestrationError> {
        std::fs::create_dir_all(&self.workdir)
            .map_err(|e| OrchestrationError::materialization(&self.workdir, e))?;

        let config = match &self.cache {
            Some(cache) => self.spec.compose_cached(cache)?,
            None => self.spec.compose()?,
        };
        let namelist_path = self.workdir.join(self.spec.namelist_file());
        std::fs::write(&namelist_path, config.to_text())
            .map_err(|e| OrchestrationError::materialization(&namelist_path, e))?;
        self.config = Some(config);

        let manifest_path = self.workdir.join(MANIFEST_FILE);
        self.manifest(None, None, None)
            .write(&manifest_path)
            .map_err(|e| OrchestrationError::materialization(&manifest_path, e))?;

        debug!(id = %self.spec.id(), namelist = %namelist_path.display(), "Materialized working directory");
        Ok(())
    }

    fn enter(&mut self, to: RunState) {
        if let Err(e) = self.machine.advance(to) {
            error!(id = %self.spec.id(), error = %e, "Run state machine rejected transition");
        }
    }

    fn manifest(&self, exit: Option<ExitInfo>, duration: Option<Duration>, failure: Option<&FailureCause>) -> RunManifest {
        let state = self.machine.state();
        RunManifest {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            experiment: self.spec.id().to_string(),
            config_digest: self.config.as_ref().map(|c| c.digest().to_string()).unwrap_or_default(),
            layers: self.spec.layers().iter().map(|l| l.identity().clone()).collect(),
            overrides: self.spec.overrides().iter().map(ToString::to_string).collect(),
            command: self.spec.launch_command().argv(),
            namelist_file: self.spec.namelist_file().to_string(),
            state,
            exit,
            started_at: self.started_at,
            finished_at: state.is_terminal().then(Utc::now),
            duration_secs: duration.map(|d| d.as_secs_f64()),
            failure: failure.map(ToString::to_string),
            host: HostInfo::collect(),
            history: self.machine.history().to_vec(),
        }
    }

    fn finish(
        mut self,
        state: RunState,
        exit: Option<ExitInfo>,
        duration: Option<Duration>,
        failure: Option<FailureCause>,
    ) -> RunResult {
        self.enter(state);

        let manifest = self.manifest(exit, duration, failure.as_ref());
        if let Err(e) = write_final_manifest(&self.workdir, &manifest) {
            warn!(id = %self.spec.id(), error = %e, "Failed to write final manifest");
        }

        match &failure {
            Some(cause) => warn!(id = %self.spec.id(), %state, cause = %cause, "Run finished"),
            None => info!(id = %self.spec.id(), %state, duration = ?duration, "Run finished"),
        }

        RunResult {
            experiment: self.spec.id().to_string(),
            repetition: self.repetition,
            state,
            exit,
            duration: duration.unwrap_or_default(),
            namelist_path: self.workdir.join(self.spec.namelist_file()),
            workdir: self.workdir,
            config: self.config,
            history: self.machine.history().to_vec(),
            failure,
        }
    }
}

fn write_final_manifest(workdir: &Path, manifest: &RunManifest) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(workdir)?;
    manifest.write(&workdir.join(MANIFEST_FILE))
}
