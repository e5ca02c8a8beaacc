#![warn(missing_docs)]
//! ifsbench Run Orchestration
//!
//! Executes validated benchmark specs against the external model:
//! - Explicit run state machine with a recorded history
//! - Process-group control with wall-time enforcement and graceful termination
//! - Cooperative cancellation shared across concurrent runs
//! - Per-run `manifest.json` with host metadata
//! - Bounded concurrent batches with progress reporting

mod batch;
mod cancel;
mod error;
mod manifest;
mod metadata;
mod orchestrator;
mod process;
mod state;

pub use batch::{BatchOptions, BatchRunner, workdir_for};
pub use cancel::CancellationToken;
pub use error::OrchestrationError;
pub use manifest::{MANIFEST_FILE, RunManifest};
pub use metadata::HostInfo;
pub use orchestrator::{
    DEFAULT_POLL_INTERVAL, FailureCause, OrchestratorOptions, RunOrchestrator, RunResult,
    STDERR_TAIL_LINES,
};
pub use process::{ExitInfo, ProcessHandle, STDERR_FILE, STDOUT_FILE, tail};
pub use state::{InvalidTransition, RunState, StateChange, StateMachine};
