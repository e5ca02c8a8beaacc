#![warn(missing_docs)]
//! ifsbench Benchmark Specifications
//!
//! Everything needed to describe one benchmark experiment before it runs:
//! - Resources, launchers and the environment pipeline
//! - Configuration layers and namelist overrides, composed once per spec
//! - Artifact and timer patterns for result collection
//! - TOML spec sources with exhaustive validation

mod artifacts;
mod env;
mod error;
mod launcher;
mod resources;
mod source;
mod spec;

pub use artifacts::{ArtifactPattern, TimerPattern, TimerSource};
pub use env::{EnvMap, EnvOp, EnvPipeline, PATH_SEPARATOR};
pub use error::{InvalidSpecError, SpecError, Violation};
pub use launcher::{LaunchCommand, LauncherKind};
pub use resources::{
    DEFAULT_GRACE_PERIOD, DEFAULT_WALL_TIME, Resources, format_duration, parse_duration,
};
pub use source::{load_specs, parse_specs};
pub use spec::{
    BenchmarkSpec, ENV_EXEC_PATH, ENV_MEMORY_MB, ENV_TASKS, ENV_THREADS_PER_TASK, ENV_WALL_TIME,
    SpecBuilder, SpecContext,
};
