#![warn(missing_docs)]
//! # ifsbench
//!
//! Benchmark toolbox for IFS-style simulation runs.
//!
//! - **Namelists**: typed Fortran namelist model, reader and writer, structural diff
//! - **Layered configuration**: defaults, site, experiment and command-line layers
//!   composed into one fingerprinted effective namelist
//! - **Specs**: validated experiment descriptions loaded from TOML
//! - **Orchestration**: explicit run state machine, wall-time enforcement,
//!   cancellation and bounded concurrent batches
//! - **Results**: artifact and timer collection, regression checks, reports
//!
//! ## Quick Start
//!
//! ```ignore
//! use ifsbench::prelude::*;
//!
//! let specs = load_specs(Path::new("bench.toml"), &SpecContext::from_process())?;
//! let runner = BatchRunner::new(BatchOptions::default());
//! for result in runner.run(&specs)? {
//!     println!("{} {}", result.label(), result.state);
//! }
//! ```

// Re-export the namelist engine
pub use ifsbench_namelist::{
    ArrayDiffMode, Change, ChangeKind, ConfigCache, ConfigError, ConfigLayer, DiffOptions, DiffReport,
    EffectiveConfig, FormatError, GroupMergeStrategy, Namelist, NamelistOverride, ParseOptions, Provenance,
    Scalar, Schema, Value, compose, diff, parse_file, parse_str, to_string, write_file,
};

// Re-export specs
pub use ifsbench_spec::{
    ArtifactPattern, BenchmarkSpec, InvalidSpecError, LauncherKind, Resources, SpecBuilder, SpecContext,
    SpecError, TimerPattern, TimerSource, load_specs, parse_specs,
};

// Re-export orchestration
pub use ifsbench_run::{
    BatchOptions, BatchRunner, CancellationToken, OrchestrationError, OrchestratorOptions, RunOrchestrator,
    RunResult, RunState,
};

// Re-export results
pub use ifsbench_report::{
    Baseline, BatchReport, Collection, OutputFormat, RegressionCheck, ResultCollector, build_report,
    check_regression, render,
};

/// Namelist engine
pub mod namelist {
    pub use ifsbench_namelist::*;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BatchOptions, BatchRunner, BenchmarkSpec, CancellationToken, ConfigLayer, DiffOptions, Namelist,
        NamelistOverride, Provenance, ResultCollector, RunOrchestrator, RunState, SpecContext, diff, load_specs,
    };
    pub use std::path::Path;
}

/// Run the ifs-bench CLI and return its exit code.
///
/// ```ignore
/// fn main() {
///     std::process::exit(ifsbench::run());
/// }
/// ```
pub use ifsbench_cli::run;
