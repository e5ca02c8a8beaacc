//! Orchestration Errors

use ifsbench_namelist::ConfigError;
use thiserror::Error;

/// Why a run could not be set up or started
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Working directory, namelist or manifest could not be written
    #[error("Materialization failed for {path}: {source}")]
    Materialization {
        /// File or directory involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Effective configuration could not be composed
    #[error("Materialization failed: {0}")]
    Config(#[from] ConfigError),

    /// Process could not be spawned
    #[error("Failed to launch {program}: {source}")]
    Launch {
        /// Program that was spawned
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Worker pool could not be built
    #[error("Failed to build run pool: {0}")]
    Pool(String),
}

impl OrchestrationError {
    pub(crate) fn materialization(path: &std::path::Path, source: std::io::Error) -> Self {
        OrchestrationError::Materialization {
            path: path.display().to_string(),
            source,
        }
    }
}
