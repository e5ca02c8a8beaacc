//! Run Manifest
//!
//! `manifest.json` in each working directory records what was run and how it
//! ended. An initial manifest is written before launch and rewritten once the
//! run reaches a terminal state.

use crate::metadata::HostInfo;
use crate::process::ExitInfo;
use crate::state::{RunState, StateChange};
use chrono::{DateTime, Utc};
use ifsbench_namelist::LayerIdentity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the manifest
pub const MANIFEST_FILE: &str = "manifest.json";

/// Persisted description of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Tool version that wrote the manifest
    pub tool_version: String,
    /// Experiment identifier
    pub experiment: String,
    /// SHA-256 of the effective namelist
    pub config_digest: String,
    /// Contributing layers, lowest precedence first
    pub layers: Vec<LayerIdentity>,
    /// Overrides applied after composition
    pub overrides: Vec<String>,
    /// Program and arguments
    pub command: Vec<String>,
    /// Namelist file name in the working directory
    pub namelist_file: String,
    /// State when the manifest was written
    pub state: RunState,
    /// Exit status, once known
    pub exit: Option<ExitInfo>,
    /// Run start (UTC)
    pub started_at: DateTime<Utc>,
    /// Run end (UTC)
    pub finished_at: Option<DateTime<Utc>>,
    /// Seconds from launch to exit
    pub duration_secs: Option<f64>,
    /// Failure description for failed runs
    pub failure: Option<String>,
    /// Machine the run executed on
    pub host: HostInfo,
    /// Every state entered
    pub history: Vec<StateChange>,
}

impl RunManifest {
    /// Write as pretty JSON
    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Read a manifest written by [`write`](Self::write)
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
