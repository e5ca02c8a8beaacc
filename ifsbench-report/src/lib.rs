#![warn(missing_docs)]
//! ifsbench Report - Results and Regressions
//!
//! Turns finished runs into findings:
//! - Artifact and timer collection from working directories
//! - Timing statistics across repetitions
//! - Regression checks against a baseline namelist or run
//! - Human and JSON batch reports

mod collector;
mod formatting;
mod json;
mod regression;
mod report;
mod summary;

pub use collector::{
    ArtifactMissingError, Collection, FoundArtifact, ResultCollector, SavedTimings, TIMINGS_FILE,
    WALL_CLOCK,
};
pub use formatting::format_human_report;
pub use json::generate_json_report;
pub use regression::{
    Baseline, DEFAULT_THRESHOLD, RegressionCheck, RegressionError, TimingChange, check_regression,
};
pub use report::{BatchReport, ExperimentSummary, ReportMeta, ReportSummary, RunReport, build_report};
pub use summary::{TimingSummary, percentile, summarize};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Render `report` in `format`
pub fn render(report: &BatchReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Human => Ok(format_human_report(report)),
        OutputFormat::Json => generate_json_report(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse(), Ok(OutputFormat::Json));
        assert_eq!("text".parse(), Ok(OutputFormat::Human));
        assert_eq!(
            "csv".parse::<OutputFormat>(),
            Err("Unknown output format: csv".to_string())
        );
    }
}
