//! Human Output
//!
//! Terminal rendering of a batch report: one line per run with its state,
//! timing statistics per experiment, and the regression checks.

use crate::report::BatchReport;
use ifsbench_run::RunState;

fn state_icon(state: RunState) -> &'static str {
    match state {
        RunState::Completed => "✓",
        RunState::Failed => "✗",
        RunState::TimedOut => "⏱",
        RunState::Cancelled => "⊘",
        _ => "?",
    }
}

/// Format a report for terminal display
pub fn format_human_report(report: &BatchReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("ifsbench Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    for run in &report.runs {
        let label = match run.repetition {
            Some(rep) => format!("{} #{}", run.experiment, rep),
            None => run.experiment.clone(),
        };
        output.push_str(&format!(
            "  {} {:<30} {:<10} {:>10.2}s\n",
            state_icon(run.state),
            label,
            run.state,
            run.duration_secs
        ));
        if let Some(failure) = &run.failure {
            for line in failure.lines() {
                output.push_str(&format!("      {}\n", line));
            }
        }
        if !run.missing_artifacts.is_empty() {
            output.push_str(&format!("      missing artifacts: {}\n", run.missing_artifacts.join(", ")));
        }
    }

    if !report.experiments.is_empty() {
        output.push_str("\nTimings\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for experiment in &report.experiments {
            output.push_str(&format!("  {}\n", experiment.experiment));
            for (name, s) in &experiment.timers {
                output.push_str(&format!(
                    "      {:<16} mean: {:.3}s  median: {:.3}s  stddev: {:.3}s  min: {:.3}s  max: {:.3}s  (n={})\n",
                    name, s.mean, s.median, s.std_dev, s.min, s.max, s.samples
                ));
            }
        }
    }

    if !report.regressions.is_empty() {
        output.push_str("\nRegression Check\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for check in &report.regressions {
            output.push_str(&format!("  {} vs {}\n", check.experiment, check.baseline.display()));
            if check.config_changed() {
                for line in check.diff.render_lines() {
                    output.push_str(&format!("      {}\n", line));
                }
            } else {
                output.push_str("      namelist unchanged\n");
            }
            for t in &check.timings {
                let marker = if t.regressed {
                    "  REGRESSION"
                } else if t.improved {
                    "  improved"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "      {:<16} {:.3}s -> {:.3}s ({:+.1}%){}\n",
                    t.name, t.baseline, t.current, t.relative_change, marker
                ));
            }
        }
    }

    let s = &report.summary;
    output.push('\n');
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "Summary: {} runs, {} completed, {} failed, {} timed out, {} cancelled\n",
        s.total, s.completed, s.failed, s.timed_out, s.cancelled
    ));
    if s.missing_artifacts > 0 {
        output.push_str(&format!("  {} required artifact(s) missing\n", s.missing_artifacts));
    }
    if !report.regressions.is_empty() {
        output.push_str(&format!(
            "  {} namelist change(s), {} timing regression(s), {} improvement(s)\n",
            s.config_changes, s.regressions, s.improvements
        ));
    }

    output
}
