//! Namelist comparison for `ifs-bench compare` and `nml-diff`

use ifsbench_namelist::{DiffOptions, DiffReport, GroupMergeStrategy, ParseOptions, diff};
use ifsbench_report::Baseline;
use std::io::Write;
use std::path::Path;

/// Exit code when both sides are equal
pub const EXIT_SAME: i32 = 0;
/// Exit code when differences were found
pub const EXIT_DIFFERENT: i32 = 1;
/// Exit code when a side could not be read
pub const EXIT_UNREADABLE: i32 = 2;

/// Compare two namelist files or run directories.
///
/// `before` is the reference side; additions are keys only `after` has.
pub fn compare_paths(
    before: &Path,
    after: &Path,
    duplicate_groups: GroupMergeStrategy,
    options: &DiffOptions,
) -> anyhow::Result<DiffReport> {
    let parse = ParseOptions {
        schema: None,
        duplicate_groups,
    };
    let a = Baseline::load(before, &parse)?;
    let b = Baseline::load(after, &parse)?;
    Ok(diff(a.namelist(), b.namelist(), options))
}

/// Print one change per line and return the exit code for the report
pub fn print_report(report: &DiffReport, out: &mut impl Write) -> std::io::Result<i32> {
    for line in report.render_lines() {
        writeln!(out, "{}", line)?;
    }
    Ok(if report.has_differences() {
        EXIT_DIFFERENT
    } else {
        EXIT_SAME
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsbench_namelist::ArrayDiffMode;
    use std::fs;

    #[test]
    fn test_compare_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nml");
        let b = dir.path().join("b.nml");
        fs::write(&a, "&NAMCT0\n  NSTOP = 24,\n  NFRHIS = 1, 2,\n/\n").unwrap();
        fs::write(&b, "&namct0\n  nstop = 48,\n  nfrhis = 1, 3,\n/\n").unwrap();

        let options = DiffOptions {
            array_mode: ArrayDiffMode::PerElement,
            ..Default::default()
        };
        let report = compare_paths(&a, &b, GroupMergeStrategy::Reject, &options).unwrap();
        assert_eq!(report.len(), 2);

        let mut out = Vec::new();
        assert_eq!(print_report(&report, &mut out).unwrap(), EXIT_DIFFERENT);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("NSTOP"));
    }

    #[test]
    fn test_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nml");
        fs::write(&a, "&NAMCT0\n  NSTOP = 24,\n/\n").unwrap();

        let report = compare_paths(&a, &a, GroupMergeStrategy::Reject, &DiffOptions::default()).unwrap();
        let mut out = Vec::new();
        assert_eq!(print_report(&report, &mut out).unwrap(), EXIT_SAME);
        assert!(out.is_empty());
    }

    #[test]
    fn test_duplicate_group_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nml");
        let b = dir.path().join("b.nml");
        fs::write(&a, "&NAMCT0\n  NSTOP = 24,\n/\n&NAMCT0\n  NSTOP = 12,\n/\n").unwrap();
        fs::write(&b, "&NAMCT0\n  NSTOP = 24,\n/\n").unwrap();

        assert!(compare_paths(&a, &b, GroupMergeStrategy::Reject, &DiffOptions::default()).is_err());
        let report = compare_paths(&a, &b, GroupMergeStrategy::First, &DiffOptions::default()).unwrap();
        assert!(!report.has_differences());
    }
}
