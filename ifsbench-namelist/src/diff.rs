//! Structural Namelist Diff
//!
//! Compares two namelists key by key. Groups are visited in the order of the
//! `before` namelist followed by groups that only exist in `after`; keys within a
//! group follow the same rule. The report is a pure function of its inputs.

use crate::model::{Group, Namelist};
use crate::value::{Array, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Only in `after`
    Added,
    /// Only in `before`
    Removed,
    /// In both, different values
    Changed,
    /// In both, equal values
    Unchanged,
}

impl ChangeKind {
    /// Lowercase label
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Changed => "changed",
            ChangeKind::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How arrays are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayDiffMode {
    /// One change per key
    #[default]
    Whole,
    /// One change per element, keyed `KEY(i)`
    PerElement,
}

impl FromStr for ArrayDiffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "whole" => Ok(ArrayDiffMode::Whole),
            "per-element" => Ok(ArrayDiffMode::PerElement),
            other => Err(format!("unknown array mode '{}' (expected whole or per-element)", other)),
        }
    }
}

/// Diff options
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Relative float tolerance; 0 means exact
    pub tolerance: f64,
    /// Also report equal keys
    pub include_unchanged: bool,
    /// Array comparison granularity
    pub array_mode: ArrayDiffMode,
}

/// One `(group, key)` comparison result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Group name
    pub group: String,
    /// Key name (`KEY(i)` for per-element entries)
    pub key: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Value in `before`
    pub before: Option<Value>,
    /// Value in `after`
    pub after: Option<Value>,
}

fn side(value: &Option<Value>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "None".to_string())
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}: {} -> {}",
            self.kind,
            self.group,
            self.key,
            side(&self.before),
            side(&self.after)
        )
    }
}

/// Ordered list of changes between two namelists
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    changes: Vec<Change>,
}

impl DiffReport {
    /// All entries in report order
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Iterate entries
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the report holds no entry at all
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether any entry is not `unchanged`
    pub fn has_differences(&self) -> bool {
        self.changes.iter().any(|c| c.kind != ChangeKind::Unchanged)
    }

    /// Number of entries of one kind
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    /// One rendered line per entry
    pub fn render_lines(&self) -> Vec<String> {
        self.changes.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{}", change)?;
        }
        Ok(())
    }
}

/// Compare `before` against `after`
pub fn diff(before: &Namelist, after: &Namelist, options: &DiffOptions) -> DiffReport {
    let mut report = DiffReport::default();
    let empty = Group::empty();

    for group in before.groups() {
        let theirs = after.group(group.name()).unwrap_or(&empty);
        diff_group(&mut report, group.name(), group, theirs, options);
    }
    for group in after.groups() {
        if !before.contains_group(group.name()) {
            diff_group(&mut report, group.name(), &empty, group, options);
        }
    }
    report
}

fn diff_group(report: &mut DiffReport, name: &str, before: &Group, after: &Group, options: &DiffOptions) {
    for (key, old) in before.iter() {
        diff_key(report, name, key, Some(old), after.get(key), options);
    }
    for (key, new) in after.iter() {
        if !before.contains_key(key) {
            diff_key(report, name, key, None, Some(new), options);
        }
    }
}

fn diff_key(
    report: &mut DiffReport,
    group: &str,
    key: &str,
    before: Option<&Value>,
    after: Option<&Value>,
    options: &DiffOptions,
) {
    if options.array_mode == ArrayDiffMode::PerElement {
        if let (Some(Value::Array(a)), Some(Value::Array(b))) = (before, after) {
            diff_elements(report, group, key, a, b, options);
            return;
        }
    }

    let kind = match (before, after) {
        (Some(_), None) => ChangeKind::Removed,
        (None, Some(_)) => ChangeKind::Added,
        (Some(a), Some(b)) if a.approx_eq(b, options.tolerance) => ChangeKind::Unchanged,
        (Some(_), Some(_)) => ChangeKind::Changed,
        (None, None) => return,
    };
    push(report, group, key.to_string(), kind, before.cloned(), after.cloned(), options);
}

fn diff_elements(report: &mut DiffReport, group: &str, key: &str, a: &Array, b: &Array, options: &DiffOptions) {
    let indices: BTreeSet<usize> = a.iter().chain(b.iter()).map(|(i, _)| i).collect();
    for index in indices {
        let before = a.get(index);
        let after = b.get(index);
        let kind = match (before, after) {
            (Some(_), None) => ChangeKind::Removed,
            (None, Some(_)) => ChangeKind::Added,
            (Some(x), Some(y)) if x.approx_eq(y, options.tolerance) => ChangeKind::Unchanged,
            (Some(_), Some(_)) => ChangeKind::Changed,
            (None, None) => continue,
        };
        push(
            report,
            group,
            format!("{}({})", key, index),
            kind,
            before.cloned().map(Value::Scalar),
            after.cloned().map(Value::Scalar),
            options,
        );
    }
}

fn push(
    report: &mut DiffReport,
    group: &str,
    key: String,
    kind: ChangeKind,
    before: Option<Value>,
    after: Option<Value>,
    options: &DiffOptions,
) {
    if kind == ChangeKind::Unchanged && !options.include_unchanged {
        return;
    }
    report.changes.push(Change {
        group: group.to_string(),
        key,
        kind,
        before,
        after,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    #[test]
    fn test_added_changed_rendering() {
        let default = parse_str("&A x = 1 /").unwrap();
        let effective = parse_str("&A x = 2 /\n&B y = 'hi' /").unwrap();
        let report = diff(&default, &effective, &DiffOptions::default());
        assert_eq!(
            report.render_lines(),
            vec!["changed A.x: 1 -> 2", "added B.y: None -> \"hi\""]
        );
    }

    #[test]
    fn test_identical_is_empty() {
        let nml = parse_str("&A x = 1, r = 1.5, s = 'a' /").unwrap();
        let report = diff(&nml, &nml, &DiffOptions::default());
        assert!(report.is_empty());
        assert!(!report.has_differences());
    }

    #[test]
    fn test_include_unchanged() {
        let a = parse_str("&A x = 1, y = 2 /").unwrap();
        let b = parse_str("&A x = 1, y = 3 /").unwrap();
        let options = DiffOptions {
            include_unchanged: true,
            ..Default::default()
        };
        let report = diff(&a, &b, &options);
        assert_eq!(report.count(ChangeKind::Unchanged), 1);
        assert_eq!(report.count(ChangeKind::Changed), 1);
        assert_eq!(report.render_lines()[0], "unchanged A.x: 1 -> 1");
    }

    #[test]
    fn test_float_tolerance() {
        let a = parse_str("&A r = 100.0 /").unwrap();
        let b = parse_str("&A r = 100.001 /").unwrap();
        assert_eq!(diff(&a, &b, &DiffOptions::default()).len(), 1);

        let loose = DiffOptions {
            tolerance: 1e-4,
            ..Default::default()
        };
        assert!(diff(&a, &b, &loose).is_empty());
    }

    #[test]
    fn test_int_never_equals_float() {
        let a = parse_str("&A n = 1 /").unwrap();
        let b = parse_str("&A n = 1.0 /").unwrap();
        let report = diff(&a, &b, &DiffOptions::default());
        assert_eq!(report.render_lines(), vec!["changed A.n: 1 -> 1.0"]);
    }

    #[test]
    fn test_array_modes() {
        let a = parse_str("&A v = 1, 2, 3 /").unwrap();
        let b = parse_str("&A v = 1, 5 /").unwrap();

        let whole = diff(&a, &b, &DiffOptions::default());
        assert_eq!(whole.render_lines(), vec!["changed A.v: [1, 2, 3] -> [1, 5]"]);

        let per_element = DiffOptions {
            array_mode: ArrayDiffMode::PerElement,
            ..Default::default()
        };
        let report = diff(&a, &b, &per_element);
        assert_eq!(
            report.render_lines(),
            vec!["changed A.v(2): 2 -> 5", "removed A.v(3): 3 -> None"]
        );
    }

    #[test]
    fn test_order_before_then_after_only() {
        let a = parse_str("&G1 a = 1, b = 2 /\n&G2 c = 3 /").unwrap();
        let b = parse_str("&G3 z = 0 /\n&G2 d = 4 /\n&G1 b = 2, a = 1 /").unwrap();
        let keys: Vec<String> = diff(&a, &b, &DiffOptions::default())
            .iter()
            .map(|c| format!("{}.{}", c.group, c.key))
            .collect();
        assert_eq!(keys, vec!["G2.c", "G2.d", "G3.z"]);
    }

    #[test]
    fn test_add_remove_symmetry() {
        let a = parse_str("&A x = 1, y = 2 /").unwrap();
        let b = parse_str("&A x = 1, z = 3 /").unwrap();
        let ab = diff(&a, &b, &DiffOptions::default());
        let ba = diff(&b, &a, &DiffOptions::default());
        assert_eq!(ab.count(ChangeKind::Added), ba.count(ChangeKind::Removed));
        assert_eq!(ab.count(ChangeKind::Removed), ba.count(ChangeKind::Added));
    }
}
