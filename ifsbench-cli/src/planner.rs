//! Benchmark Planner
//!
//! Builds an execution plan by filtering and ordering loaded specs.
//!
//! Filtering options:
//! - Regex pattern matching on the experiment identifier
//! - Tag inclusion/exclusion
//!
//! Ordering: specs are sorted by identifier for deterministic execution.

use ifsbench_spec::BenchmarkSpec;
use regex::Regex;
use std::collections::BTreeMap;

/// Execution plan for a batch
pub struct ExecutionPlan {
    /// Ordered specs to run
    pub specs: Vec<BenchmarkSpec>,
}

impl ExecutionPlan {
    /// Whether nothing was selected
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Filter `specs` and return them in deterministic order
pub fn build_plan(
    specs: impl IntoIterator<Item = BenchmarkSpec>,
    filter: Option<&Regex>,
    tag: Option<&str>,
    skip_tag: Option<&str>,
) -> ExecutionPlan {
    let mut selected: Vec<_> = specs
        .into_iter()
        .filter(|s| filter.is_none_or(|re| re.is_match(s.id())))
        .filter(|s| tag.is_none_or(|t| s.has_tag(t)))
        .filter(|s| skip_tag.is_none_or(|t| !s.has_tag(t)))
        .collect();

    selected.sort_by(|a, b| a.id().cmp(b.id()));

    ExecutionPlan { specs: selected }
}

/// Every tag across `specs` with its use count
pub fn tag_counts(specs: &[BenchmarkSpec]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for spec in specs {
        for tag in spec.tags() {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsbench_namelist::{ConfigLayer, Namelist, Provenance};
    use ifsbench_spec::SpecContext;

    fn make_spec(id: &str, tags: &[&str]) -> BenchmarkSpec {
        let defaults = Namelist::builder().set("NAMCT0", "NSTOP", 6).build().unwrap();
        let mut builder = BenchmarkSpec::builder(id, "/bin/sh")
            .layer(ConfigLayer::new("defaults", Provenance::Default, defaults));
        for tag in tags {
            builder = builder.tag(*tag);
        }
        builder.build(&SpecContext::from_vars(Vec::<(String, String)>::new())).unwrap()
    }

    #[test]
    fn test_no_filter() {
        let specs = vec![
            make_spec("tco399", &[]),
            make_spec("t21", &[]),
            make_spec("tco199", &[]),
        ];

        let plan = build_plan(specs, None, None, None);

        assert_eq!(plan.specs.len(), 3);
        assert_eq!(plan.specs[0].id(), "t21");
        assert_eq!(plan.specs[1].id(), "tco199");
        assert_eq!(plan.specs[2].id(), "tco399");
    }

    #[test]
    fn test_regex_filter() {
        let specs = vec![make_spec("t21", &[]), make_spec("tco199", &[]), make_spec("tco399", &[])];
        let re = Regex::new("^tco").unwrap();

        let plan = build_plan(specs, Some(&re), None, None);

        assert_eq!(plan.specs.len(), 2);
        assert!(plan.specs.iter().all(|s| s.id().starts_with("tco")));
    }

    #[test]
    fn test_tag_filter() {
        let specs = vec![
            make_spec("a", &["smoke"]),
            make_spec("b", &["nightly"]),
            make_spec("c", &["smoke", "mpi"]),
        ];

        let plan = build_plan(specs, None, Some("smoke"), Some("mpi"));

        assert_eq!(plan.specs.len(), 1);
        assert_eq!(plan.specs[0].id(), "a");
    }

    #[test]
    fn test_tag_counts() {
        let specs = vec![make_spec("a", &["smoke"]), make_spec("b", &["smoke", "mpi"])];
        let counts = tag_counts(&specs);
        assert_eq!(counts.get("smoke"), Some(&2));
        assert_eq!(counts.get("mpi"), Some(&1));
    }
}
