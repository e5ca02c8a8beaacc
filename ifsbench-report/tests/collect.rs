//! Collecting, comparing and reporting real runs

use ifsbench_namelist::{ConfigLayer, DiffOptions, Namelist, ParseOptions, Provenance};
use ifsbench_report::{
    Baseline, OutputFormat, ResultCollector, SavedTimings, WALL_CLOCK, build_report, check_regression,
    render,
};
use ifsbench_run::{OrchestratorOptions, RunOrchestrator, RunState};
use ifsbench_spec::{BenchmarkSpec, SpecContext, TimerSource};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

fn spec(dir: &Path, nstop: i64) -> BenchmarkSpec {
    let exe = dir.join("model.sh");
    fs::write(
        &exe,
        "#!/bin/sh\nmkdir -p out\necho data > out/ICMSHhbas+000006\necho 'STEP 1 took 0.25s'\necho 'TOTAL TIME 1.5D0' >&2\necho 'setup 0.125' > timing.txt\n",
    )
    .unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let nml = Namelist::builder().set("NAMCT0", "NSTOP", nstop).build().unwrap();
    BenchmarkSpec::builder("t21", exe.to_str().unwrap())
        .layer(ConfigLayer::new("defaults", Provenance::Default, nml))
        .artifact("spectral", r"^out/ICMSH\w+\+\d+$", true)
        .artifact("restart", r"^srf\d+$", true)
        .artifact("optional", r"^NODE\.", false)
        .timer("step", r"STEP \d+ took ([0-9.]+)s", TimerSource::Stdout)
        .timer("total", r"TOTAL TIME\s+(?P<value>\S+)", TimerSource::Stderr)
        .timer("setup", r"setup ([0-9.]+)", TimerSource::File("timing.txt".into()))
        .timer("never", r"NEVER ([0-9.]+)", TimerSource::Stdout)
        .build(&SpecContext::from_process())
        .unwrap()
}

fn options() -> OrchestratorOptions {
    OrchestratorOptions {
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[test]
fn collect_compare_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let base_spec = spec(dir.path(), 6);

    // Baseline run
    let base = RunOrchestrator::new(&base_spec, dir.path().join("runs/base"))
        .with_options(options())
        .run();
    assert_eq!(base.state, RunState::Completed);
    let collector = ResultCollector::new(&base_spec);
    let base_collection = collector.collect(&base);
    base_collection.write_timings().unwrap();

    assert_eq!(base_collection.artifacts.len(), 1);
    assert_eq!(base_collection.artifacts[0].path, "out/ICMSHhbas+000006");
    assert_eq!(base_collection.missing.len(), 1);
    assert_eq!(base_collection.missing[0].artifact, "restart");
    assert_eq!(base_collection.timers["step"], 0.25);
    assert_eq!(base_collection.timers["total"], 1.5);
    assert_eq!(base_collection.timers["setup"], 0.125);
    assert_eq!(base_collection.missing_timers, vec!["never".to_string()]);
    // Collection leaves the run result untouched
    assert_eq!(base.state, RunState::Completed);

    // Current run with a changed namelist
    let current_spec = spec(dir.path(), 12);
    let current = RunOrchestrator::new(&current_spec, dir.path().join("runs/current"))
        .with_options(options())
        .run();
    let collection = ResultCollector::new(&current_spec).collect(&current);

    let baseline = Baseline::load(&dir.path().join("runs/base"), &ParseOptions::default()).unwrap();
    let saved = SavedTimings::load(&dir.path().join("runs/base")).unwrap();
    assert_eq!(saved.get("total"), Some(1.5));

    let check = check_regression(
        &collection,
        current.config.as_ref().unwrap(),
        &baseline,
        &DiffOptions::default(),
        1000.0,
    );
    assert!(check.config_changed());
    assert_eq!(
        check.diff.render_lines(),
        vec!["changed NAMCT0.NSTOP: 6 -> 12".to_string()]
    );
    assert_eq!(check.timings[0].name, WALL_CLOCK);
    assert_eq!(check.regressions(), 0);

    let results = vec![base, current];
    let collections = vec![base_collection, collection];
    let report = build_report(&results, &collections, vec![check]);
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.missing_artifacts, 2);
    assert_eq!(report.summary.config_changes, 1);
    assert_eq!(report.experiments.len(), 1);
    assert_eq!(report.experiments[0].timers["total"].samples, 2);

    let human = render(&report, OutputFormat::Human).unwrap();
    assert!(human.contains("ifsbench Results"));
    assert!(human.contains("changed NAMCT0.NSTOP: 6 -> 12"));

    let json: serde_json::Value = serde_json::from_str(&render(&report, OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["summary"]["completed"], 2);
    assert_eq!(json["runs"][0]["state"], "completed");
}
