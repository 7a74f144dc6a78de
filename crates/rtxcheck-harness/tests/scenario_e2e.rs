//! End-to-end runs of the built-in scenarios against the simulator.

use rtxcheck_harness::scenario::{Scenario, ScenarioReport, DEFAULT_SEED};
use rtxcheck_harness::script::TaskScript;
use rtxcheck_harness::Priority;
use rtxcheck_trace::{CaseSpec, TaskId, MAX_TRACE_LEN};

#[test]
fn every_builtin_scenario_passes() {
    for scenario in Scenario::all() {
        let report = scenario.run(DEFAULT_SEED).unwrap();
        assert!(report.passed, "{}:\n{report}", scenario.name());
        assert!(report.cases.iter().all(|c| c.checks.iter().all(|k| k.passed)));
    }
}

#[test]
fn runs_are_reproducible() {
    let a = Scenario::preempt_mbx().run(11).unwrap();
    let b = Scenario::preempt_mbx().run(11).unwrap();
    assert_eq!(a.cases[0].recorded, b.cases[0].recorded);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn perturbed_expectation_is_caught_and_reported() {
    // Same scripts as a passing run, but the expected order claims the
    // checker's spawn slot ran a checkpoint it never reaches.
    let checker = TaskScript::for_case(1).verify(1, 0).exit();
    let root = TaskScript::for_case(0)
        .checkpoint()
        .spawn(Priority::Lowest, checker, "spawn checker", true)
        .checkpoint()
        .exit();
    let scenario = Scenario::new(
        "perturbed",
        "RTX-TSX",
        vec![
            CaseSpec::sequence(vec![TaskId(1), TaskId(2)], MAX_TRACE_LEN),
            CaseSpec::checks_only(),
        ],
        root,
        Priority::High,
    );

    let report = scenario.run(DEFAULT_SEED).unwrap();
    assert!(!report.passed);

    // Verdicts survive a JSON round trip for offline triage.
    let json = serde_json::to_string_pretty(&report).unwrap();
    let loaded: ScenarioReport = serde_json::from_str(&json).unwrap();
    assert!(!loaded.passed);
    let failed: Vec<&str> = loaded.cases[1]
        .checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.label.as_str())
        .collect();
    assert_eq!(failed, vec!["execution sequence @ 1"]);
}
