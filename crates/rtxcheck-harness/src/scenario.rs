//! Built-in scenarios and the scenario runner.
//!
//! A [`Scenario`] bundles the cases to register, the root task script,
//! and the timer setup for one run. [`Scenario::run`] registers the
//! cases, boots the simulated kernel with the root task, interprets one
//! script op per scheduling quantum, and finally folds the session into a
//! serializable [`ScenarioReport`].
//!
//! The shipped scenarios:
//!
//! - **preempt-mbx** — a root task spawns two high-priority peers and a
//!   lowest-priority checker; the peers promote themselves to real-time,
//!   exchange non-blocking mailbox messages with period suspensions in
//!   between, and exit; the checker then scores the recorded checkpoint
//!   order (case 0) under its own case (case 1).
//! - **timed-delay** — a root task busy-waits on the simulated
//!   free-running timer between two checkpoints, exercising the
//!   tick-difference engine under seeded jitter.

use crate::kernel::{KernelError, Priority, MSG_KIND_DEFAULT};
use crate::script::{Op, TaskScript};
use crate::sim::SimKernel;
use log::{debug, info};
use rtxcheck_timer::{spin_wait, FreeRunTimer, TimerConfig, TimerError, FREE_RUN_TIMER};
use rtxcheck_trace::{
    CaseId, CaseSpec, CaseVerdict, CheckOutcome, SequenceVerifier, TaskId, TraceError,
    TraceSession, MAX_TRACE_LEN,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Seed used when the caller does not supply one.
pub const DEFAULT_SEED: u64 = 42;

/// Heap budget handed to the simulated kernel.
const HEAP_BYTES: usize = 1024;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("kernel rejected the root task: {0}")]
    Root(#[from] KernelError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

// ═══════════════════════════════════════════════════════════════════════
//  Scenario
// ═══════════════════════════════════════════════════════════════════════

/// A scripted exercise of the kernel under test.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: &'static str,
    prefix: &'static str,
    cases: Vec<CaseSpec>,
    root: TaskScript,
    root_priority: Priority,
    /// Simulated timer advance per sample, milliseconds.
    timer_step_ms: u64,
    /// Maximum extra advance per sample under seeded jitter, milliseconds.
    jitter_ms: u64,
}

impl Scenario {
    pub fn new(
        name: &'static str,
        prefix: &'static str,
        cases: Vec<CaseSpec>,
        root: TaskScript,
        root_priority: Priority,
    ) -> Self {
        Self {
            name,
            prefix,
            cases,
            root,
            root_priority,
            timer_step_ms: 1,
            jitter_ms: 0,
        }
    }

    /// Override the simulated timer's step and jitter bound.
    pub fn with_timer(mut self, step_ms: u64, jitter_ms: u64) -> Self {
        self.timer_step_ms = step_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Every built-in scenario.
    pub fn all() -> Vec<Scenario> {
        vec![Self::preempt_mbx(), Self::timed_delay()]
    }

    /// Look up a built-in scenario by name.
    pub fn by_name(name: &str) -> Option<Scenario> {
        Self::all().into_iter().find(|s| s.name == name)
    }

    /// Preemption, yield, real-time promotion/suspension, and
    /// non-blocking mailbox traffic, recorded under case 0 and verified
    /// under case 1.
    pub fn preempt_mbx() -> Scenario {
        const ROOT: TaskId = TaskId(1);
        const RECEIVER: TaskId = TaskId(2);
        const SENDER: TaskId = TaskId(3);

        // Checkpoint order under the simulator's strict-priority,
        // FIFO-within-level scheduling.
        let expected = vec![
            ROOT, RECEIVER, RECEIVER, SENDER, SENDER, RECEIVER, SENDER, ROOT, RECEIVER,
        ];

        let receiver = TaskScript::for_case(0)
            .checkpoint()
            .alloc(128, "receiver: allocate receive buffer", true)
            .mbx_create(64, "receiver: create mailbox", true)
            .rt_set(6, "receiver: promote to real-time", true)
            .checkpoint()
            .rt_get(TaskId(9), "receiver: period query for unknown task is rejected", false)
            .rt_set(6, "receiver: repeated promotion is rejected", false)
            .recv_nb("receiver: receive on empty mailbox is rejected", false)
            .rt_suspend("receiver: wait one period", true)
            .recv_nb("receiver: receive first message", true)
            .checkpoint()
            .rt_suspend("receiver: wait another period", true)
            .recv_nb("receiver: receive second message", true)
            .free("receiver: release receive buffer", true)
            .checkpoint()
            .exit();

        let sender = TaskScript::for_case(0)
            .checkpoint()
            .rt_set(0, "sender: zero period is rejected", false)
            .rt_set(2, "sender: promote to real-time", true)
            .checkpoint()
            .send_nb(
                RECEIVER,
                MSG_KIND_DEFAULT,
                b"A".to_vec(),
                "sender: first non-blocking send",
                true,
            )
            .rt_suspend("sender: wait one period", true)
            .send_nb(
                RECEIVER,
                MSG_KIND_DEFAULT,
                b"B".to_vec(),
                "sender: second non-blocking send",
                true,
            )
            .checkpoint()
            .exit();

        let checker = TaskScript::for_case(1).verify(1, 0).exit();

        let root = TaskScript::for_case(0)
            .checkpoint()
            .spawn(Priority::High, receiver, "root: spawn receiver", true)
            .spawn(Priority::High, sender, "root: spawn sender", true)
            .spawn(Priority::Lowest, checker, "root: spawn checker", true)
            .mbx_create(128, "root: create mailbox", true)
            .rt_suspend("root: real-time suspend from a plain task is rejected", false)
            .yield_now()
            .checkpoint()
            .exit();

        Scenario::new(
            "preempt-mbx",
            "RTX-TS1",
            vec![
                CaseSpec::sequence(expected, MAX_TRACE_LEN),
                CaseSpec::checks_only(),
            ],
            root,
            Priority::High,
        )
    }

    /// Busy-wait timing between checkpoints.
    pub fn timed_delay() -> Scenario {
        const ROOT: TaskId = TaskId(1);

        let checker = TaskScript::for_case(1).verify(1, 0).exit();
        let root = TaskScript::for_case(0)
            .checkpoint()
            .spawn(Priority::Lowest, checker, "root: spawn checker", true)
            .spin(50)
            .checkpoint()
            .exit();

        Scenario::new(
            "timed-delay",
            "RTX-TS2",
            vec![
                CaseSpec::sequence(vec![ROOT, ROOT], MAX_TRACE_LEN),
                CaseSpec::checks_only(),
            ],
            root,
            Priority::Medium,
        )
        .with_timer(1, 1)
    }

    // ═══════════════════════════════════════════════════════════════
    //  Runner
    // ═══════════════════════════════════════════════════════════════

    /// Run the scenario to quiescence and report.
    pub fn run(&self, seed: u64) -> Result<ScenarioReport, ScenarioError> {
        info!("{}: START (seed {seed})", self.prefix);

        let mut session = TraceSession::new(self.prefix);
        for spec in &self.cases {
            session.register(spec.clone())?;
        }

        let config = TimerConfig::reference_100mhz();
        let mut timer = FreeRunTimer::new(FREE_RUN_TIMER, &config)?
            .with_step(self.timer_step_ms as i64 * config.units_per_ms());
        if self.jitter_ms > 0 {
            timer = timer.with_jitter(seed, self.jitter_ms as i64 * config.units_per_ms());
        }

        let mut kernel = SimKernel::new(HEAP_BYTES);
        kernel.spawn(self.root.clone(), self.root_priority)?;

        while let Some(tid) = kernel.schedule() {
            let Some(op) = kernel.fetch_op(tid) else {
                // scripts normally end in Exit; an exhausted script exits
                // implicitly so the scenario still quiesces
                kernel.exit(tid);
                continue;
            };
            execute(op, tid, &mut kernel, &mut session, &mut timer, &config)?;
        }

        let report = ScenarioReport::from_session(self.name, seed, &session);
        info!(
            "{}: {} ({} cases)",
            self.prefix,
            if report.passed { "PASS" } else { "FAIL" },
            report.cases.len()
        );
        Ok(report)
    }
}

/// Interpret one op on behalf of `tid`.
fn execute(
    op: Op,
    tid: TaskId,
    kernel: &mut SimKernel,
    session: &mut TraceSession,
    timer: &mut FreeRunTimer,
    config: &TimerConfig,
) -> Result<(), ScenarioError> {
    let own_case = kernel.case_of(tid);
    match op {
        Op::Checkpoint => session.record(own_case, tid),
        Op::Yield => kernel.yield_now(tid),
        Op::Exit => kernel.exit(tid),
        Op::Spin { ms } => spin_wait(timer, config, ms)?,
        Op::Verify { case, source } => {
            let report = SequenceVerifier::verify(session, case, source)?;
            debug!("{report}");
        }
        Op::Spawn {
            priority,
            script,
            label,
            expect_ok,
        } => {
            let result = kernel.spawn(script, priority).map(drop);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::RtSet {
            period,
            label,
            expect_ok,
        } => {
            let result = kernel.rt_set(tid, period);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::RtGet {
            target,
            label,
            expect_ok,
        } => {
            let result = kernel.rt_get(target).map(drop);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::RtSuspend { label, expect_ok } => {
            let result = kernel.rt_suspend(tid);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::MbxCreate {
            capacity,
            label,
            expect_ok,
        } => {
            let result = kernel.mbx_create(tid, capacity);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::SendNb {
            to,
            kind,
            payload,
            label,
            expect_ok,
        } => {
            let result = kernel.send_nb(tid, to, kind, payload);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::RecvNb { label, expect_ok } => {
            let result = kernel.recv_nb(tid).map(drop);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::Alloc {
            bytes,
            label,
            expect_ok,
        } => {
            let result = kernel.alloc(tid, bytes);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
        Op::Free { label, expect_ok } => {
            let result = kernel.free(tid);
            score(kernel, session, tid, own_case, label, expect_ok, result);
        }
    }
    Ok(())
}

/// Score a kernel-call outcome against its expectation. A contradicted
/// expectation cancels the rest of the task's script; the scenario and
/// its reporting continue.
fn score(
    kernel: &mut SimKernel,
    session: &mut TraceSession,
    tid: TaskId,
    case: CaseId,
    label: &str,
    expect_ok: bool,
    result: Result<(), KernelError>,
) {
    if let Err(err) = &result {
        debug!("{}: {label}: {err}", session.prefix());
    }
    let passed = result.is_ok() == expect_ok;
    if !session.check(case, label, passed) {
        kernel.cancel(tid);
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Report
// ═══════════════════════════════════════════════════════════════════════

/// Serializable outcome of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub seed: u64,
    pub cases: Vec<CaseSummary>,
    /// Conjunction of every sub-check of every case.
    pub passed: bool,
}

/// Per-case slice of a [`ScenarioReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case: CaseId,
    pub verdict: CaseVerdict,
    pub recorded: Vec<TaskId>,
    pub expected: Vec<TaskId>,
    pub checks: Vec<CheckOutcome>,
}

impl ScenarioReport {
    fn from_session(scenario: &str, seed: u64, session: &TraceSession) -> Self {
        let cases = session
            .cases()
            .iter()
            .map(|rec| {
                let shown = rec.cursor().min(rec.recorded().len());
                CaseSummary {
                    case: rec.case_id(),
                    verdict: rec.verdict(),
                    recorded: rec.recorded()[..shown].to_vec(),
                    expected: rec.expected().to_vec(),
                    checks: rec.checks().to_vec(),
                }
            })
            .collect();
        Self {
            scenario: scenario.to_string(),
            seed,
            cases,
            passed: session.all_passed(),
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario {} (seed {}): {}",
            self.scenario,
            self.seed,
            if self.passed { "PASS" } else { "FAIL" }
        )?;
        for case in &self.cases {
            let failed = case.checks.iter().filter(|c| !c.passed).count();
            writeln!(
                f,
                "  case {}: {} ({} checks, {} failed)",
                case.case,
                case.verdict,
                case.checks.len(),
                failed
            )?;
            if !case.expected.is_empty() {
                writeln!(
                    f,
                    "    actual:   {}",
                    rtxcheck_trace::verifier::render_sequence(&case.recorded)
                )?;
                writeln!(
                    f,
                    "    expected: {}",
                    rtxcheck_trace::verifier::render_sequence(&case.expected)
                )?;
            }
            for check in case.checks.iter().filter(|c| !c.passed) {
                writeln!(f, "    FAIL {}", check.label)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preempt_mbx_passes_and_matches_expectation() {
        let report = Scenario::preempt_mbx().run(DEFAULT_SEED).unwrap();
        assert!(report.passed, "{report}");
        assert_eq!(report.cases.len(), 2);
        assert_eq!(report.cases[0].recorded, report.cases[0].expected);
        assert_eq!(report.cases[0].verdict, CaseVerdict::Passed);
        assert_eq!(report.cases[1].verdict, CaseVerdict::Passed);
    }

    #[test]
    fn timed_delay_passes() {
        let report = Scenario::timed_delay().run(DEFAULT_SEED).unwrap();
        assert!(report.passed, "{report}");
        assert_eq!(report.cases[0].recorded, vec![TaskId(1), TaskId(1)]);
    }

    #[test]
    fn verdicts_are_seed_independent() {
        for seed in 0..4 {
            for scenario in Scenario::all() {
                assert!(scenario.run(seed).unwrap().passed);
            }
        }
    }

    #[test]
    fn wrong_expectation_fails_position_checks() {
        let checker = TaskScript::for_case(1).verify(1, 0).exit();
        let root = TaskScript::for_case(0)
            .checkpoint()
            .spawn(Priority::Lowest, checker, "spawn checker", true)
            .exit();
        let scenario = Scenario::new(
            "wrong-expectation",
            "RTX-TSX",
            vec![
                CaseSpec::sequence(vec![TaskId(7)], MAX_TRACE_LEN),
                CaseSpec::checks_only(),
            ],
            root,
            Priority::High,
        );

        let report = scenario.run(DEFAULT_SEED).unwrap();
        assert!(!report.passed);
        let failed: Vec<_> = report.cases[1]
            .checks
            .iter()
            .filter(|c| !c.passed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].label, "execution sequence @ 0");
    }

    #[test]
    fn contradicted_expectation_cancels_the_task() {
        // The double mailbox creation fails its expectation, so the
        // task's final checkpoint must never run.
        let root = TaskScript::for_case(0)
            .mbx_create(64, "first mailbox", true)
            .mbx_create(64, "second mailbox succeeds", true)
            .checkpoint()
            .exit();
        let scenario = Scenario::new(
            "cancelled",
            "RTX-TSX",
            vec![CaseSpec::sequence(vec![], MAX_TRACE_LEN)],
            root,
            Priority::High,
        );

        let report = scenario.run(DEFAULT_SEED).unwrap();
        assert!(!report.passed);
        assert!(report.cases[0].recorded.is_empty());
    }

    #[test]
    fn by_name_finds_builtins() {
        assert!(Scenario::by_name("preempt-mbx").is_some());
        assert!(Scenario::by_name("timed-delay").is_some());
        assert!(Scenario::by_name("nope").is_none());
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = Scenario::timed_delay().run(3).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let loaded: ScenarioReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.scenario, report.scenario);
        assert_eq!(loaded.passed, report.passed);
        assert_eq!(loaded.cases.len(), report.cases.len());
    }
}
