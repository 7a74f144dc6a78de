//! Sequence verification — scoring a recorded trace against expectations.
//!
//! [`SequenceVerifier::verify`] compares the checkpoint sequence recorded
//! under one case against that case's expected sequence and scores the
//! outcome into a (usually different) verifying case, supporting
//! multi-phase scenarios where the recording phase and the checking phase
//! are logically distinct tests.
//!
//! Five kinds of sub-check are scored, all of them always evaluated so
//! every check contributes diagnostic signal:
//!
//! | Sub-check            | Passes when                                   |
//! |----------------------|-----------------------------------------------|
//! | execution shortfall  | `diff >= 0`                                   |
//! | one-extra execution  | `diff != 1`                                   |
//! | two-extra executions | `diff != 2`                                   |
//! | exact count          | `diff == 0`                                   |
//! | sequence @ i         | `actual[i] == expected[i]`, one per position  |
//!
//! where `diff = cursor(source) - expected_len(source)`. The two overrun
//! flags only distinguish overruns of exactly one and exactly two;
//! overruns of three or more pass both flags and are caught by the exact
//! count sub-check instead. This asymmetry is preserved as observed
//! behavior of the system this oracle models.

use crate::case::{CaseId, CaseState, CheckOutcome, TaskId, TraceError, TraceSession};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
//  Report
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of one `verify` call.
///
/// `checks` holds every sub-check scored against the verifying case,
/// including any setup checks recorded before verification; `passed` is
/// the conjunction of all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    /// The verifying case.
    pub case: CaseId,
    /// The case whose recorded data was scored.
    pub source: CaseId,
    /// `cursor(source) - expected_len(source)`.
    pub diff: i64,
    /// The sequence that was recorded (up to the source's cursor).
    pub actual: Vec<TaskId>,
    /// The sequence that was expected.
    pub expected: Vec<TaskId>,
    /// Every sub-check scored against the verifying case.
    pub checks: Vec<CheckOutcome>,
    /// Conjunction of all sub-check bits of the verifying case.
    pub passed: bool,
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "case {} scoring case {}: {} (diff {:+})",
            self.case,
            self.source,
            if self.passed { "PASS" } else { "FAIL" },
            self.diff,
        )?;
        writeln!(f, "  actual:   {}", render_sequence(&self.actual))?;
        writeln!(f, "  expected: {}", render_sequence(&self.expected))?;
        for (i, check) in self.checks.iter().enumerate() {
            writeln!(
                f,
                "  [{:>2}] {}  {}",
                i,
                if check.passed { "ok  " } else { "FAIL" },
                check.label,
            )?;
        }
        Ok(())
    }
}

/// Render a task-id sequence in the oracle's diagnostic form,
/// e.g. `2 -> 2 -> 1 -> NIL`.
pub fn render_sequence(seq: &[TaskId]) -> String {
    let mut out = String::new();
    for task in seq {
        out.push_str(&format!("{task} -> "));
    }
    out.push_str("NIL");
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  Verifier
// ═══════════════════════════════════════════════════════════════════════

/// Scores recorded checkpoint sequences. Stateless; all state lives in
/// the [`TraceSession`].
pub struct SequenceVerifier;

impl SequenceVerifier {
    /// Score the data recorded under `source` into `case`'s result bits
    /// and mark `case` verified.
    ///
    /// Both sequences are rendered through `log` before scoring; the
    /// rendering is observational only and never affects the verdict.
    /// Exactly one `verify` call may transition a case out of its
    /// recording phase; a second call fails with
    /// [`TraceError::AlreadyVerified`].
    pub fn verify(
        session: &mut TraceSession,
        case: CaseId,
        source: CaseId,
    ) -> Result<CaseReport, TraceError> {
        if session.case(case).state() == CaseState::Verified {
            return Err(TraceError::AlreadyVerified(case));
        }

        let (cursor, expected, actual) = {
            let src = session.case(source);
            let shown = src.cursor().min(src.recorded().len());
            (
                src.cursor(),
                src.expected().to_vec(),
                src.recorded()[..shown].to_vec(),
            )
        };

        info!(
            "{}: actual exec order: {}",
            session.prefix(),
            render_sequence(&actual)
        );
        info!(
            "{}: expected exec order: {}",
            session.prefix(),
            render_sequence(&expected)
        );

        let diff = cursor as i64 - expected.len() as i64;

        session.check(case, "execution shortfall", diff >= 0);
        session.check(case, "one-extra execution", diff != 1);
        session.check(case, "two-extra executions", diff != 2);
        session.check(case, "exact execution count", diff == 0);

        for (i, want) in expected.iter().enumerate() {
            let label = format!("execution sequence @ {i}");
            session.check(case, &label, actual.get(i) == Some(want));
        }

        session.case_mut(case).mark_verified();

        let rec = session.case(case);
        let report = CaseReport {
            case,
            source,
            diff,
            actual,
            expected,
            checks: rec.checks().to_vec(),
            passed: rec.results().all_passed(),
        };
        info!("{}: case {} {}", session.prefix(), case, rec.verdict());
        Ok(report)
    }
}
