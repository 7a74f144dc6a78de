//! Per-case trace bookkeeping.
//!
//! A [`TraceSession`] owns one [`CaseRecord`] per registered test case for
//! the duration of a scenario run. Each record holds the expected
//! checkpoint sequence, the actual sequence as it is written by
//! [`TraceSession::record`], a wrapping write cursor, and a
//! bit-per-subcheck result accumulator. Nothing here persists beyond the
//! run.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════
//  Identifiers and limits
// ═══════════════════════════════════════════════════════════════════════

/// Identifier of a kernel task, as reported at checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u8);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a registered case within a [`TraceSession`].
pub type CaseId = usize;

/// Fixed capacity of every recorded execution sequence.
pub const MAX_TRACE_LEN: usize = 16;

// A case's sub-checks share one u32 bitfield.
const MAX_SUB_CHECKS: u8 = 32;

// ═══════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("expected sequence of {0} entries exceeds the trace capacity of {MAX_TRACE_LEN}")]
    ExpectedTooLong(usize),

    #[error("modulus {0} exceeds the trace capacity of {MAX_TRACE_LEN}")]
    ModulusTooLarge(usize),

    #[error("case {0} has already been verified")]
    AlreadyVerified(CaseId),
}

// ═══════════════════════════════════════════════════════════════════════
//  Sub-check accumulator
// ═══════════════════════════════════════════════════════════════════════

/// Bit-per-subcheck result accumulator.
///
/// Every scored sub-check occupies the next free bit; a set bit means the
/// sub-check passed. The case verdict is the conjunction of all scored
/// bits, but each bit remains independently reportable for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResults {
    bits: u32,
    scored: u8,
}

impl SubResults {
    /// Score the next sub-check, returning its bit index.
    pub fn score(&mut self, passed: bool) -> u8 {
        let index = self.scored;
        debug_assert!(index < MAX_SUB_CHECKS, "sub-check bitfield exhausted");
        if passed {
            self.bits |= 1 << index;
        }
        self.scored += 1;
        index
    }

    /// Whether the sub-check at `index` passed.
    pub fn passed(&self, index: u8) -> bool {
        self.bits & (1 << index) != 0
    }

    /// Number of sub-checks scored so far.
    pub fn scored(&self) -> u8 {
        self.scored
    }

    /// Raw bitfield value.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Conjunction of every scored bit. Vacuously true with none scored.
    pub fn all_passed(&self) -> bool {
        let mask = (1u64 << self.scored) - 1;
        u64::from(self.bits) & mask == mask
    }
}

/// One named sub-check outcome, kept alongside the bitfield so reports can
/// show what each bit meant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub label: String,
    pub passed: bool,
}

// ═══════════════════════════════════════════════════════════════════════
//  Case record
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle of a case record. `Verified` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseState {
    Registered,
    Recording,
    Verified,
}

/// Outcome of a case, derived from its scored sub-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseVerdict {
    /// No sub-check scored yet.
    Pending,
    /// Every scored sub-check passed.
    Passed,
    /// At least one scored sub-check failed.
    Failed,
}

impl fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Passed => f.write_str("PASS"),
            Self::Failed => f.write_str("FAIL"),
        }
    }
}

/// Registration-time description of a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseSpec {
    pub expected: Vec<TaskId>,
    pub modulus: usize,
}

impl CaseSpec {
    /// A case that records an execution sequence with the given wrap
    /// modulus and is later scored against `expected`.
    pub fn sequence(expected: Vec<TaskId>, modulus: usize) -> Self {
        Self { expected, modulus }
    }

    /// A case that records no sequence (modulus 0): only named sub-checks
    /// contribute to its verdict, and `record` on it is a no-op.
    pub fn checks_only() -> Self {
        Self {
            expected: Vec::new(),
            modulus: 0,
        }
    }
}

/// State of one registered test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    case_id: CaseId,
    expected: Vec<TaskId>,
    modulus: usize,
    actual: Vec<TaskId>,
    cursor: usize,
    checks: Vec<CheckOutcome>,
    results: SubResults,
    state: CaseState,
}

impl CaseRecord {
    fn new(case_id: CaseId, spec: CaseSpec) -> Self {
        Self {
            case_id,
            expected: spec.expected,
            modulus: spec.modulus,
            actual: Vec::with_capacity(spec.modulus),
            cursor: 0,
            checks: Vec::new(),
            results: SubResults::default(),
            state: CaseState::Registered,
        }
    }

    pub fn case_id(&self) -> CaseId {
        self.case_id
    }

    /// The expected checkpoint sequence; empty means "not applicable".
    pub fn expected(&self) -> &[TaskId] {
        &self.expected
    }

    /// Wrap modulus for the write cursor; 0 means this case records no
    /// sequence.
    pub fn modulus(&self) -> usize {
        self.modulus
    }

    /// Every slot written so far (at most `modulus` entries; earlier
    /// entries are overwritten once the cursor wraps).
    pub fn recorded(&self) -> &[TaskId] {
        &self.actual
    }

    /// Next free slot. Always within `[0, modulus)` when `modulus > 0`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn checks(&self) -> &[CheckOutcome] {
        &self.checks
    }

    pub fn results(&self) -> &SubResults {
        &self.results
    }

    pub fn state(&self) -> CaseState {
        self.state
    }

    pub fn verdict(&self) -> CaseVerdict {
        if self.results.scored() == 0 {
            CaseVerdict::Pending
        } else if self.results.all_passed() {
            CaseVerdict::Passed
        } else {
            CaseVerdict::Failed
        }
    }

    fn score(&mut self, label: &str, passed: bool) {
        self.results.score(passed);
        self.checks.push(CheckOutcome {
            label: label.to_string(),
            passed,
        });
    }

    pub(crate) fn mark_verified(&mut self) {
        self.state = CaseState::Verified;
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Session
// ═══════════════════════════════════════════════════════════════════════

/// Owns every case record for one scenario run.
///
/// The session is the struct-per-test-case replacement for a bank of
/// global arrays: scenario task bodies borrow it mutably through the
/// scheduler, which on a single-core run-to-completion platform guarantees
/// each call completes atomically with respect to the others.
///
/// Out-of-range case ids are a caller contract violation and panic via
/// indexing; this is a test tool, not a hardened service.
#[derive(Debug, Clone)]
pub struct TraceSession {
    prefix: String,
    cases: Vec<CaseRecord>,
}

impl TraceSession {
    /// Create an empty session. `prefix` tags every log line the session
    /// and its verifier emit.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            cases: Vec::new(),
        }
    }

    /// Register a case, returning its id. Ids are assigned sequentially
    /// from 0 and are immutable for the record's lifetime.
    pub fn register(&mut self, spec: CaseSpec) -> Result<CaseId, TraceError> {
        if spec.expected.len() > MAX_TRACE_LEN {
            return Err(TraceError::ExpectedTooLong(spec.expected.len()));
        }
        if spec.modulus > MAX_TRACE_LEN {
            return Err(TraceError::ModulusTooLarge(spec.modulus));
        }
        let case_id = self.cases.len();
        self.cases.push(CaseRecord::new(case_id, spec));
        Ok(case_id)
    }

    /// Append `task` to the case's actual sequence and advance the write
    /// cursor modulo the case's modulus.
    ///
    /// When the modulus is 0 the case records no sequence and this is a
    /// no-op. The recorded order is exactly the order of `record`
    /// invocations as scheduled by the kernel under test.
    pub fn record(&mut self, case: CaseId, task: TaskId) {
        let rec = &mut self.cases[case];
        debug_assert!(
            rec.state != CaseState::Verified,
            "record on a verified case"
        );
        if rec.modulus == 0 {
            return;
        }
        if rec.state == CaseState::Registered {
            rec.state = CaseState::Recording;
        }
        if rec.cursor < rec.actual.len() {
            rec.actual[rec.cursor] = task;
        } else {
            rec.actual.push(task);
        }
        rec.cursor = (rec.cursor + 1) % rec.modulus;
        debug!("{}: checkpoint: TID = {}", self.prefix, task);
    }

    /// Score one named sub-check against the case, returning `passed`.
    ///
    /// Kernel-call outcomes from scenario setup flow through here; a
    /// failure is recorded and reported but never raised as an error, so
    /// every check contributes diagnostic signal.
    pub fn check(&mut self, case: CaseId, label: &str, passed: bool) -> bool {
        self.cases[case].score(label, passed);
        if passed {
            debug!("{}: ok: {}", self.prefix, label);
        } else {
            warn!("{}: FAIL: {}", self.prefix, label);
        }
        passed
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn case(&self, case: CaseId) -> &CaseRecord {
        &self.cases[case]
    }

    pub(crate) fn case_mut(&mut self, case: CaseId) -> &mut CaseRecord {
        &mut self.cases[case]
    }

    pub fn cases(&self) -> &[CaseRecord] {
        &self.cases
    }

    /// Whether every scored sub-check in every case passed.
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.results.all_passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u8) -> TaskId {
        TaskId(n)
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut session = TraceSession::new("T");
        let a = session.register(CaseSpec::checks_only()).unwrap();
        let b = session
            .register(CaseSpec::sequence(vec![tid(1)], 4))
            .unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(session.case(b).expected(), &[tid(1)]);
    }

    #[test]
    fn register_rejects_over_capacity() {
        let mut session = TraceSession::new("T");
        let long = vec![tid(1); MAX_TRACE_LEN + 1];
        assert_eq!(
            session.register(CaseSpec::sequence(long, 4)),
            Err(TraceError::ExpectedTooLong(MAX_TRACE_LEN + 1))
        );
        assert_eq!(
            session.register(CaseSpec::sequence(vec![], MAX_TRACE_LEN + 1)),
            Err(TraceError::ModulusTooLarge(MAX_TRACE_LEN + 1))
        );
    }

    #[test]
    fn record_appends_in_call_order() {
        let mut session = TraceSession::new("T");
        let case = session
            .register(CaseSpec::sequence(vec![tid(1), tid(2)], 8))
            .unwrap();
        session.record(case, tid(1));
        session.record(case, tid(2));
        session.record(case, tid(1));
        assert_eq!(session.case(case).recorded(), &[tid(1), tid(2), tid(1)]);
        assert_eq!(session.case(case).cursor(), 3);
        assert_eq!(session.case(case).state(), CaseState::Recording);
    }

    #[test]
    fn cursor_wraps_at_modulus() {
        let mut session = TraceSession::new("T");
        let case = session.register(CaseSpec::sequence(vec![], 3)).unwrap();
        // modulus + 1 records return the cursor to index 1
        for n in 0..4 {
            session.record(case, tid(n));
            assert!(session.case(case).cursor() < 3);
        }
        assert_eq!(session.case(case).cursor(), 1);
        // slot 0 was overwritten by the wrapped fourth record
        assert_eq!(session.case(case).recorded(), &[tid(3), tid(1), tid(2)]);
    }

    #[test]
    fn zero_modulus_record_is_noop() {
        let mut session = TraceSession::new("T");
        let case = session.register(CaseSpec::checks_only()).unwrap();
        session.record(case, tid(1));
        assert_eq!(session.case(case).cursor(), 0);
        assert!(session.case(case).recorded().is_empty());
        assert_eq!(session.case(case).state(), CaseState::Registered);
    }

    #[test]
    fn check_scores_bits_and_labels() {
        let mut session = TraceSession::new("T");
        let case = session.register(CaseSpec::checks_only()).unwrap();
        assert!(session.check(case, "first", true));
        assert!(!session.check(case, "second", false));

        let rec = session.case(case);
        assert_eq!(rec.results().scored(), 2);
        assert!(rec.results().passed(0));
        assert!(!rec.results().passed(1));
        assert!(!rec.results().all_passed());
        assert_eq!(rec.checks()[1].label, "second");
        assert_eq!(rec.verdict(), CaseVerdict::Failed);
    }

    #[test]
    fn verdict_pending_until_scored() {
        let mut session = TraceSession::new("T");
        let case = session.register(CaseSpec::checks_only()).unwrap();
        assert_eq!(session.case(case).verdict(), CaseVerdict::Pending);
        session.check(case, "only", true);
        assert_eq!(session.case(case).verdict(), CaseVerdict::Passed);
    }

    #[test]
    fn all_passed_is_vacuous_on_empty_results() {
        let results = SubResults::default();
        assert!(results.all_passed());

        let mut session = TraceSession::new("T");
        session.register(CaseSpec::checks_only()).unwrap();
        assert!(session.all_passed());
    }

    #[test]
    fn sub_results_full_width() {
        let mut results = SubResults::default();
        for _ in 0..32 {
            results.score(true);
        }
        assert_eq!(results.scored(), 32);
        assert!(results.all_passed());
    }
}
