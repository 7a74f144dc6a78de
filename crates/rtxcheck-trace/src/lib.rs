//! Execution-trace recording and verification for preemptive kernels.
//!
//! This crate is the bookkeeping half of the rtxcheck oracle: it captures,
//! per test case, the sequence of task identifiers that executed a
//! checkpoint while the kernel under test scheduled them, and scores that
//! sequence against a precomputed expected sequence once the scenario is
//! quiescent.
//!
//! # Architecture
//!
//! ```text
//! scenario task bodies          TraceSession              SequenceVerifier
//! ────────────────────          ────────────              ────────────────
//! checkpoint()          ──→  record(case, tid)
//! syscall outcome       ──→  check(case, label, ok)
//!                                                    ──→  verify(case, source)
//!                                                         shortfall / overrun /
//!                                                         position sub-checks
//! ```
//!
//! Recording imposes no ordering of its own: the recorded order is exactly
//! the order of `record` calls as scheduled by the kernel under test. The
//! session assumes a single-core, run-to-completion-between-preemptions
//! platform, so `record` needs no internal locking; a port to a truly
//! concurrent scheduler would need a mutex per case record.
//!
//! # Example
//!
//! ```
//! use rtxcheck_trace::{CaseSpec, SequenceVerifier, TaskId, TraceSession};
//!
//! let mut session = TraceSession::new("TS0");
//! let data = session.register(CaseSpec::sequence(vec![TaskId(1), TaskId(2)], 16)).unwrap();
//! let check = session.register(CaseSpec::checks_only()).unwrap();
//!
//! session.record(data, TaskId(1));
//! session.record(data, TaskId(2));
//!
//! let report = SequenceVerifier::verify(&mut session, check, data).unwrap();
//! assert!(report.passed);
//! ```

pub mod case;
pub mod verifier;

pub use case::{
    CaseId, CaseRecord, CaseSpec, CaseState, CaseVerdict, CheckOutcome, SubResults, TaskId,
    TraceError, TraceSession, MAX_TRACE_LEN,
};
pub use verifier::{CaseReport, SequenceVerifier};
