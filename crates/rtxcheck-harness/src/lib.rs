//! Scenario harness for the rtxcheck oracle.
//!
//! This crate supplies everything around the two oracle components
//! (`rtxcheck-trace`, `rtxcheck-timer`) needed to actually drive them:
//!
//! - [`kernel`] — the service contract of the kernel under test
//!   (priorities, error codes, messages);
//! - [`sim`] — a deterministic single-core kernel simulator implementing
//!   that contract in-process;
//! - [`script`] — data-driven task bodies, one op per scheduling quantum;
//! - [`scenario`] — the built-in scenarios, the runner, and the
//!   serializable run report.
//!
//! # Example
//!
//! ```
//! use rtxcheck_harness::scenario::{Scenario, DEFAULT_SEED};
//!
//! let report = Scenario::preempt_mbx().run(DEFAULT_SEED).unwrap();
//! assert!(report.passed);
//! ```

pub mod kernel;
pub mod scenario;
pub mod script;
pub mod sim;

pub use kernel::{KernelError, Message, Priority};
pub use scenario::{Scenario, ScenarioError, ScenarioReport, DEFAULT_SEED};
pub use script::{Op, TaskScript};
pub use sim::SimKernel;
