//! Elapsed-time measurement over a free-running two-counter timer.
//!
//! The timers this crate models expose two nested counters: a prescale
//! counter that increments at the peripheral clock rate and a tick counter
//! that advances (and resets the prescale counter) once per prescale
//! period. Sampling the pair non-atomically can race with a hardware
//! increment, so two raw samples may disagree in sign even though wall
//! time moved forward; [`TimerConfig::tick_diff`] normalizes such pairs
//! into a correct, monotonic, sign-consistent duration.
//!
//! Three pieces:
//!
//! - [`tick`] — [`TickSample`], [`Elapsed`], and the de-wrapping
//!   difference arithmetic, parameterized over the hardware's prescale
//!   period and unit scale;
//! - [`source`] — the [`TickSource`] sampling contract and
//!   [`FreeRunTimer`], a deterministic simulated peripheral with optional
//!   seeded jitter and sampling-race injection;
//! - [`spin`] — [`spin_wait`], the busy (non-yielding) wait built on the
//!   difference arithmetic.
//!
//! # Example
//!
//! ```
//! use rtxcheck_timer::{TickSample, TimerConfig};
//!
//! let config = TimerConfig::reference_100mhz();
//! let start = TickSample { prescale: 0, tick: 5 };
//! let end = TickSample { prescale: 50_000_000, tick: 6 };
//! let elapsed = config.tick_diff(&start, &end);
//! assert_eq!((elapsed.secs, elapsed.millis), (1, 500));
//! ```

pub mod source;
pub mod spin;
pub mod tick;

pub use source::{FreeRunTimer, TickSource, FREE_RUN_TIMER};
pub use spin::spin_wait;
pub use tick::{Elapsed, TickSample, TimerConfig, TimerError};
