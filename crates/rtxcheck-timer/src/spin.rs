//! Busy-wait built on the tick-difference arithmetic.

use crate::source::TickSource;
use crate::tick::{TimerConfig, TimerError};

/// Spin until at least `duration_ms` of timer time has passed.
///
/// Samples the source once as a baseline, then re-samples until the
/// elapsed time computed against the baseline reaches the threshold.
/// This is a busy, non-yielding wait: it occupies the calling task's
/// execution slot for its whole duration, is not a kernel-level sleep,
/// and has no run-time cancellation. Absolute error is bounded by one
/// sampling step plus the sub-millisecond truncation of the difference
/// arithmetic.
pub fn spin_wait<S: TickSource + ?Sized>(
    source: &mut S,
    config: &TimerConfig,
    duration_ms: u64,
) -> Result<(), TimerError> {
    let baseline = source.sample()?;
    loop {
        let now = source.sample()?;
        if config.tick_diff(&baseline, &now).total_millis() >= duration_ms {
            return Ok(());
        }
    }
}
