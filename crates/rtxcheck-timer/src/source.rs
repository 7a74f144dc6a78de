//! Tick sources — where samples come from.
//!
//! [`TickSource`] is the sampling contract the rest of the oracle consumes;
//! [`FreeRunTimer`] is a deterministic simulated peripheral standing in for
//! the hardware free-running counter. It advances by a fixed step per
//! sample, optionally perturbed by seeded jitter, and can deterministically
//! inject the wrap-boundary sampling race that the difference arithmetic
//! must normalize.

use crate::tick::{TickSample, TimerError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The timer wired as a free-running counter. Requesting any other timer
/// id fails, matching the modeled hardware where only one timer is set up
/// for free-run sampling.
pub const FREE_RUN_TIMER: u8 = 2;

/// Anything that can be sampled for a `(prescale, tick)` pair.
///
/// After initialization a source must yield monotonically advancing pairs,
/// one reading per call; the race injection of [`FreeRunTimer`] perturbs
/// how a single reading is split across the two counters, never the
/// underlying instant.
pub trait TickSource {
    fn sample(&mut self) -> Result<TickSample, TimerError>;
}

#[derive(Debug, Clone)]
struct Jitter {
    rng: ChaCha8Rng,
    max_units: i64,
}

/// Deterministic simulated free-running two-counter timer.
///
/// # Example
///
/// ```
/// use rtxcheck_timer::{FreeRunTimer, TickSource, TimerConfig, FREE_RUN_TIMER};
///
/// let config = TimerConfig::reference_100mhz();
/// let mut timer = FreeRunTimer::new(FREE_RUN_TIMER, &config).unwrap();
/// let first = timer.sample().unwrap();
/// let second = timer.sample().unwrap();
/// assert!(config.tick_diff(&first, &second).total_millis() >= 1);
/// ```
#[derive(Debug, Clone)]
pub struct FreeRunTimer {
    period: i64,
    units: i64,
    step: i64,
    jitter: Option<Jitter>,
    race_every: u64,
    samples: u64,
}

impl FreeRunTimer {
    /// Set up the simulated peripheral. Only [`FREE_RUN_TIMER`] is
    /// supported; other ids fail with [`TimerError::UnsupportedTimer`].
    ///
    /// The default step is one millisecond of prescale units per sample.
    pub fn new(timer_id: u8, config: &crate::tick::TimerConfig) -> Result<Self, TimerError> {
        if timer_id != FREE_RUN_TIMER {
            return Err(TimerError::UnsupportedTimer(timer_id));
        }
        Ok(Self {
            period: config.prescale_period(),
            units: 0,
            step: config.units_per_ms(),
            jitter: None,
            race_every: 0,
            samples: 0,
        })
    }

    /// Advance by `units` prescale units per sample instead of the
    /// default.
    pub fn with_step(mut self, units: i64) -> Self {
        debug_assert!(units > 0, "step must advance the counter");
        self.step = units;
        self
    }

    /// Add seeded jitter: each sample advances by an extra
    /// `0..=max_units` drawn from a ChaCha stream, so runs with the same
    /// seed see identical timelines.
    pub fn with_jitter(mut self, seed: u64, max_units: i64) -> Self {
        debug_assert!(max_units >= 0);
        self.jitter = Some(Jitter {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_units,
        });
        self
    }

    /// Inject the wrap-boundary sampling race on every `every`-th sample
    /// that crosses a tick boundary: the returned pair carries the
    /// pre-wrap prescale reading against the post-wrap tick count, the
    /// inconsistency the difference arithmetic normalizes.
    pub fn with_race_every(mut self, every: u64) -> Self {
        self.race_every = every;
        self
    }

    /// Number of samples taken since initialization.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl TickSource for FreeRunTimer {
    fn sample(&mut self) -> Result<TickSample, TimerError> {
        let mut advance = self.step;
        if let Some(jitter) = &mut self.jitter {
            advance += jitter.rng.gen_range(0..=jitter.max_units);
        }
        let before = self.units;
        self.units += advance;
        self.samples += 1;

        let tick = self.units / self.period;
        let wrapped = before / self.period != tick;
        if wrapped && self.race_every > 0 && self.samples % self.race_every == 0 {
            return Ok(TickSample {
                prescale: (self.period - 1) as u32,
                tick: tick as u32,
            });
        }

        Ok(TickSample {
            prescale: (self.units % self.period) as u32,
            tick: tick as u32,
        })
    }
}
