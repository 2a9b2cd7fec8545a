// pulse-core: monotonic tick time base
// Every scheduling decision and control integrator reads this; keep it cheap.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Nanoseconds in one second.
pub const NSECS_IN_SECS: i64 = 1_000_000_000;

/// A monotonic tick count, in nanoseconds since the process time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    /// Zero ticks, the process time base itself.
    pub const ZERO: Ticks = Ticks(0);

    #[inline(always)]
    pub fn as_nsecs(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NSECS_IN_SECS as f64
    }

    /// Ticks elapsed since `earlier`, saturating at zero.
    #[inline(always)]
    pub fn since(self, earlier: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(earlier.0))
    }
}

impl From<Duration> for Ticks {
    fn from(d: Duration) -> Self {
        Ticks(d.as_nanos() as u64)
    }
}

impl From<Ticks> for Duration {
    fn from(t: Ticks) -> Self {
        Duration::from_nanos(t.0)
    }
}

/// Convert a floating-point period in seconds to integer nanoseconds.
///
/// Rounds to the nearest nanosecond, matching the period normalization
/// applied by [`crate::task::PeriodicTask::new`].
#[inline]
pub fn secs_to_nsecs(secs: f64) -> i64 {
    (secs * NSECS_IN_SECS as f64).round() as i64
}

/// Convert integer nanoseconds to floating-point seconds.
#[inline]
pub fn nsecs_to_secs(nsecs: i64) -> f64 {
    nsecs as f64 / NSECS_IN_SECS as f64
}

/// Process-wide monotonic time source.
///
/// Anchored on one [`Instant`] captured the first time it is touched. Reads
/// are reentrant and lock-free; successive observations from one thread are
/// non-decreasing.
#[derive(Debug)]
pub struct TimeService {
    epoch: Instant,
}

static TIME_SERVICE: OnceLock<TimeService> = OnceLock::new();

impl TimeService {
    /// The global time service.
    #[inline]
    pub fn instance() -> &'static TimeService {
        TIME_SERVICE.get_or_init(|| TimeService {
            epoch: Instant::now(),
        })
    }

    /// Current tick count.
    #[inline(always)]
    pub fn now(&self) -> Ticks {
        Ticks(self.epoch.elapsed().as_nanos() as u64)
    }

    /// Ticks elapsed since `t0`.
    #[inline(always)]
    pub fn ticks_since(&self, t0: Ticks) -> Ticks {
        self.now().since(t0)
    }

    /// Seconds elapsed since `t0`.
    #[inline(always)]
    pub fn seconds_since(&self, t0: Ticks) -> f64 {
        self.ticks_since(t0).as_secs_f64()
    }
}
