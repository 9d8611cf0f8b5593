//! Pluggable time source.
//!
//! The reservoir needs a monotonic clock for its landmark math and a wall
//! clock for rescale-trigger comparisons and sink line timestamps (see
//! `reservoir.rs` and SPEC_FULL.md §9's decided Open Question). `std::time::Instant`
//! has no public constructor, so tests can't rewind or fast-forward it; we
//! define our own `Monotonic` newtick instead so a `VirtualClock` can be
//! driven deterministically from test code.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A monotonic timestamp, opaque except for subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Monotonic(Duration);

impl Monotonic {
    /// Duration elapsed between an earlier and this later monotonic reading.
    ///
    /// # Panics
    /// Panics if `earlier` is actually later than `self` (clock went
    /// backwards, which a correct `Clock` implementation never produces).
    #[must_use]
    pub fn since(self, earlier: Monotonic) -> Duration {
        self.0
            .checked_sub(earlier.0)
            .expect("monotonic clock went backwards")
    }
}

/// Supplies wall and monotonic time to the reservoir and scheduler.
///
/// Production code uses [`SystemClock`]; tests inject [`VirtualClock`] for
/// deterministic rescale/flush behavior.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time, used for rescale-trigger comparisons and
    /// sink line timestamps.
    fn now_wall(&self) -> SystemTime;

    /// Current monotonic time, used for the reservoir's landmark math.
    fn now_monotonic(&self) -> Monotonic;

    /// Current wall-clock time as whole seconds since the Unix epoch.
    fn now_wall_secs(&self) -> i64 {
        self.now_wall()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Real time, backed by `SystemTime` and a process-local monotonic origin.
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    /// Creates a new system clock with its monotonic origin set to now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_wall(&self) -> SystemTime {
        SystemTime::now()
    }

    fn now_monotonic(&self) -> Monotonic {
        Monotonic(self.origin.elapsed())
    }
}

/// A clock driven entirely by test code via [`VirtualClock::advance`].
///
/// Wall and monotonic time advance together; there is no wall-clock drift
/// independent of monotonic time, which keeps scenario tests deterministic.
pub struct VirtualClock {
    wall: Mutex<SystemTime>,
    mono: Mutex<Duration>,
}

impl VirtualClock {
    /// Creates a virtual clock starting at the given wall-clock time.
    #[must_use]
    pub fn new(start_wall: SystemTime) -> Self {
        Self {
            wall: Mutex::new(start_wall),
            mono: Mutex::new(Duration::ZERO),
        }
    }

    /// Creates a virtual clock starting at a fixed Unix-epoch second.
    #[must_use]
    pub fn at_unix_secs(secs: u64) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Advances both the wall and monotonic readings by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut wall = self.wall.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *wall += delta;
        let mut mono = self.mono.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *mono += delta;
    }
}

impl Clock for VirtualClock {
    fn now_wall(&self) -> SystemTime {
        *self.wall.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn now_monotonic(&self) -> Monotonic {
        Monotonic(*self.mono.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}
