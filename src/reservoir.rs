//! Forward-decaying priority reservoir (Cormode et al.).
//!
//! A bounded sample of values, exponentially biased towards recent
//! insertions. Grounded on `original_source/txstatsd/stats/exponentiallydecayingsample.py`:
//! the priority formula, the landmark rescale, and the tie-break policy
//! below are a direct port of that algorithm's semantics, not a
//! reinterpretation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{Clock, Monotonic};
use crate::error::{MetricResult, MetricsError};

/// A reservoir priority. Wraps `f64` with a total order so it can key a
/// `BTreeMap`; reservoir priorities are always finite and strictly
/// positive, which `Reservoir::insert` enforces before using one as a key.
#[derive(Debug, Clone, Copy)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Tunables for a [`Reservoir`], mirroring spec.md §4.3's parameter list.
#[derive(Debug, Clone, Copy)]
pub struct ReservoirConfig {
    /// Maximum number of samples retained.
    pub capacity: usize,
    /// Exponential decay factor; higher biases more strongly towards recent values.
    pub alpha: f64,
    /// How often the landmark is rescaled to keep priorities numerically bounded.
    pub rescale_interval: Duration,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            capacity: 1028,
            alpha: 0.015,
            rescale_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// A forward-decaying priority reservoir.
///
/// Invariants (spec.md §3): `|reservoir| <= capacity`; every stored priority
/// is strictly positive and finite; `start_time <= now`.
pub struct Reservoir {
    config: ReservoirConfig,
    values: BTreeMap<Priority, f64>,
    count: u64,
    start_time: Monotonic,
    next_rescale_wall: SystemTime,
    rng: StdRng,
}

impl Reservoir {
    /// Creates a reservoir with its landmark set to `clock`'s current
    /// monotonic and wall time.
    #[must_use]
    pub fn new(config: ReservoirConfig, clock: &dyn Clock) -> Self {
        Self::with_rng(config, clock, StdRng::from_entropy())
    }

    /// Creates a reservoir with an explicit RNG, for deterministic tests.
    #[must_use]
    pub fn with_rng(config: ReservoirConfig, clock: &dyn Clock, rng: StdRng) -> Self {
        Self {
            next_rescale_wall: clock.now_wall() + config.rescale_interval,
            start_time: clock.now_monotonic(),
            config,
            values: BTreeMap::new(),
            count: 0,
            rng,
        }
    }

    /// Total inserts since the reservoir was created or last cleared. Not
    /// the same as the number of samples currently retained.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Number of samples currently retained (`<= capacity`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the reservoir currently holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inserts a value observed at `clock`'s current time.
    ///
    /// # Errors
    /// Returns [`MetricsError::Invariant`] if the computed priority is not
    /// finite and strictly positive — this indicates a code defect (e.g. a
    /// broken clock or RNG), not a recoverable ingest error, and should be
    /// treated as fatal by the caller.
    pub fn insert(&mut self, value: f64, clock: &dyn Clock) -> MetricResult<()> {
        let elapsed = clock.now_monotonic().since(self.start_time).as_secs_f64();
        let weight = (self.config.alpha * elapsed).exp();
        // uniform(0, 1]: rand's gen::<f64>() is [0, 1); flip it so it never yields 0.
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        let priority = weight / u;

        if !priority.is_finite() || priority <= 0.0 {
            return Err(MetricsError::Invariant(format!(
                "reservoir priority {priority} is not finite and positive"
            )));
        }
        let key = Priority(priority);

        if self.values.len() < self.config.capacity {
            self.values.insert(key, value);
        } else if let Some((&pmin, _)) = self.values.iter().next() {
            if priority > pmin.0 && !self.values.contains_key(&key) {
                self.values.remove(&pmin);
                self.values.insert(key, value);
            }
            // else: priority <= pmin, or an exact collision — keep the
            // existing entry and drop the new one (spec.md §9's decided
            // tie-break policy).
        }

        self.count += 1;

        let now_wall = clock.now_wall();
        if now_wall >= self.next_rescale_wall {
            self.rescale(clock);
        }

        Ok(())
    }

    /// Rescales all stored priorities relative to a new landmark, bounding
    /// `exp(alpha * (t - L))` from overflowing as `t` grows without bound.
    /// Preserves the relative order (and hence the sample content) of
    /// every stored priority.
    fn rescale(&mut self, clock: &dyn Clock) {
        let new_landmark = clock.now_monotonic();
        let delta = new_landmark.since(self.start_time).as_secs_f64();
        let factor = (-self.config.alpha * delta).exp();

        let old = std::mem::take(&mut self.values);
        for (Priority(priority), value) in old {
            self.values.insert(Priority(priority * factor), value);
        }

        self.start_time = new_landmark;
        self.next_rescale_wall = clock.now_wall() + self.config.rescale_interval;
    }

    /// Returns the stored values ordered by their current priority key,
    /// ascending. A pure read with no side effects.
    #[must_use]
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.values().copied().collect()
    }

    /// Value at quantile `q` (`0.0..=1.0`) of the current snapshot, or
    /// `None` if the reservoir is empty.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let index = (q * (snapshot.len() - 1) as f64).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = index as usize;
        snapshot.get(index.min(snapshot.len() - 1)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn det_reservoir(config: ReservoirConfig, clock: &VirtualClock) -> Reservoir {
        Reservoir::with_rng(config, clock, StdRng::seed_from_u64(42))
    }

    #[test]
    fn size_bound_holds_after_many_inserts() {
        let clock = VirtualClock::at_unix_secs(1_700_000_000);
        let config = ReservoirConfig {
            capacity: 16,
            alpha: 0.015,
            rescale_interval: Duration::from_secs(3600),
        };
        let mut reservoir = det_reservoir(config, &clock);

        for i in 0..500 {
            reservoir
                .insert(f64::from(i), &clock)
                .expect("insert should not violate invariants");
            clock.advance(Duration::from_millis(10));
        }

        assert!(reservoir.len() <= 16);
        assert_eq!(reservoir.count(), 500);
    }

    #[test]
    fn rescale_preserves_snapshot_order() {
        let clock = VirtualClock::at_unix_secs(0);
        let config = ReservoirConfig {
            capacity: 64,
            alpha: 0.015,
            rescale_interval: Duration::from_secs(0), // forces rescale on every insert
        };
        let mut reservoir = det_reservoir(config, &clock);

        for i in 0..2000 {
            reservoir
                .insert(f64::from(i % 50), &clock)
                .expect("insert should not violate invariants");
            clock.advance(Duration::from_secs(4));
        }

        let before = reservoir.snapshot();
        reservoir.rescale(&clock);
        let after = reservoir.snapshot();
        assert_eq!(before, after);
    }

    #[test]
    fn quantile_is_within_observed_range() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut reservoir = det_reservoir(ReservoirConfig::default(), &clock);

        for i in 1..=100 {
            reservoir.insert(f64::from(i), &clock).unwrap();
        }

        let median = reservoir.quantile(0.5).expect("non-empty");
        assert!((1.0..=100.0).contains(&median));
    }

    #[test]
    fn empty_reservoir_quantile_is_none() {
        let clock = VirtualClock::at_unix_secs(0);
        let reservoir = det_reservoir(ReservoirConfig::default(), &clock);
        assert_eq!(reservoir.quantile(0.5), None);
    }
}
