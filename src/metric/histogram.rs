use super::{format_value, FlushContext, FlushLine};
use crate::clock::Clock;
use crate::error::MetricResult;
use crate::reservoir::{Reservoir, ReservoirConfig};

/// Full-distribution tracking: exact count/sum/min/max plus a decaying
/// reservoir for quantile estimates. Never resets on flush — the reservoir's
/// own decay is what keeps it representative of recent traffic.
pub struct Histogram {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    reservoir: Reservoir,
}

impl Histogram {
    /// Creates an empty histogram backed by a fresh reservoir.
    #[must_use]
    pub fn new(config: ReservoirConfig, clock: &dyn Clock) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            reservoir: Reservoir::new(config, clock),
        }
    }

    /// Records one observation, updating the exact running stats and
    /// offering the value to the reservoir.
    ///
    /// # Errors
    /// Propagates [`crate::reservoir::Reservoir::insert`]'s error.
    pub fn update(&mut self, value: f64, clock: &dyn Clock) -> MetricResult<()> {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.reservoir.insert(value, clock)
    }

    /// Emits `.count`, `.sum`, `.min`, `.max`, and `.upper_<p>` for each
    /// configured percentile from the reservoir's current quantile estimate.
    /// An untouched histogram emits only a zero count.
    pub fn flush(&self, name: &str, ctx: &FlushContext) -> Vec<FlushLine> {
        let ts = ctx.timestamp;
        let mut lines = vec![FlushLine::new(
            format!("{name}.count"),
            format_value(self.count as f64),
            ts,
        )];

        if self.count == 0 {
            return lines;
        }

        lines.push(FlushLine::new(format!("{name}.sum"), format_value(self.sum), ts));
        lines.push(FlushLine::new(format!("{name}.min"), format_value(self.min), ts));
        lines.push(FlushLine::new(format!("{name}.max"), format_value(self.max), ts));

        for &p in &ctx.percentiles {
            if let Some(v) = self.reservoir.quantile(f64::from(p) / 100.0) {
                lines.push(FlushLine::new(
                    format!("{name}.upper_{p}"),
                    format_value(v),
                    ts,
                ));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::time::Duration;

    fn ctx(percentiles: Vec<u8>) -> FlushContext {
        FlushContext {
            timestamp: 7,
            interval: Duration::from_secs(10),
            percentiles,
        }
    }

    #[test]
    fn untouched_histogram_emits_only_zero_count() {
        let clock = VirtualClock::at_unix_secs(0);
        let histogram = Histogram::new(ReservoirConfig::default(), &clock);
        let lines = histogram.flush("x", &ctx(vec![90]));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].value, "0");
    }

    #[test]
    fn exact_stats_reflect_every_observation_regardless_of_reservoir_eviction() {
        let clock = VirtualClock::at_unix_secs(0);
        let config = ReservoirConfig {
            capacity: 4,
            ..ReservoirConfig::default()
        };
        let mut histogram = Histogram::new(config, &clock);

        for i in 1..=100 {
            histogram.update(f64::from(i), &clock).unwrap();
            clock.advance(Duration::from_millis(1));
        }

        let lines = histogram.flush("x", &ctx(vec![]));
        let value = |suffix: &str| {
            lines
                .iter()
                .find(|l| l.name == format!("x.{suffix}"))
                .map(|l| l.value.clone())
                .unwrap()
        };

        assert_eq!(value("count"), "100");
        assert_eq!(value("min"), "1");
        assert_eq!(value("max"), "100");
        assert_eq!(value("sum"), "5050");
    }

    #[test]
    fn percentile_comes_from_reservoir_quantile() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut histogram = Histogram::new(ReservoirConfig::default(), &clock);
        for i in 1..=100 {
            histogram.update(f64::from(i), &clock).unwrap();
        }

        let lines = histogram.flush("x", &ctx(vec![50]));
        let p50 = lines.iter().find(|l| l.name == "x.upper_50").unwrap();
        let parsed: f64 = p50.value.parse().unwrap();
        assert!((1.0..=100.0).contains(&parsed));
    }
}
