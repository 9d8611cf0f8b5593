use super::{format_value, FlushContext, FlushLine};

/// Per-interval duration samples. Unbounded (every sample observed during the
/// interval is retained) since timers are expected to flush frequently enough
/// that the per-interval sample count stays small; reset on every flush.
#[derive(Debug, Default)]
pub struct Timer {
    samples: Vec<f64>,
}

impl Timer {
    /// Creates a timer with no samples.
    #[must_use]
    pub const fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Records one duration sample.
    pub fn update(&mut self, value: f64) {
        self.samples.push(value);
    }

    /// Emits `<name>.count`, and — if any samples were recorded — `.min`,
    /// `.max`, `.mean`, and `.upper_<p>` for each configured percentile,
    /// then clears the sample buffer. An interval with no samples emits only
    /// the zero count.
    pub fn flush(&mut self, name: &str, ctx: &FlushContext) -> Vec<FlushLine> {
        let mut samples = std::mem::take(&mut self.samples);
        let count = samples.len();
        let ts = ctx.timestamp;

        let mut lines = Vec::with_capacity(2 + count.min(1) * (3 + ctx.percentiles.len()));
        lines.push(FlushLine::new(
            format!("{name}.count"),
            format_value(count as f64),
            ts,
        ));

        if samples.is_empty() {
            return lines;
        }

        samples.sort_by(f64::total_cmp);
        let min = samples[0];
        let max = samples[count - 1];
        let mean = samples.iter().sum::<f64>() / count as f64;

        lines.push(FlushLine::new(format!("{name}.min"), format_value(min), ts));
        lines.push(FlushLine::new(format!("{name}.max"), format_value(max), ts));
        lines.push(FlushLine::new(format!("{name}.mean"), format_value(mean), ts));

        for &p in &ctx.percentiles {
            let rank = ((f64::from(p) / 100.0) * count as f64).ceil() as usize;
            let index = rank.saturating_sub(1).min(count - 1);
            lines.push(FlushLine::new(
                format!("{name}.upper_{p}"),
                format_value(samples[index]),
                ts,
            ));
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx(percentiles: Vec<u8>) -> FlushContext {
        FlushContext {
            timestamp: 100,
            interval: Duration::from_secs(10),
            percentiles,
        }
    }

    #[test]
    fn empty_interval_emits_only_zero_count() {
        let mut timer = Timer::new();
        let lines = timer.flush("x", &ctx(vec![90]));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "x.count");
        assert_eq!(lines[0].value, "0");
    }

    #[test]
    fn summary_stats_and_percentile_are_computed() {
        let mut timer = Timer::new();
        for v in [320.0, 240.0, 200.0, 300.0, 250.0] {
            timer.update(v);
        }
        let lines = timer.flush("glork", &ctx(vec![90]));

        let by_name = |suffix: &str| {
            lines
                .iter()
                .find(|l| l.name == format!("glork.{suffix}"))
                .map(|l| l.value.clone())
        };

        assert_eq!(by_name("count"), Some("5".to_string()));
        assert_eq!(by_name("min"), Some("200".to_string()));
        assert_eq!(by_name("max"), Some("320".to_string()));
        assert_eq!(by_name("mean"), Some("262".to_string()));
        assert_eq!(by_name("upper_90"), Some("320".to_string()));
    }

    #[test]
    fn flush_clears_samples() {
        let mut timer = Timer::new();
        timer.update(5.0);
        timer.flush("x", &ctx(vec![]));
        let lines = timer.flush("x", &ctx(vec![]));
        assert_eq!(lines[0].value, "0");
    }
}
