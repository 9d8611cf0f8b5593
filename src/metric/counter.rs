use super::{format_value, FlushContext, FlushLine};

/// Monotonic running total for the current flush interval.
///
/// An update of `v` at sample rate `r` contributes `v / r` to the total
/// (spec.md §3). Reset to zero on every flush.
#[derive(Debug, Default)]
pub struct Counter {
    total: f64,
}

impl Counter {
    /// Creates a counter with a zero total.
    #[must_use]
    pub const fn new() -> Self {
        Self { total: 0.0 }
    }

    /// Adds `value / rate` (rate defaults to `1.0`) to the running total.
    pub fn update(&mut self, value: f64, sample_rate: Option<f64>) {
        let rate = sample_rate.unwrap_or(1.0);
        self.total += value / rate;
    }

    /// Emits `<name> <total> <ts>` and `<name>.rate <total/interval_s> <ts>`,
    /// then resets the total to zero.
    pub fn flush(&mut self, name: &str, ctx: &FlushContext) -> Vec<FlushLine> {
        let total = self.total;
        self.total = 0.0;

        let interval_s = ctx.interval.as_secs_f64();
        let rate = if interval_s > 0.0 { total / interval_s } else { 0.0 };

        vec![
            FlushLine::new(name.to_string(), format_value(total), ctx.timestamp),
            FlushLine::new(format!("{name}.rate"), format_value(rate), ctx.timestamp),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx() -> FlushContext {
        FlushContext {
            timestamp: 1_700_000_000,
            interval: Duration::from_secs(10),
            percentiles: vec![90],
        }
    }

    #[test]
    fn counter_sums_rate_adjusted_updates_within_an_interval() {
        let mut counter = Counter::new();
        counter.update(1.0, None);
        counter.update(1.0, None);
        counter.update(1.0, Some(0.1));

        let lines = counter.flush("gorets", &ctx());
        assert_eq!(lines[0].name, "gorets");
        assert_eq!(lines[0].value, "12");
        assert_eq!(lines[1].name, "gorets.rate");
        assert_eq!(lines[1].value, "1.2");
    }

    #[test]
    fn flush_resets_total() {
        let mut counter = Counter::new();
        counter.update(5.0, None);
        counter.flush("x", &ctx());

        let second = counter.flush("x", &ctx());
        assert_eq!(second[0].value, "0");
    }
}
