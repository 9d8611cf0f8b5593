use super::{format_value, FlushContext, FlushLine};
use crate::clock::{Clock, Monotonic};

/// One-minute EWMA event rate, in the style of a Unix load average. Never
/// resets the lifetime count on flush; only the rate decays.
#[derive(Debug, Default)]
pub struct Meter {
    count: u64,
    events_since_tick: u64,
    rate: f64,
    last_tick: Option<Monotonic>,
}

impl Meter {
    /// Creates a meter with no events recorded.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            events_since_tick: 0,
            rate: 0.0,
            last_tick: None,
        }
    }

    /// Records `value` events (usually `1.0`).
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn update(&mut self, value: f64) {
        let n = value.max(0.0) as u64;
        self.count += n;
        self.events_since_tick += n;
    }

    /// Emits the lifetime `.count` and the decayed `.rate`, then resets the
    /// per-tick event counter (but not the lifetime count).
    pub fn flush(&mut self, name: &str, ctx: &FlushContext, clock: &dyn Clock) -> Vec<FlushLine> {
        let now = clock.now_monotonic();
        let dt = match self.last_tick {
            Some(last) => now.since(last),
            None => ctx.interval,
        };
        self.last_tick = Some(now);

        let dt_secs = dt.as_secs_f64();
        let events = self.events_since_tick;
        self.events_since_tick = 0;

        #[allow(clippy::cast_precision_loss)]
        let instant_rate = if dt_secs > 0.0 { events as f64 / dt_secs } else { 0.0 };

        if self.count == events {
            // First-ever tick: seed the EWMA directly rather than decaying
            // from a rate of zero, which would understate the true rate.
            self.rate = instant_rate;
        } else {
            let alpha = 1.0 - (-dt_secs / 60.0).exp();
            self.rate += alpha * (instant_rate - self.rate);
        }

        vec![
            FlushLine::new(
                format!("{name}.count"),
                format_value(self.count as f64),
                ctx.timestamp,
            ),
            FlushLine::new(format!("{name}.rate"), format_value(self.rate), ctx.timestamp),
        ]
    }
}
