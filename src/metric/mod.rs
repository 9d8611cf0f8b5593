//! Per-kind metric aggregates and the tagged variant that stores them.
//!
//! Spec.md §9 re-architects the source's dynamic per-name kind selection as
//! "a tagged variant over the five kinds; the registry holds variant
//! instances" — that's exactly [`MetricKind`]. Each kind is its own small
//! struct with `update`/`flush` inherent methods rather than a shared
//! trait: their signatures genuinely differ (gauges take an absolute-or-delta
//! update, histograms need the clock for reservoir timing, meters need it
//! for their EWMA tick), so a one-size trait would just be a thin wrapper
//! around a match anyway.

mod counter;
mod gauge;
mod histogram;
mod meter;
mod timer;

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::Histogram;
pub use meter::Meter;
pub use timer::Timer;

use std::time::Duration;

use crate::clock::Clock;
use crate::error::MetricResult;
use crate::reservoir::ReservoirConfig;

/// The five wire-level metric kinds (spec.md §3/§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKindTag {
    /// Monotonic running total, reset on flush.
    Counter,
    /// Last absolute value written, never reset.
    Gauge,
    /// Unbounded per-interval duration vector, reset on flush.
    Timer,
    /// Event counter with a one-minute EWMA rate, never reset.
    Meter,
    /// Distribution tracking via a decaying reservoir, never reset.
    Histogram,
}

impl MetricKindTag {
    /// The wire suffix used in `name:value|<kind>`, matching spec.md §4.1.
    #[must_use]
    pub const fn wire_token(self) -> &'static str {
        match self {
            Self::Counter => "c",
            Self::Gauge => "g",
            Self::Timer => "ms",
            Self::Meter => "m",
            Self::Histogram => "h",
        }
    }
}

/// A decoded update value. Only gauges distinguish absolute vs. delta; every
/// other kind always treats its value as absolute (spec.md §4.1: a signed
/// counter update is a plain negative/positive total, not a delta).
#[derive(Debug, Clone, Copy)]
pub enum UpdateValue {
    /// Replace (gauge) or add to (everything else) the running state.
    Absolute(f64),
    /// Gauge-only: add to the prior value, treating a missing prior as zero.
    Delta(f64),
}

impl UpdateValue {
    /// The raw numeric payload, ignoring whether it was a delta.
    #[must_use]
    pub const fn raw(self) -> f64 {
        match self {
            Self::Absolute(v) | Self::Delta(v) => v,
        }
    }
}

/// One materialized output line: `"<name> <value> <timestamp>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushLine {
    /// Fully-qualified metric name, including any `.rate`/`.count`/etc. suffix.
    pub name: String,
    /// Decimal value, pre-rendered.
    pub value: String,
    /// Whole seconds since the Unix epoch, shared by every line in a flush batch.
    pub timestamp: i64,
}

impl FlushLine {
    fn new(name: String, value: String, timestamp: i64) -> Self {
        Self {
            name,
            value,
            timestamp,
        }
    }

    /// Renders the Carbon/Graphite wire form: `"<name> <value> <timestamp>\n"`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buf = String::with_capacity(self.name.len() + self.value.len() + 24);
        buf.push_str(&self.name);
        buf.push(' ');
        buf.push_str(&self.value);
        buf.push(' ');
        let mut itoa_buf = itoa::Buffer::new();
        buf.push_str(itoa_buf.format(self.timestamp));
        buf.push('\n');
        buf
    }
}

/// Per-flush context shared by every aggregate's `flush` call.
#[derive(Debug, Clone)]
pub struct FlushContext {
    /// Whole seconds since the Unix epoch, taken once at flush start.
    pub timestamp: i64,
    /// The scheduler's configured flush period, used for counter/meter rate math.
    pub interval: Duration,
    /// Percentiles to emit for timers and histograms (e.g. `[90]`).
    pub percentiles: Vec<u8>,
}

/// Renders an `f64` the way Graphite expects: no unnecessary trailing zeros,
/// no exponent notation for ordinary magnitudes (`std`'s `Display` for `f64`
/// already satisfies both).
pub(crate) fn format_value(value: f64) -> String {
    format!("{value}")
}

/// A registered metric's aggregate state, tagged by kind.
pub enum MetricKind {
    /// See [`Counter`].
    Counter(Counter),
    /// See [`Gauge`].
    Gauge(Gauge),
    /// See [`Timer`].
    Timer(Timer),
    /// See [`Meter`].
    Meter(Meter),
    /// See [`Histogram`].
    Histogram(Histogram),
}

impl MetricKind {
    /// Creates the zeroed/empty state for a freshly-registered name.
    #[must_use]
    pub fn new(tag: MetricKindTag, reservoir_config: ReservoirConfig, clock: &dyn Clock) -> Self {
        match tag {
            MetricKindTag::Counter => Self::Counter(Counter::new()),
            MetricKindTag::Gauge => Self::Gauge(Gauge::new()),
            MetricKindTag::Timer => Self::Timer(Timer::new()),
            MetricKindTag::Meter => Self::Meter(Meter::new()),
            MetricKindTag::Histogram => Self::Histogram(Histogram::new(reservoir_config, clock)),
        }
    }

    /// The tag identifying this instance's kind, for kind-conflict checks.
    #[must_use]
    pub const fn tag(&self) -> MetricKindTag {
        match self {
            Self::Counter(_) => MetricKindTag::Counter,
            Self::Gauge(_) => MetricKindTag::Gauge,
            Self::Timer(_) => MetricKindTag::Timer,
            Self::Meter(_) => MetricKindTag::Meter,
            Self::Histogram(_) => MetricKindTag::Histogram,
        }
    }

    /// Applies a decoded update to this aggregate.
    ///
    /// # Errors
    /// Only [`MetricKind::Histogram`] can fail, and only on an internal
    /// reservoir invariant violation (see [`crate::reservoir::Reservoir::insert`]).
    pub fn apply(
        &mut self,
        value: UpdateValue,
        sample_rate: Option<f64>,
        clock: &dyn Clock,
    ) -> MetricResult<()> {
        match self {
            Self::Counter(c) => {
                c.update(value.raw(), sample_rate);
                Ok(())
            }
            Self::Gauge(g) => {
                g.update(value);
                Ok(())
            }
            Self::Timer(t) => {
                t.update(value.raw());
                Ok(())
            }
            Self::Meter(m) => {
                m.update(value.raw());
                Ok(())
            }
            Self::Histogram(h) => h.update(value.raw(), clock),
        }
    }

    /// Materializes this aggregate's lines for the current flush, applying
    /// reset/decay semantics per spec.md §4.2.
    pub fn flush(&mut self, name: &str, ctx: &FlushContext, clock: &dyn Clock) -> Vec<FlushLine> {
        match self {
            Self::Counter(c) => c.flush(name, ctx),
            Self::Gauge(g) => g.flush(name, ctx),
            Self::Timer(t) => t.flush(name, ctx),
            Self::Meter(m) => m.flush(name, ctx, clock),
            Self::Histogram(h) => h.flush(name, ctx),
        }
    }
}
