//! The name-keyed table of live metric aggregates.
//!
//! Spec.md §9 settles the concurrency model as single-writer: one thread
//! (the [`crate::processor::MessageProcessor`]) owns a `Registry` outright,
//! so there is no need for the teacher's sharded `DashMap`. A plain
//! `BTreeMap` also gives flush output sorted by name for free, which
//! spec.md §4.4 requires anyway.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::error::{MetricResult, MetricsError};
use crate::metric::{FlushContext, FlushLine, MetricKind, MetricKindTag, UpdateValue};
use crate::reservoir::ReservoirConfig;

/// Owns every registered metric's aggregate state, keyed by its fully
/// qualified name.
pub struct Registry {
    metrics: BTreeMap<String, MetricKind>,
    reservoir_config: ReservoirConfig,
}

impl Registry {
    /// Creates an empty registry. Histograms created later use
    /// `reservoir_config` for their reservoir's capacity/alpha/rescale period.
    #[must_use]
    pub fn new(reservoir_config: ReservoirConfig) -> Self {
        Self {
            metrics: BTreeMap::new(),
            reservoir_config,
        }
    }

    /// Number of distinct registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether no metric has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Applies a decoded update, lazily creating the aggregate on first
    /// sight of `name`.
    ///
    /// # Errors
    /// Returns [`MetricsError::KindConflict`] (recoverable) if `name` was
    /// previously registered under a different kind (spec.md §4.1: a name's
    /// kind is fixed by its first observed update). Propagates
    /// [`MetricsError::Invariant`] (fatal) unchanged if the underlying
    /// aggregate's `apply` fails.
    pub fn apply(
        &mut self,
        name: &str,
        tag: MetricKindTag,
        value: UpdateValue,
        sample_rate: Option<f64>,
        clock: &dyn Clock,
    ) -> MetricResult<()> {
        let kind = match self.metrics.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let kind = entry.into_mut();
                if kind.tag() != tag {
                    return Err(MetricsError::KindConflict(format!(
                        "{name} was registered as {:?}, got update tagged {:?}",
                        kind.tag(),
                        tag
                    )));
                }
                kind
            }
            Entry::Vacant(entry) => {
                entry.insert(MetricKind::new(tag, self.reservoir_config, clock))
            }
        };

        kind.apply(value, sample_rate, clock)
    }

    /// Flushes every registered metric's lines, in ascending name order.
    /// Aggregates that reset on flush (counters, timers) do so as a side
    /// effect of this call.
    pub fn flush_all(&mut self, ctx: &FlushContext, clock: &dyn Clock) -> Vec<FlushLine> {
        let mut lines = Vec::new();
        for (name, kind) in &mut self.metrics {
            lines.extend(kind.flush(name, ctx, clock));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::time::Duration;

    fn ctx() -> FlushContext {
        FlushContext {
            timestamp: 1,
            interval: Duration::from_secs(10),
            percentiles: vec![90],
        }
    }

    #[test]
    fn lazily_creates_and_flushes_in_name_order() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut registry = Registry::new(ReservoirConfig::default());

        registry
            .apply("zeta", MetricKindTag::Counter, UpdateValue::Absolute(1.0), None, &clock)
            .unwrap();
        registry
            .apply("alpha", MetricKindTag::Gauge, UpdateValue::Absolute(2.0), None, &clock)
            .unwrap();

        let lines = registry.flush_all(&ctx(), &clock);
        assert_eq!(lines[0].name, "alpha");
        assert!(lines.iter().any(|l| l.name == "zeta"));
    }

    #[test]
    fn conflicting_kind_on_same_name_is_rejected() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut registry = Registry::new(ReservoirConfig::default());

        registry
            .apply("x", MetricKindTag::Counter, UpdateValue::Absolute(1.0), None, &clock)
            .unwrap();

        let err = registry.apply("x", MetricKindTag::Gauge, UpdateValue::Absolute(1.0), None, &clock);
        assert!(matches!(err, Err(MetricsError::KindConflict(_))));
        assert!(err.unwrap_err().is_recoverable_ingest_error());
    }
}
