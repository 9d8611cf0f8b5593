//! The single-writer actor that owns the metric [`Registry`].
//!
//! Grounded on `original_source/txstatsd/service.py`'s `createService`,
//! which wires one `txstatsd.processor.MessageProcessor` instance to the
//! UDP protocol: one object receives every decoded line and owns the
//! aggregate table outright. Spec.md §9 moves that single-owner property
//! from "convenient" (the source is single-threaded Twisted) to
//! "load-bearing" — here it's what lets [`Registry`] use a plain
//! `BTreeMap` with no internal locking.

use std::time::Duration;

use crossbeam::channel::Sender;

use tracing::warn;

use crate::clock::Clock;
use crate::error::MetricResult;
use crate::metric::{FlushContext, FlushLine};
use crate::registry::Registry;
use crate::reservoir::ReservoirConfig;
use crate::wire::parse_datagram;

/// A unit of work delivered to the processor's mailbox.
pub enum ProcessorMsg {
    /// A raw datagram payload received off the network, to be decoded and
    /// applied.
    Datagram(String),
    /// A scheduler tick: flush every registered metric and send the
    /// resulting lines back over `reply`.
    Flush {
        /// Wall-clock time to stamp the flushed lines with.
        now: i64,
        /// Configured flush period, used for rate math.
        interval: Duration,
        /// Percentiles to emit for timers/histograms.
        percentiles: Vec<u8>,
        /// Where to send the flushed lines.
        reply: Sender<Vec<FlushLine>>,
    },
}

/// Self-reported counters, exposed as their own metrics on each flush
/// (spec.md §4.4: the daemon reports on its own health alongside client data).
#[derive(Debug, Default, Clone, Copy)]
struct SelfStats {
    messages_received: u64,
    messages_bad: u64,
}

/// Owns the [`Registry`] and processes [`ProcessorMsg`]s sequentially.
pub struct MessageProcessor {
    registry: Registry,
    self_stats: SelfStats,
    self_metric_prefix: String,
}

impl MessageProcessor {
    /// Creates a processor with an empty registry. Self-reported metrics are
    /// emitted under `<self_metric_prefix>.*`.
    #[must_use]
    pub fn new(reservoir_config: ReservoirConfig, self_metric_prefix: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(reservoir_config),
            self_stats: SelfStats::default(),
            self_metric_prefix: self_metric_prefix.into(),
        }
    }

    /// Decodes and applies a raw datagram, tracking per-line failures in the
    /// self-reported stats rather than surfacing them to the caller — a
    /// malformed line from one client must never stop the processor.
    ///
    /// # Errors
    /// Returns `Err` only for a fatal, non-recoverable registry error (an
    /// internal invariant violation — see [`crate::error::MetricsError::Invariant`]);
    /// the caller must propagate it rather than continue processing. Parse
    /// errors and kind conflicts are recoverable and never reach the caller —
    /// they're absorbed into `messages_bad` (spec.md §7).
    pub fn handle_datagram(&mut self, payload: &str, clock: &dyn Clock) -> MetricResult<()> {
        let (updates, errors) = parse_datagram(payload);

        self.self_stats.messages_received += updates.len() as u64;
        self.self_stats.messages_bad += errors.len() as u64;

        for error in &errors {
            warn!(%error, "dropping malformed statsd line");
        }

        for update in updates {
            if let Err(e) = self.registry.apply(
                &update.name,
                update.kind,
                update.value,
                update.sample_rate,
                clock,
            ) {
                if !e.is_recoverable_ingest_error() {
                    return Err(e);
                }
                warn!(name = %update.name, error = %e, "dropping update after kind conflict");
                self.self_stats.messages_bad += 1;
            }
        }

        Ok(())
    }

    /// Flushes every registered metric plus the processor's own self-stats,
    /// returning the combined, name-ordered line set.
    pub fn flush(&mut self, now: i64, interval: Duration, percentiles: Vec<u8>, clock: &dyn Clock) -> Vec<FlushLine> {
        let ctx = FlushContext {
            timestamp: now,
            interval,
            percentiles,
        };

        let mut lines = self.registry.flush_all(&ctx, clock);
        lines.extend(self.self_stat_lines(&ctx));
        lines
    }

    fn self_stat_lines(&mut self, ctx: &FlushContext) -> Vec<FlushLine> {
        let stats = std::mem::take(&mut self.self_stats);
        vec![
            FlushLine {
                name: format!("{}.messages.received", self.self_metric_prefix),
                value: stats.messages_received.to_string(),
                timestamp: ctx.timestamp,
            },
            FlushLine {
                name: format!("{}.messages.bad", self.self_metric_prefix),
                value: stats.messages_bad.to_string(),
                timestamp: ctx.timestamp,
            },
        ]
    }

    /// Number of distinct registered metric names, for diagnostics.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }
}

/// Processes one message, used by the scheduler/UDP-receive threads to drive
/// a processor running on its own dedicated thread.
///
/// # Errors
/// Propagates a send failure on the flush reply channel, or a fatal
/// (non-recoverable) error out of [`MessageProcessor::handle_datagram`] — a
/// disconnected reply channel means the scheduler has shut down, and a
/// propagated processor error means an internal invariant was violated.
/// Either way the caller should treat `Err` as a signal to stop the
/// processing loop; a fatal processor error should terminate the process
/// (spec.md §7).
pub fn drive(processor: &mut MessageProcessor, msg: ProcessorMsg, clock: &dyn Clock) -> MetricResult<()> {
    match msg {
        ProcessorMsg::Datagram(payload) => processor.handle_datagram(&payload, clock),
        ProcessorMsg::Flush {
            now,
            interval,
            percentiles,
            reply,
        } => {
            let lines = processor.flush(now, interval, percentiles, clock);
            reply
                .send(lines)
                .map_err(|_| crate::error::MetricsError::Custom("flush reply channel closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crossbeam::channel;

    #[test]
    fn flush_emits_client_metrics_and_self_stats() {
        let clock = VirtualClock::at_unix_secs(1_700_000_000);
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");

        processor.handle_datagram("gorets:1|c\nmalformed", &clock).unwrap();
        let lines = processor.flush(1_700_000_010, Duration::from_secs(10), vec![90], &clock);

        assert!(lines.iter().any(|l| l.name == "gorets"));
        let received = lines.iter().find(|l| l.name == "statsd.messages.received").unwrap();
        assert_eq!(received.value, "1");
        let bad = lines.iter().find(|l| l.name == "statsd.messages.bad").unwrap();
        assert_eq!(bad.value, "1");
    }

    #[test]
    fn self_stats_reset_after_each_flush() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");
        processor.handle_datagram("x:1|c", &clock).unwrap();
        processor.flush(0, Duration::from_secs(10), vec![], &clock);

        let lines = processor.flush(10, Duration::from_secs(10), vec![], &clock);
        let received = lines.iter().find(|l| l.name == "statsd.messages.received").unwrap();
        assert_eq!(received.value, "0");
    }

    #[test]
    fn drive_routes_flush_reply() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");
        processor.handle_datagram("x:1|c", &clock).unwrap();

        let (tx, rx) = channel::unbounded();
        drive(
            &mut processor,
            ProcessorMsg::Flush {
                now: 0,
                interval: Duration::from_secs(10),
                percentiles: vec![],
                reply: tx,
            },
            &clock,
        )
        .unwrap();

        let lines = rx.recv().unwrap();
        assert!(lines.iter().any(|l| l.name == "x"));
    }

    #[test]
    fn kind_conflict_is_absorbed_as_a_bad_message_not_an_error() {
        let clock = VirtualClock::at_unix_secs(0);
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");

        processor.handle_datagram("x:1|c", &clock).unwrap();
        processor.handle_datagram("x:1|g", &clock).unwrap();

        let lines = processor.flush(0, Duration::from_secs(10), vec![], &clock);
        let bad = lines.iter().find(|l| l.name == "statsd.messages.bad").unwrap();
        assert_eq!(bad.value, "1");
    }

    #[test]
    fn fatal_reservoir_invariant_violation_propagates_out_of_handle_datagram() {
        use crate::error::MetricsError;

        let clock = VirtualClock::at_unix_secs(0);
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");

        // Seeds the histogram's reservoir with `clock`'s current reading as
        // its landmark.
        processor.handle_datagram("x:1|h", &clock).unwrap();

        // Push the clock far enough forward that exp(alpha * elapsed)
        // overflows to infinity; `Reservoir::insert` must refuse to use that
        // as a priority and report it as fatal rather than silently drop it
        // like an ordinary bad message.
        clock.advance(Duration::from_secs(10_000_000_000));

        let err = processor.handle_datagram("x:2|h", &clock);
        assert!(matches!(err, Err(MetricsError::Invariant(_))));
        assert!(!err.unwrap_err().is_recoverable_ingest_error());
    }
}
