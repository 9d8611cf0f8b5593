//! Outbound delivery of flushed metric lines to one or more Carbon/Graphite
//! backends.

pub mod graphite;
pub mod router;

use crate::metric::FlushLine;

/// A destination for rendered metric lines. [`graphite::GraphiteSink`] is
/// the only production implementation; the trait exists so
/// `router::Router` can hold a heterogeneous collection of sinks without
/// knowing their connection details.
pub trait Sink: Send {
    /// Renders and enqueues `line` for delivery. Never blocks on the
    /// network — a sink buffers internally and drains on its own thread.
    fn enqueue(&mut self, line: &FlushLine);
}
