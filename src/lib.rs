//! A StatsD-to-Carbon metrics aggregation daemon.
//!
//! Clients send UDP line-protocol datagrams (`name:value|kind[|@rate]`);
//! this crate decodes them, aggregates in memory per metric name, and
//! periodically flushes the aggregates to one or more Carbon/Graphite TCP
//! backends, optionally sharded across backends by consistent hashing.
//!
//! The crate is organized around a single-writer actor
//! ([`processor::MessageProcessor`]) that owns the metric
//! [`registry::Registry`] outright, fed by a [`scheduler::Scheduler`] on a
//! fixed interval and drained to a [`sink::graphite::GraphiteSink`] per
//! flush.

pub mod clock;
pub mod config;
pub mod error;
pub mod metric;
pub mod processor;
pub mod registry;
pub mod reservoir;
pub mod scheduler;
pub mod sink;
pub mod wire;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::Config;
pub use error::{MetricResult, MetricsError};
pub use processor::{MessageProcessor, ProcessorMsg};
pub use registry::Registry;
pub use reservoir::{Reservoir, ReservoirConfig};
