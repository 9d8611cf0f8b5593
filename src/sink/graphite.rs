//! A single Carbon/Graphite TCP backend: buffered writer with reconnect and
//! exponential backoff.
//!
//! Grounded on the teacher's buffered line-writer shape (accumulate
//! rendered lines, flush them to a socket in one write) and the
//! reconnect-loop idiom from the `postmates-cernan` example's native sink
//! (`connect()` returns an `Option<TcpStream>`; a drain loop recreates the
//! connection on failure rather than propagating the error up). Backoff
//! jitter is this crate's own addition — cernan's reconnect loop has none.

use std::collections::VecDeque;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use super::Sink;
use crate::metric::FlushLine;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const JITTER_FRACTION: f64 = 0.2;

/// Connection lifecycle. `Connecting` is the brief window inside
/// [`GraphiteSink::drain`] between a failed socket and a successful one;
/// it's never observed from outside a single `drain` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// Exponential backoff with jitter, driven by caller-supplied elapsed time
/// rather than a wall clock (keeps this testable without a `Clock` and
/// keeps `drain` cheap to call from a tight sink-thread loop).
struct Backoff {
    current: Duration,
    deadline: Option<Duration>,
    elapsed_since_failure: Duration,
}

impl Backoff {
    const fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
            deadline: None,
            elapsed_since_failure: Duration::ZERO,
        }
    }

    /// Advances the elapsed-time counter and reports whether a retry is due.
    fn tick(&mut self, delta: Duration) -> bool {
        let Some(deadline) = self.deadline else {
            return true;
        };
        self.elapsed_since_failure += delta;
        self.elapsed_since_failure >= deadline
    }

    fn record_failure(&mut self) {
        let jitter = 1.0 + rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered_secs = (self.current.as_secs_f64() * jitter).max(0.0) as u64;
        self.deadline = Some(Duration::from_secs(jittered_secs.max(1)));
        self.elapsed_since_failure = Duration::ZERO;
        self.current = (self.current * 2).min(MAX_BACKOFF);
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
        self.deadline = None;
        self.elapsed_since_failure = Duration::ZERO;
    }
}

/// A bounded outbound buffer fronting one Carbon TCP connection. Lines are
/// dropped from the front (oldest first) when the buffer is full, on the
/// theory that a consumer lagging this far behind cares more about recent
/// data than complete history.
pub struct GraphiteSink {
    host: String,
    port: u16,
    buffer: VecDeque<String>,
    capacity: usize,
    dropped: u64,
    stream: Option<TcpStream>,
    state: ConnState,
    backoff: Backoff,
}

impl GraphiteSink {
    /// Creates a sink targeting `host:port`, buffering up to `capacity`
    /// unsent lines.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, capacity: usize) -> Self {
        Self {
            host: host.into(),
            port,
            buffer: VecDeque::new(),
            capacity,
            dropped: 0,
            stream: None,
            state: ConnState::Disconnected,
            backoff: Backoff::new(),
        }
    }

    /// Total lines dropped so far due to a full buffer.
    #[must_use]
    pub const fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Number of lines currently queued, unsent.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to drain the buffer to the socket, reconnecting if needed.
    /// `tick` is how much time elapsed since the previous call, used to
    /// drive the backoff timer without assuming a particular clock.
    pub fn drain(&mut self, tick: Duration) {
        if self.state != ConnState::Connected {
            if !self.backoff.tick(tick) {
                return;
            }
            self.state = ConnState::Connecting;
            match TcpStream::connect((self.host.as_str(), self.port)) {
                Ok(stream) => {
                    info!(host = %self.host, port = self.port, "connected to carbon cache");
                    self.stream = Some(stream);
                    self.state = ConnState::Connected;
                    self.backoff.reset();
                }
                Err(e) => {
                    warn!(host = %self.host, port = self.port, error = %e, "carbon connect failed");
                    self.state = ConnState::Disconnected;
                    self.backoff.record_failure();
                    return;
                }
            }
        }

        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        while let Some(line) = self.buffer.front() {
            match stream.write_all(line.as_bytes()) {
                Ok(()) => {
                    self.buffer.pop_front();
                }
                Err(e) => {
                    warn!(error = %e, "carbon write failed, will reconnect");
                    self.stream = None;
                    self.state = ConnState::Disconnected;
                    self.backoff.record_failure();
                    return;
                }
            }
        }
    }

    /// Best-effort final drain, retrying `drain` until the buffer empties or
    /// `deadline` elapses (spec.md §5's bounded-deadline shutdown flush).
    /// Gives up past the deadline rather than blocking shutdown indefinitely
    /// on a downstream that refuses to accept a connection.
    pub fn drain_until(&mut self, deadline: Duration) {
        const RETRY_INTERVAL: Duration = Duration::from_millis(100);
        let start = std::time::Instant::now();

        while !self.buffer.is_empty() && start.elapsed() < deadline {
            self.drain(RETRY_INTERVAL);
            if self.buffer.is_empty() {
                break;
            }
            std::thread::sleep(RETRY_INTERVAL.min(deadline.saturating_sub(start.elapsed())));
        }

        if !self.buffer.is_empty() {
            warn!(
                remaining = self.buffer.len(),
                ?deadline,
                "shutdown drain deadline elapsed with lines still buffered"
            );
        }
    }
}

impl Sink for GraphiteSink {
    fn enqueue(&mut self, line: &FlushLine) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(line.render());
    }
}
