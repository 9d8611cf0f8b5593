//! Periodic flush scheduling.
//!
//! Grounded on `original_source/txstatsd/report.py`'s `ReportingService`:
//! a function is scheduled to run on a fixed interval, and whatever it
//! reports is handed to a report callback prefixed by an instance name.
//! Here "the function" is always a flush round-trip to the
//! [`crate::processor::MessageProcessor`], and "the report callback" is a
//! [`Reporter`] that receives the flushed lines.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::warn;

use crate::clock::Clock;
use crate::metric::FlushLine;
use crate::processor::ProcessorMsg;

/// Receives the lines produced by each flush round. Typically forwards them
/// to the sink thread's inbound channel.
pub trait Reporter: Send + 'static {
    /// Called once per completed flush, with that round's lines.
    fn report(&mut self, lines: Vec<FlushLine>);
}

impl<F: FnMut(Vec<FlushLine>) + Send + 'static> Reporter for F {
    fn report(&mut self, lines: Vec<FlushLine>) {
        self(lines)
    }
}

/// Drives periodic flushes of a processor running on another thread.
///
/// A tick fires every `interval`; each tick sends a `Flush` message to
/// `processor_tx` and waits up to `interval` for the reply. If the prior
/// flush still hasn't replied by the next scheduled tick, that tick is
/// skipped (with a `tracing::warn!`) rather than queuing up a second flush
/// behind the first — the spec requires the scheduler to defer to an
/// in-flight flush, not pile work up behind it.
pub struct Scheduler {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the scheduler thread. `percentiles` is cloned into every
    /// `Flush` message; `reporter` receives each round's lines in order.
    pub fn spawn(
        interval: Duration,
        percentiles: Vec<u8>,
        clock: std::sync::Arc<dyn Clock>,
        processor_tx: Sender<ProcessorMsg>,
        mut reporter: impl Reporter,
    ) -> Self {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let ticker = channel::tick(interval);

        let handle = std::thread::spawn(move || {
            let mut draining = false;
            loop {
                channel::select! {
                    recv(ticker) -> _ => {
                        if draining {
                            warn!("flush still draining, skipping tick");
                            continue;
                        }
                        let (reply_tx, reply_rx) = channel::bounded(1);
                        let msg = ProcessorMsg::Flush {
                            now: clock.now_wall_secs(),
                            interval,
                            percentiles: percentiles.clone(),
                            reply: reply_tx,
                        };
                        if processor_tx.send(msg).is_err() {
                            break;
                        }
                        draining = true;
                        match reply_rx.recv_timeout(interval) {
                            Ok(lines) => {
                                reporter.report(lines);
                                draining = false;
                            }
                            Err(RecvTimeoutError::Timeout) => {
                                warn!("flush reply timed out after one full interval");
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signals the scheduler thread to stop and blocks until it exits.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A one-shot wait helper used by shutdown: blocks on `rx` for up to
/// `deadline`, logging and giving up rather than hanging forever.
pub fn recv_with_deadline<T>(rx: &Receiver<T>, deadline: Duration) -> Option<T> {
    match rx.recv_timeout(deadline) {
        Ok(v) => Some(v),
        Err(RecvTimeoutError::Timeout) => {
            warn!(?deadline, "timed out waiting for final drain");
            None
        }
        Err(RecvTimeoutError::Disconnected) => None,
    }
}
