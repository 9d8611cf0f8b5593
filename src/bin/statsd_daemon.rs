//! Daemon entrypoint: wires up the processor, scheduler, and sink threads
//! around a blocking UDP receive loop.
//!
//! Mirrors `original_source/txstatsd/service.py`'s `createService`: a UDP
//! listener feeds a `MessageProcessor`, and a TCP client factory drains it
//! on an interval. Twisted's reactor owns all of that on one thread; here
//! each piece gets its own OS thread connected by channels, per the
//! concurrency model.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;
use tracing::{error, info, warn};

use rylv_statsd::clock::{Clock, SystemClock};
use rylv_statsd::config::Config;
use rylv_statsd::metric::FlushLine;
use rylv_statsd::processor::{self, MessageProcessor, ProcessorMsg};
use rylv_statsd::reservoir::ReservoirConfig;
use rylv_statsd::scheduler::{self, Scheduler};
use rylv_statsd::sink::graphite::GraphiteSink;
use rylv_statsd::sink::router::{Router, SinkId};
use rylv_statsd::sink::Sink;
use rylv_statsd::MetricResult;

const UDP_RECV_BUF_SIZE: usize = 65_536;
const SINK_CHANNEL_CAPACITY: usize = 16;
const SINK_BUFFER_CAPACITY: usize = 10_000;
const SINK_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// spec.md §5: "the sink buffer is flushed with a bounded deadline (default 5 s)".
const SHUTDOWN_FLUSH_DEADLINE: Duration = Duration::from_secs(5);

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!(error = %e, "daemon exiting after fatal error");
        std::process::exit(1);
    }
}

fn load_config() -> MetricResult<Config> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config_path = args.iter().enumerate().find_map(|(i, a)| {
        a.strip_prefix("--config=")
            .map(str::to_string)
            .or_else(|| (a == "--config" || a == "-c").then(|| args.get(i + 1).cloned()).flatten())
    });

    let mut config = Config::default();
    if let Some(path) = config_path {
        config = config.apply_file(&path)?;
    }
    config.apply_args(&args)
}

/// One configured Carbon backend, identified by the [`SinkId`] it occupies
/// on the router's ring. Config (spec.md §6) only ever names a single
/// `carbon-cache-host`/`carbon-cache-port`, so this is always a one-element
/// list today; the router and per-sink fan-out below are written against an
/// arbitrary-length list so a future multi-sink config just adds entries.
fn sink_targets(config: &Config) -> Vec<(SinkId, String, u16)> {
    vec![(SinkId(0), config.carbon_cache_host.clone(), config.carbon_cache_port)]
}

fn run() -> MetricResult<()> {
    let config = load_config()?;
    info!(?config, "starting statsd daemon");

    let reservoir_config = ReservoirConfig {
        capacity: config.reservoir_size,
        alpha: config.reservoir_alpha,
        ..ReservoirConfig::default()
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let (processor_tx, processor_rx) = crossbeam::channel::unbounded::<ProcessorMsg>();
    let processor_clock = Arc::clone(&clock);
    let self_metric_prefix = if config.instance_name.is_empty() {
        "statsd".to_string()
    } else {
        format!("{}.statsd", config.instance_name)
    };

    let processor_handle = thread::spawn(move || {
        let mut processor = MessageProcessor::new(reservoir_config, self_metric_prefix);
        for msg in processor_rx {
            if let Err(e) = processor::drive(&mut processor, msg, processor_clock.as_ref()) {
                // Only a fatal, non-recoverable error (an internal invariant
                // violation) ever reaches here — recoverable ingest errors
                // are absorbed inside `MessageProcessor::handle_datagram`.
                // spec.md §7 requires these to terminate the process.
                error!(error = %e, "fatal invariant violation in processor, exiting");
                std::process::exit(1);
            }
        }
    });

    let targets = sink_targets(&config);
    let router = Router::new(&targets.iter().map(|(id, _, _)| *id).collect::<Vec<_>>());

    let (sink_tx, sink_rx) = crossbeam::channel::bounded::<Vec<FlushLine>>(SINK_CHANNEL_CAPACITY);

    let sink_handle = thread::spawn(move || {
        let mut sinks: HashMap<SinkId, GraphiteSink> = targets
            .into_iter()
            .map(|(id, host, port)| (id, GraphiteSink::new(host, port, SINK_BUFFER_CAPACITY)))
            .collect();

        let route_and_enqueue = |sinks: &mut HashMap<SinkId, GraphiteSink>, lines: &[FlushLine]| {
            for line in lines {
                let Some(id) = router.route(&line.name) else {
                    continue;
                };
                if let Some(sink) = sinks.get_mut(&id) {
                    sink.enqueue(line);
                }
            }
        };

        loop {
            match sink_rx.recv_timeout(SINK_POLL_INTERVAL) {
                Ok(lines) => {
                    route_and_enqueue(&mut sinks, &lines);
                    for sink in sinks.values_mut() {
                        sink.drain(SINK_POLL_INTERVAL);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    for sink in sinks.values_mut() {
                        sink.drain(SINK_POLL_INTERVAL);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Drain any lines still buffered, up to the shutdown
                    // deadline, before the TCP connections close (spec.md §5).
                    for sink in sinks.values_mut() {
                        sink.drain_until(SHUTDOWN_FLUSH_DEADLINE);
                    }
                    break;
                }
            }
        }
    });

    let reporter_tx = sink_tx.clone();
    let mut scheduler = Scheduler::spawn(
        config.flush_interval,
        config.percentiles.clone(),
        Arc::clone(&clock),
        processor_tx.clone(),
        move |lines: Vec<FlushLine>| {
            if reporter_tx.send(lines).is_err() {
                warn!("sink channel closed, dropping flushed lines");
            }
        },
    );

    let socket = UdpSocket::bind(("0.0.0.0", config.listen_port))?;
    info!(port = config.listen_port, "listening for statsd datagrams");

    let mut buf = vec![0u8; UDP_RECV_BUF_SIZE];
    loop {
        let (len, _peer) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "udp recv failed, continuing");
                continue;
            }
        };

        let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
        if processor_tx.send(ProcessorMsg::Datagram(payload)).is_err() {
            error!("processor channel closed, shutting down receive loop");
            break;
        }
    }

    // Shutdown sequence (spec.md §5): cancel the scheduler (an in-flight
    // flush is allowed to complete), let the processor drain whatever is
    // already queued, perform one final explicit flush, hand it to the
    // sink with a bounded deadline, then close everything.
    scheduler.stop();

    let (final_reply_tx, final_reply_rx) = crossbeam::channel::bounded(1);
    let sent_final_flush = processor_tx
        .send(ProcessorMsg::Flush {
            now: clock.now_wall_secs(),
            interval: config.flush_interval,
            percentiles: config.percentiles.clone(),
            reply: final_reply_tx,
        })
        .is_ok();

    drop(processor_tx);
    let _ = processor_handle.join();

    if sent_final_flush {
        if let Some(lines) = scheduler::recv_with_deadline(&final_reply_rx, SHUTDOWN_FLUSH_DEADLINE) {
            let _ = sink_tx.send(lines);
        }
    }

    drop(sink_tx);
    let _ = sink_handle.join();

    Ok(())
}
