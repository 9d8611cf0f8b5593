use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rylv_statsd::clock::VirtualClock;
use rylv_statsd::{MessageProcessor, ReservoirConfig};

fn datagram_ingest(c: &mut Criterion) {
    let clock = VirtualClock::at_unix_secs(0);
    let datagram = "gorets:1|c\nglork:320|ms|@0.1\ntemp:+5|g\nevent:1|m\nvalue:42|h";

    c.bench_function("processor_handle_datagram", |b| {
        let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");
        b.iter(|| {
            processor.handle_datagram(black_box(datagram), &clock);
        });
    });
}

fn flush_throughput(c: &mut Criterion) {
    let clock = VirtualClock::at_unix_secs(0);
    let mut processor = MessageProcessor::new(ReservoirConfig::default(), "statsd");
    for i in 0..500 {
        processor.handle_datagram(&format!("metric.{i}:1|c"), &clock);
    }

    c.bench_function("processor_flush_500_metrics", |b| {
        b.iter(|| {
            black_box(processor.flush(0, Duration::from_secs(10), vec![90], &clock));
        });
    });
}

criterion_group!(benches, datagram_ingest, flush_throughput);
criterion_main!(benches);
