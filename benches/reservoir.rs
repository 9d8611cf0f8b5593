use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rylv_statsd::clock::SystemClock;
use rylv_statsd::{Reservoir, ReservoirConfig};

fn insert_throughput(c: &mut Criterion) {
    let clock = SystemClock::new();

    c.bench_function("reservoir_insert_1028_capacity", |b| {
        b.iter(|| {
            let mut reservoir = Reservoir::new(ReservoirConfig::default(), &clock);
            for i in 0..10_000 {
                reservoir.insert(black_box(f64::from(i % 1000)), &clock).unwrap();
            }
        });
    });
}

fn quantile_lookup(c: &mut Criterion) {
    let clock = SystemClock::new();
    let mut reservoir = Reservoir::new(ReservoirConfig::default(), &clock);
    for i in 0..2000 {
        reservoir.insert(f64::from(i % 1000), &clock).unwrap();
    }

    c.bench_function("reservoir_quantile_90", |b| {
        b.iter(|| black_box(reservoir.quantile(0.9)));
    });
}

criterion_group!(benches, insert_throughput, quantile_lookup);
criterion_main!(benches);
