//! Benchmarks for TRANSEC slot clock operations

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use transec_core::{JitterRange, PrimeStrategy, SharedSecret, SlotIndex, TransecConfig};
use transec_time::{is_prime, nearest_prime, next_prime, JitterStream, SlotClock};

const NOW: Duration = Duration::from_secs(1_700_000_000);

fn bench_fixed_slot_at(c: &mut Criterion) {
    let clock = SlotClock::fixed(Duration::from_secs(5), Duration::ZERO);

    c.bench_function("fixed_slot_at", |b| b.iter(|| clock.slot_at(black_box(NOW))));
}

fn bench_adaptive_slot_at(c: &mut Criterion) {
    let config = TransecConfig::new(SharedSecret::from_bytes([0x42; 32]))
        .with_jitter_range(JitterRange::from_secs(2, 10))
        .with_epoch(NOW - Duration::from_secs(86_400));
    let clock = SlotClock::from_config(&config).unwrap();
    // Warm the boundary table
    clock.slot_at(NOW);

    c.bench_function("adaptive_slot_at_warm", |b| {
        let mut t = NOW;
        b.iter(|| {
            t += Duration::from_millis(1);
            clock.slot_at(black_box(t))
        })
    });
}

fn bench_jitter(c: &mut Criterion) {
    let stream = JitterStream::new(
        SharedSecret::from_bytes([0x42; 32]),
        JitterRange::from_secs(2, 10),
    );

    c.bench_function("jitter_millis", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            stream.jitter_millis(black_box(counter))
        })
    });
}

fn bench_primality(c: &mut Criterion) {
    let mut group = c.benchmark_group("primality");

    group.bench_function("is_prime_u64", |b| {
        b.iter(|| is_prime(black_box(18_446_744_073_709_551_557)))
    });
    group.bench_function("nearest_prime_slot", |b| {
        b.iter(|| nearest_prime(black_box(340_000_000)))
    });
    group.bench_function("next_prime_slot", |b| {
        b.iter(|| next_prime(black_box(340_000_000)))
    });

    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let fixed = SlotClock::fixed(Duration::from_secs(5), Duration::ZERO);
    let prime = SlotClock::fixed(Duration::from_secs(5), Duration::ZERO)
        .with_prime_strategy(PrimeStrategy::Nearest);
    let raw = SlotIndex::new(340_000_000);

    let mut group = c.benchmark_group("window");
    group.bench_function("fixed_drift_2", |b| b.iter(|| fixed.window(black_box(raw), 2)));
    group.bench_function("prime_drift_2", |b| b.iter(|| prime.window(black_box(raw), 2)));
    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_slot_at,
    bench_adaptive_slot_at,
    bench_jitter,
    bench_primality,
    bench_window,
);
criterion_main!(benches);
