//! Benchmarks for reading synthesis and broadcast encoding

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fleetsim::reading::{synthesize, SampleTime};
use fleetsim::{AnomalyKind, AnomalyState, Broadcast, SensorConfig, SensorRegistry};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sample_time(hour: u32) -> SampleTime {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap();
    SampleTime {
        process_start: start,
        now: start + Duration::hours(36),
        local_hour: hour,
    }
}

fn bench_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthesis");
    let mut rng = StdRng::seed_from_u64(7);
    let at = sample_time(12);
    let config = SensorConfig::random(&mut rng, at.process_start);

    group.throughput(Throughput::Elements(1));

    group.bench_function("single_reading", |b| {
        let mut anomaly = AnomalyState::default();
        b.iter(|| black_box(synthesize("sensor_0", &config, &mut anomaly, &at, &mut rng)))
    });

    group.bench_function("single_reading_with_anomaly", |b| {
        let mut anomaly = AnomalyState::default();
        anomaly.activate(AnomalyKind::TemperatureSpike, at.now, &mut rng);
        b.iter(|| black_box(synthesize("sensor_0", &config, &mut anomaly, &at, &mut rng)))
    });

    group.finish();
}

fn bench_fleet_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("fleet");
    let mut rng = StdRng::seed_from_u64(7);
    let at = sample_time(2);

    let mut registry = SensorRegistry::new();
    for i in 0..1000 {
        registry.add(&format!("sensor_{}", i), false, &mut rng, at.process_start);
    }

    group.throughput(Throughput::Elements(1000));

    group.bench_function("generate_1000_readings", |b| {
        b.iter(|| black_box(registry.generate_all(&at, &mut rng)))
    });

    let readings = registry.generate_all(&at, &mut rng);
    group.bench_function("encode_1000_broadcasts", |b| {
        b.iter(|| {
            for reading in &readings {
                let message = Broadcast::SensorReading(reading.clone());
                black_box(serde_json::to_vec(&message).unwrap());
            }
        })
    });

    group.bench_function("state_snapshot_1000", |b| {
        b.iter(|| black_box(registry.states()))
    });

    group.finish();
}

criterion_group!(benches, bench_synthesis, bench_fleet_tick);
criterion_main!(benches);
