//! Benchmarks for telemetry decoding and routing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rhms_telemetry::codec::{decode, detect_format, encode, Format, WireFormat};
use rhms_telemetry::config::DispatcherConfig;
use rhms_telemetry::{HealthCode, TelemetryDispatcher, TelemetryRecord};

fn sample_record(params: usize) -> TelemetryRecord {
    let mut record = TelemetryRecord::new("SIGPROC-01", HealthCode::Warning)
        .with_message("buffer utilization high")
        .with_timestamp(1_700_000_000_000);
    for i in 0..params {
        match i % 3 {
            0 => record.add_parameter(format!("float_{}", i), i as f64 * 1.5),
            1 => record.add_parameter(format!("int_{}", i), i as i32),
            _ => record.add_parameter(format!("text_{}", i), "nominal"),
        }
    }
    record
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for params in [0usize, 8, 32].iter() {
        let record = sample_record(*params);
        for format in [WireFormat::Binary, WireFormat::Json, WireFormat::DefenseProtocol] {
            let bytes = encode(&record, format.into()).unwrap();
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format.to_string(), params),
                &bytes,
                |b, bytes| b.iter(|| black_box(decode(bytes, Format::Auto).unwrap())),
            );
        }
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let record = sample_record(8);

    for format in [WireFormat::Binary, WireFormat::Json, WireFormat::DefenseProtocol] {
        group.bench_function(format.to_string(), |b| {
            b.iter(|| black_box(encode(&record, format.into()).unwrap()))
        });
    }

    group.finish();
}

fn bench_detect_format(c: &mut Criterion) {
    let record = sample_record(8);
    let json = encode(&record, Format::Json).unwrap();
    let defense = encode(&record, Format::DefenseProtocol).unwrap();

    let mut group = c.benchmark_group("detect_format");
    group.bench_function("json", |b| b.iter(|| black_box(detect_format(&json))));
    group.bench_function("defense", |b| b.iter(|| black_box(detect_format(&defense))));
    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    group.throughput(Throughput::Elements(1));

    let (dispatcher, deliveries) = TelemetryDispatcher::new(&DispatcherConfig::default());
    for i in 0..64 {
        dispatcher
            .register_fn(format!("SUB-{:02}", i), |record: &TelemetryRecord| {
                black_box(record.health_code);
            })
            .unwrap();
    }
    let hit = TelemetryRecord::new("SUB-42", HealthCode::Ok);
    let miss = TelemetryRecord::new("NOBODY", HealthCode::Ok);
    let events = dispatcher.events();

    group.bench_function("hit", |b| {
        b.iter(|| {
            black_box(dispatcher.route(hit.clone()));
            deliveries.drain();
            while events.try_recv().is_ok() {}
        })
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            black_box(dispatcher.route(miss.clone()));
            while events.try_recv().is_ok() {}
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_detect_format, bench_route);
criterion_main!(benches);
