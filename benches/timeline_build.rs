//! Benchmarks for timeline construction
//!
//! Measures box navigation, unit scanning and telemetry decoding over
//! synthetic recordings of one minute at 30 fps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dashframe_media::fixture::DashcamFileBuilder;
use dashframe_media::{extract_telemetry, Gear, TelemetryRecord, TelemetrySchema, Timeline};

const FRAMES: usize = 1800;

fn recording(telemetry_every: Option<usize>) -> bytes::Bytes {
    let mut builder = DashcamFileBuilder::new().frames(FRAMES).keyframe_interval(30);
    if let Some(step) = telemetry_every {
        for index in (0..FRAMES).step_by(step) {
            builder = builder.telemetry_at(
                index,
                TelemetryRecord {
                    gear_state: Some(Gear::Drive as i32),
                    frame_seq_no: Some(index as u64),
                    vehicle_speed_mps: Some(13.4),
                    latitude_deg: Some(37.3947),
                    longitude_deg: Some(-122.1503),
                    ..Default::default()
                },
            );
        }
    }
    builder.build()
}

fn bench_timeline_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("timeline_build");
    let schema = TelemetrySchema::dashcam();

    for (name, every) in [("video_only", None), ("telemetry_every_frame", Some(1))] {
        let data = recording(every);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("build", name), &data, |b, data| {
            b.iter(|| Timeline::build(black_box(data.clone()), &schema).unwrap());
        });
    }

    group.finish();
}

fn bench_telemetry_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_scan");
    let schema = TelemetrySchema::dashcam();

    for every in [1, 30] {
        let data = recording(Some(every));
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("extract", every), &data, |b, data| {
            b.iter(|| extract_telemetry(black_box(data), &schema).unwrap());
        });
    }

    group.finish();
}

fn bench_frame_lookup(c: &mut Criterion) {
    let timeline = Timeline::build(recording(None), &TelemetrySchema::dashcam()).unwrap();
    let duration = timeline.duration_ms();

    c.bench_function("frame_index_at", |b| {
        let mut t = 0.0;
        b.iter(|| {
            t = (t + 137.0) % duration;
            black_box(timeline.frame_index_at(black_box(t)))
        });
    });
}

criterion_group!(
    benches,
    bench_timeline_build,
    bench_telemetry_scan,
    bench_frame_lookup
);
criterion_main!(benches);
