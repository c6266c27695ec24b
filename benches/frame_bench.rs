//! Criterion benchmarks for the position frame codec.

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use pinpoint::frame;
use pinpoint::locations::{DocPageLocations, TextLocation};

/// A page with `count` word-sized runs, shaped like real extractor output.
fn sample_dpl(count: u32) -> DocPageLocations {
    let mut dpl = DocPageLocations::new(3, 17);
    for i in 0..count {
        let x = (i % 90) as f32 * 6.0;
        let y = 720.0 - (i / 90) as f32 * 14.0;
        dpl.locations.push(TextLocation {
            start: i * 6,
            end: 0,
            llx: x,
            lly: y,
            urx: x + 5.0,
            ury: y + 12.0,
        });
    }
    dpl
}

fn bench_encode(c: &mut Criterion) {
    let dpl = sample_dpl(500);
    let encoded_len = frame::encode(&dpl).len() as u64;

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes(encoded_len));
    group.bench_function("encode_500_runs", |b| {
        b.iter(|| frame::encode(black_box(&dpl)))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let dpl = sample_dpl(500);
    let payload = frame::encode(&dpl);

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("decode_500_runs", |b| {
        b.iter(|| frame::decode(black_box(&payload)).unwrap())
    });
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let dpl = sample_dpl(500);

    let mut group = c.benchmark_group("frame_round_trip");
    group.bench_function("write_read_500_runs", |b| {
        b.iter(|| {
            let mut buf = Cursor::new(Vec::new());
            let header = frame::write(&mut buf, black_box(&dpl)).unwrap();
            let read_back = frame::read_at(&mut buf, &header).unwrap();
            assert_eq!(read_back.page, dpl.page);
            read_back
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_round_trip);
criterion_main!(benches);
