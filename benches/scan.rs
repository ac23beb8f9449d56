use std::hint::black_box;
use std::io;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use commport::{FileTransport, Port, PortSettings};

/// Printable filler with the marker appended at the end. The filler
/// contains neither '*' nor '\n', so scans run the full length.
fn haystack(len: usize, marker: &[u8]) -> Vec<u8> {
    let filler = b"telemetry frame 0123456789 ";
    let mut data: Vec<u8> = filler.iter().copied().cycle().take(len).collect();
    data.extend_from_slice(marker);
    data
}

fn replay_port(data: &[u8]) -> Port<FileTransport> {
    let capture = std::env::temp_dir().join("commport-bench-capture.bin");
    let mut port = Port::with_settings(
        FileTransport::from_bytes(data.to_vec(), capture),
        PortSettings::new().with_timeout_millis(1_000),
    );
    port.open().unwrap();
    port
}

pub fn bench_skip_until(c: &mut Criterion) {
    let pattern = b"*SYNC*\r\n";
    let data = haystack(64 * 1024, pattern);

    c.bench_function("skip_until_64k", |b| {
        b.iter_batched(
            || replay_port(&data),
            |mut port| {
                let found = port.skip_until(pattern).unwrap();
                black_box(found);
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn bench_copy_until(c: &mut Criterion) {
    let data = haystack(64 * 1024, b"\n");

    c.bench_function("copy_until_64k", |b| {
        b.iter_batched(
            || replay_port(&data),
            |mut port| {
                let mut chunk = [0u8; 512];
                let result = port
                    .copy_until(b'\n', &mut io::sink(), &mut chunk)
                    .unwrap();
                black_box(result);
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn bench_byte_loop(c: &mut Criterion) {
    let data = haystack(16 * 1024, b"\n");

    c.bench_function("collect_until_16k", |b| {
        b.iter_batched(
            || replay_port(&data),
            |mut port| {
                let mut line = Vec::with_capacity(data.len());
                let result = port.collect_until(b'\n', &mut line).unwrap();
                black_box((result, line));
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_skip_until, bench_copy_until, bench_byte_loop
}
criterion_main!(benches);
