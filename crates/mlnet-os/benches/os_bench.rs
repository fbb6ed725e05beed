//! Benchmarks for the mlnet-os primitives.
//!
//! Run with: `cargo bench -p mlnet-os`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mlnet_os::{Descriptor, HashBuffer, SeekOrigin, fd_size, path_size, seek};
use std::io::Write;
use tempfile::NamedTempFile;

fn temp_file(len: usize) -> NamedTempFile {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&data).unwrap();
    temp.flush().unwrap();
    temp
}

/// Stream whole files through the hash buffer into BLAKE3
fn bench_hash_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_stream");

    for size_mib in [1usize, 16, 64] {
        let len = size_mib * 1024 * 1024;
        let temp = temp_file(len);
        let fd = Descriptor::from_file(temp.as_file());
        let mut buffer = HashBuffer::new();

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("mib", size_mib), &size_mib, |b, _| {
            b.iter(|| {
                seek(&fd, 0, SeekOrigin::Start).unwrap();
                let mut hasher = blake3::Hasher::new();
                while buffer.fill_from(&fd).unwrap() > 0 {
                    hasher.update(buffer.filled());
                }
                black_box(hasher.finalize())
            });
        });
    }

    group.finish();
}

/// Size queries by descriptor and by path
fn bench_size_queries(c: &mut Criterion) {
    let temp = temp_file(4096);
    let fd = Descriptor::from_file(temp.as_file());

    c.bench_function("fd_size", |b| b.iter(|| black_box(fd_size(&fd).unwrap())));
    c.bench_function("path_size", |b| {
        b.iter(|| black_box(path_size(temp.path()).unwrap()))
    });
}

criterion_group!(benches, bench_hash_stream, bench_size_queries);
criterion_main!(benches);
