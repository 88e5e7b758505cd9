//! Microbenchmarks for the chunk packer and bloom index construction.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use qgd::store::Builder;
use qgd::utils::bloom::build_chunk_index;

/// Synthetic source-like content: short lines with some repetition.
fn synthetic_content(size: usize) -> Vec<u8> {
    let mut content = Vec::with_capacity(size + 64);
    let mut i = 0usize;
    while content.len() < size {
        content.extend_from_slice(
            format!("fn function_{}(arg: usize) -> usize {{ arg + {} }}\n", i, i * 7).as_bytes(),
        );
        i += 1;
    }
    content.truncate(size);
    content
}

fn bench_pack(c: &mut Criterion) {
    let content = synthetic_content(8 * 1024 * 1024);

    let mut group = c.benchmark_group("pack");
    group.throughput(Throughput::Bytes(content.len() as u64));
    group.bench_function("8mb_synthetic", |b| {
        b.iter(|| {
            let mut builder = Builder::new(std::io::sink()).unwrap();
            builder
                .append_file_part("bench.rs", 0, black_box(&content), 1, content.len() as u64)
                .unwrap();
            builder.finish().unwrap();
        })
    });
    group.finish();
}

fn bench_bloom_index(c: &mut Criterion) {
    let content = synthetic_content(512 * 1024);

    let mut group = c.benchmark_group("bloom");
    group.throughput(Throughput::Bytes(content.len() as u64));
    group.bench_function("index_512k", |b| {
        b.iter(|| build_chunk_index(black_box(&content)))
    });
    group.finish();
}

criterion_group!(benches, bench_pack, bench_bloom_index);
criterion_main!(benches);
