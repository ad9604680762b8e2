//! Benchmarks for frame-level sessions
//!
//! - One-shot compression and decompression per level
//! - Streaming compression with small writes
//! - Small-record compression with and without a dictionary

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zframe::{
    CompressionOptions, DecompressionOptions, EndDirective, ZstdCompressor, ZstdDecompressor,
    ZstdDict, compress_level, compress_with, decompress, decompress_with,
};

mod test_data {
    /// Text-like data - realistic scenario
    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"The quick brown fox jumps over the lazy dog. \
                     Pack my box with five dozen liquor jugs. \
                     How vexingly quick daft zebras jump! ";
        let mut data = Vec::with_capacity(size);
        let mut seed: u32 = 0x9E37_79B9;
        while data.len() < size {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let start = (seed >> 16) as usize % text.len();
            let end = (start + 24).min(text.len());
            data.extend_from_slice(&text[start..end]);
        }
        data.truncate(size);
        data
    }

    /// Small JSON-like records sharing most of their structure
    pub fn records(count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                format!(
                    "{{\"id\": {i}, \"kind\": \"metric\", \"host\": \"node-{}\", \"value\": {}}}",
                    i % 32,
                    i * 37 % 1000
                )
                .into_bytes()
            })
            .collect()
    }
}

fn bench_one_shot(c: &mut Criterion) {
    let data = test_data::text_like(1 << 20);
    let mut group = c.benchmark_group("one_shot");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for level in [1i64, 3, 9, 19] {
        group.bench_with_input(BenchmarkId::new("compress", level), &level, |b, &level| {
            b.iter(|| compress_level(black_box(&data), level).unwrap())
        });
        let compressed = compress_level(&data, level).unwrap();
        group.bench_with_input(
            BenchmarkId::new("decompress", level),
            &compressed,
            |b, compressed| b.iter(|| decompress(black_box(compressed)).unwrap()),
        );
    }
    group.finish();
}

fn bench_streaming(c: &mut Criterion) {
    let data = test_data::text_like(1 << 20);
    let mut group = c.benchmark_group("streaming");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for write_size in [512usize, 8 * 1024, 64 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("compress_writes", write_size),
            &write_size,
            |b, &write_size| {
                b.iter(|| {
                    let mut compressor = ZstdCompressor::new();
                    let mut out = Vec::new();
                    for chunk in data.chunks(write_size) {
                        out.extend(compressor.compress(chunk, EndDirective::Continue).unwrap());
                    }
                    out.extend(compressor.flush(EndDirective::FlushFrame).unwrap());
                    out
                })
            },
        );
    }

    let compressed = compress_level(&data, 3).unwrap();
    group.bench_function("decompress_pieces", |b| {
        b.iter(|| {
            let mut decompressor = ZstdDecompressor::new();
            let mut total = 0;
            for piece in compressed.chunks(4096) {
                total += decompressor.decompress(piece, None).unwrap().len();
            }
            total
        })
    });
    group.finish();
}

fn bench_dictionary(c: &mut Criterion) {
    let records = test_data::records(2_000);
    let dict = ZstdDict::train(&records, 4096).unwrap();
    let options = CompressionOptions::new();
    let mut group = c.benchmark_group("dictionary");

    group.bench_function("train", |b| {
        b.iter(|| ZstdDict::train(black_box(&records[..500]), 4096).unwrap())
    });
    group.bench_function("compress_records_plain", |b| {
        b.iter(|| {
            for record in records.iter().take(200) {
                black_box(compress_with(record, &options, None).unwrap());
            }
        })
    });
    group.bench_function("compress_records_dict", |b| {
        b.iter(|| {
            for record in records.iter().take(200) {
                black_box(compress_with(record, &options, Some(dict.as_digested_dict())).unwrap());
            }
        })
    });

    let frames: Vec<Vec<u8>> = records
        .iter()
        .take(200)
        .map(|r| compress_with(r, &options, Some(dict.as_digested_dict())).unwrap())
        .collect();
    let decompression = DecompressionOptions::new();
    group.bench_function("decompress_records_dict", |b| {
        b.iter(|| {
            for frame in &frames {
                black_box(
                    decompress_with(frame, Some(dict.as_digested_dict()), &decompression).unwrap(),
                );
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_one_shot, bench_streaming, bench_dictionary);
criterion_main!(benches);
