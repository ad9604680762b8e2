//! Benchmarks for the block codec
//!
//! - Block encoding speed per strategy
//! - Block decoding speed
//! - Dictionary content selection

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zframe_codec::{
    BLOCK_SIZE_MAX, BlockCodec, BlockParams, EncodedBlock, ParamOverrides, ZstdBlockCodec,
};
use zframe_core::{CompressionLevel, SlidingWindow};

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
}

fn params(level: i32) -> BlockParams {
    BlockParams::resolve(
        CompressionLevel::new(level),
        &ParamOverrides::default(),
        None,
        0,
    )
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_encode");
    let codec = ZstdBlockCodec::new();
    let data = test_data::text_like(BLOCK_SIZE_MAX);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for level in [-5, 1, 3, 9, 19] {
        let p = params(level);
        group.bench_with_input(BenchmarkId::new("level", level), &data, |b, data| {
            b.iter(|| {
                let mut encoder = codec.new_encoder(&p);
                encoder.reset(None);
                black_box(encoder.encode_block(data).expect("encode failed"))
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_decode");
    let codec = ZstdBlockCodec::new();
    let data = test_data::text_like(BLOCK_SIZE_MAX);
    let p = params(3);
    let mut encoder = codec.new_encoder(&p);
    encoder.reset(None);
    let EncodedBlock::Compressed(payload) = encoder.encode_block(&data).expect("encode failed")
    else {
        return;
    };

    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("level_3", |b| {
        b.iter(|| {
            let mut decoder = codec.new_decoder();
            decoder.reset(None);
            let mut window = SlidingWindow::new(1 << 21);
            decoder
                .decode_block(black_box(&payload), &mut window)
                .expect("decode failed");
            black_box(window.total_out())
        });
    });

    group.finish();
}

fn bench_train(c: &mut Criterion) {
    let codec = ZstdBlockCodec::new();
    let samples: Vec<Vec<u8>> = (0..500)
        .map(|i| format!("{{\"user\": {i}, \"action\": \"login\", \"region\": \"r{}\"}}", i % 9).into_bytes())
        .collect();
    let refs: Vec<&[u8]> = samples.iter().map(Vec::as_slice).collect();

    c.bench_function("train_content_4k", |b| {
        b.iter(|| black_box(codec.train_content(&refs, 4096).expect("training failed")));
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_train);
criterion_main!(benches);
