//! One-shot round trips across levels, strategies and frame options.

use zframe::{
    CompressionOptions, CompressionParameter, ErrorKind, Strategy, compress, compress_level,
    compress_with, decompress, get_frame_info, write_skippable_frame,
};

fn text_like(size: usize) -> Vec<u8> {
    let text = b"The quick brown fox jumps over the lazy dog. \
                 Pack my box with five dozen liquor jugs. \
                 How vexingly quick daft zebras jump! ";
    let mut data = Vec::with_capacity(size);
    let mut seed: u32 = 0x2545_F491;
    while data.len() < size {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let start = (seed >> 16) as usize % text.len();
        let end = (start + 31).min(text.len());
        data.extend_from_slice(&text[start..end]);
    }
    data.truncate(size);
    data
}

fn noise(size: usize) -> Vec<u8> {
    let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
    (0..size)
        .map(|_| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1);
            (seed >> 33) as u8
        })
        .collect()
}

// ============================================================================
// Basic inputs
// ============================================================================

#[test]
fn test_empty_input() {
    let compressed = compress(b"").unwrap();
    assert!(!compressed.is_empty());
    assert_eq!(decompress(&compressed).unwrap(), b"");
    assert_eq!(get_frame_info(&compressed).unwrap().decompressed_size, Some(0));
}

#[test]
fn test_single_byte() {
    let compressed = compress(b"A").unwrap();
    assert_eq!(decompress(&compressed).unwrap(), b"A");
}

#[test]
fn test_all_same_byte() {
    let input = vec![0xAAu8; 300_000];
    let compressed = compress(&input).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
    // One RLE block per 128 KiB
    assert!(compressed.len() < 100);
}

#[test]
fn test_incompressible_input() {
    let input = noise(200_000);
    let compressed = compress(&input).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
    // Raw blocks bound the expansion
    assert!(compressed.len() < input.len() + 64);
}

#[test]
fn test_large_text() {
    let input = text_like(1 << 20);
    let compressed = compress(&input).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 2);
}

// ============================================================================
// Levels and parameters
// ============================================================================

#[test]
fn test_levels() {
    let input = text_like(100_000);
    for level in [-5, -1, 1, 3, 6, 9, 15, 19, 22] {
        let compressed = compress_level(&input, level).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), input, "level {level}");
    }
}

#[test]
fn test_out_of_range_levels_clamp() {
    let input = text_like(10_000);
    let compressed = compress_level(&input, 1_000).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
    assert_eq!(compressed, compress_level(&input, 22).unwrap());
}

#[test]
fn test_level_beyond_i32_is_config_error() {
    let err = compress_level(b"x", i64::from(i32::MAX) + 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_every_strategy() {
    let input = text_like(200_000);
    for value in 1..=9 {
        let strategy = Strategy::from_value(value).unwrap();
        let options = CompressionOptions::new()
            .with(CompressionParameter::Strategy, i64::from(strategy.value()))
            .unwrap();
        let compressed = compress_with(&input, &options, None).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), input, "{strategy:?}");
    }
}

#[test]
fn test_long_distance_matching() {
    let block = noise(64 * 1024);
    let mut input = block.clone();
    input.extend(text_like(900_000));
    input.extend(&block);

    let options = CompressionOptions::new()
        .with(CompressionParameter::EnableLongDistanceMatching, 1)
        .unwrap()
        .with(CompressionParameter::WindowLog, 21)
        .unwrap();
    let compressed = compress_with(&input, &options, None).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
}

#[test]
fn test_explicit_search_parameters() {
    let input = text_like(150_000);
    let options = CompressionOptions::new()
        .with(CompressionParameter::WindowLog, 17)
        .unwrap()
        .with(CompressionParameter::HashLog, 15)
        .unwrap()
        .with(CompressionParameter::ChainLog, 16)
        .unwrap()
        .with(CompressionParameter::SearchLog, 4)
        .unwrap()
        .with(CompressionParameter::MinMatch, 5)
        .unwrap();
    let compressed = compress_with(&input, &options, None).unwrap();
    assert_eq!(decompress(&compressed).unwrap(), input);
}

#[test]
fn test_frame_flags_off() {
    let input = text_like(5_000);
    let options = CompressionOptions::new()
        .with(CompressionParameter::ChecksumFlag, 0)
        .unwrap()
        .with(CompressionParameter::ContentSizeFlag, 0)
        .unwrap();
    let plain = compress(&input).unwrap();
    let compressed = compress_with(&input, &options, None).unwrap();

    assert_eq!(decompress(&compressed).unwrap(), input);
    assert_eq!(get_frame_info(&compressed).unwrap().decompressed_size, None);
    assert!(compressed.len() < plain.len());
}

#[test]
fn test_deterministic_output() {
    let input = text_like(300_000);
    for level in [1, 3, 12] {
        assert_eq!(
            compress_level(&input, level).unwrap(),
            compress_level(&input, level).unwrap()
        );
    }
}

// ============================================================================
// Multi-frame streams
// ============================================================================

#[test]
fn test_concatenated_frames() {
    let a = text_like(70_000);
    let b = noise(1_000);
    let mut stream = compress(&a).unwrap();
    stream.extend(compress(&b).unwrap());
    stream.extend(compress(b"").unwrap());

    let mut expected = a.clone();
    expected.extend(&b);
    assert_eq!(decompress(&stream).unwrap(), expected);
}

#[test]
fn test_skippable_frames_anywhere() {
    let data = text_like(10_000);
    let frame = compress(&data).unwrap();
    let skip = write_skippable_frame(7, b"user metadata").unwrap();

    let mut before = skip.clone();
    before.extend(&frame);
    let mut after = frame.clone();
    after.extend(&skip);

    assert_eq!(decompress(&before).unwrap(), data);
    assert_eq!(decompress(&after).unwrap(), data);
}

#[test]
fn test_trailing_garbage_is_format_error() {
    let mut stream = compress(b"payload").unwrap();
    stream.extend_from_slice(b"\x00\x01\x02\x03garbage");
    let err = decompress(&stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_truncation_is_detected() {
    let frame = compress(&text_like(2_000)).unwrap();
    for cut in [1, 2, 4, 5, frame.len() / 2, frame.len() - 1] {
        let err = decompress(&frame[..cut]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEnd, "cut at {cut}");
    }
}
