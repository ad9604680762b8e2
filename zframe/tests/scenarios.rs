//! End-to-end scenarios: empty frames, truncation, trained dictionaries and
//! appending through the file wrapper.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use zframe::{
    CompressionOptions, DecompressionOptions, ErrorKind, ZstdDecompressor, ZstdDict, ZstdFile,
    compress, compress_with, decompress, decompress_with,
};

#[test]
fn test_empty_input_emits_a_real_frame() {
    let compressed = compress(b"").unwrap();
    assert!(!compressed.is_empty());
    assert_eq!(&compressed[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
    assert_eq!(decompress(&compressed).unwrap(), b"");
}

#[test]
fn test_truncated_frame_fails_and_full_frame_succeeds() {
    let data = b"a".repeat(42);
    let frame = compress(&data).unwrap();

    let err = decompress(&frame[..frame.len() - 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEnd);
    assert_eq!(decompress(&frame).unwrap(), data);

    // The streaming API reports the same condition as a need for input
    let mut decompressor = ZstdDecompressor::new();
    decompressor
        .decompress(&frame[..frame.len() - 1], None)
        .unwrap();
    assert!(decompressor.needs_input());
    assert!(!decompressor.eof());
}

#[test]
fn test_trained_dictionary_reloaded_from_content() {
    let samples: Vec<Vec<u8>> = (0..250)
        .map(|i| {
            format!(
                "GET /api/v2/items/{i} HTTP/1.1\r\nHost: example.org\r\nAccept: application/json\r\nX-Request: {}\r\n\r\n",
                i * 7919 % 1000
            )
            .into_bytes()
        })
        .collect();

    let zd = ZstdDict::new(ZstdDict::train(&samples, 3072).unwrap().dict_content(), false).unwrap();
    for sample in &samples {
        let compressed =
            compress_with(sample, &CompressionOptions::new(), Some(zd.clone().into())).unwrap();
        let restored =
            decompress_with(&compressed, Some(zd.clone().into()), &DecompressionOptions::new())
                .unwrap();
        assert_eq!(&restored, sample);
    }
}

#[test]
fn test_write_append_read_through_buffer() {
    let mut file = ZstdFile::new(Cursor::new(Vec::new()), "w").unwrap();
    file.write_all(b"hello world").unwrap();
    let mut buffer = file.into_inner().unwrap();

    buffer.seek(SeekFrom::End(0)).unwrap();
    let mut file = ZstdFile::new(buffer, "a").unwrap();
    file.write_all(b"!").unwrap();
    let mut buffer = file.into_inner().unwrap();

    buffer.set_position(0);
    let mut file = ZstdFile::new(buffer, "r").unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"hello world!");
}
