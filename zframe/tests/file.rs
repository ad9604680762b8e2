//! File wrapper and text mode on real files.

use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom, Write};

use tempfile::tempdir;
use zframe::{
    EndDirective, ErrorKind, FileMode, FileOptions, NewlineMode, OpenFile, OpenOptions,
    ZframeError, ZstdDict, ZstdFile, open, write_skippable_frame,
};

/// Hands out at most `step` bytes per read, like a pipe or socket.
struct ShortReads<R> {
    inner: R,
    step: usize,
}

impl<R: Read> Read for ShortReads<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.step);
        self.inner.read(&mut buf[..len])
    }
}

fn read_in_steps(raw: &[u8], step: usize) -> zframe::Result<Vec<u8>> {
    let reader = ShortReads {
        inner: Cursor::new(raw.to_vec()),
        step,
    };
    let mut file = ZstdFile::reader(reader, FileOptions::new())?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)?;
    Ok(out)
}

fn read_all(path: &std::path::Path) -> Vec<u8> {
    let mut file = ZstdFile::open(path, "rb").unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

// ============================================================================
// Modes
// ============================================================================

#[test]
fn test_append_adds_a_second_frame() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.zst");

    let mut file = ZstdFile::open(&path, "w").unwrap();
    file.write_all(b"first frame, ").unwrap();
    file.close().unwrap();
    let first_len = std::fs::metadata(&path).unwrap().len();

    let mut file = ZstdFile::open(&path, "ab").unwrap();
    file.write_all(b"second frame").unwrap();
    drop(file);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(zframe::get_frame_size(&raw).unwrap(), first_len);
    assert_eq!(read_all(&path), b"first frame, second frame");
}

#[test]
fn test_exclusive_mode_refuses_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("once.zst");

    let mut file = ZstdFile::open(&path, "x").unwrap();
    file.write_all(b"created").unwrap();
    file.close().unwrap();

    let err = ZstdFile::open(&path, "xb").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(read_all(&path), b"created");
}

#[test]
fn test_write_truncates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("truncate.zst");
    for text in [&b"a much longer first version"[..], b"short"] {
        let mut file = ZstdFile::open(&path, "wb").unwrap();
        file.write_all(text).unwrap();
        file.close().unwrap();
    }
    assert_eq!(read_all(&path), b"short");
}

#[test]
fn test_mode_accessors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mode.zst");
    let mut file = ZstdFile::open(&path, "w").unwrap();
    assert_eq!(file.mode(), FileMode::Write);
    assert!(!file.is_closed());
    file.close().unwrap();
    assert!(file.is_closed());
    assert_eq!(file.tell(), 0);
}

// ============================================================================
// Reading
// ============================================================================

#[test]
fn test_large_file_read_and_seek() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("large.zst");
    let data: Vec<u8> = (0..600_000u32)
        .flat_map(|i| format!("{i:08}\n").into_bytes())
        .take(600_000)
        .collect();

    let mut file = ZstdFile::open_with(&path, "w", FileOptions::new().with_level(1)).unwrap();
    for chunk in data.chunks(65_536) {
        file.write_all(chunk).unwrap();
    }
    assert_eq!(file.tell(), data.len() as u64);
    file.close().unwrap();

    let mut file = ZstdFile::open(&path, "r").unwrap();
    assert_eq!(file.seek(SeekFrom::Start(450_000)).unwrap(), 450_000);
    let mut buf = vec![0u8; 9];
    file.read_exact(&mut buf).unwrap();
    assert_eq!(buf, &data[450_000..450_009]);

    assert_eq!(file.seek(SeekFrom::Start(9)).unwrap(), 9);
    let mut line = String::new();
    file.read_line(&mut line).unwrap();
    assert_eq!(line.as_bytes(), &data[9..18]);

    let end = file.seek(SeekFrom::End(0)).unwrap();
    assert_eq!(end, data.len() as u64);
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_dictionary_through_file_options() {
    let samples: Vec<Vec<u8>> = (0..200)
        .map(|i| format!("record {i}: temperature={} unit=celsius", i % 40).into_bytes())
        .collect();
    let dict = ZstdDict::train(&samples, 2048).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dict.zst");

    let mut file =
        ZstdFile::open_with(&path, "w", FileOptions::new().with_dict(dict.clone())).unwrap();
    file.write_all(&samples[5]).unwrap();
    file.close().unwrap();

    let mut file = ZstdFile::open_with(&path, "r", FileOptions::new().with_dict(dict)).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    assert_eq!(out, samples[5]);

    let mut file = ZstdFile::open(&path, "r").unwrap();
    let err = file.read_to_end(&mut Vec::new()).unwrap_err();
    assert_eq!(ZframeError::from(err).kind(), ErrorKind::Integrity);
}

#[test]
fn test_flush_makes_partial_file_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.zst");

    let mut writer = ZstdFile::open(&path, "w").unwrap();
    writer.write_all(b"visible after flush").unwrap();
    writer.flush().unwrap();
    let flushed = std::fs::read(&path).unwrap();
    writer.flush_with(EndDirective::FlushBlock).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), flushed);

    let mut decompressor = zframe::ZstdDecompressor::new();
    assert_eq!(
        decompressor.decompress(&flushed, None).unwrap(),
        b"visible after flush"
    );
    assert!(!decompressor.eof());
    writer.close().unwrap();
}

// ============================================================================
// open()
// ============================================================================

#[test]
fn test_open_binary_and_text() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.zst");

    let OpenFile::Text(mut text) = open(
        &path,
        "wt",
        OpenOptions::new().with_newline(NewlineMode::CrLf),
    )
    .unwrap() else {
        panic!("expected a text file");
    };
    text.write_str("line one\nline two\n").unwrap();
    text.close().unwrap();

    let OpenFile::Binary(mut binary) = open(&path, "rb", OpenOptions::new()).unwrap() else {
        panic!("expected a binary file");
    };
    let mut raw = Vec::new();
    binary.read_to_end(&mut raw).unwrap();
    assert_eq!(raw, b"line one\r\nline two\r\n");

    let OpenFile::Text(mut text) = open(&path, "rt", OpenOptions::new()).unwrap() else {
        panic!("expected a text file");
    };
    let lines: Vec<String> = text.lines().collect::<zframe::Result<_>>().unwrap();
    assert_eq!(lines, ["line one\n", "line two\n"]);
}

#[test]
fn test_open_text_with_encoding() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("latin1.zst");
    let options = OpenOptions::new().with_encoding("latin1").unwrap();

    let OpenFile::Text(mut text) = open(&path, "xt", options.clone()).unwrap() else {
        panic!("expected a text file");
    };
    text.write_str("café crème").unwrap();
    text.close().unwrap();

    let OpenFile::Binary(mut binary) = open(&path, "r", OpenOptions::new()).unwrap() else {
        panic!("expected a binary file");
    };
    let mut raw = Vec::new();
    binary.read_to_end(&mut raw).unwrap();
    assert_eq!(raw, b"caf\xe9 cr\xe8me");

    let OpenFile::Text(mut text) = open(&path, "rt", options).unwrap() else {
        panic!("expected a text file");
    };
    assert_eq!(text.read_to_string().unwrap(), "café crème");
}

#[test]
fn test_bufread_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lines.zst");
    let mut file = ZstdFile::open(&path, "w").unwrap();
    for i in 0..1_000 {
        writeln!(file, "row {i}").unwrap();
    }
    file.close().unwrap();

    let file = ZstdFile::open(&path, "r").unwrap();
    let lines: Vec<String> = file.lines().map(Result::unwrap).collect();
    assert_eq!(lines.len(), 1_000);
    assert_eq!(lines[999], "row 999");
}

// ============================================================================
// Short reads from the underlying stream
// ============================================================================

const STEPS: [usize; 4] = [1, 3, 7, 4096];

#[test]
fn test_short_reads_concatenated_frames() {
    let mut raw = zframe::compress(b"first frame, ").unwrap();
    raw.extend(zframe::compress(b"second frame").unwrap());
    for step in STEPS {
        assert_eq!(
            read_in_steps(&raw, step).unwrap(),
            b"first frame, second frame",
            "step {step}"
        );
    }
}

#[test]
fn test_short_reads_trailing_skippable_frame() {
    let mut raw = zframe::compress(b"payload").unwrap();
    raw.extend(write_skippable_frame(0, b"meta").unwrap());
    for step in STEPS {
        assert_eq!(read_in_steps(&raw, step).unwrap(), b"payload", "step {step}");
    }
}

#[test]
fn test_short_reads_trailing_garbage() {
    for garbage in [&b"x"[..], b"ab", b"garbage after the frame"] {
        let mut raw = zframe::compress(b"payload").unwrap();
        raw.extend_from_slice(garbage);
        for step in STEPS {
            assert_eq!(read_in_steps(&raw, step).unwrap(), b"payload", "step {step}");
        }
    }
}

#[test]
fn test_short_reads_skippable_only() {
    let mut raw = write_skippable_frame(1, b"only metadata").unwrap();
    raw.extend(write_skippable_frame(2, b"").unwrap());
    for step in STEPS {
        assert!(read_in_steps(&raw, step).unwrap().is_empty(), "step {step}");
    }
}

#[test]
fn test_short_reads_truncated_frame() {
    let raw = zframe::compress(&b"abc".repeat(100)).unwrap();
    for step in STEPS {
        let err = read_in_steps(&raw[..raw.len() - 2], step).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEnd, "step {step}");
    }
}

#[test]
fn test_frame_aligned_chained_reader() {
    let frame = zframe::compress(b"payload").unwrap();
    let skip = write_skippable_frame(0, b"meta").unwrap();
    let reader = Cursor::new(frame).chain(Cursor::new(skip));
    let mut file = ZstdFile::reader(reader, FileOptions::new()).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"payload");
}
