//! File-like wrapper over compression and decompression sessions.
//!
//! [`ZstdFile`] implements [`Read`], [`BufRead`], [`Write`] and [`Seek`] on
//! top of any byte stream. Read mode decodes every frame in the stream,
//! including concatenated frames written by append mode. Write mode buffers
//! through a [`ZstdCompressor`] and writes one frame per session.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Read, Write};
//! use zframe::ZstdFile;
//!
//! let mut file = ZstdFile::new(Cursor::new(Vec::new()), "w").unwrap();
//! file.write_all(b"hello world").unwrap();
//! let mut raw = file.into_inner().unwrap();
//!
//! raw.set_position(0);
//! let mut file = ZstdFile::new(raw, "r").unwrap();
//! let mut text = String::new();
//! file.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "hello world");
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;
use zframe_codec::CompressionParameter;
use zframe_core::EndDirective;
use zframe_core::error::{Result, ZframeError};

use crate::compressor::ZstdCompressor;
use crate::decompressor::ZstdDecompressor;
use crate::dict::DictUsage;
use crate::params::{CompressionOptions, DecompressionOptions};

/// Compressed bytes pulled from the underlying stream per read.
pub const READ_SIZE: usize = 131_075;

/// Decoded bytes produced per decompression step.
const OUTPUT_CHUNK: usize = 128 * 1024;

/// How a [`ZstdFile`] was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// `r` / `rb`.
    Read,
    /// `w` / `wb`; truncates.
    Write,
    /// `a` / `ab`; adds a new frame after existing content.
    Append,
    /// `x` / `xb`; fails if the target exists.
    Exclusive,
}

impl FileMode {
    /// Parse a binary mode string.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "r" | "rb" => Ok(Self::Read),
            "w" | "wb" => Ok(Self::Write),
            "a" | "ab" => Ok(Self::Append),
            "x" | "xb" => Ok(Self::Exclusive),
            other => Err(ZframeError::invalid_config(format!(
                "invalid mode: {other:?}"
            ))),
        }
    }

    /// Whether this mode reads.
    pub fn is_read(self) -> bool {
        self == Self::Read
    }

    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
            Self::Exclusive => options.write(true).create_new(true),
        };
        options
    }
}

/// Session settings for a [`ZstdFile`].
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    level: Option<i64>,
    compression: Option<CompressionOptions>,
    decompression: Option<DecompressionOptions>,
    dict: Option<DictUsage>,
}

impl FileOptions {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression level (write modes only).
    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    /// Compression parameters (write modes only).
    pub fn with_compression(mut self, options: CompressionOptions) -> Self {
        self.compression = Some(options);
        self
    }

    /// Decompression parameters (read mode only).
    pub fn with_decompression(mut self, options: DecompressionOptions) -> Self {
        self.decompression = Some(options);
        self
    }

    /// Dictionary for every frame.
    pub fn with_dict(mut self, dict: impl Into<DictUsage>) -> Self {
        self.dict = Some(dict.into());
        self
    }
}

type Sink<F> = fn(&mut F, &[u8]) -> io::Result<()>;

fn write_through<W: Write>(inner: &mut W, bytes: &[u8]) -> io::Result<()> {
    inner.write_all(bytes)
}

fn flush_through<W: Write>(inner: &mut W, bytes: &[u8]) -> io::Result<()> {
    inner.write_all(bytes)?;
    inner.flush()
}

#[derive(Debug)]
struct ReadState {
    decompressor: ZstdDecompressor,
    options: DecompressionOptions,
    dict: Option<DictUsage>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    /// Logical position in the decompressed stream.
    pos: u64,
    /// Compressed bytes consumed from the underlying stream.
    raw_pos: u64,
    /// Current decompressor is not the first one.
    follow_on: bool,
    eof: bool,
    /// Decompressed size, once known.
    size: Option<u64>,
}

impl ReadState {
    fn new(options: DecompressionOptions, dict: Option<DictUsage>) -> Result<Self> {
        let decompressor = build_decompressor(&options, dict.as_ref())?;
        Ok(Self {
            decompressor,
            options,
            dict,
            buffer: Vec::new(),
            buffer_pos: 0,
            pos: 0,
            raw_pos: 0,
            follow_on: false,
            eof: false,
            size: None,
        })
    }

    fn buffered(&self) -> &[u8] {
        &self.buffer[self.buffer_pos..]
    }

    fn consume(&mut self, amount: usize) {
        let amount = amount.min(self.buffer.len() - self.buffer_pos);
        self.buffer_pos += amount;
        self.pos += amount as u64;
    }

    /// Make at least one decoded byte available unless the stream has
    /// ended. Returns whether data is buffered.
    fn fill<R: Read + ?Sized>(&mut self, inner: &mut R) -> Result<bool> {
        if self.buffer_pos < self.buffer.len() {
            return Ok(true);
        }
        self.buffer.clear();
        self.buffer_pos = 0;

        while !self.eof {
            let data = if self.decompressor.eof() {
                if !self.decompressor.unused_data().is_empty() {
                    // Trailing bytes that are not a frame are ignored.
                    self.finish();
                    break;
                }
                let raw = self.read_raw(inner)?;
                if raw.is_empty() {
                    self.finish();
                    break;
                }
                self.decompressor = build_decompressor(&self.options, self.dict.as_ref())?;
                self.follow_on = true;
                self.feed(&raw)
            } else if self.decompressor.needs_input() {
                let raw = self.read_raw(inner)?;
                if raw.is_empty() {
                    // Only skippable frames, or nothing, since the last frame.
                    if self.decompressor.at_frame_boundary() {
                        self.finish();
                        break;
                    }
                    return Err(ZframeError::unexpected_eof(1));
                }
                self.feed(&raw)
            } else {
                self.feed(&[])
            };

            match data {
                Ok(data) if !data.is_empty() => {
                    self.buffer = data;
                    return Ok(true);
                }
                Ok(_) => {}
                Err(err) if self.follow_on && is_trailing_garbage(&err) => {
                    self.finish();
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    fn feed(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        self.decompressor.decompress(raw, Some(OUTPUT_CHUNK))
    }

    fn read_raw<R: Read + ?Sized>(&mut self, inner: &mut R) -> Result<Vec<u8>> {
        let mut raw = vec![0u8; READ_SIZE];
        let n = loop {
            match inner.read(&mut raw) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };
        raw.truncate(n);
        self.raw_pos += n as u64;
        Ok(raw)
    }

    fn finish(&mut self) {
        self.eof = true;
        self.size = Some(self.pos);
    }

    fn rewind(&mut self) -> Result<()> {
        self.decompressor = build_decompressor(&self.options, self.dict.as_ref())?;
        self.buffer.clear();
        self.buffer_pos = 0;
        self.pos = 0;
        self.raw_pos = 0;
        self.follow_on = false;
        self.eof = false;
        Ok(())
    }
}

/// Bytes after the last stream that do not start a frame are ignored.
fn is_trailing_garbage(err: &ZframeError) -> bool {
    matches!(err, ZframeError::InvalidMagic { .. })
}

fn build_decompressor(
    options: &DecompressionOptions,
    dict: Option<&DictUsage>,
) -> Result<ZstdDecompressor> {
    let mut decompressor = ZstdDecompressor::with_options(options.clone());
    if let Some(dict) = dict {
        decompressor.set_dict(dict.clone())?;
    }
    Ok(decompressor)
}

#[derive(Debug)]
struct WriteState {
    compressor: ZstdCompressor,
    /// Uncompressed bytes accepted.
    pos: u64,
}

#[derive(Debug)]
enum State {
    Reading(ReadState),
    Writing(WriteState),
}

/// A compressed file.
///
/// Reads decompress and writes compress. `flush` ends the current block so
/// everything written so far can be decoded; [`ZstdFile::close`] ends the
/// frame.
pub struct ZstdFile<F> {
    inner: Option<F>,
    mode: FileMode,
    owns_inner: bool,
    state: State,
    sink: Option<Sink<F>>,
    closed: bool,
}

impl<F> std::fmt::Debug for ZstdFile<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZstdFile")
            .field("mode", &self.mode)
            .field("owns_inner", &self.owns_inner)
            .field("closed", &self.closed)
            .field("state", &self.state)
            .finish()
    }
}

impl<F: Read + Write> ZstdFile<F> {
    /// Wrap a stream in the given mode with default options.
    pub fn new(inner: F, mode: &str) -> Result<Self> {
        Self::with_options(inner, mode, FileOptions::new())
    }

    /// Wrap a stream in the given mode.
    pub fn with_options(inner: F, mode: &str, options: FileOptions) -> Result<Self> {
        let mode = FileMode::parse(mode)?;
        if mode.is_read() {
            Self::build(inner, mode, options, None, false)
        } else {
            Self::build(inner, mode, options, Some(write_through::<F>), false)
        }
    }
}

impl<F: Read> ZstdFile<F> {
    /// Wrap a read-only stream.
    pub fn reader(inner: F, options: FileOptions) -> Result<Self> {
        Self::build(inner, FileMode::Read, options, None, false)
    }
}

impl<F: Write> ZstdFile<F> {
    /// Wrap a write-only stream. `mode` must be a write mode.
    pub fn writer(inner: F, mode: &str, options: FileOptions) -> Result<Self> {
        let mode = FileMode::parse(mode)?;
        if mode.is_read() {
            return Err(ZframeError::invalid_config(
                "a write-only stream cannot be opened for reading",
            ));
        }
        Self::build(inner, mode, options, Some(write_through::<F>), false)
    }
}

impl ZstdFile<File> {
    /// Open a file by path with default options.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        Self::open_with(path, mode, FileOptions::new())
    }

    /// Open a file by path. The file is closed with the wrapper.
    pub fn open_with(path: impl AsRef<Path>, mode: &str, options: FileOptions) -> Result<Self> {
        let mode = FileMode::parse(mode)?;
        let file = mode.open_options().open(path.as_ref())?;
        let sink: Option<Sink<File>> = if mode.is_read() {
            None
        } else {
            Some(flush_through::<File>)
        };
        Self::build(file, mode, options, sink, true)
    }
}

impl<F> ZstdFile<F> {
    fn build(
        inner: F,
        mode: FileMode,
        options: FileOptions,
        sink: Option<Sink<F>>,
        owns_inner: bool,
    ) -> Result<Self> {
        let FileOptions {
            level,
            compression,
            decompression,
            dict,
        } = options;

        let state = if mode.is_read() {
            if level.is_some() || compression.is_some() {
                return Err(ZframeError::invalid_config(
                    "compression options given for a file opened for reading",
                ));
            }
            State::Reading(ReadState::new(decompression.unwrap_or_default(), dict)?)
        } else {
            if decompression.is_some() {
                return Err(ZframeError::invalid_config(
                    "decompression options given for a file opened for writing",
                ));
            }
            let mut compression = compression.unwrap_or_default();
            if let Some(level) = level {
                compression.set(CompressionParameter::CompressionLevel, level)?;
            }
            let mut compressor = ZstdCompressor::with_options(compression);
            if let Some(dict) = dict {
                compressor.set_dict(dict)?;
            }
            State::Writing(WriteState { compressor, pos: 0 })
        };

        Ok(Self {
            inner: Some(inner),
            mode,
            owns_inner,
            state,
            sink,
            closed: false,
        })
    }

    /// The mode this file was opened with.
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Whether [`ZstdFile::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current position in the decompressed stream.
    pub fn tell(&self) -> u64 {
        match &self.state {
            State::Reading(state) => state.pos,
            State::Writing(state) => state.pos,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(ZframeError::unsupported("I/O operation on closed file"));
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match (self.sink, self.inner.as_mut()) {
            (Some(sink), Some(inner)) => Ok(sink(inner, bytes)?),
            _ => Err(ZframeError::unsupported("write on a file not opened for writing")),
        }
    }

    /// End the current block or frame.
    ///
    /// Repeating the previous flush mode writes nothing. Read-mode files
    /// ignore this call.
    pub fn flush_with(&mut self, mode: EndDirective) -> Result<()> {
        self.check_open()?;
        let State::Writing(state) = &mut self.state else {
            return Ok(());
        };
        if !mode.is_flush() {
            return Err(ZframeError::invalid_config(
                "flush mode must be FlushBlock or FlushFrame",
            ));
        }
        if mode == state.compressor.last_mode() {
            return Ok(());
        }
        let out = state.compressor.flush(mode)?;
        self.emit(&out)
    }

    /// Finish the session.
    ///
    /// Write modes end the frame. The underlying file is closed only if
    /// this wrapper opened it. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = if matches!(self.state, State::Writing(_)) {
            self.flush_with(EndDirective::FlushFrame)
        } else {
            Ok(())
        };
        self.closed = true;
        if self.owns_inner {
            self.inner = None;
        }
        result
    }

    /// Close the session and return the underlying stream.
    pub fn into_inner(mut self) -> Result<F> {
        self.owns_inner = false;
        self.close()?;
        self.inner
            .take()
            .ok_or_else(|| ZframeError::unsupported("underlying stream already released"))
    }

    fn reading(&mut self) -> Result<(&mut ReadState, &mut F)> {
        self.check_open()?;
        match (&mut self.state, self.inner.as_mut()) {
            (State::Reading(state), Some(inner)) => Ok((state, inner)),
            _ => Err(ZframeError::unsupported("read on a file not opened for reading")),
        }
    }
}

impl<F: Read> ZstdFile<F> {
    /// Return the buffered decoded bytes without consuming them, decoding
    /// more only if nothing is buffered.
    pub fn peek(&mut self) -> Result<&[u8]> {
        let (state, inner) = self.reading()?;
        state.fill(inner)?;
        Ok(state.buffered())
    }

    /// Read up to `size` bytes with at most one decoding step. `None`
    /// returns everything buffered.
    pub fn read1(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let (state, inner) = self.reading()?;
        if size == Some(0) || !state.fill(inner)? {
            return Ok(Vec::new());
        }
        let take = size.map_or(state.buffered().len(), |n| n.min(state.buffered().len()));
        let out = state.buffered()[..take].to_vec();
        state.consume(take);
        Ok(out)
    }

    /// Read one line including its `\n`, up to `limit` bytes.
    pub fn readline(&mut self, limit: Option<usize>) -> Result<Vec<u8>> {
        let (state, inner) = self.reading()?;
        let limit = limit.unwrap_or(usize::MAX);
        let mut line = Vec::new();
        while line.len() < limit && state.fill(inner)? {
            let available = state.buffered();
            let room = (limit - line.len()).min(available.len());
            let (take, done) = match available[..room].iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (room, false),
            };
            line.extend_from_slice(&available[..take]);
            state.consume(take);
            if done {
                break;
            }
        }
        Ok(line)
    }
}

impl<F: Read> Read for ZstdFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let (state, inner) = self.reading()?;
        if !state.fill(inner)? {
            return Ok(0);
        }
        let available = state.buffered();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        state.consume(n);
        Ok(n)
    }
}

impl<F: Read> BufRead for ZstdFile<F> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.peek()?)
    }

    fn consume(&mut self, amt: usize) {
        if let State::Reading(state) = &mut self.state {
            state.consume(amt);
        }
    }
}

impl<F: Write> Write for ZstdFile<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        let State::Writing(state) = &mut self.state else {
            return Err(ZframeError::unsupported("write on a file not opened for writing").into());
        };
        let out = state.compressor.compress(buf, EndDirective::Continue)?;
        state.pos += buf.len() as u64;
        self.emit(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_with(EndDirective::FlushBlock)?;
        if let Some(inner) = self.inner.as_mut() {
            if !self.closed && self.sink.is_some() {
                inner.flush()?;
            }
        }
        Ok(())
    }
}

impl<F: Read + Seek> Seek for ZstdFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        if let State::Writing(state) = &self.state {
            if pos == SeekFrom::Current(0) {
                return Ok(state.pos);
            }
            return Err(ZframeError::unsupported("seek on a file opened for writing").into());
        }

        let (state, inner) = self.reading()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                while state.fill(inner)? {
                    let n = state.buffered().len();
                    state.consume(n);
                }
                state.size.unwrap_or(state.pos).checked_add_signed(delta)
            }
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            ));
        };

        if target < state.pos {
            let back = i64::try_from(state.raw_pos).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "stream too long to rewind")
            })?;
            debug!(from = state.pos, to = target, "rewinding compressed stream");
            inner.seek(SeekFrom::Current(-back))?;
            state.rewind()?;
        }

        while state.pos < target && state.fill(inner)? {
            let remaining = usize::try_from(target - state.pos).unwrap_or(usize::MAX);
            let n = state.buffered().len().min(remaining);
            state.consume(n);
        }
        Ok(state.pos)
    }
}

impl<F> Drop for ZstdFile<F> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "error while closing compressed file");
        }
    }
}
