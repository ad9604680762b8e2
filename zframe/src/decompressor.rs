//! Streaming decompression sessions.
//!
//! A [`ZstdDecompressor`] accepts input in arbitrary pieces and produces
//! output as soon as whole blocks are available. Frames that follow each
//! other in the input are decoded as one stream, and skippable frames are
//! consumed without output.
//!
//! When a frame ends, decoding continues only if the remaining input starts
//! with a frame magic number (or could, being shorter than one). Otherwise
//! the stream is over: [`ZstdDecompressor::eof`] turns true and the rest of
//! the input becomes [`ZstdDecompressor::unused_data`].

use std::sync::Arc;

use tracing::{debug, trace};
use zframe_codec::{BLOCK_SIZE_MAX, BlockCodec, BlockDecoder, DecompressionParameter, ZstdBlockCodec};
use zframe_core::error::{Result, ZframeError};
use zframe_core::{SlidingWindow, XxHash64};

use crate::dict::{DictUsage, PreparedDict};
use crate::frame::{
    BLOCK_HEADER_SIZE, BlockHeader, BlockType, CHECKSUM_SIZE, FrameHeader, Header,
    ZSTD_MAGIC, parse_block_header, parse_header, starts_with_frame,
};
use crate::params::DecompressionOptions;

/// Where the decoder is within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for a frame or skippable frame header.
    FrameHeader,
    /// Inside a skippable frame's payload.
    Skip { remaining: u64 },
    /// Waiting for a block header.
    BlockHeader,
    /// Waiting for a block payload.
    Block(BlockHeader),
    /// Waiting for the content checksum.
    Checksum,
}

/// Outcome of one decoding step.
enum Step {
    Progress,
    NeedInput,
}

/// Streaming decompressor.
///
/// # Example
///
/// ```rust
/// use zframe::ZstdDecompressor;
///
/// let mut stream = zframe::compress(b"x").unwrap();
/// stream.extend_from_slice(b"TRAILING");
///
/// let mut decompressor = ZstdDecompressor::new();
/// assert_eq!(decompressor.decompress(&stream, None).unwrap(), b"x");
/// assert!(decompressor.eof());
/// assert_eq!(decompressor.unused_data(), b"TRAILING");
/// ```
#[derive(Debug)]
pub struct ZstdDecompressor {
    codec: Arc<dyn BlockCodec>,
    options: DecompressionOptions,
    dict: Option<PreparedDict>,
    decoder: Box<dyn BlockDecoder>,
    window: SlidingWindow,
    stage: Stage,
    frame: Option<FrameHeader>,
    hasher: XxHash64,
    /// Undecoded input; `input[input_pos..]` is live.
    input: Vec<u8>,
    input_pos: usize,
    /// Decoded output not yet returned; `output[output_pos..]` is live.
    output: Vec<u8>,
    output_pos: usize,
    /// A Zstandard frame has been completed in this stream.
    frame_done: bool,
    finished: bool,
    needs_input: bool,
    unused: Vec<u8>,
    started: bool,
}

impl Default for ZstdDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ZstdDecompressor {
    /// Create a decompressor with default options.
    pub fn new() -> Self {
        Self::with_options(DecompressionOptions::new())
    }

    /// Create a decompressor from a parameter set.
    pub fn with_options(options: DecompressionOptions) -> Self {
        let codec: Arc<dyn BlockCodec> = Arc::new(ZstdBlockCodec::new());
        let decoder = codec.new_decoder();
        Self {
            codec,
            options,
            dict: None,
            decoder,
            window: SlidingWindow::default(),
            stage: Stage::FrameHeader,
            frame: None,
            hasher: XxHash64::new(),
            input: Vec::new(),
            input_pos: 0,
            output: Vec::new(),
            output_pos: 0,
            frame_done: false,
            finished: false,
            needs_input: true,
            unused: Vec::new(),
            started: false,
        }
    }

    /// Replace the block codec.
    pub fn with_codec(mut self, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        self.ensure_not_started("codec")?;
        self.decoder = codec.new_decoder();
        self.codec = codec;
        Ok(self)
    }

    /// Use a dictionary for every frame of this stream.
    pub fn set_dict(&mut self, dict: impl Into<DictUsage>) -> Result<&mut Self> {
        self.ensure_not_started("dictionary")?;
        self.dict = Some(dict.into().prepare_decompression()?);
        Ok(self)
    }

    /// Set one parameter.
    ///
    /// After decoding has started only `WindowLogMax` may change, and only
    /// between frames.
    pub fn set_parameter(&mut self, key: DecompressionParameter, value: i64) -> Result<&mut Self> {
        if self.started {
            let hot_swappable = key == DecompressionParameter::WindowLogMax;
            if !hot_swappable || self.stage != Stage::FrameHeader {
                return Err(ZframeError::invalid_config(format!(
                    "cannot change {} in the middle of a frame",
                    key.name()
                )));
            }
            let mut options = self.options.clone();
            options.set(key, value)?;
            options.validate(self.codec.as_ref())?;
            self.options = options;
            return Ok(self);
        }
        self.options.set(key, value)?;
        Ok(self)
    }

    /// The parameter set.
    pub fn options(&self) -> &DecompressionOptions {
        &self.options
    }

    /// Whether the end of the stream has been reached and all output
    /// returned.
    pub fn eof(&self) -> bool {
        self.finished && self.output_pos == self.output.len()
    }

    /// Whether the next call needs more input to make progress.
    pub fn needs_input(&self) -> bool {
        self.needs_input
    }

    /// Input that followed the end of the stream. Empty until [`eof`].
    ///
    /// [`eof`]: ZstdDecompressor::eof
    pub fn unused_data(&self) -> &[u8] {
        if self.eof() { &self.unused } else { &[] }
    }

    /// Forget all stream state, keeping the options and dictionary.
    pub fn reset(&mut self) {
        self.decoder = self.codec.new_decoder();
        self.window = SlidingWindow::default();
        self.stage = Stage::FrameHeader;
        self.frame = None;
        self.hasher.reset();
        self.input.clear();
        self.input_pos = 0;
        self.output.clear();
        self.output_pos = 0;
        self.frame_done = false;
        self.finished = false;
        self.needs_input = true;
        self.unused.clear();
        self.started = false;
    }

    fn ensure_not_started(&self, what: &str) -> Result<()> {
        if self.started {
            return Err(ZframeError::invalid_config(format!(
                "cannot change {what} after decompression has started"
            )));
        }
        Ok(())
    }

    /// Feed `data` and return up to `max_length` bytes of output (all
    /// available output when `None`).
    pub fn decompress(&mut self, data: &[u8], max_length: Option<usize>) -> Result<Vec<u8>> {
        if self.eof() {
            return Err(ZframeError::EndOfStream);
        }
        if !self.started {
            self.options.validate(self.codec.as_ref())?;
            self.started = true;
        }

        if self.finished {
            // Only buffered output remains; trailing input is unused data.
            self.unused.extend_from_slice(data);
        } else {
            self.input.drain(..self.input_pos);
            self.input_pos = 0;
            self.input.extend_from_slice(data);
        }

        let limit = max_length.unwrap_or(usize::MAX);
        let mut starved = false;
        while !self.finished && self.output.len() - self.output_pos < limit {
            match self.step() {
                Ok(Step::Progress) => {}
                Ok(Step::NeedInput) => {
                    starved = true;
                    break;
                }
                Err(err) => {
                    self.needs_input = false;
                    return Err(err);
                }
            }
        }

        let available = self.output.len() - self.output_pos;
        let take = available.min(limit);
        let out = self.output[self.output_pos..self.output_pos + take].to_vec();
        self.output_pos += take;
        if self.output_pos == self.output.len() {
            self.output.clear();
            self.output_pos = 0;
        }

        self.needs_input = !self.finished && starved && self.output_pos == self.output.len();
        Ok(out)
    }

    /// Bytes still missing before the current element can be decoded.
    fn missing_input(&self) -> usize {
        let live = self.live_input().len();
        match self.stage {
            Stage::FrameHeader => 1,
            Stage::Skip { remaining } => usize::try_from(remaining).unwrap_or(usize::MAX),
            Stage::BlockHeader => BLOCK_HEADER_SIZE.saturating_sub(live),
            Stage::Block(header) => header.payload_len().saturating_sub(live),
            Stage::Checksum => CHECKSUM_SIZE.saturating_sub(live),
        }
    }

    /// Between frames with no buffered input.
    pub(crate) fn at_frame_boundary(&self) -> bool {
        self.stage == Stage::FrameHeader && self.live_input().is_empty()
    }

    fn live_input(&self) -> &[u8] {
        &self.input[self.input_pos..]
    }

    fn step(&mut self) -> Result<Step> {
        match self.stage {
            Stage::FrameHeader => self.step_frame_header(),
            Stage::Skip { remaining } => {
                let available = self.live_input().len() as u64;
                let skip = remaining.min(available);
                self.input_pos += skip as usize;
                if skip < remaining {
                    self.stage = Stage::Skip {
                        remaining: remaining - skip,
                    };
                    return Ok(Step::NeedInput);
                }
                self.stage = Stage::FrameHeader;
                self.end_of_frame(false);
                Ok(Step::Progress)
            }
            Stage::BlockHeader => {
                if self.live_input().len() < BLOCK_HEADER_SIZE {
                    return Ok(Step::NeedInput);
                }
                let header = parse_block_header(self.live_input())?;
                let limit = self.block_limit();
                if header.size as usize > limit {
                    return Err(ZframeError::corrupted(
                        self.input_pos as u64,
                        format!("block size {} exceeds the frame's {limit} byte limit", header.size),
                    ));
                }
                self.input_pos += BLOCK_HEADER_SIZE;
                self.stage = Stage::Block(header);
                Ok(Step::Progress)
            }
            Stage::Block(header) => {
                let len = header.payload_len();
                if self.live_input().len() < len {
                    return Ok(Step::NeedInput);
                }
                self.decode_block(header)?;
                self.input_pos += len;
                self.stage = match (header.last, self.frame.is_some_and(|f| f.checksum)) {
                    (false, _) => Stage::BlockHeader,
                    (true, true) => Stage::Checksum,
                    (true, false) => {
                        self.finish_frame()?;
                        Stage::FrameHeader
                    }
                };
                if self.stage == Stage::FrameHeader {
                    self.end_of_frame(true);
                }
                Ok(Step::Progress)
            }
            Stage::Checksum => {
                let Some(stored) = self.live_input().get(..CHECKSUM_SIZE) else {
                    return Ok(Step::NeedInput);
                };
                let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
                let computed = self.hasher.checksum32();
                if expected != computed {
                    return Err(ZframeError::checksum_mismatch(expected, computed));
                }
                self.input_pos += CHECKSUM_SIZE;
                self.finish_frame()?;
                self.stage = Stage::FrameHeader;
                self.end_of_frame(true);
                Ok(Step::Progress)
            }
        }
    }

    fn step_frame_header(&mut self) -> Result<Step> {
        let live = self.live_input();
        if live.is_empty() {
            return Ok(Step::NeedInput);
        }
        if !starts_with_frame(live) {
            return Err(ZframeError::invalid_magic(
                ZSTD_MAGIC.to_le_bytes(),
                &live[..live.len().min(4)],
            ));
        }
        let (header, used) = match parse_header(self.live_input()) {
            Ok(parsed) => parsed,
            Err(ZframeError::UnexpectedEof { .. }) => return Ok(Step::NeedInput),
            Err(err) => return Err(err),
        };
        match header {
            Header::Skippable {
                magic_variant,
                length,
            } => {
                debug!(magic_variant, length, "skipping skippable frame");
                self.stage = Stage::Skip {
                    remaining: u64::from(length),
                };
            }
            Header::Frame(frame) => {
                self.start_frame(frame)?;
                self.stage = Stage::BlockHeader;
            }
        }
        self.input_pos += used;
        Ok(Step::Progress)
    }

    fn start_frame(&mut self, frame: FrameHeader) -> Result<()> {
        let limit = self.options.max_window_size();
        if frame.window_size > limit {
            return Err(ZframeError::WindowTooLarge {
                required: frame.window_size,
                limit,
            });
        }
        let loaded_id = self.dict.as_ref().map_or(0, PreparedDict::frame_dict_id);
        if frame.dictionary_id != 0 && frame.dictionary_id != loaded_id {
            return Err(ZframeError::dictionary_mismatch(
                frame.dictionary_id,
                loaded_id,
            ));
        }
        let window_size = usize::try_from(frame.window_size).map_err(|_| {
            ZframeError::WindowTooLarge {
                required: frame.window_size,
                limit,
            }
        })?;

        let view = self.dict.as_ref().map(PreparedDict::view);
        let history = self.dict.as_ref().map_or(&[][..], PreparedDict::history);
        self.window.reset(window_size, history);
        self.decoder.reset(view.as_ref());
        self.hasher.reset();
        self.frame = Some(frame);
        debug!(
            window_size = frame.window_size,
            content_size = ?frame.content_size,
            dictionary_id = frame.dictionary_id,
            checksum = frame.checksum,
            "frame started"
        );
        Ok(())
    }

    /// Largest block the current frame may contain.
    fn block_limit(&self) -> usize {
        let window = self.frame.map_or(0, |f| f.window_size);
        BLOCK_SIZE_MAX.min(usize::try_from(window).unwrap_or(usize::MAX))
    }

    fn decode_block(&mut self, header: BlockHeader) -> Result<()> {
        let payload = &self.input[self.input_pos..self.input_pos + header.payload_len()];
        match header.kind {
            BlockType::Raw => self.window.push_literals(payload),
            BlockType::Rle => self.window.push_repeated(payload[0], header.size as usize),
            BlockType::Compressed => self.decoder.decode_block(payload, &mut self.window)?,
        }

        let start = self.output.len();
        let produced = self.window.drain_into(&mut self.output);
        self.hasher.update(&self.output[start..]);
        trace!(kind = ?header.kind, size = header.size, produced, "decoded block");

        if let Some(expected) = self.frame.and_then(|f| f.content_size) {
            if self.window.total_out() > expected {
                return Err(ZframeError::corrupted(
                    self.input_pos as u64,
                    format!(
                        "frame content exceeds its declared size of {expected} bytes"
                    ),
                ));
            }
        }
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<()> {
        let produced = self.window.total_out();
        if let Some(expected) = self.frame.and_then(|f| f.content_size) {
            if produced != expected {
                return Err(ZframeError::corrupted(
                    self.input_pos as u64,
                    format!("content size mismatch: expected {expected}, got {produced}"),
                ));
            }
        }
        debug!(content_size = produced, "frame finished");
        self.frame = None;
        Ok(())
    }

    /// Decide whether the stream continues after a frame.
    fn end_of_frame(&mut self, zstd_frame: bool) {
        self.frame_done |= zstd_frame;
        if !self.frame_done {
            return;
        }
        let rest = self.live_input();
        if !rest.is_empty() && starts_with_frame(rest) {
            return;
        }
        self.unused = rest.to_vec();
        self.input.clear();
        self.input_pos = 0;
        self.finished = true;
    }
}

/// Decompress a complete input in one call.
///
/// Every byte must belong to a frame: trailing bytes that are not a frame
/// are [`ZframeError::InvalidMagic`] and an incomplete final frame is
/// [`ZframeError::UnexpectedEof`]. Empty input decompresses to nothing.
pub fn decompress_all(
    data: &[u8],
    dict: Option<DictUsage>,
    options: &DecompressionOptions,
) -> Result<Vec<u8>> {
    let mut decompressor = ZstdDecompressor::with_options(options.clone());
    if let Some(dict) = dict {
        decompressor.set_dict(dict)?;
    }
    let out = decompressor.decompress(data, None)?;
    if decompressor.eof() {
        let unused = decompressor.unused_data();
        if !unused.is_empty() {
            let found = &unused[..unused.len().min(4)];
            return Err(ZframeError::invalid_magic(ZSTD_MAGIC.to_le_bytes(), found));
        }
    } else if !decompressor.at_frame_boundary() {
        return Err(ZframeError::unexpected_eof(decompressor.missing_input()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::write_skippable_frame;

    fn frame(data: &[u8]) -> Vec<u8> {
        crate::compress(data).unwrap()
    }

    #[test]
    fn test_single_frame_sets_eof() {
        let mut d = ZstdDecompressor::new();
        assert_eq!(d.decompress(&frame(b"hello"), None).unwrap(), b"hello");
        assert!(d.eof());
        assert!(!d.needs_input());
        assert!(d.unused_data().is_empty());
        assert!(matches!(
            d.decompress(b"", None),
            Err(ZframeError::EndOfStream)
        ));
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = b"incremental input, one byte per call".repeat(20);
        let compressed = frame(&data);
        let mut d = ZstdDecompressor::new();
        let mut out = Vec::new();
        for byte in &compressed {
            assert!(!d.eof());
            out.extend(d.decompress(std::slice::from_ref(byte), None).unwrap());
        }
        assert!(d.eof());
        assert_eq!(out, data);
    }

    #[test]
    fn test_truncated_frame_needs_input() {
        let compressed = frame(&b"a".repeat(42));
        let mut d = ZstdDecompressor::new();
        let out = d.decompress(&compressed[..compressed.len() - 1], None).unwrap();
        assert!(!d.eof());
        assert!(d.needs_input());
        assert!(out.len() <= 42);
    }

    #[test]
    fn test_max_length_limits_output() {
        let data = b"0123456789".repeat(100);
        let compressed = frame(&data);
        let mut d = ZstdDecompressor::new();

        let first = d.decompress(&compressed, Some(0)).unwrap();
        assert!(first.is_empty());
        assert!(!d.needs_input());

        let mut out = d.decompress(b"", Some(300)).unwrap();
        assert_eq!(out.len(), 300);
        assert!(!d.eof());
        while !d.eof() {
            out.extend(d.decompress(b"", Some(300)).unwrap());
        }
        assert_eq!(out, data);
    }

    #[test]
    fn test_concatenated_frames_in_one_call() {
        let mut stream = frame(b"first ");
        stream.extend(frame(b"second"));
        let mut d = ZstdDecompressor::new();
        assert_eq!(d.decompress(&stream, None).unwrap(), b"first second");
        assert!(d.eof());
    }

    #[test]
    fn test_skippable_frames_are_transparent() {
        let skip = write_skippable_frame(3, b"metadata").unwrap();
        let mut stream = skip.clone();
        stream.extend(frame(b"payload"));
        stream.extend(&skip);

        let mut d = ZstdDecompressor::new();
        assert_eq!(d.decompress(&stream, None).unwrap(), b"payload");
        assert!(d.eof());
        assert!(d.unused_data().is_empty());
    }

    #[test]
    fn test_skippable_alone_does_not_end_stream() {
        let mut d = ZstdDecompressor::new();
        let skip = write_skippable_frame(0, b"abc").unwrap();
        assert!(d.decompress(&skip, None).unwrap().is_empty());
        assert!(!d.eof());
        assert!(d.needs_input());
        assert_eq!(d.decompress(&frame(b"later"), None).unwrap(), b"later");
        assert!(d.eof());
    }

    #[test]
    fn test_trailing_data_becomes_unused() {
        let mut stream = frame(b"x");
        stream.extend_from_slice(b"TRAILING");
        let mut d = ZstdDecompressor::new();
        assert_eq!(d.decompress(&stream, None).unwrap(), b"x");
        assert!(d.eof());
        assert_eq!(d.unused_data(), b"TRAILING");
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let mut d = ZstdDecompressor::new();
        let err = d.decompress(b"not a zstd frame", None).unwrap_err();
        assert!(matches!(err, ZframeError::InvalidMagic { .. }));
    }

    #[test]
    fn test_short_non_frame_input_fails_early() {
        let mut d = ZstdDecompressor::new();
        assert!(matches!(
            d.decompress(b"ab", None),
            Err(ZframeError::InvalidMagic { .. })
        ));

        let mut d = ZstdDecompressor::new();
        assert!(d.decompress(&[0x28, 0xB5], None).unwrap().is_empty());
        assert!(d.needs_input());
    }

    #[test]
    fn test_window_log_max() {
        let mut options = crate::CompressionOptions::new();
        options
            .set(zframe_codec::CompressionParameter::WindowLog, 28)
            .unwrap();
        let mut c = crate::ZstdCompressor::with_options(options);
        let mut compressed = c
            .compress(&b"window".repeat(10), zframe_core::EndDirective::FlushBlock)
            .unwrap();
        compressed.extend(c.flush(zframe_core::EndDirective::FlushFrame).unwrap());

        let mut d = ZstdDecompressor::new();
        assert!(matches!(
            d.decompress(&compressed, None),
            Err(ZframeError::WindowTooLarge { .. })
        ));

        let mut d = ZstdDecompressor::new();
        d.set_parameter(DecompressionParameter::WindowLogMax, 28)
            .unwrap();
        assert_eq!(d.decompress(&compressed, None).unwrap(), b"window".repeat(10));
    }

    #[test]
    fn test_window_log_max_hot_swap_between_frames() {
        let skip = write_skippable_frame(0, b"").unwrap();
        let mut d = ZstdDecompressor::new();
        d.decompress(&skip, None).unwrap();
        d.set_parameter(DecompressionParameter::WindowLogMax, 30)
            .unwrap();
        assert_eq!(d.options().max_window_size(), 1 << 30);

        let compressed = frame(&b"z".repeat(1000));
        d.decompress(&compressed[..compressed.len() - 2], None).unwrap();
        assert!(d
            .set_parameter(DecompressionParameter::WindowLogMax, 20)
            .is_err());
    }

    #[test]
    fn test_decompress_all_edges() {
        let options = DecompressionOptions::new();
        assert!(decompress_all(b"", None, &options).unwrap().is_empty());

        let skip = write_skippable_frame(1, b"only metadata").unwrap();
        assert!(decompress_all(&skip, None, &options).unwrap().is_empty());

        let compressed = frame(&b"a".repeat(42));
        let err = decompress_all(&compressed[..compressed.len() - 1], None, &options).unwrap_err();
        assert!(matches!(err, ZframeError::UnexpectedEof { expected: 1 }));

        let mut trailing = compressed.clone();
        trailing.extend_from_slice(b"junk");
        let err = decompress_all(&trailing, None, &options).unwrap_err();
        assert!(matches!(err, ZframeError::InvalidMagic { .. }));
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut compressed = frame(b"checksummed content");
        let last = compressed.len() - 1;
        compressed[last] ^= 0x01;
        let mut d = ZstdDecompressor::new();
        assert!(matches!(
            d.decompress(&compressed, None),
            Err(ZframeError::ChecksumMismatch { .. })
        ));
    }
}
