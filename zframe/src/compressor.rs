//! Streaming compression sessions.
//!
//! A [`ZstdCompressor`] buffers input and emits frames incrementally.
//! Nothing is written until a block must be emitted: `Continue` emits only
//! full blocks while more than one block of input is pending, `FlushBlock`
//! emits everything pending without closing the frame, and `FlushFrame`
//! closes the frame. The next call after a closed frame starts a new one.
//!
//! With the `parallel` feature and a nonzero worker count, emitted input is
//! split into jobs that are encoded on a rayon pool, each with its own
//! encoder seeded with the tail of the preceding input.

use std::sync::Arc;

use tracing::{debug, trace};
use zframe_codec::{
    BLOCK_SIZE_MAX, BlockCodec, BlockEncoder, BlockParams, CompressionParameter, EncodedBlock,
    ZstdBlockCodec,
};
use zframe_core::error::{Result, ZframeError};
use zframe_core::{EndDirective, XxHash64};

use crate::dict::{DictUsage, PreparedDict};
use crate::frame::{BlockType, FrameParams, write_block_header, write_header};
use crate::params::CompressionOptions;

/// Smallest job handed to a worker.
#[cfg(feature = "parallel")]
const MIN_JOB_SIZE: usize = 512 * 1024;

/// Overlap log used when none is configured.
#[cfg(feature = "parallel")]
const DEFAULT_OVERLAP_LOG: u8 = 6;

/// A frame being written.
#[derive(Debug)]
struct OpenFrame {
    #[cfg(feature = "parallel")]
    params: BlockParams,
    encoder: Box<dyn BlockEncoder>,
    /// Dictionary for the first job of the frame.
    #[cfg(feature = "parallel")]
    dict: Option<PreparedDict>,
    hasher: XxHash64,
    checksum: bool,
    /// Content size the header promised, checked at the end.
    expected_size: Option<u64>,
    consumed: u64,
    block_size: usize,
    /// Tail of the frame content, kept for job overlap.
    #[cfg(feature = "parallel")]
    recent: Vec<u8>,
}

/// Streaming compressor.
///
/// # Example
///
/// ```rust
/// use zframe::{EndDirective, ZstdCompressor};
///
/// let mut compressor = ZstdCompressor::new();
/// let mut frame = compressor.compress(b"hello ", EndDirective::Continue).unwrap();
/// frame.extend(compressor.compress(b"world", EndDirective::FlushFrame).unwrap());
/// assert_eq!(zframe::decompress(&frame).unwrap(), b"hello world");
/// ```
#[derive(Debug)]
pub struct ZstdCompressor {
    codec: Arc<dyn BlockCodec>,
    options: CompressionOptions,
    dict: Option<DictUsage>,
    pledged: Option<u64>,
    pending: Vec<u8>,
    frame: Option<OpenFrame>,
    last_mode: EndDirective,
    started: bool,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ZstdCompressor {
    /// Create a compressor at the default level.
    pub fn new() -> Self {
        Self::with_options(CompressionOptions::new())
    }

    /// Create a compressor at `level`.
    ///
    /// Levels outside the supported range are clamped; values that do not
    /// fit in `i32` are rejected.
    pub fn with_level(level: i64) -> Result<Self> {
        let options = CompressionOptions::new().with(CompressionParameter::CompressionLevel, level)?;
        Ok(Self::with_options(options))
    }

    /// Create a compressor from a parameter set.
    ///
    /// Parameter bounds are checked when the first frame starts.
    pub fn with_options(options: CompressionOptions) -> Self {
        Self {
            codec: Arc::new(ZstdBlockCodec::new()),
            options,
            dict: None,
            pledged: None,
            pending: Vec::new(),
            frame: None,
            last_mode: EndDirective::FlushFrame,
            started: false,
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }

    /// Replace the block codec.
    pub fn with_codec(mut self, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        self.ensure_not_started("codec")?;
        self.codec = codec;
        Ok(self)
    }

    /// Use a dictionary for every frame of this session.
    pub fn set_dict(&mut self, dict: impl Into<DictUsage>) -> Result<&mut Self> {
        self.ensure_not_started("dictionary")?;
        self.dict = Some(dict.into());
        Ok(self)
    }

    /// Set one parameter.
    pub fn set_parameter(&mut self, key: CompressionParameter, value: i64) -> Result<&mut Self> {
        self.ensure_not_started(key.name())?;
        self.options.set(key, value)?;
        Ok(self)
    }

    /// Declare the size of the next frame's content.
    ///
    /// Only allowed between frames. The size is written to the header, and a
    /// frame whose content differs from it fails.
    pub fn set_pledged_input_size(&mut self, size: Option<u64>) -> Result<()> {
        if self.frame.is_some() || !self.pending.is_empty() {
            return Err(ZframeError::invalid_config(
                "pledged input size can only be set between frames",
            ));
        }
        self.pledged = size;
        Ok(())
    }

    /// The parameter set.
    pub fn options(&self) -> &CompressionOptions {
        &self.options
    }

    /// The directive applied by the last `compress` or `flush` call.
    pub fn last_mode(&self) -> EndDirective {
        self.last_mode
    }

    /// Input accepted but not yet emitted.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn ensure_not_started(&self, what: &str) -> Result<()> {
        if self.started {
            return Err(ZframeError::invalid_config(format!(
                "cannot change {what} after compression has started"
            )));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.options.validate(self.codec.as_ref())?;
        #[cfg(feature = "parallel")]
        {
            let workers = self.options.nb_workers();
            if workers > 0 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|err| {
                        ZframeError::invalid_config(format!("cannot start {workers} workers: {err}"))
                    })?;
                self.pool = Some(pool);
            }
        }
        self.started = true;
        Ok(())
    }

    /// Compress `data` and return the bytes that are ready under `mode`.
    pub fn compress(&mut self, data: &[u8], mode: EndDirective) -> Result<Vec<u8>> {
        self.begin()?;
        self.pending.extend_from_slice(data);
        let mut out = Vec::new();

        match mode {
            EndDirective::Continue => {
                if self.pending.len() > BLOCK_SIZE_MAX {
                    self.open_frame(None, &mut out)?;
                    let unit = self.emit_unit();
                    let ready = (self.pending.len() - 1) / unit * unit;
                    if ready > 0 {
                        self.emit(ready, false, &mut out)?;
                    }
                }
            }
            EndDirective::FlushBlock => {
                if !self.pending.is_empty() {
                    self.open_frame(None, &mut out)?;
                    self.emit(self.pending.len(), false, &mut out)?;
                }
            }
            EndDirective::FlushFrame => {
                let known = self.pending.len() as u64;
                self.open_frame(Some(known), &mut out)?;
                self.emit(self.pending.len(), true, &mut out)?;
                self.close_frame(&mut out)?;
            }
        }

        self.last_mode = mode;
        Ok(out)
    }

    /// Emit pending input without adding any.
    ///
    /// `FlushBlock` with nothing pending, and `FlushFrame` right after a
    /// frame was closed, return nothing. A fresh session counts as having
    /// just closed a frame; `compress(b"", EndDirective::FlushFrame)` forces
    /// an empty frame.
    pub fn flush(&mut self, mode: EndDirective) -> Result<Vec<u8>> {
        match mode {
            EndDirective::Continue => Err(ZframeError::invalid_config(
                "flush mode must be FlushBlock or FlushFrame",
            )),
            EndDirective::FlushFrame if self.last_mode == EndDirective::FlushFrame => {
                Ok(Vec::new())
            }
            _ => self.compress(&[], mode),
        }
    }

    /// Bytes emitted per step under `Continue`.
    fn emit_unit(&self) -> usize {
        #[cfg(feature = "parallel")]
        {
            if self.pool.is_some() {
                return self.job_size();
            }
        }
        self.frame.as_ref().map_or(BLOCK_SIZE_MAX, |f| f.block_size)
    }

    #[cfg(feature = "parallel")]
    fn job_size(&self) -> usize {
        let window = self
            .frame
            .as_ref()
            .map_or(1 << 21, |f| f.params.window_size() as usize);
        match self.options.job_size() {
            0 => window.saturating_mul(4).max(MIN_JOB_SIZE),
            size => size.max(MIN_JOB_SIZE),
        }
    }

    #[cfg(feature = "parallel")]
    fn overlap_len(&self, params: &BlockParams) -> usize {
        let log = match self.options.overlap_log() {
            0 => DEFAULT_OVERLAP_LOG,
            log => log,
        };
        (params.window_size() >> (9 - log.min(9))) as usize
    }

    /// Start a frame if none is open. `known_size` is the content size when
    /// all of it is already pending.
    fn open_frame(&mut self, known_size: Option<u64>, out: &mut Vec<u8>) -> Result<()> {
        if self.frame.is_some() {
            return Ok(());
        }
        let source_size = self.pledged.or(known_size);
        let dict_len = self.dict.as_ref().map_or(0, |d| d.history().len());
        let params = BlockParams::resolve(
            self.options.level(),
            &self.options.overrides(),
            source_size,
            dict_len,
        );
        let flags = self.options.frame_flags();
        let prepared = self
            .dict
            .as_ref()
            .map(|d| d.prepare_compression(self.codec.as_ref(), &params))
            .transpose()?;

        let mut encoder = self.codec.new_encoder(&params);
        let view = prepared.as_ref().map(PreparedDict::view);
        encoder.reset(view.as_ref());

        let dictionary_id = match (&prepared, flags.dict_id) {
            (Some(dict), true) => dict.frame_dict_id(),
            _ => 0,
        };
        let header = FrameParams {
            window_log: params.window_log,
            content_size: source_size.filter(|_| flags.content_size),
            dictionary_id,
            checksum: flags.checksum,
        };
        out.extend_from_slice(&write_header(&header));
        debug!(
            window_log = params.window_log,
            strategy = ?params.strategy,
            content_size = ?header.content_size,
            dictionary_id,
            "frame started"
        );

        self.frame = Some(OpenFrame {
            #[cfg(feature = "parallel")]
            params,
            encoder,
            #[cfg(feature = "parallel")]
            dict: prepared,
            hasher: XxHash64::new(),
            checksum: flags.checksum,
            expected_size: self.pledged,
            consumed: 0,
            block_size: BLOCK_SIZE_MAX.min(params.window_size() as usize),
            #[cfg(feature = "parallel")]
            recent: Vec::new(),
        });
        Ok(())
    }

    /// Encode the first `len` pending bytes as blocks.
    fn emit(&mut self, len: usize, last: bool, out: &mut Vec<u8>) -> Result<()> {
        #[cfg(feature = "parallel")]
        let overlap = self
            .frame
            .as_ref()
            .map_or(0, |f| self.overlap_len(&f.params));
        #[cfg(feature = "parallel")]
        let job_size = self.job_size();

        let Some(frame) = self.frame.as_mut() else {
            return Err(ZframeError::invalid_config("no frame is open"));
        };
        let consumed = frame.consumed + len as u64;
        if let Some(expected) = frame.expected_size {
            if consumed > expected {
                return Err(ZframeError::invalid_config(format!(
                    "frame content exceeds the pledged size of {expected} bytes"
                )));
            }
        }

        let chunk: Vec<u8> = self.pending.drain(..len).collect();
        frame.hasher.update(&chunk);

        #[cfg(feature = "parallel")]
        {
            if let Some(pool) = self.pool.as_ref().filter(|_| !chunk.is_empty()) {
                let jobs = JobPlan {
                    params: frame.params,
                    block_size: frame.block_size,
                    job_size,
                    overlap,
                    first_of_frame: frame.consumed == 0,
                    dict: frame.dict.as_ref(),
                    recent: &frame.recent,
                };
                let encoded = encode_jobs(pool, self.codec.as_ref(), &jobs, &chunk, last)?;
                out.extend_from_slice(&encoded);
                frame.recent.extend_from_slice(&chunk);
                let excess = frame.recent.len().saturating_sub(overlap);
                frame.recent.drain(..excess);
                frame.consumed = consumed;
                return Ok(());
            }
        }

        if chunk.is_empty() {
            if last {
                write_block(frame.encoder.as_mut(), &[], true, out)?;
            }
        } else {
            let count = chunk.len().div_ceil(frame.block_size);
            for (i, block) in chunk.chunks(frame.block_size).enumerate() {
                write_block(frame.encoder.as_mut(), block, last && i + 1 == count, out)?;
            }
        }
        frame.consumed = consumed;
        Ok(())
    }

    fn close_frame(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.pledged = None;
        if let Some(expected) = frame.expected_size {
            if frame.consumed != expected {
                return Err(ZframeError::invalid_config(format!(
                    "frame content is {} bytes but {expected} were pledged",
                    frame.consumed
                )));
            }
        }
        if frame.checksum {
            out.extend_from_slice(&frame.hasher.checksum32().to_le_bytes());
        }
        debug!(content_size = frame.consumed, "frame closed");
        Ok(())
    }
}

fn write_block(
    encoder: &mut dyn BlockEncoder,
    block: &[u8],
    last: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    match encoder.encode_block(block)? {
        EncodedBlock::Raw => {
            write_block_header(out, last, BlockType::Raw, block.len());
            out.extend_from_slice(block);
        }
        EncodedBlock::Rle(byte) => {
            write_block_header(out, last, BlockType::Rle, block.len());
            out.push(byte);
        }
        EncodedBlock::Compressed(payload) => {
            write_block_header(out, last, BlockType::Compressed, payload.len());
            out.extend_from_slice(&payload);
        }
    }
    trace!(size = block.len(), written = out.len() - start, last, "emitted block");
    Ok(())
}

/// History a job starts from: the last `overlap` bytes before it.
#[cfg(feature = "parallel")]
fn job_history(recent: &[u8], before: &[u8], overlap: usize) -> Vec<u8> {
    if before.len() >= overlap {
        return before[before.len() - overlap..].to_vec();
    }
    let from_recent = (overlap - before.len()).min(recent.len());
    let mut history = recent[recent.len() - from_recent..].to_vec();
    history.extend_from_slice(before);
    history
}

/// Everything a worker needs from the open frame.
#[cfg(feature = "parallel")]
struct JobPlan<'a> {
    params: BlockParams,
    block_size: usize,
    job_size: usize,
    overlap: usize,
    first_of_frame: bool,
    dict: Option<&'a PreparedDict>,
    recent: &'a [u8],
}

#[cfg(feature = "parallel")]
fn encode_jobs(
    pool: &rayon::ThreadPool,
    codec: &dyn BlockCodec,
    plan: &JobPlan<'_>,
    chunk: &[u8],
    last: bool,
) -> Result<Vec<u8>> {
    use rayon::prelude::*;

    let jobs = chunk.len().div_ceil(plan.job_size);
    let encoded: Vec<Result<Vec<u8>>> = pool.install(|| {
        chunk
            .par_chunks(plan.job_size)
            .enumerate()
            .map(|(i, job)| {
                let mut encoder = codec.new_encoder(&plan.params);
                if plan.first_of_frame && i == 0 {
                    let dict = plan.dict.map(PreparedDict::view);
                    encoder.reset(dict.as_ref());
                } else {
                    encoder.reset(None);
                    let before = &chunk[..i * plan.job_size];
                    encoder.extend_history(&job_history(plan.recent, before, plan.overlap));
                }

                let blocks = job.len().div_ceil(plan.block_size);
                let mut out = Vec::with_capacity(job.len() / 2);
                for (j, block) in job.chunks(plan.block_size).enumerate() {
                    let is_last = last && i + 1 == jobs && j + 1 == blocks;
                    write_block(encoder.as_mut(), block, is_last, &mut out)?;
                }
                trace!(job = i, size = job.len(), written = out.len(), "encoded job");
                Ok(out)
            })
            .collect()
    });

    let mut out = Vec::new();
    for job in encoded {
        out.extend_from_slice(&job?);
    }
    Ok(out)
}

/// Compress `data` into one complete frame that records its content size.
///
/// Empty input still produces a frame.
pub fn compress_all(
    data: &[u8],
    options: &CompressionOptions,
    dict: Option<DictUsage>,
) -> Result<Vec<u8>> {
    let mut compressor = ZstdCompressor::with_options(options.clone());
    if let Some(dict) = dict {
        compressor.set_dict(dict)?;
    }
    compressor.compress(data, EndDirective::FlushFrame)
}
