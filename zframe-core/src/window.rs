//! Sliding window for Zstandard frame decoding.
//!
//! Decoded bytes accumulate in a linear buffer so that freshly produced
//! output can be handed out as a contiguous slice. Once output has been
//! drained and the buffer holds more than twice the frame's window, the
//! oldest bytes are discarded, keeping at least `window_size` bytes of
//! history for back-references.
//!
//! A dictionary (or prefix) is kept separately and acts as history that
//! precedes the first output byte of every frame. It stays addressable until
//! the first trim, which only happens once more than a full window of output
//! has been produced.

use crate::error::{Result, ZframeError};

/// Decoding history for one frame.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    /// History preceding the frame content.
    dict: Vec<u8>,
    /// Frame output, possibly with its oldest part discarded.
    buffer: Vec<u8>,
    /// `buffer[..drained]` has already been handed out.
    drained: usize,
    /// Back-reference distance the frame may use.
    window_size: usize,
    /// The buffer no longer starts at the beginning of the frame.
    trimmed: bool,
    /// Bytes produced since the frame started.
    total_out: u64,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    /// Start a new frame with the given window and preceding history.
    pub fn reset(&mut self, window_size: usize, dict: &[u8]) {
        self.dict.clear();
        self.dict.extend_from_slice(dict);
        self.buffer.clear();
        self.drained = 0;
        self.window_size = window_size;
        self.trimmed = false;
        self.total_out = 0;
    }

    /// Configured window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Total bytes produced in the current frame.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Bytes a back-reference can currently reach.
    pub fn history_len(&self) -> usize {
        if self.trimmed {
            self.buffer.len()
        } else {
            self.buffer.len() + self.dict.len()
        }
    }

    /// Output produced but not yet drained.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.drained..]
    }

    /// Append literal bytes.
    pub fn push_literals(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.total_out += bytes.len() as u64;
    }

    /// Append `count` copies of `byte`.
    pub fn push_repeated(&mut self, byte: u8, count: usize) {
        self.buffer.resize(self.buffer.len() + count, byte);
        self.total_out += count as u64;
    }

    /// Copy `length` bytes starting `offset` bytes back.
    ///
    /// Overlapping copies (offset < length) repeat the referenced pattern.
    pub fn copy_match(&mut self, offset: usize, length: usize) -> Result<()> {
        if offset == 0 || offset > self.history_len() {
            return Err(ZframeError::invalid_distance(offset, self.history_len()));
        }

        let in_buffer = self.buffer.len();
        let mut remaining = length;
        if offset > in_buffer {
            // Source starts inside the dictionary.
            let back = offset - in_buffer;
            let start = self.dict.len() - back;
            let from_dict = remaining.min(back);
            self.buffer
                .extend_from_slice(&self.dict[start..start + from_dict]);
            remaining -= from_dict;
        }

        while remaining > 0 {
            let start = self.buffer.len() - offset;
            let chunk = remaining.min(offset);
            self.buffer.extend_from_within(start..start + chunk);
            remaining -= chunk;
        }

        self.total_out += length as u64;
        Ok(())
    }

    /// Move undrained output into `out` and discard history that can no
    /// longer be referenced. Returns the number of bytes appended.
    pub fn drain_into(&mut self, out: &mut Vec<u8>) -> usize {
        let fresh = self.buffer.len() - self.drained;
        out.extend_from_slice(&self.buffer[self.drained..]);
        self.drained = self.buffer.len();

        let keep = self.window_size.max(1);
        if self.buffer.len() > keep.saturating_mul(2) {
            let discard = self.buffer.len() - keep;
            self.buffer.drain(..discard);
            self.drained -= discard;
            self.trimmed = true;
        }
        fresh
    }
}
