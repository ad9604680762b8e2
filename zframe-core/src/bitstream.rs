//! Bit-level I/O over in-memory buffers.
//!
//! Zstandard uses two bit orders:
//!
//! - **Forward** streams (FSE table descriptions) are read LSB-first from
//!   the first byte, like DEFLATE.
//! - **Backward** streams (Huffman literals, FSE sequences) are written
//!   LSB-first, terminated by a single `1` end mark, and then read starting
//!   from the *last* bit written. The reader finds the end mark in the final
//!   byte and walks toward the start.
//!
//! # Example
//!
//! ```
//! use zframe_core::bitstream::{BackwardBitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);
//! writer.write_bits(0b1100, 4);
//! let stream = writer.finish_with_end_mark();
//!
//! // Backward streams return the most recently written field first.
//! let mut reader = BackwardBitReader::new(&stream).unwrap();
//! assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert!(reader.is_empty());
//! ```

use crate::error::{Result, ZframeError};

/// Largest field width accepted by a single read or write.
pub const MAX_FIELD_BITS: u8 = 56;

#[inline]
fn low_mask(count: u8) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// LSB-first bit writer collecting into a byte vector.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    output: Vec<u8>,
    /// Pending bits (LSB-first).
    buffer: u64,
    /// Number of valid bits in buffer.
    bits_in_buffer: u8,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with reserved output capacity.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            output: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Number of bits written so far.
    pub fn bits_written(&self) -> u64 {
        self.output.len() as u64 * 8 + u64::from(self.bits_in_buffer)
    }

    /// Write the low `count` bits of `value`.
    ///
    /// `count` must not exceed [`MAX_FIELD_BITS`].
    #[inline]
    pub fn write_bits(&mut self, value: u64, count: u8) {
        debug_assert!(count <= MAX_FIELD_BITS);
        if count == 0 {
            return;
        }
        self.buffer |= (value & low_mask(count)) << self.bits_in_buffer;
        self.bits_in_buffer += count;
        while self.bits_in_buffer >= 8 {
            self.output.push(self.buffer as u8);
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }
    }

    /// Pad to a byte boundary with zero bits and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bits_in_buffer > 0 {
            self.output.push(self.buffer as u8);
        }
        self.output
    }

    /// Append the end mark of a backward stream, pad, and return the bytes.
    pub fn finish_with_end_mark(mut self) -> Vec<u8> {
        self.write_bits(1, 1);
        self.finish()
    }
}

/// LSB-first reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ForwardBitReader<'a> {
    data: &'a [u8],
    /// Bits consumed from the start of `data`.
    position: usize,
}

impl<'a> ForwardBitReader<'a> {
    /// Create a reader positioned at the first bit.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current bit position.
    pub fn bit_position(&self) -> usize {
        self.position
    }

    /// Bytes touched so far, rounding partial bytes up.
    pub fn bytes_consumed(&self) -> usize {
        self.position.div_ceil(8)
    }

    /// Look at the next `count` bits; bits past the end read as zero.
    pub fn peek_bits(&self, count: u8) -> u64 {
        debug_assert!(count <= MAX_FIELD_BITS);
        let byte = self.position / 8;
        let shift = self.position % 8;
        let mut word = 0u64;
        for i in 0..8 {
            if let Some(&b) = self.data.get(byte + i) {
                word |= u64::from(b) << (8 * i);
            }
        }
        (word >> shift) & low_mask(count)
    }

    /// Advance past `count` bits.
    pub fn skip_bits(&mut self, count: u8) -> Result<()> {
        let end = self.position + usize::from(count);
        if end > self.data.len() * 8 {
            return Err(ZframeError::unexpected_eof(
                (end - self.data.len() * 8).div_ceil(8),
            ));
        }
        self.position = end;
        Ok(())
    }

    /// Read `count` bits.
    pub fn read_bits(&mut self, count: u8) -> Result<u64> {
        let value = self.peek_bits(count);
        self.skip_bits(count)?;
        Ok(value)
    }
}

/// Reader for backward bit streams.
///
/// Reading past the start of the stream is tracked rather than rejected by
/// [`BackwardBitReader::read_bits_padded`]; some decoders rely on detecting
/// that overflow to find the end of their symbol run.
#[derive(Debug, Clone)]
pub struct BackwardBitReader<'a> {
    data: &'a [u8],
    /// Stream bits below the end mark.
    total_bits: usize,
    /// Bits consumed from the top.
    consumed: usize,
}

impl<'a> BackwardBitReader<'a> {
    /// Locate the end mark and position the reader just below it.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let last = match data.last() {
            Some(&b) if b != 0 => b,
            Some(_) => {
                return Err(ZframeError::corrupted(
                    data.len() as u64 - 1,
                    "bit stream end mark missing",
                ));
            }
            None => return Err(ZframeError::corrupted(0, "empty bit stream")),
        };
        let padding = last.leading_zeros() as usize + 1;
        Ok(Self {
            data,
            total_bits: data.len() * 8 - padding,
            consumed: 0,
        })
    }

    /// Bits left before the start of the stream.
    pub fn remaining(&self) -> usize {
        self.total_bits.saturating_sub(self.consumed)
    }

    /// All bits consumed exactly.
    pub fn is_empty(&self) -> bool {
        self.consumed == self.total_bits
    }

    /// More bits were consumed than the stream holds.
    pub fn is_overflowed(&self) -> bool {
        self.consumed > self.total_bits
    }

    fn bits_at(&self, start: usize, count: u8) -> u64 {
        let byte = start / 8;
        let shift = start % 8;
        let mut word = 0u64;
        for i in 0..8 {
            if let Some(&b) = self.data.get(byte + i) {
                word |= u64::from(b) << (8 * i);
            }
        }
        (word >> shift) & low_mask(count)
    }

    /// Look at the next `count` bits, padding with zeros below the start.
    #[inline]
    pub fn peek_bits(&self, count: u8) -> u64 {
        debug_assert!(count <= MAX_FIELD_BITS);
        let remaining = self.remaining();
        let count_usize = usize::from(count);
        if count_usize <= remaining {
            self.bits_at(remaining - count_usize, count)
        } else {
            self.bits_at(0, remaining as u8) << (count_usize - remaining)
        }
    }

    /// Consume `count` bits, failing if the stream is exhausted.
    #[inline]
    pub fn skip_bits(&mut self, count: u8) -> Result<()> {
        if usize::from(count) > self.remaining() {
            return Err(ZframeError::corrupted(
                0,
                "bit stream overflow: read past the start of the stream",
            ));
        }
        self.consumed += usize::from(count);
        Ok(())
    }

    /// Read `count` bits, failing if the stream is exhausted.
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u64> {
        let value = self.peek_bits(count);
        self.skip_bits(count)?;
        Ok(value)
    }

    /// Read `count` bits, treating bits past the start as zero and recording
    /// the overflow instead of failing.
    pub fn read_bits_padded(&mut self, count: u8) -> u64 {
        let value = self.peek_bits(count);
        self.consumed += usize::from(count);
        value
    }
}
