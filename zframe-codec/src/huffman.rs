//! Huffman coding of literals.
//!
//! Tables are canonical and described by per-symbol *weights*: a symbol of
//! weight `w > 0` gets a code of `max_bits + 1 - w` bits. Descriptions carry
//! the weights of every symbol but the last, whose weight is implied by the
//! requirement that the code space is filled exactly.
//!
//! Literal streams are backward bit streams. Regenerated sizes of 256 bytes
//! and more are split into four streams preceded by a six byte jump table.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::fse::{self, DecodeTable, Distribution};
use zframe_core::bitstream::{BackwardBitReader, BitWriter};
use zframe_core::error::{Result, ZframeError};

/// Longest code length.
pub const MAX_CODE_BITS: u8 = 11;

/// Largest symbol a direct weight description can carry.
pub const MAX_DIRECT_SYMBOL: usize = 128;

const WEIGHT_FSE_MAX_LOG: u8 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Code {
    value: u16,
    bits: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DecodeEntry {
    symbol: u8,
    bits: u8,
}

/// Canonical Huffman table usable in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    max_bits: u8,
    weights: Vec<u8>,
    codes: Vec<Code>,
    decode: Vec<DecodeEntry>,
}

impl HuffmanTable {
    /// Build an optimal table for a byte histogram.
    ///
    /// At least two distinct symbols are required.
    pub fn from_histogram(histogram: &[u32]) -> Result<Self> {
        let present = histogram.iter().filter(|&&c| c > 0).count();
        if present < 2 {
            return Err(ZframeError::invalid_config(
                "Huffman table needs at least two symbols",
            ));
        }

        let mut counts: Vec<u64> = histogram.iter().map(|&c| u64::from(c)).collect();
        let lengths = loop {
            let lengths = code_lengths(&counts);
            if lengths.iter().all(|&l| l <= MAX_CODE_BITS) {
                break lengths;
            }
            // Flatten the distribution until the tree is shallow enough.
            for count in counts.iter_mut().filter(|c| **c > 0) {
                *count = (*count + 1) / 2;
            }
        };

        let max_bits = lengths.iter().copied().max().unwrap_or(0);
        let last = lengths.iter().rposition(|&l| l > 0).unwrap_or(0);
        let weights = lengths[..=last]
            .iter()
            .map(|&l| if l == 0 { 0 } else { max_bits + 1 - l })
            .collect();
        Self::from_weights(weights)
    }

    /// Build from the full weight list, last symbol included.
    pub fn from_weights(weights: Vec<u8>) -> Result<Self> {
        let mut total: u32 = 0;
        for &w in &weights {
            if w > MAX_CODE_BITS {
                return Err(ZframeError::corrupted(0, "Huffman weight too large"));
            }
            if w > 0 {
                total += 1 << (w - 1);
            }
        }
        if total == 0 || !total.is_power_of_two() {
            return Err(ZframeError::corrupted(0, "Huffman weights do not fill the code space"));
        }
        let max_bits = total.trailing_zeros() as u8;
        if max_bits == 0 || max_bits > MAX_CODE_BITS {
            return Err(ZframeError::corrupted(
                0,
                format!("Huffman table depth {max_bits} out of range"),
            ));
        }

        let bits_of = |w: u8| if w == 0 { 0 } else { max_bits + 1 - w };

        // Encoder side: canonical values, longest codes first.
        let mut per_length = [0u16; MAX_CODE_BITS as usize + 2];
        for &w in &weights {
            per_length[usize::from(bits_of(w))] += 1;
        }
        let mut next_value = [0u16; MAX_CODE_BITS as usize + 2];
        let mut min = 0u16;
        for length in (1..=usize::from(max_bits)).rev() {
            next_value[length] = min;
            min += per_length[length];
            min >>= 1;
        }
        let codes = weights
            .iter()
            .map(|&w| {
                let bits = bits_of(w);
                if bits == 0 {
                    return Code::default();
                }
                let value = next_value[usize::from(bits)];
                next_value[usize::from(bits)] += 1;
                Code { value, bits }
            })
            .collect();

        // Decoder side: ranges of the peek table grouped by weight.
        let mut per_weight = [0u32; MAX_CODE_BITS as usize + 2];
        for &w in &weights {
            per_weight[usize::from(w)] += 1;
        }
        let mut rank_start = [0u32; MAX_CODE_BITS as usize + 2];
        let mut next = 0u32;
        for w in 1..=usize::from(max_bits) {
            rank_start[w] = next;
            next += per_weight[w] << (w - 1);
        }
        let mut decode = vec![DecodeEntry::default(); 1 << max_bits];
        for (symbol, &w) in weights.iter().enumerate() {
            if w == 0 {
                continue;
            }
            let span = 1u32 << (w - 1);
            let start = rank_start[usize::from(w)] as usize;
            decode[start..start + span as usize].fill(DecodeEntry {
                symbol: symbol as u8,
                bits: bits_of(w),
            });
            rank_start[usize::from(w)] += span;
        }

        Ok(Self {
            max_bits,
            weights,
            codes,
            decode,
        })
    }

    /// Parse a tree description, returning the table and bytes consumed.
    pub fn read(data: &[u8]) -> Result<(Self, usize)> {
        let header = *data
            .first()
            .ok_or_else(|| ZframeError::corrupted(0, "missing Huffman tree description"))?;

        let (mut weights, consumed) = if header >= 128 {
            let count = usize::from(header - 127);
            let bytes = count.div_ceil(2);
            let packed = data
                .get(1..1 + bytes)
                .ok_or_else(|| ZframeError::corrupted(0, "truncated Huffman weights"))?;
            let weights = (0..count)
                .map(|i| {
                    let byte = packed[i / 2];
                    if i % 2 == 0 { byte >> 4 } else { byte & 0x0F }
                })
                .collect::<Vec<u8>>();
            (weights, 1 + bytes)
        } else {
            let size = usize::from(header);
            let body = data
                .get(1..1 + size)
                .ok_or_else(|| ZframeError::corrupted(0, "truncated Huffman weights"))?;
            (decode_fse_weights(body)?, 1 + size)
        };

        let mut total: u32 = 0;
        for &w in &weights {
            if w > MAX_CODE_BITS {
                return Err(ZframeError::corrupted(0, "Huffman weight too large"));
            }
            if w > 0 {
                total += 1 << (w - 1);
            }
        }
        if total == 0 {
            return Err(ZframeError::corrupted(0, "Huffman description has no symbols"));
        }
        let max_bits = fse::highbit(total) + 1;
        if max_bits > u32::from(MAX_CODE_BITS) {
            return Err(ZframeError::corrupted(0, "Huffman table too deep"));
        }
        let rest = (1u32 << max_bits) - total;
        if !rest.is_power_of_two() {
            return Err(ZframeError::corrupted(0, "Huffman weights leave an invalid gap"));
        }
        weights.push(fse::highbit(rest) as u8 + 1);
        if weights.len() > 256 {
            return Err(ZframeError::corrupted(0, "Huffman alphabet too large"));
        }

        Ok((Self::from_weights(weights)?, consumed))
    }

    /// Whether [`write`](Self::write) can describe this table.
    pub fn can_write(&self) -> bool {
        self.weights.len() <= MAX_DIRECT_SYMBOL + 1
    }

    /// Serialize with direct four-bit weights.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if !self.can_write() {
            return Err(ZframeError::unsupported(
                "Huffman description for symbols above 128",
            ));
        }
        let described = &self.weights[..self.weights.len() - 1];
        out.push(127 + described.len() as u8);
        for pair in described.chunks(2) {
            let high = pair[0] << 4;
            let low = pair.get(1).copied().unwrap_or(0);
            out.push(high | low);
        }
        Ok(())
    }

    /// Size in bytes of the serialized description.
    pub fn description_size(&self) -> usize {
        1 + (self.weights.len() - 1).div_ceil(2)
    }

    /// Whether every symbol in `histogram` has a code.
    pub fn covers(&self, histogram: &[u32]) -> bool {
        histogram.iter().enumerate().all(|(symbol, &count)| {
            count == 0 || self.codes.get(symbol).is_some_and(|c| c.bits > 0)
        })
    }

    /// Encoded size in bits of the symbols in `histogram`.
    pub fn encoded_bits(&self, histogram: &[u32]) -> Option<u64> {
        let mut bits = 0u64;
        for (symbol, &count) in histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let code = self.codes.get(symbol).filter(|c| c.bits > 0)?;
            bits += u64::from(count) * u64::from(code.bits);
        }
        Some(bits)
    }

    /// Weight of each symbol, last described symbol included.
    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    fn encode_stream(&self, symbols: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(symbols.len());
        for &symbol in symbols.iter().rev() {
            let code = self.codes[usize::from(symbol)];
            writer.write_bits(u64::from(code.value), code.bits);
        }
        writer.finish_with_end_mark()
    }

    /// Encode literals as one stream or four streams with a jump table.
    ///
    /// Every literal must be covered by the table.
    pub fn compress(&self, literals: &[u8], four_streams: bool) -> Result<Vec<u8>> {
        if !four_streams {
            return Ok(self.encode_stream(literals));
        }
        let segment = literals.len().div_ceil(4);
        let streams: Vec<Vec<u8>> = (0..4)
            .map(|i| {
                let start = (i * segment).min(literals.len());
                let end = ((i + 1) * segment).min(literals.len());
                self.encode_stream(&literals[start..end])
            })
            .collect();

        let mut out = Vec::with_capacity(6 + streams.iter().map(Vec::len).sum::<usize>());
        for stream in &streams[..3] {
            let size = u16::try_from(stream.len())
                .map_err(|_| ZframeError::invalid_config("Huffman stream exceeds jump table range"))?;
            out.extend_from_slice(&size.to_le_bytes());
        }
        for stream in &streams {
            out.extend_from_slice(stream);
        }
        Ok(out)
    }

    fn decode_stream(&self, stream: &[u8], out: &mut Vec<u8>, count: usize) -> Result<()> {
        let mut reader = BackwardBitReader::new(stream)?;
        for _ in 0..count {
            let index = reader.peek_bits(self.max_bits) as usize;
            let entry = self.decode[index];
            reader.skip_bits(entry.bits)?;
            out.push(entry.symbol);
        }
        if !reader.is_empty() {
            return Err(ZframeError::corrupted(0, "Huffman stream not fully consumed"));
        }
        Ok(())
    }

    /// Decode `regenerated` literals.
    pub fn decompress(&self, data: &[u8], regenerated: usize, four_streams: bool) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(regenerated);
        if !four_streams {
            self.decode_stream(data, &mut out, regenerated)?;
            return Ok(out);
        }

        if data.len() < 6 {
            return Err(ZframeError::corrupted(0, "truncated Huffman jump table"));
        }
        let sizes = [
            usize::from(u16::from_le_bytes([data[0], data[1]])),
            usize::from(u16::from_le_bytes([data[2], data[3]])),
            usize::from(u16::from_le_bytes([data[4], data[5]])),
        ];
        let body = &data[6..];
        let declared: usize = sizes.iter().sum();
        if declared > body.len() {
            return Err(ZframeError::corrupted(0, "Huffman jump table exceeds literals"));
        }
        let segment = regenerated.div_ceil(4);
        if segment * 3 > regenerated {
            return Err(ZframeError::corrupted(0, "too few literals for four streams"));
        }

        let mut start = 0;
        for (i, size) in sizes.iter().copied().chain([body.len() - declared]).enumerate() {
            let count = if i < 3 { segment } else { regenerated - 3 * segment };
            self.decode_stream(&body[start..start + size], &mut out, count)?;
            start += size;
        }
        Ok(out)
    }
}

/// Code lengths of an unrestricted Huffman tree.
fn code_lengths(counts: &[u64]) -> Vec<u8> {
    let leaves = counts.len();
    let mut heap = BinaryHeap::new();
    for (symbol, &count) in counts.iter().enumerate() {
        if count > 0 {
            heap.push(Reverse((count, symbol)));
        }
    }

    let mut parent = vec![usize::MAX; leaves];
    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let node = parent.len();
        parent.push(usize::MAX);
        parent[a] = node;
        parent[b] = node;
        heap.push(Reverse((wa + wb, node)));
    }

    (0..leaves)
        .map(|symbol| {
            if counts[symbol] == 0 {
                return 0;
            }
            let mut depth = 0u32;
            let mut node = symbol;
            while parent[node] != usize::MAX {
                node = parent[node];
                depth += 1;
            }
            depth.min(u32::from(u8::MAX)) as u8
        })
        .collect()
}

/// Weights compressed with two interleaved FSE states.
fn decode_fse_weights(body: &[u8]) -> Result<Vec<u8>> {
    let (dist, used) = Distribution::read(body, MAX_CODE_BITS, WEIGHT_FSE_MAX_LOG)?;
    let table = DecodeTable::new(&dist)?;
    let stream = &body[used..];
    let mut reader = BackwardBitReader::new(stream)?;

    let mut first = table.init_state(&mut reader)?;
    let mut second = table.init_state(&mut reader)?;
    let mut weights = Vec::new();
    loop {
        weights.push(table.symbol(first));
        first = table.update_state_padded(first, &mut reader);
        if reader.is_overflowed() {
            weights.push(table.symbol(second));
            break;
        }
        weights.push(table.symbol(second));
        second = table.update_state_padded(second, &mut reader);
        if reader.is_overflowed() {
            weights.push(table.symbol(first));
            break;
        }
        if weights.len() > 255 {
            return Err(ZframeError::corrupted(0, "too many Huffman weights"));
        }
    }
    Ok(weights)
}

/// Byte histogram.
pub fn histogram(data: &[u8]) -> [u32; 256] {
    let mut counts = [0u32; 256];
    for &byte in data {
        counts[usize::from(byte)] += 1;
    }
    counts
}
