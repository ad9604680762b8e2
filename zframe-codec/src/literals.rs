//! Literals section of compressed blocks.

use crate::huffman::{self, HuffmanTable};
use zframe_core::error::{Result, ZframeError};

/// Maximum regenerated size of a block.
pub const BLOCK_SIZE_MAX: usize = 128 * 1024;

/// Literals shorter than this are always stored raw.
const MIN_COMPRESSIBLE: usize = 32;

/// Literals section type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralsType {
    /// Stored as-is.
    Raw,
    /// One byte repeated.
    Rle,
    /// Huffman coded with a new table.
    Compressed,
    /// Huffman coded with the previous table.
    Treeless,
}

impl LiteralsType {
    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::Raw,
            1 => Self::Rle,
            2 => Self::Compressed,
            _ => Self::Treeless,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Rle => 1,
            Self::Compressed => 2,
            Self::Treeless => 3,
        }
    }
}

fn write_plain_header(out: &mut Vec<u8>, kind: LiteralsType, size: usize) {
    let kind = kind.bits();
    if size < 32 {
        out.push(kind | (size as u8) << 3);
    } else if size < 4096 {
        out.push(kind | 0b0100 | ((size & 0x0F) as u8) << 4);
        out.push((size >> 4) as u8);
    } else {
        out.push(kind | 0b1100 | ((size & 0x0F) as u8) << 4);
        out.push((size >> 4) as u8);
        out.push((size >> 12) as u8);
    }
}

fn write_compressed_header(
    out: &mut Vec<u8>,
    kind: LiteralsType,
    regenerated: usize,
    compressed: usize,
    four_streams: bool,
) {
    let kind = u64::from(kind.bits());
    let largest = regenerated.max(compressed);
    let (format, width, field) = if largest < 1024 {
        (if four_streams { 1 } else { 0 }, 3, 10)
    } else if largest < 16384 {
        (2, 4, 14)
    } else {
        (3, 5, 18)
    };
    let value = kind
        | (format << 2)
        | ((regenerated as u64) << 4)
        | ((compressed as u64) << (4 + field));
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Result of encoding a literals section.
#[derive(Debug)]
pub struct EncodedLiterals {
    /// Section bytes.
    pub bytes: Vec<u8>,
    /// New table the decoder will hold afterwards, if one was described.
    pub new_table: Option<HuffmanTable>,
}

/// Encode a literals section, choosing the cheapest representation.
pub fn encode_literals(literals: &[u8], previous: Option<&HuffmanTable>) -> EncodedLiterals {
    let raw = || {
        let mut bytes = Vec::with_capacity(literals.len() + 3);
        write_plain_header(&mut bytes, LiteralsType::Raw, literals.len());
        bytes.extend_from_slice(literals);
        EncodedLiterals {
            bytes,
            new_table: None,
        }
    };

    let Some(&first) = literals.first() else {
        return raw();
    };
    if literals.len() > 1 && literals.iter().all(|&b| b == first) {
        let mut bytes = Vec::with_capacity(4);
        write_plain_header(&mut bytes, LiteralsType::Rle, literals.len());
        bytes.push(first);
        return EncodedLiterals {
            bytes,
            new_table: None,
        };
    }
    if literals.len() < MIN_COMPRESSIBLE {
        return raw();
    }

    let counts = huffman::histogram(literals);
    let four_streams = literals.len() >= 256;

    let fresh = HuffmanTable::from_histogram(&counts)
        .ok()
        .filter(HuffmanTable::can_write);
    let fresh_cost = fresh.as_ref().and_then(|t| {
        t.encoded_bits(&counts)
            .map(|bits| bits.div_ceil(8) + t.description_size() as u64)
    });
    let reuse_cost = previous
        .filter(|t| t.covers(&counts))
        .and_then(|t| t.encoded_bits(&counts).map(|bits| bits.div_ceil(8)));

    let use_previous = match (reuse_cost, fresh_cost) {
        (Some(reuse), Some(fresh)) => reuse <= fresh,
        (Some(_), None) => true,
        _ => false,
    };

    let encoded = if use_previous {
        previous.and_then(|table| {
            let streams = table.compress(literals, four_streams).ok()?;
            Some((LiteralsType::Treeless, streams, None))
        })
    } else {
        fresh.and_then(|table| {
            let mut body = Vec::with_capacity(literals.len());
            table.write(&mut body).ok()?;
            body.extend(table.compress(literals, four_streams).ok()?);
            Some((LiteralsType::Compressed, body, Some(table)))
        })
    };

    match encoded {
        Some((kind, body, new_table)) if body.len() + 8 < literals.len() => {
            let mut bytes = Vec::with_capacity(body.len() + 5);
            write_compressed_header(&mut bytes, kind, literals.len(), body.len(), four_streams);
            bytes.extend_from_slice(&body);
            EncodedLiterals { bytes, new_table }
        }
        _ => raw(),
    }
}

/// Decode a literals section.
///
/// `huffman` holds the table of the previous compressed section and is
/// replaced when this section describes a new one. Returns the literals and
/// the number of bytes consumed.
pub fn decode_literals(
    block: &[u8],
    huffman: &mut Option<HuffmanTable>,
) -> Result<(Vec<u8>, usize)> {
    let first = *block
        .first()
        .ok_or_else(|| ZframeError::corrupted(0, "missing literals section"))?;
    let kind = LiteralsType::from_bits(first);
    let format = (first >> 2) & 3;

    match kind {
        LiteralsType::Raw | LiteralsType::Rle => {
            let (size, header) = match format {
                0 | 2 => (usize::from(first >> 3), 1),
                1 => {
                    let b1 = *block.get(1).ok_or_else(truncated)?;
                    (usize::from(first >> 4) | usize::from(b1) << 4, 2)
                }
                _ => {
                    let b = block.get(1..3).ok_or_else(truncated)?;
                    (
                        usize::from(first >> 4) | usize::from(b[0]) << 4 | usize::from(b[1]) << 12,
                        3,
                    )
                }
            };
            if size > BLOCK_SIZE_MAX {
                return Err(ZframeError::corrupted(0, "literals exceed block size"));
            }
            if kind == LiteralsType::Raw {
                let bytes = block.get(header..header + size).ok_or_else(truncated)?;
                Ok((bytes.to_vec(), header + size))
            } else {
                let byte = *block.get(header).ok_or_else(truncated)?;
                Ok((vec![byte; size], header + 1))
            }
        }
        LiteralsType::Compressed | LiteralsType::Treeless => {
            let (width, field) = match format {
                0 | 1 => (3, 10),
                2 => (4, 14),
                _ => (5, 18),
            };
            let header_bytes = block.get(..width).ok_or_else(truncated)?;
            let mut raw = [0u8; 8];
            raw[..width].copy_from_slice(header_bytes);
            let value = u64::from_le_bytes(raw);
            let mask = (1u64 << field) - 1;
            let regenerated = ((value >> 4) & mask) as usize;
            let compressed = ((value >> (4 + field)) & mask) as usize;
            let four_streams = format != 0;

            if regenerated > BLOCK_SIZE_MAX {
                return Err(ZframeError::corrupted(0, "literals exceed block size"));
            }
            let mut body = block
                .get(width..width + compressed)
                .ok_or_else(truncated)?;

            if kind == LiteralsType::Compressed {
                let (table, used) = HuffmanTable::read(body)?;
                body = &body[used..];
                *huffman = Some(table);
            }
            let table = huffman
                .as_ref()
                .ok_or_else(|| ZframeError::corrupted(0, "treeless literals without a previous table"))?;
            let literals = table.decompress(body, regenerated, four_streams)?;
            Ok((literals, width + compressed))
        }
    }
}

fn truncated() -> ZframeError {
    ZframeError::corrupted(0, "truncated literals section")
}
