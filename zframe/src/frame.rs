//! Zstandard frame and block headers.
//!
//! A stream is a sequence of frames. Each frame is either a Zstandard frame
//! (magic, descriptor, optional window descriptor, dictionary id and content
//! size, then blocks and an optional checksum) or a skippable frame (magic
//! in a 16-value range, a 4-byte length, then opaque payload).
//!
//! Nothing here decodes block payloads; [`get_frame_size`] walks block
//! headers only.

use zframe_codec::BLOCK_SIZE_MAX;
use zframe_core::error::{Result, ZframeError};

/// Zstandard frame magic number.
pub const ZSTD_MAGIC: u32 = 0xFD2F_B528;

/// First skippable frame magic number; the low four bits are free.
pub const SKIPPABLE_MAGIC_BASE: u32 = 0x184D_2A50;

const SKIPPABLE_MAGIC_MASK: u32 = 0xFFFF_FFF0;

/// Smallest window a frame may declare.
pub const MIN_WINDOW_LOG: u8 = 10;

/// Largest window log this implementation decodes.
pub const MAX_WINDOW_LOG: u8 = 31;

/// Size of a block header.
pub const BLOCK_HEADER_SIZE: usize = 3;

/// Size of the content checksum.
pub const CHECKSUM_SIZE: usize = 4;

/// Size of a skippable frame header.
pub const SKIPPABLE_HEADER_SIZE: usize = 8;

/// Frame header descriptor flags.
const FHD_SINGLE_SEGMENT: u8 = 0x20;
const FHD_RESERVED: u8 = 0x08;
const FHD_CONTENT_CHECKSUM: u8 = 0x04;
const FHD_DICT_ID_FLAG_MASK: u8 = 0x03;
const FHD_CONTENT_SIZE_SHIFT: u8 = 6;

/// What the compressor wants a frame header to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    /// Log2 of the window size.
    pub window_log: u8,
    /// Content size to record, if any.
    pub content_size: Option<u64>,
    /// Dictionary id to record; 0 records none.
    pub dictionary_id: u32,
    /// Whether the frame ends with a content checksum.
    pub checksum: bool,
}

/// Parsed Zstandard frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Back-reference distance the decoder must retain.
    pub window_size: u64,
    /// Uncompressed content size, if recorded.
    pub content_size: Option<u64>,
    /// Dictionary id, 0 if none.
    pub dictionary_id: u32,
    /// Whether a content checksum follows the last block.
    pub checksum: bool,
    /// Whether the window descriptor was replaced by the content size.
    pub single_segment: bool,
}

/// Header at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// A Zstandard frame.
    Frame(FrameHeader),
    /// A skippable frame whose `length` payload bytes follow the header.
    Skippable {
        /// Low four bits of the magic number.
        magic_variant: u8,
        /// Payload length.
        length: u32,
    },
}

/// Block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Stored bytes.
    Raw,
    /// One byte repeated `size` times.
    Rle,
    /// Literals and sequences.
    Compressed,
}

/// Parsed 3-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Whether this is the last block of the frame.
    pub last: bool,
    /// Block type.
    pub kind: BlockType,
    /// Block size field: payload length, or regenerated length for RLE.
    pub size: u32,
}

impl BlockHeader {
    /// Bytes of payload that follow the header.
    pub fn payload_len(&self) -> usize {
        match self.kind {
            BlockType::Rle => 1,
            BlockType::Raw | BlockType::Compressed => self.size as usize,
        }
    }
}

/// Frame information available from the header alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Content size, when the header records it.
    pub decompressed_size: Option<u64>,
    /// Dictionary id, 0 if none.
    pub dictionary_id: u32,
}

fn read_le(data: &[u8]) -> u64 {
    data.iter()
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

fn need(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(ZframeError::unexpected_eof(len - data.len()));
    }
    Ok(())
}

/// Whether `magic` is one of the skippable frame magic numbers.
pub fn is_skippable_magic(magic: u32) -> bool {
    magic & SKIPPABLE_MAGIC_MASK == SKIPPABLE_MAGIC_BASE
}

/// Whether `data` starts with a frame magic number, or with a prefix of one
/// when fewer than four bytes are present.
pub fn starts_with_frame(data: &[u8]) -> bool {
    let n = data.len().min(4);
    let zstd = ZSTD_MAGIC.to_le_bytes();
    if data[..n] == zstd[..n] {
        return true;
    }
    let skippable = SKIPPABLE_MAGIC_BASE.to_le_bytes();
    match data.first() {
        None => true,
        Some(&first) => first & 0xF0 == skippable[0] && data[1..n] == skippable[1..n],
    }
}

/// Serialize a frame header.
///
/// The frame is single-segment when the content size is known and fits in
/// the window; the window descriptor is then omitted.
pub fn write_header(params: &FrameParams) -> Vec<u8> {
    let window_log = params.window_log.clamp(MIN_WINDOW_LOG, MAX_WINDOW_LOG);
    let window_size = 1u64 << window_log;
    let single_segment = params.content_size.is_some_and(|size| size <= window_size);

    let (fcs_code, fcs_len) = match params.content_size {
        None => (0u8, 0usize),
        Some(size) if size < 256 && single_segment => (0, 1),
        Some(size) if (256..65_536 + 256).contains(&size) => (1, 2),
        Some(size) if size <= u64::from(u32::MAX) => (2, 4),
        Some(_) => (3, 8),
    };
    let (did_code, did_len) = match params.dictionary_id {
        0 => (0u8, 0usize),
        1..=0xFF => (1, 1),
        0x100..=0xFFFF => (2, 2),
        _ => (3, 4),
    };

    let mut descriptor = (fcs_code << FHD_CONTENT_SIZE_SHIFT) | did_code;
    if single_segment {
        descriptor |= FHD_SINGLE_SEGMENT;
    }
    if params.checksum {
        descriptor |= FHD_CONTENT_CHECKSUM;
    }

    let mut out = Vec::with_capacity(4 + 1 + 1 + did_len + fcs_len);
    out.extend_from_slice(&ZSTD_MAGIC.to_le_bytes());
    out.push(descriptor);
    if !single_segment {
        out.push((window_log - MIN_WINDOW_LOG) << 3);
    }
    out.extend_from_slice(&params.dictionary_id.to_le_bytes()[..did_len]);
    if let Some(size) = params.content_size {
        let stored = if fcs_code == 1 { size - 256 } else { size };
        out.extend_from_slice(&stored.to_le_bytes()[..fcs_len]);
    }
    out
}

/// Parse the header at the start of `data`.
///
/// Returns the header and the number of bytes it occupies.
pub fn parse_header(data: &[u8]) -> Result<(Header, usize)> {
    need(data, 4)?;
    let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

    if is_skippable_magic(magic) {
        need(data, SKIPPABLE_HEADER_SIZE)?;
        let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let header = Header::Skippable {
            magic_variant: (magic & 0x0F) as u8,
            length,
        };
        return Ok((header, SKIPPABLE_HEADER_SIZE));
    }
    if magic != ZSTD_MAGIC {
        return Err(ZframeError::invalid_magic(
            ZSTD_MAGIC.to_le_bytes(),
            &data[..4],
        ));
    }

    need(data, 5)?;
    let descriptor = data[4];
    if descriptor & FHD_RESERVED != 0 {
        return Err(ZframeError::invalid_header(
            "reserved bit set in frame header descriptor",
        ));
    }
    let single_segment = descriptor & FHD_SINGLE_SEGMENT != 0;
    let checksum = descriptor & FHD_CONTENT_CHECKSUM != 0;
    let did_len = match descriptor & FHD_DICT_ID_FLAG_MASK {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    };
    let fcs_len = match descriptor >> FHD_CONTENT_SIZE_SHIFT {
        0 if single_segment => 1,
        0 => 0,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let window_len = usize::from(!single_segment);
    let header_len = 5 + window_len + did_len + fcs_len;
    need(data, header_len)?;

    let mut pos = 5;
    let declared_window = if single_segment {
        None
    } else {
        let wd = data[pos];
        pos += 1;
        let window_log = MIN_WINDOW_LOG + (wd >> 3);
        if window_log > MAX_WINDOW_LOG {
            return Err(ZframeError::invalid_header(format!(
                "window log {window_log} is out of range"
            )));
        }
        let base = 1u64 << window_log;
        Some(base + (base >> 3) * u64::from(wd & 0x07))
    };

    let dictionary_id = read_le(&data[pos..pos + did_len]) as u32;
    pos += did_len;

    let content_size = match fcs_len {
        0 => None,
        2 => Some(read_le(&data[pos..pos + 2]) + 256),
        _ => Some(read_le(&data[pos..pos + fcs_len])),
    };
    pos += fcs_len;

    let window_size = match (declared_window, content_size) {
        (Some(window), _) => window,
        (None, Some(size)) => size,
        (None, None) => 0,
    };
    if single_segment && window_size > 1u64 << MAX_WINDOW_LOG {
        return Err(ZframeError::invalid_header(format!(
            "single segment window of {window_size} bytes is out of range"
        )));
    }

    let header = FrameHeader {
        window_size,
        content_size,
        dictionary_id,
        checksum,
        single_segment,
    };
    Ok((Header::Frame(header), pos))
}

/// Parse a 3-byte block header.
pub fn parse_block_header(data: &[u8]) -> Result<BlockHeader> {
    need(data, BLOCK_HEADER_SIZE)?;
    let raw = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    let kind = match (raw >> 1) & 0x03 {
        0 => BlockType::Raw,
        1 => BlockType::Rle,
        2 => BlockType::Compressed,
        _ => return Err(ZframeError::corrupted(0, "reserved block type")),
    };
    let size = raw >> 3;
    if size as usize > BLOCK_SIZE_MAX {
        return Err(ZframeError::corrupted(
            0,
            format!("block size {size} exceeds maximum"),
        ));
    }
    Ok(BlockHeader {
        last: raw & 1 != 0,
        kind,
        size,
    })
}

/// Append a block header.
pub fn write_block_header(out: &mut Vec<u8>, last: bool, kind: BlockType, size: usize) {
    let kind_bits = match kind {
        BlockType::Raw => 0u32,
        BlockType::Rle => 1,
        BlockType::Compressed => 2,
    };
    let raw = u32::from(last) | (kind_bits << 1) | ((size as u32) << 3);
    out.extend_from_slice(&raw.to_le_bytes()[..BLOCK_HEADER_SIZE]);
}

/// Content size and dictionary id of the frame at the start of `data`.
pub fn get_frame_info(data: &[u8]) -> Result<FrameInfo> {
    let info = match parse_header(data)?.0 {
        Header::Frame(header) => FrameInfo {
            decompressed_size: header.content_size,
            dictionary_id: header.dictionary_id,
        },
        Header::Skippable { .. } => FrameInfo {
            decompressed_size: Some(0),
            dictionary_id: 0,
        },
    };
    Ok(info)
}

/// Compressed size of the complete frame at the start of `data`.
pub fn get_frame_size(data: &[u8]) -> Result<u64> {
    let (header, mut pos) = parse_header(data)?;
    let header = match header {
        Header::Skippable { length, .. } => {
            let total = SKIPPABLE_HEADER_SIZE as u64 + u64::from(length);
            if (data.len() as u64) < total {
                return Err(ZframeError::unexpected_eof(
                    (total - data.len() as u64) as usize,
                ));
            }
            return Ok(total);
        }
        Header::Frame(header) => header,
    };

    loop {
        let block = parse_block_header(&data[pos..]).map_err(|err| match err {
            ZframeError::CorruptedData { message, .. } => {
                ZframeError::corrupted(pos as u64, message)
            }
            other => other,
        })?;
        pos += BLOCK_HEADER_SIZE;
        need(&data[pos..], block.payload_len())?;
        pos += block.payload_len();
        if block.last {
            break;
        }
    }
    if header.checksum {
        need(&data[pos..], CHECKSUM_SIZE)?;
        pos += CHECKSUM_SIZE;
    }
    Ok(pos as u64)
}

/// Build a skippable frame carrying `payload`.
///
/// `magic_variant` selects one of the sixteen skippable magic numbers.
pub fn write_skippable_frame(magic_variant: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if magic_variant > 0x0F {
        return Err(ZframeError::invalid_config(format!(
            "skippable magic variant must be in 0..=15, got {magic_variant}"
        )));
    }
    let length = u32::try_from(payload.len()).map_err(|_| {
        ZframeError::invalid_config("skippable frame payload exceeds 4 GiB")
    })?;
    let mut out = Vec::with_capacity(SKIPPABLE_HEADER_SIZE + payload.len());
    out.extend_from_slice(&(SKIPPABLE_MAGIC_BASE | u32::from(magic_variant)).to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}
