//! Sequences section of compressed blocks.
//!
//! Sequences describe LZ77-style back-references using literal lengths,
//! match lengths, and offsets. Each of the three fields is split into an FSE
//! coded *code* and raw extra bits; the three FSE states share one backward
//! bit stream.

use std::sync::Arc;

use crate::fse::{self, DecodeTable, Distribution, EncodeTable, PredefinedTables};
use zframe_core::bitstream::{BackwardBitReader, BitWriter};
use zframe_core::error::{Result, ZframeError};

/// A literal run followed by a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Number of literal bytes to copy.
    pub literal_length: u32,
    /// Number of bytes to copy from back-reference.
    pub match_length: u32,
    /// Distance of the back-reference.
    pub offset: u32,
}

/// Compression mode for sequence symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Predefined FSE table.
    Predefined,
    /// RLE (single symbol).
    Rle,
    /// FSE table in compressed form.
    Fse,
    /// Repeat previous FSE table.
    Repeat,
}

impl CompressionMode {
    /// Create from 2-bit value.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Predefined,
            1 => Self::Rle,
            2 => Self::Fse,
            _ => Self::Repeat,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Predefined => 0,
            Self::Rle => 1,
            Self::Fse => 2,
            Self::Repeat => 3,
        }
    }
}

const LL_BASELINE: [u32; 36] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24, 28, 32, 40, 48, 64,
    128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];
const LL_EXTRA_BITS: [u8; 36] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 4, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15, 16,
];
const ML_BASELINE: [u32; 53] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
    28, 29, 30, 31, 32, 33, 34, 35, 37, 39, 41, 43, 47, 51, 59, 67, 83, 99, 131, 259, 515, 1027,
    2051, 4099, 8195, 16387, 32771, 65539,
];
const ML_EXTRA_BITS: [u8; 53] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 1, 1, 1, 1, 2, 2, 3, 3, 4, 4, 5, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
];

/// Largest offset code.
pub const MAX_OFFSET_CODE: u8 = 31;

/// The three coded fields of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Literal length codes.
    LiteralLength,
    /// Offset codes.
    Offset,
    /// Match length codes.
    MatchLength,
}

impl SymbolKind {
    /// Largest valid code.
    pub fn max_symbol(self) -> u8 {
        match self {
            Self::LiteralLength => 35,
            Self::Offset => MAX_OFFSET_CODE,
            Self::MatchLength => 52,
        }
    }

    /// Largest accuracy log of a custom table.
    pub fn max_log(self) -> u8 {
        match self {
            Self::LiteralLength | Self::MatchLength => 9,
            Self::Offset => 8,
        }
    }

    /// Predefined tables.
    pub fn predefined(self) -> &'static PredefinedTables {
        match self {
            Self::LiteralLength => fse::literal_length_default(),
            Self::Offset => fse::offset_default(),
            Self::MatchLength => fse::match_length_default(),
        }
    }
}

pub(crate) fn literal_length_code(length: u32) -> u8 {
    (LL_BASELINE.partition_point(|&base| base <= length) - 1) as u8
}

pub(crate) fn match_length_code(length: u32) -> u8 {
    (ML_BASELINE.partition_point(|&base| base <= length) - 1) as u8
}

/// Repeat offset history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatOffsets([u32; 3]);

impl Default for RepeatOffsets {
    fn default() -> Self {
        Self([1, 4, 8])
    }
}

impl RepeatOffsets {
    /// Create from explicit values.
    pub fn new(offsets: [u32; 3]) -> Self {
        Self(offsets)
    }

    /// Current values, most recent first.
    pub fn values(&self) -> [u32; 3] {
        self.0
    }

    /// Turn an offset value into a distance, updating the history.
    pub fn resolve(&mut self, offset_value: u32, literal_length: u32) -> Result<u32> {
        let [rep0, rep1, rep2] = self.0;
        if offset_value > 3 {
            let offset = offset_value - 3;
            self.0 = [offset, rep0, rep1];
            return Ok(offset);
        }

        let index = if literal_length == 0 {
            offset_value + 1
        } else {
            offset_value
        };
        let offset = match index {
            1 => rep0,
            2 => {
                self.0 = [rep1, rep0, rep2];
                rep1
            }
            3 => {
                self.0 = [rep2, rep0, rep1];
                rep2
            }
            _ => {
                let offset = rep0.wrapping_sub(1);
                if offset == 0 {
                    return Err(ZframeError::corrupted(0, "repeat offset underflow"));
                }
                self.0 = [offset, rep0, rep1];
                offset
            }
        };
        Ok(offset)
    }
}

/// Custom FSE table as held by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTable {
    /// Distribution the table was built from.
    pub distribution: Distribution,
    /// Encoding table.
    pub encode: EncodeTable,
}

impl CustomTable {
    /// Build the encoding side of a distribution.
    pub fn new(distribution: Distribution) -> Result<Self> {
        let encode = EncodeTable::new(&distribution)?;
        Ok(Self {
            distribution,
            encode,
        })
    }
}

/// Tables the decoder would reuse in repeat mode, as tracked by the encoder.
///
/// Only custom tables are tracked; after a predefined or RLE section the
/// stream has nothing worth repeating.
#[derive(Debug, Clone, Default)]
pub struct EncoderTables {
    /// Literal length table.
    pub literal_lengths: Option<Arc<CustomTable>>,
    /// Offset table.
    pub offsets: Option<Arc<CustomTable>>,
    /// Match length table.
    pub match_lengths: Option<Arc<CustomTable>>,
}

impl EncoderTables {
    fn slot(&self, kind: SymbolKind) -> Option<&Arc<CustomTable>> {
        match kind {
            SymbolKind::LiteralLength => self.literal_lengths.as_ref(),
            SymbolKind::Offset => self.offsets.as_ref(),
            SymbolKind::MatchLength => self.match_lengths.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: SymbolKind) -> &mut Option<Arc<CustomTable>> {
        match kind {
            SymbolKind::LiteralLength => &mut self.literal_lengths,
            SymbolKind::Offset => &mut self.offsets,
            SymbolKind::MatchLength => &mut self.match_lengths,
        }
    }
}

/// Tables held by the decoder between blocks of a frame.
#[derive(Debug, Clone, Default)]
pub struct DecoderTables {
    /// Literal length table.
    pub literal_lengths: Option<DecodeTable>,
    /// Offset table.
    pub offsets: Option<DecodeTable>,
    /// Match length table.
    pub match_lengths: Option<DecodeTable>,
}

impl DecoderTables {
    fn slot_mut(&mut self, kind: SymbolKind) -> &mut Option<DecodeTable> {
        match kind {
            SymbolKind::LiteralLength => &mut self.literal_lengths,
            SymbolKind::Offset => &mut self.offsets,
            SymbolKind::MatchLength => &mut self.match_lengths,
        }
    }
}

enum Choice {
    Predefined,
    Rle(u8),
    Custom(Arc<CustomTable>),
    Repeat(Arc<CustomTable>),
}

impl Choice {
    fn mode(&self) -> CompressionMode {
        match self {
            Self::Predefined => CompressionMode::Predefined,
            Self::Rle(_) => CompressionMode::Rle,
            Self::Custom(_) => CompressionMode::Fse,
            Self::Repeat(_) => CompressionMode::Repeat,
        }
    }

    fn table(&self, kind: SymbolKind) -> Option<&EncodeTable> {
        match self {
            Self::Predefined => Some(&kind.predefined().encode),
            Self::Rle(_) => None,
            Self::Custom(t) | Self::Repeat(t) => Some(&t.encode),
        }
    }
}

fn choose_mode(
    kind: SymbolKind,
    codes: &[u8],
    previous: Option<&Arc<CustomTable>>,
) -> Result<Choice> {
    let mut histogram = vec![0u32; usize::from(kind.max_symbol()) + 1];
    for &code in codes {
        histogram[usize::from(code)] += 1;
    }
    let distinct = histogram.iter().filter(|&&c| c > 0).count();
    if distinct == 1 {
        return Ok(Choice::Rle(codes[0]));
    }

    let mut best = None;
    let mut best_cost = f64::INFINITY;

    if let Some(table) = previous {
        if let Some(cost) = table.distribution.estimate_cost(&histogram) {
            best_cost = cost;
            best = Some(Choice::Repeat(Arc::clone(table)));
        }
    }
    if let Some(cost) = kind.predefined().distribution.estimate_cost(&histogram) {
        if cost < best_cost {
            best_cost = cost;
            best = Some(Choice::Predefined);
        }
    }

    let log = fse::choose_table_log(codes.len(), distinct, kind.max_log());
    let distribution = Distribution::from_histogram(&histogram, log)?;
    let header_bits = distribution.to_bytes().len() as f64 * 8.0;
    if let Some(cost) = distribution.estimate_cost(&histogram) {
        if cost + header_bits < best_cost || best.is_none() {
            best = Some(Choice::Custom(Arc::new(CustomTable::new(distribution)?)));
        }
    }

    best.ok_or_else(|| ZframeError::invalid_config("no usable sequence table"))
}

fn write_sequence_count(out: &mut Vec<u8>, count: usize) {
    if count < 128 {
        out.push(count as u8);
    } else if count < 0x7F00 {
        out.push(((count >> 8) + 128) as u8);
        out.push(count as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&((count - 0x7F00) as u16).to_le_bytes());
    }
}

/// Encode a sequences section.
///
/// Returns the tables the decoder will hold after this section.
pub fn encode_sequences(
    sequences: &[Sequence],
    previous: &EncoderTables,
    out: &mut Vec<u8>,
) -> Result<EncoderTables> {
    write_sequence_count(out, sequences.len());
    if sequences.is_empty() {
        return Ok(previous.clone());
    }

    let mut ll_codes = Vec::with_capacity(sequences.len());
    let mut ml_codes = Vec::with_capacity(sequences.len());
    let mut of_codes = Vec::with_capacity(sequences.len());
    for seq in sequences {
        if seq.offset == 0 || seq.match_length < 3 {
            return Err(ZframeError::invalid_config("invalid sequence"));
        }
        ll_codes.push(literal_length_code(seq.literal_length));
        ml_codes.push(match_length_code(seq.match_length));
        of_codes.push(fse::highbit(seq.offset + 3) as u8);
    }

    let kinds = [
        SymbolKind::LiteralLength,
        SymbolKind::Offset,
        SymbolKind::MatchLength,
    ];
    let code_lists = [&ll_codes, &of_codes, &ml_codes];
    let mut choices = Vec::with_capacity(3);
    for (kind, codes) in kinds.iter().zip(code_lists) {
        choices.push(choose_mode(*kind, codes, previous.slot(*kind))?);
    }

    out.push(choices[0].mode().bits() << 6 | choices[1].mode().bits() << 4 | choices[2].mode().bits() << 2);
    for choice in &choices {
        match choice {
            Choice::Rle(symbol) => out.push(*symbol),
            Choice::Custom(table) => out.extend(table.distribution.to_bytes()),
            Choice::Predefined | Choice::Repeat(_) => {}
        }
    }

    let ll_table = choices[0].table(SymbolKind::LiteralLength);
    let of_table = choices[1].table(SymbolKind::Offset);
    let ml_table = choices[2].table(SymbolKind::MatchLength);

    let mut writer = BitWriter::with_capacity(sequences.len() * 4);
    let last = sequences.len() - 1;
    let mut ml_state = ml_table.map(|t| t.init_state(ml_codes[last]));
    let mut of_state = of_table.map(|t| t.init_state(of_codes[last]));
    let mut ll_state = ll_table.map(|t| t.init_state(ll_codes[last]));
    write_extra_bits(&mut writer, &sequences[last], ll_codes[last], ml_codes[last], of_codes[last]);

    for n in (0..last).rev() {
        if let (Some(table), Some(state)) = (of_table, of_state.as_mut()) {
            table.encode(state, of_codes[n], &mut writer);
        }
        if let (Some(table), Some(state)) = (ml_table, ml_state.as_mut()) {
            table.encode(state, ml_codes[n], &mut writer);
        }
        if let (Some(table), Some(state)) = (ll_table, ll_state.as_mut()) {
            table.encode(state, ll_codes[n], &mut writer);
        }
        write_extra_bits(&mut writer, &sequences[n], ll_codes[n], ml_codes[n], of_codes[n]);
    }

    if let (Some(table), Some(state)) = (ml_table, ml_state) {
        table.flush(state, &mut writer);
    }
    if let (Some(table), Some(state)) = (of_table, of_state) {
        table.flush(state, &mut writer);
    }
    if let (Some(table), Some(state)) = (ll_table, ll_state) {
        table.flush(state, &mut writer);
    }
    out.extend(writer.finish_with_end_mark());

    let mut next = EncoderTables::default();
    for (kind, choice) in kinds.iter().zip(choices) {
        *next.slot_mut(*kind) = match choice {
            Choice::Custom(table) | Choice::Repeat(table) => Some(table),
            Choice::Predefined | Choice::Rle(_) => None,
        };
    }
    Ok(next)
}

fn write_extra_bits(writer: &mut BitWriter, seq: &Sequence, ll_code: u8, ml_code: u8, of_code: u8) {
    let ll = usize::from(ll_code);
    writer.write_bits(
        u64::from(seq.literal_length - LL_BASELINE[ll]),
        LL_EXTRA_BITS[ll],
    );
    let ml = usize::from(ml_code);
    writer.write_bits(
        u64::from(seq.match_length - ML_BASELINE[ml]),
        ML_EXTRA_BITS[ml],
    );
    let offset_value = u64::from(seq.offset) + 3;
    writer.write_bits(offset_value - (1 << of_code), of_code);
}

fn read_table(
    kind: SymbolKind,
    mode: CompressionMode,
    data: &[u8],
    tables: &mut DecoderTables,
) -> Result<usize> {
    let slot = tables.slot_mut(kind);
    match mode {
        CompressionMode::Predefined => {
            *slot = Some(kind.predefined().decode.clone());
            Ok(0)
        }
        CompressionMode::Rle => {
            let symbol = *data.first().ok_or_else(truncated)?;
            if symbol > kind.max_symbol() {
                return Err(ZframeError::corrupted(0, "RLE sequence code out of range"));
            }
            *slot = Some(DecodeTable::rle(symbol));
            Ok(1)
        }
        CompressionMode::Fse => {
            let (distribution, used) = Distribution::read(data, kind.max_symbol(), kind.max_log())?;
            *slot = Some(DecodeTable::new(&distribution)?);
            Ok(used)
        }
        CompressionMode::Repeat => {
            if slot.is_none() {
                return Err(ZframeError::corrupted(0, "repeat mode without a previous table"));
            }
            Ok(0)
        }
    }
}

fn truncated() -> ZframeError {
    ZframeError::corrupted(0, "truncated sequences section")
}

/// Decode a sequences section occupying all of `data`.
///
/// Offsets in the returned sequences are resolved distances.
pub fn decode_sequences(
    data: &[u8],
    tables: &mut DecoderTables,
    repeats: &mut RepeatOffsets,
) -> Result<Vec<Sequence>> {
    let byte0 = *data.first().ok_or_else(truncated)?;
    let (count, mut pos) = if byte0 < 128 {
        (usize::from(byte0), 1)
    } else if byte0 < 255 {
        let b1 = *data.get(1).ok_or_else(truncated)?;
        ((usize::from(byte0) - 128) << 8 | usize::from(b1), 2)
    } else {
        let b = data.get(1..3).ok_or_else(truncated)?;
        (usize::from(u16::from_le_bytes([b[0], b[1]])) + 0x7F00, 3)
    };

    if count == 0 {
        if pos != data.len() {
            return Err(ZframeError::corrupted(pos as u64, "data after empty sequences section"));
        }
        return Ok(Vec::new());
    }

    let modes = *data.get(pos).ok_or_else(truncated)?;
    pos += 1;
    if modes & 3 != 0 {
        return Err(ZframeError::corrupted(pos as u64, "reserved sequence mode bits set"));
    }
    for (kind, shift) in [
        (SymbolKind::LiteralLength, 6),
        (SymbolKind::Offset, 4),
        (SymbolKind::MatchLength, 2),
    ] {
        let mode = CompressionMode::from_bits(modes >> shift);
        pos += read_table(kind, mode, &data[pos..], tables)?;
    }

    let (Some(ll_table), Some(of_table), Some(ml_table)) =
        (&tables.literal_lengths, &tables.offsets, &tables.match_lengths)
    else {
        return Err(ZframeError::corrupted(pos as u64, "missing sequence tables"));
    };

    let mut reader = BackwardBitReader::new(&data[pos..])?;
    let mut ll_state = ll_table.init_state(&mut reader)?;
    let mut of_state = of_table.init_state(&mut reader)?;
    let mut ml_state = ml_table.init_state(&mut reader)?;

    let mut sequences = Vec::with_capacity(count);
    for i in 0..count {
        let ll_code = ll_table.symbol(ll_state);
        let of_code = of_table.symbol(of_state);
        let ml_code = ml_table.symbol(ml_state);
        if ll_code > 35 || ml_code > 52 || of_code > MAX_OFFSET_CODE {
            return Err(ZframeError::corrupted(pos as u64, "sequence code out of range"));
        }

        let offset_value = (1u32 << of_code) + reader.read_bits(of_code)? as u32;
        let ml = usize::from(ml_code);
        let match_length = ML_BASELINE[ml] + reader.read_bits(ML_EXTRA_BITS[ml])? as u32;
        let ll = usize::from(ll_code);
        let literal_length = LL_BASELINE[ll] + reader.read_bits(LL_EXTRA_BITS[ll])? as u32;

        let offset = repeats.resolve(offset_value, literal_length)?;
        sequences.push(Sequence {
            literal_length,
            match_length,
            offset,
        });

        if i + 1 < count {
            ll_state = ll_table.update_state(ll_state, &mut reader)?;
            ml_state = ml_table.update_state(ml_state, &mut reader)?;
            of_state = of_table.update_state(of_state, &mut reader)?;
        }
    }

    if !reader.is_empty() {
        return Err(ZframeError::corrupted(pos as u64, "sequence bit stream not fully consumed"));
    }
    Ok(sequences)
}
