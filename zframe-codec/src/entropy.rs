//! Entropy tables carried by structured dictionaries.
//!
//! A structured dictionary starts with a magic number and an id, followed by
//! a Huffman description for literals, three FSE descriptions (offsets,
//! match lengths, literal lengths) and three repeat offsets. The remaining
//! bytes are content.

use std::sync::Arc;

use crate::fse::{DecodeTable, Distribution};
use crate::huffman::HuffmanTable;
use crate::sequences::{CustomTable, DecoderTables, EncoderTables, RepeatOffsets, SymbolKind};
use zframe_core::error::{Result, ZframeError};

/// Magic number of structured dictionaries.
pub const DICT_MAGIC: u32 = 0xEC30_A437;

/// Largest literal value given a code in generated tables.
const HUFFMAN_ALPHABET: usize = 128;

const OFFSET_LOG: u8 = 8;
const MATCH_LENGTH_LOG: u8 = 9;
const LITERAL_LENGTH_LOG: u8 = 9;

/// Symbol statistics gathered by compressing samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyStatistics {
    /// Literal byte counts.
    pub literals: [u32; 256],
    /// Literal length code counts.
    pub literal_lengths: [u32; 36],
    /// Match length code counts.
    pub match_lengths: [u32; 53],
    /// Offset code counts.
    pub offsets: [u32; 32],
}

impl Default for EntropyStatistics {
    fn default() -> Self {
        Self {
            literals: [0; 256],
            literal_lengths: [0; 36],
            match_lengths: [0; 53],
            offsets: [0; 32],
        }
    }
}

/// Parsed entropy section of a dictionary, in both directions.
#[derive(Debug, Clone)]
pub struct EntropyTables {
    huffman: HuffmanTable,
    encoder: EncoderTables,
    decoder: DecoderTables,
    repeat_offsets: RepeatOffsets,
}

fn corrupt(message: &str) -> ZframeError {
    ZframeError::corrupted(0, format!("dictionary entropy tables: {message}"))
}

fn build(distribution: Distribution) -> Result<(Arc<CustomTable>, DecodeTable)> {
    let decode = DecodeTable::new(&distribution)?;
    let custom = CustomTable::new(distribution)?;
    Ok((Arc::new(custom), decode))
}

impl EntropyTables {
    /// Parse the tables that follow the magic number and id.
    ///
    /// Returns the tables and the number of bytes consumed; the rest of
    /// `data` is the dictionary content.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let (huffman, mut pos) = HuffmanTable::read(data)?;

        let mut read = |kind: SymbolKind| -> Result<Distribution> {
            let rest = data.get(pos..).ok_or_else(|| corrupt("truncated"))?;
            let (dist, used) = Distribution::read(rest, kind.max_symbol(), kind.max_log())?;
            pos += used;
            Ok(dist)
        };
        let offsets = read(SymbolKind::Offset)?;
        let match_lengths = read(SymbolKind::MatchLength)?;
        let literal_lengths = read(SymbolKind::LiteralLength)?;

        let raw = data.get(pos..pos + 12).ok_or_else(|| corrupt("truncated repeat offsets"))?;
        pos += 12;
        let content_len = data.len() - pos;
        let mut reps = [0u32; 3];
        for (rep, chunk) in reps.iter_mut().zip(raw.chunks_exact(4)) {
            *rep = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if *rep == 0 || *rep as usize > content_len {
                return Err(corrupt("repeat offset outside content"));
            }
        }

        let tables = Self::assemble(
            huffman,
            offsets,
            match_lengths,
            literal_lengths,
            RepeatOffsets::new(reps),
        )?;
        Ok((tables, pos))
    }

    fn assemble(
        huffman: HuffmanTable,
        offsets: Distribution,
        match_lengths: Distribution,
        literal_lengths: Distribution,
        repeat_offsets: RepeatOffsets,
    ) -> Result<Self> {
        let (of_custom, of_decode) = build(offsets)?;
        let (ml_custom, ml_decode) = build(match_lengths)?;
        let (ll_custom, ll_decode) = build(literal_lengths)?;
        Ok(Self {
            huffman,
            encoder: EncoderTables {
                literal_lengths: Some(ll_custom),
                offsets: Some(of_custom),
                match_lengths: Some(ml_custom),
            },
            decoder: DecoderTables {
                literal_lengths: Some(ll_decode),
                offsets: Some(of_decode),
                match_lengths: Some(ml_decode),
            },
            repeat_offsets,
        })
    }

    /// Derive tables from sample statistics.
    ///
    /// Every code gets a nonzero probability so that the tables stay usable
    /// for data unlike the samples.
    pub fn from_statistics(stats: &EntropyStatistics) -> Result<Self> {
        let literals: Vec<u32> = stats.literals[..HUFFMAN_ALPHABET]
            .iter()
            .map(|&c| c.saturating_add(1))
            .collect();
        let huffman = HuffmanTable::from_histogram(&literals)?;

        let mut offsets = stats.offsets;
        offsets[..31].iter_mut().for_each(|c| *c = c.saturating_add(1));
        let smooth =
            |counts: &[u32]| -> Vec<u32> { counts.iter().map(|&c| c.saturating_add(1)).collect() };

        Self::assemble(
            huffman,
            Distribution::from_histogram(&offsets, OFFSET_LOG)?,
            Distribution::from_histogram(&smooth(&stats.match_lengths), MATCH_LENGTH_LOG)?,
            Distribution::from_histogram(&smooth(&stats.literal_lengths), LITERAL_LENGTH_LOG)?,
            RepeatOffsets::default(),
        )
    }

    /// Serialize in dictionary order.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.huffman.write(out)?;
        let tables = [
            &self.encoder.offsets,
            &self.encoder.match_lengths,
            &self.encoder.literal_lengths,
        ];
        for table in tables {
            let table = table.as_ref().ok_or_else(|| corrupt("missing table"))?;
            out.extend(table.distribution.to_bytes());
        }
        for rep in self.repeat_offsets.values() {
            out.extend_from_slice(&rep.to_le_bytes());
        }
        Ok(())
    }

    /// Literal table.
    pub fn huffman(&self) -> &HuffmanTable {
        &self.huffman
    }

    /// Sequence tables for the encoder's repeat mode.
    pub fn encoder_tables(&self) -> &EncoderTables {
        &self.encoder
    }

    /// Sequence tables for the decoder.
    pub fn decoder_tables(&self) -> &DecoderTables {
        &self.decoder
    }

    /// Initial repeat offsets.
    pub fn repeat_offsets(&self) -> RepeatOffsets {
        self.repeat_offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stats() -> EntropyStatistics {
        let mut stats = EntropyStatistics::default();
        for (i, c) in stats.literals.iter_mut().enumerate().take(128) {
            *c = (i as u32 % 7) * 10;
        }
        stats.literals[b'e' as usize] = 900;
        stats.literal_lengths[0] = 400;
        stats.literal_lengths[3] = 120;
        stats.match_lengths[2] = 300;
        stats.offsets[10] = 250;
        stats
    }

    #[test]
    fn test_written_tables_parse_back() {
        let tables = EntropyTables::from_statistics(&sample_stats()).unwrap();
        let mut bytes = Vec::new();
        tables.write(&mut bytes).unwrap();
        let header_len = bytes.len();
        bytes.extend_from_slice(&[0u8; 64]);

        let (parsed, used) = EntropyTables::parse(&bytes).unwrap();
        assert_eq!(used, header_len);
        assert_eq!(parsed.huffman(), tables.huffman());
        assert_eq!(parsed.repeat_offsets().values(), [1, 4, 8]);
        assert_eq!(
            parsed.encoder_tables().offsets.as_ref().unwrap().distribution,
            tables.encoder_tables().offsets.as_ref().unwrap().distribution
        );
    }

    #[test]
    fn test_repeat_offset_beyond_content_rejected() {
        let tables = EntropyTables::from_statistics(&sample_stats()).unwrap();
        let mut bytes = Vec::new();
        tables.write(&mut bytes).unwrap();
        // Reps are 1, 4, 8 but only 4 bytes of content follow.
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(EntropyTables::parse(&bytes).is_err());
    }

    #[test]
    fn test_truncated_tables_rejected() {
        let tables = EntropyTables::from_statistics(&sample_stats()).unwrap();
        let mut bytes = Vec::new();
        tables.write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 5);
        assert!(EntropyTables::parse(&bytes).is_err());
    }

    #[test]
    fn test_generated_tables_cover_all_codes() {
        let tables = EntropyTables::from_statistics(&EntropyStatistics::default()).unwrap();
        let encoder = tables.encoder_tables();
        for code in 0..=35u8 {
            assert!(encoder.literal_lengths.as_ref().unwrap().encode.covers(code));
        }
        for code in 0..=52u8 {
            assert!(encoder.match_lengths.as_ref().unwrap().encode.covers(code));
        }
        for code in 0..=30u8 {
            assert!(encoder.offsets.as_ref().unwrap().encode.covers(code));
        }
    }
}
