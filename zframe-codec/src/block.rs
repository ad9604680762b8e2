//! The default block codec.
//!
//! Compressed blocks hold a literals section followed by a sequences
//! section. The encoder parses each block with the match finder, then
//! keeps whichever representation is smallest: raw, RLE or compressed.
//! Entropy state (the last Huffman table and the last custom FSE tables)
//! carries over between the blocks of a frame on both sides, and is only
//! advanced on the encoder side when a compressed block is emitted.

use tracing::trace;

use crate::codec::{
    BlockCodec, BlockDecoder, BlockEncoder, DictionaryIndex, DictionaryView, EncodedBlock,
};
use crate::entropy::EntropyStatistics;
use crate::huffman::HuffmanTable;
use crate::literals::{BLOCK_SIZE_MAX, decode_literals, encode_literals};
use crate::matcher::{MatchFinder, MatcherConfig};
use crate::params::{BlockParams, Bounds, CompressionParameter, DecompressionParameter};
use crate::sequences::{
    DecoderTables, EncoderTables, RepeatOffsets, decode_sequences, encode_sequences,
};
use crate::train;
use zframe_core::error::{Result, ZframeError};
use zframe_core::window::SlidingWindow;

/// Zstandard block codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdBlockCodec;

impl ZstdBlockCodec {
    /// Create the codec.
    pub fn new() -> Self {
        Self
    }
}

impl BlockCodec for ZstdBlockCodec {
    fn compression_bounds(&self, param: CompressionParameter) -> Option<Bounds> {
        param.bounds()
    }

    fn decompression_bounds(&self, param: DecompressionParameter) -> Option<Bounds> {
        param.bounds()
    }

    fn new_encoder(&self, params: &BlockParams) -> Box<dyn BlockEncoder> {
        Box::new(ZstdBlockEncoder::new(params))
    }

    fn new_decoder(&self) -> Box<dyn BlockDecoder> {
        Box::new(ZstdBlockDecoder::new())
    }

    fn index_key(&self, params: &BlockParams) -> BlockParams {
        BlockParams {
            window_log: 0,
            search_log: 0,
            target_length: 0,
            ..*params
        }
    }

    fn index_dictionary(&self, content: &[u8], params: &BlockParams) -> DictionaryIndex {
        let key = self.index_key(params);
        let mut finder = MatchFinder::new(MatcherConfig::from(&key));
        finder.load_dictionary(content);
        DictionaryIndex::new(finder)
    }

    fn train_content(&self, samples: &[&[u8]], capacity: usize) -> Result<Vec<u8>> {
        train::train_content(samples, capacity)
    }

    fn gather_statistics(
        &self,
        content: &[u8],
        samples: &[&[u8]],
        params: &BlockParams,
    ) -> Result<EntropyStatistics> {
        train::gather_statistics(content, samples, params)
    }
}

/// Encoder side of [`ZstdBlockCodec`].
#[derive(Debug, Clone)]
pub struct ZstdBlockEncoder {
    matcher: MatchFinder,
    huffman: Option<HuffmanTable>,
    tables: EncoderTables,
}

impl ZstdBlockEncoder {
    /// Create an encoder with empty history.
    pub fn new(params: &BlockParams) -> Self {
        Self {
            matcher: MatchFinder::new(MatcherConfig::from(params)),
            huffman: None,
            tables: EncoderTables::default(),
        }
    }
}

impl BlockEncoder for ZstdBlockEncoder {
    fn reset(&mut self, dict: Option<&DictionaryView<'_>>) {
        let Some(dict) = dict else {
            self.matcher.reset();
            self.huffman = None;
            self.tables = EncoderTables::default();
            return;
        };

        let adopted = dict
            .index
            .and_then(|index| index.downcast_ref::<MatchFinder>())
            .is_some_and(|index| self.matcher.adopt(index));
        if !adopted {
            self.matcher.load_dictionary(dict.content);
        }
        self.huffman = dict.entropy.map(|e| e.huffman().clone());
        self.tables = dict
            .entropy
            .map(|e| e.encoder_tables().clone())
            .unwrap_or_default();
    }

    fn extend_history(&mut self, data: &[u8]) {
        self.matcher.extend_history(data);
    }

    fn encode_block(&mut self, block: &[u8]) -> Result<EncodedBlock> {
        if block.len() > BLOCK_SIZE_MAX {
            return Err(ZframeError::invalid_config(format!(
                "block of {} bytes exceeds the maximum block size",
                block.len()
            )));
        }
        let Some(&first) = block.first() else {
            return Ok(EncodedBlock::Raw);
        };
        self.matcher.append(block);
        if block.len() > 1 && block.iter().all(|&b| b == first) {
            return Ok(EncodedBlock::Rle(first));
        }

        let (sequences, literals) = self.matcher.parse_block(block.len());
        let encoded = encode_literals(&literals, self.huffman.as_ref());
        let mut out = encoded.bytes;
        let tables = encode_sequences(&sequences, &self.tables, &mut out)?;
        trace!(
            size = block.len(),
            sequences = sequences.len(),
            literals = literals.len(),
            compressed = out.len(),
            "encoded block"
        );

        if out.len() >= block.len() {
            return Ok(EncodedBlock::Raw);
        }
        if let Some(table) = encoded.new_table {
            self.huffman = Some(table);
        }
        self.tables = tables;
        Ok(EncodedBlock::Compressed(out))
    }
}

/// Decoder side of [`ZstdBlockCodec`].
#[derive(Debug, Clone, Default)]
pub struct ZstdBlockDecoder {
    huffman: Option<HuffmanTable>,
    tables: DecoderTables,
    repeats: RepeatOffsets,
}

impl ZstdBlockDecoder {
    /// Create a decoder with default state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockDecoder for ZstdBlockDecoder {
    fn reset(&mut self, dict: Option<&DictionaryView<'_>>) {
        match dict.and_then(|d| d.entropy) {
            Some(entropy) => {
                self.huffman = Some(entropy.huffman().clone());
                self.tables = entropy.decoder_tables().clone();
                self.repeats = entropy.repeat_offsets();
            }
            None => {
                self.huffman = None;
                self.tables = DecoderTables::default();
                self.repeats = RepeatOffsets::default();
            }
        }
    }

    fn decode_block(&mut self, payload: &[u8], window: &mut SlidingWindow) -> Result<()> {
        let (literals, used) = decode_literals(payload, &mut self.huffman)?;
        let sequences = decode_sequences(&payload[used..], &mut self.tables, &mut self.repeats)?;
        trace!(
            literals = literals.len(),
            sequences = sequences.len(),
            "decoding block"
        );

        let mut consumed = 0usize;
        let mut produced = 0usize;
        for seq in &sequences {
            let literal_length = seq.literal_length as usize;
            let run = literals
                .get(consumed..consumed + literal_length)
                .ok_or_else(|| ZframeError::corrupted(0, "sequence literal run exceeds literals"))?;
            window.push_literals(run);
            consumed += literal_length;

            produced += literal_length + seq.match_length as usize;
            if produced > BLOCK_SIZE_MAX {
                return Err(ZframeError::corrupted(0, "block output exceeds maximum block size"));
            }
            window.copy_match(seq.offset as usize, seq.match_length as usize)?;
        }

        let rest = &literals[consumed..];
        if produced + rest.len() > BLOCK_SIZE_MAX {
            return Err(ZframeError::corrupted(0, "block output exceeds maximum block size"));
        }
        window.push_literals(rest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::EntropyTables;
    use crate::params::ParamOverrides;
    use proptest::prelude::*;
    use zframe_core::CompressionLevel;

    fn params(level: i32) -> BlockParams {
        BlockParams::resolve(CompressionLevel::new(level), &ParamOverrides::default(), None, 0)
    }

    fn text(len: usize) -> Vec<u8> {
        let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"];
        let mut out = Vec::with_capacity(len + 16);
        let mut i = 0usize;
        while out.len() < len {
            out.extend_from_slice(words[(i * 7 + i / 3) % words.len()].as_bytes());
            out.push(if i % 11 == 10 { b'\n' } else { b' ' });
            i += 1;
        }
        out.truncate(len);
        out
    }

    fn decode_all(
        blocks: &[(EncodedBlock, usize)],
        dict: Option<&DictionaryView<'_>>,
    ) -> Result<Vec<u8>> {
        let mut decoder = ZstdBlockDecoder::new();
        decoder.reset(dict);
        let mut window = SlidingWindow::new(1 << 21);
        window.reset(1 << 21, dict.map_or(&[][..], |d| d.content));
        for (block, size) in blocks {
            match block {
                EncodedBlock::Raw => return Err(ZframeError::unsupported("raw blocks need input")),
                EncodedBlock::Rle(byte) => window.push_repeated(*byte, *size),
                EncodedBlock::Compressed(payload) => decoder.decode_block(payload, &mut window)?,
            }
        }
        let mut out = Vec::new();
        window.drain_into(&mut out);
        Ok(out)
    }

    fn encode_all(
        encoder: &mut ZstdBlockEncoder,
        data: &[u8],
        block_size: usize,
    ) -> Vec<(EncodedBlock, usize)> {
        data.chunks(block_size)
            .map(|chunk| (encoder.encode_block(chunk).unwrap(), chunk.len()))
            .collect()
    }

    #[test]
    fn test_blocks_decode_across_levels() {
        let data = text(300_000);
        for level in [-5, 1, 3, 6, 12, 19] {
            let mut encoder = ZstdBlockEncoder::new(&params(level));
            encoder.reset(None);
            let blocks = encode_all(&mut encoder, &data, BLOCK_SIZE_MAX);
            assert!(
                blocks.iter().all(|(b, _)| matches!(b, EncodedBlock::Compressed(_))),
                "level {level}"
            );
            assert_eq!(decode_all(&blocks, None).unwrap(), data, "level {level}");
        }
    }

    #[test]
    fn test_rle_and_empty_blocks() {
        let mut encoder = ZstdBlockEncoder::new(&params(3));
        encoder.reset(None);
        assert_eq!(encoder.encode_block(&[]).unwrap(), EncodedBlock::Raw);
        assert_eq!(encoder.encode_block(&[9u8; 1000]).unwrap(), EncodedBlock::Rle(9));
        assert_eq!(encoder.encode_block(&[9u8]).unwrap(), EncodedBlock::Raw);
    }

    #[test]
    fn test_incompressible_block_is_raw() {
        let mut state = 0x2545_F491u32;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 3) as u8
            })
            .collect();
        let mut encoder = ZstdBlockEncoder::new(&params(3));
        encoder.reset(None);
        assert_eq!(encoder.encode_block(&noise).unwrap(), EncodedBlock::Raw);
    }

    #[test]
    fn test_oversized_block_rejected() {
        let mut encoder = ZstdBlockEncoder::new(&params(1));
        assert!(encoder.encode_block(&vec![1u8; BLOCK_SIZE_MAX + 1]).is_err());
    }

    #[test]
    fn test_dictionary_tables_and_content() {
        let sample = text(20_000);
        let content = &sample[..4096];
        let codec = ZstdBlockCodec::new();
        let p = params(3);
        let stats = codec.gather_statistics(content, &[&sample[4096..]], &p).unwrap();
        let entropy = EntropyTables::from_statistics(&stats).unwrap();
        let view = DictionaryView {
            content,
            entropy: Some(&entropy),
            index: None,
        };

        let data = text(5000);
        let mut encoder = ZstdBlockEncoder::new(&p);
        encoder.reset(Some(&view));
        let blocks = encode_all(&mut encoder, &data, 1000);
        assert_eq!(decode_all(&blocks, Some(&view)).unwrap(), data);

        // Without the dictionary the same payload is not decodable as-is.
        assert_ne!(decode_all(&blocks, None).ok(), Some(data));
    }

    #[test]
    fn test_digested_index_matches_undigested_output() {
        let content = text(8192);
        let codec = ZstdBlockCodec::new();
        let p = params(5);
        let index = codec.index_dictionary(&content, &p);
        let data = text(30_000);

        let mut digested = ZstdBlockEncoder::new(&p);
        digested.reset(Some(&DictionaryView {
            content: &content,
            entropy: None,
            index: Some(&index),
        }));
        let mut undigested = ZstdBlockEncoder::new(&p);
        undigested.reset(Some(&DictionaryView::raw(&content)));

        assert_eq!(
            encode_all(&mut digested, &data, 8000),
            encode_all(&mut undigested, &data, 8000)
        );
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let data = text(10_000);
        let mut encoder = ZstdBlockEncoder::new(&params(3));
        encoder.reset(None);
        let EncodedBlock::Compressed(payload) = encoder.encode_block(&data).unwrap() else {
            panic!("expected a compressed block");
        };
        for cut in [1, 3] {
            let mut decoder = ZstdBlockDecoder::new();
            let mut window = SlidingWindow::new(1 << 20);
            assert!(decoder.decode_block(&payload[..cut], &mut window).is_err());
        }
    }

    #[test]
    fn test_corrupted_bytes_never_panic() {
        let data = text(10_000);
        let mut encoder = ZstdBlockEncoder::new(&params(3));
        encoder.reset(None);
        let EncodedBlock::Compressed(payload) = encoder.encode_block(&data).unwrap() else {
            panic!("expected a compressed block");
        };
        for i in 0..payload.len() {
            for flip in [0x01u8, 0x80, 0xFF] {
                let mut bad = payload.clone();
                bad[i] ^= flip;
                let mut decoder = ZstdBlockDecoder::new();
                let mut window = SlidingWindow::new(1 << 20);
                let _ = decoder.decode_block(&bad, &mut window);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_single_block_decodes(
            data in proptest::collection::vec(0u8..6, 0..3000),
            level in -3i32..12,
        ) {
            let mut encoder = ZstdBlockEncoder::new(&params(level));
            encoder.reset(None);
            let mut window = SlidingWindow::new(1 << 20);
            match encoder.encode_block(&data).unwrap() {
                EncodedBlock::Raw => window.push_literals(&data),
                EncodedBlock::Rle(byte) => window.push_repeated(byte, data.len()),
                EncodedBlock::Compressed(payload) => {
                    ZstdBlockDecoder::new().decode_block(&payload, &mut window).unwrap();
                }
            }
            let mut out = Vec::new();
            window.drain_into(&mut out);
            prop_assert_eq!(out, data);
        }
    }
}
