//! # zframe Codec
//!
//! The block layer of zframe: everything between one block of frame content
//! and its encoded payload.
//!
//! - [`codec`]: the [`BlockCodec`] adapter traits the frame engine programs against
//! - [`block`]: [`ZstdBlockCodec`], the default Zstandard block codec
//! - [`params`]: parameter keys, their bounds and the level table
//! - [`matcher`]: hash chain match finder with lazy parsing and long-distance matching
//! - [`fse`], [`huffman`]: entropy coders
//! - [`literals`], [`sequences`]: the two sections of a compressed block
//! - [`entropy`]: entropy tables of structured dictionaries
//! - [`train`]: dictionary content selection and statistics
//!
//! ## Example
//!
//! ```rust
//! use zframe_codec::{BlockCodec, BlockParams, EncodedBlock, ParamOverrides, ZstdBlockCodec};
//! use zframe_core::{CompressionLevel, SlidingWindow};
//!
//! let codec = ZstdBlockCodec::new();
//! let params = BlockParams::resolve(CompressionLevel::DEFAULT, &ParamOverrides::default(), None, 0);
//! let data = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(8);
//!
//! let mut encoder = codec.new_encoder(&params);
//! encoder.reset(None);
//! let EncodedBlock::Compressed(payload) = encoder.encode_block(&data).unwrap() else {
//!     panic!("expected a compressed block");
//! };
//!
//! let mut decoder = codec.new_decoder();
//! decoder.reset(None);
//! let mut window = SlidingWindow::new(params.window_size() as usize);
//! decoder.decode_block(&payload, &mut window).unwrap();
//! let mut out = Vec::new();
//! window.drain_into(&mut out);
//! assert_eq!(out, data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod codec;
pub mod entropy;
pub mod fse;
pub mod huffman;
pub mod literals;
pub mod matcher;
pub mod params;
pub mod sequences;
pub mod train;

pub use block::{ZstdBlockCodec, ZstdBlockDecoder, ZstdBlockEncoder};
pub use codec::{
    BlockCodec, BlockDecoder, BlockEncoder, DictionaryIndex, DictionaryView, EncodedBlock,
};
pub use entropy::{DICT_MAGIC, EntropyStatistics, EntropyTables};
pub use literals::BLOCK_SIZE_MAX;
pub use params::{
    BlockParams, Bounds, CompressionParameter, DecompressionParameter, LdmParams, ParamOverrides,
    Strategy,
};
