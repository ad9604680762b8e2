//! Block codec adapter.
//!
//! The frame engine drives block encoding and decoding only through these
//! traits. A codec hands out per-session encoders and decoders, reports the
//! parameter bounds it accepts, and provides the training primitives used by
//! dictionary construction.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::entropy::{EntropyStatistics, EntropyTables};
use crate::params::{BlockParams, Bounds, CompressionParameter, DecompressionParameter};
use zframe_core::error::Result;
use zframe_core::window::SlidingWindow;

/// Encoded form of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedBlock {
    /// Store the block as-is.
    Raw,
    /// The block is one byte repeated.
    Rle(u8),
    /// Compressed block payload.
    Compressed(Vec<u8>),
}

/// Prepared match index over dictionary content.
///
/// The concrete type is private to the codec that built it.
#[derive(Clone)]
pub struct DictionaryIndex(Arc<dyn Any + Send + Sync>);

impl DictionaryIndex {
    /// Wrap a codec-specific index.
    pub fn new<T: Any + Send + Sync>(index: T) -> Self {
        Self(Arc::new(index))
    }

    /// Borrow the index as its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for DictionaryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryIndex").finish_non_exhaustive()
    }
}

/// Dictionary state presented to an encoder or decoder at frame start.
#[derive(Debug, Clone, Copy)]
pub struct DictionaryView<'a> {
    /// History preceding the frame content.
    pub content: &'a [u8],
    /// Entropy tables, for structured dictionaries.
    pub entropy: Option<&'a EntropyTables>,
    /// Prepared match index over `content`, when digested.
    pub index: Option<&'a DictionaryIndex>,
}

impl<'a> DictionaryView<'a> {
    /// View of raw content with no tables.
    pub fn raw(content: &'a [u8]) -> Self {
        Self {
            content,
            entropy: None,
            index: None,
        }
    }
}

/// Per-session block encoder.
pub trait BlockEncoder: Send + fmt::Debug {
    /// Start a new frame, optionally with dictionary history and tables.
    fn reset(&mut self, dict: Option<&DictionaryView<'_>>);

    /// Add history without emitting anything.
    fn extend_history(&mut self, data: &[u8]);

    /// Encode one block of at most 128 KiB.
    fn encode_block(&mut self, block: &[u8]) -> Result<EncodedBlock>;
}

/// Per-session block decoder.
pub trait BlockDecoder: Send + fmt::Debug {
    /// Start a new frame, optionally with dictionary tables.
    ///
    /// Dictionary content is installed in the window by the caller.
    fn reset(&mut self, dict: Option<&DictionaryView<'_>>);

    /// Decode a compressed block payload into `window`.
    fn decode_block(&mut self, payload: &[u8], window: &mut SlidingWindow) -> Result<()>;
}

/// A block codec.
pub trait BlockCodec: Send + Sync + fmt::Debug {
    /// Accepted range of a compression parameter; `None` if unsupported.
    fn compression_bounds(&self, param: CompressionParameter) -> Option<Bounds>;

    /// Accepted range of a decompression parameter; `None` if unsupported.
    fn decompression_bounds(&self, param: DecompressionParameter) -> Option<Bounds>;

    /// Create an encoder for one session.
    fn new_encoder(&self, params: &BlockParams) -> Box<dyn BlockEncoder>;

    /// Create a decoder for one session.
    fn new_decoder(&self) -> Box<dyn BlockDecoder>;

    /// The parameters an index depends on. Sessions whose parameters map to
    /// the same key can share one index.
    fn index_key(&self, params: &BlockParams) -> BlockParams;

    /// Build a match index over dictionary content.
    fn index_dictionary(&self, content: &[u8], params: &BlockParams) -> DictionaryIndex;

    /// Select dictionary content from samples.
    fn train_content(&self, samples: &[&[u8]], capacity: usize) -> Result<Vec<u8>>;

    /// Statistics of compressing `samples` with `content` as history.
    fn gather_statistics(
        &self,
        content: &[u8],
        samples: &[&[u8]],
        params: &BlockParams,
    ) -> Result<EntropyStatistics>;
}
