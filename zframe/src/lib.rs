//! # zframe
//!
//! A Zstandard frame engine: streaming compression and decompression
//! sessions, dictionaries and a file wrapper on top of a pluggable block
//! codec.
//!
//! - [`frame`]: frame and block headers, skippable frames, frame inspection
//! - [`params`]: typed parameter sets for compression and decompression
//! - [`dict`]: dictionaries, training and usage modes
//! - [`compressor`]: [`ZstdCompressor`], the streaming compressor
//! - [`decompressor`]: [`ZstdDecompressor`], the streaming decompressor
//! - [`file`]: [`ZstdFile`], a compressed file implementing the `std::io` traits
//! - [`text`]: [`ZstdTextFile`] and [`open`] for text mode
//!
//! ## Features
//!
//! - `parallel`: multithreaded compression with rayon (`NbWorkers`)
//!
//! ## Example
//!
//! ```rust
//! use zframe::{EndDirective, ZstdCompressor, ZstdDecompressor};
//!
//! let data = b"Hello, Zstandard frames!".repeat(100);
//!
//! // One-shot
//! let compressed = zframe::compress(&data).unwrap();
//! assert_eq!(zframe::decompress(&compressed).unwrap(), data);
//!
//! // Streaming
//! let mut compressor = ZstdCompressor::new();
//! let mut stream = compressor.compress(&data[..1000], EndDirective::Continue).unwrap();
//! stream.extend(compressor.compress(&data[1000..], EndDirective::FlushFrame).unwrap());
//!
//! let mut decompressor = ZstdDecompressor::new();
//! assert_eq!(decompressor.decompress(&stream, None).unwrap(), data);
//! assert!(decompressor.eof());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compressor;
pub mod decompressor;
pub mod dict;
pub mod file;
pub mod frame;
pub mod params;
pub mod text;

pub use compressor::{ZstdCompressor, compress_all};
pub use decompressor::{ZstdDecompressor, decompress_all};
pub use dict::{DictMode, DictUsage, ZstdDict};
pub use file::{FileMode, FileOptions, ZstdFile};
pub use frame::{FrameInfo, get_frame_info, get_frame_size, write_skippable_frame};
pub use params::{CompressionOptions, DecompressionOptions, FrameFlags};
pub use text::{Lines, NewlineMode, OpenFile, OpenOptions, ZstdTextFile, open};

pub use zframe_codec::{Bounds, CompressionParameter, DecompressionParameter, Strategy};
pub use zframe_core::{CompressionLevel, EndDirective, ErrorKind, Result, ZframeError};

/// Compress `data` into one frame at the default level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &CompressionOptions::new(), None)
}

/// Compress `data` into one frame at `level`.
pub fn compress_level(data: &[u8], level: i64) -> Result<Vec<u8>> {
    let options = CompressionOptions::new().with(CompressionParameter::CompressionLevel, level)?;
    compress_with(data, &options, None)
}

/// Compress `data` into one frame with explicit parameters and dictionary.
///
/// The frame records the content size. Empty input still produces a frame.
pub fn compress_with(
    data: &[u8],
    options: &CompressionOptions,
    dict: Option<DictUsage>,
) -> Result<Vec<u8>> {
    compress_all(data, options, dict)
}

/// Decompress every frame in `data`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_all(data, None, &DecompressionOptions::new())
}

/// Decompress every frame in `data` with a dictionary and parameters.
pub fn decompress_with(
    data: &[u8],
    dict: Option<DictUsage>,
    options: &DecompressionOptions,
) -> Result<Vec<u8>> {
    decompress_all(data, dict, options)
}
