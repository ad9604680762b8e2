//! # zframe Core
//!
//! Core components shared by the zframe codec and frame engine.
//!
//! - [`bitstream`]: forward and backward bit streams used by FSE and Huffman coding
//! - [`window`]: sliding window holding decoding history and dictionary content
//! - [`xxhash`]: XXH64, streaming and one-shot, for content checksums
//! - [`traits`]: flush directives and compression levels
//! - [`error`]: the error taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Frame engine (zframe)                               │
//! │     Frames, sessions, dictionaries, file wrappers       │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Block codec (zframe-codec)                          │
//! │     Match finding, FSE, Huffman, literals, sequences    │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     Bit streams, window, XXH64, errors                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use zframe_core::window::SlidingWindow;
//! use zframe_core::xxhash::XxHash64;
//!
//! let mut window = SlidingWindow::new(1 << 10);
//! window.push_literals(b"ab");
//! window.copy_match(2, 4).unwrap();
//!
//! let mut out = Vec::new();
//! window.drain_into(&mut out);
//! assert_eq!(out, b"ababab");
//!
//! let mut hasher = XxHash64::new();
//! hasher.update(&out);
//! assert_eq!(hasher.finish(), zframe_core::xxhash::xxhash64(b"ababab"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod error;
pub mod traits;
pub mod window;
pub mod xxhash;

// Re-exports for convenience
pub use bitstream::{BackwardBitReader, BitWriter, ForwardBitReader};
pub use error::{ErrorKind, Result, ZframeError};
pub use traits::{CompressionLevel, EndDirective};
pub use window::SlidingWindow;
pub use xxhash::{XxHash64, xxhash64, xxhash64_checksum};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorKind, Result, ZframeError};
    pub use crate::traits::{CompressionLevel, EndDirective};
    pub use crate::window::SlidingWindow;
    pub use crate::xxhash::XxHash64;
}
