//! Error types for zframe operations.
//!
//! Every failure surfaced by the frame engine, the block codec and the file
//! wrappers is a [`ZframeError`]. Callers that only care about the broad
//! category use [`ZframeError::kind`], which maps each variant onto the
//! configuration / format / integrity / end-of-data taxonomy.

use std::io;
use thiserror::Error;

/// The main error type for zframe operations.
#[derive(Debug, Error)]
pub enum ZframeError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Invalid configuration: bad mode string, illegal directive, misuse of a session.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// A level or parameter value does not fit the representable range.
    #[error("Value out of range: {name} = {value} does not fit a 32-bit signed integer")]
    ValueOutOfRange {
        /// Name of the parameter.
        name: String,
        /// The rejected value.
        value: i64,
    },

    /// The codec build does not know or support this parameter.
    #[error("Unsupported parameter: {name}")]
    UnsupportedParameter {
        /// Name of the parameter.
        name: String,
    },

    /// A parameter value lies outside the codec-reported bounds.
    #[error("Invalid value for {name}: {value} is not within [{min}, {max}]")]
    ParameterOutOfBounds {
        /// Name of the parameter.
        name: String,
        /// The rejected value.
        value: i32,
        /// Lower bound (inclusive).
        min: i32,
        /// Upper bound (inclusive).
        max: i32,
    },

    /// Unknown frame magic or frame descriptor.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Corrupted data in a frame.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid distance in a match back-reference.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Current history size.
        history_size: usize,
    },

    /// Frame window exceeds the decoder's configured limit.
    #[error("Frame requires a window of {required} bytes, limit is {limit}")]
    WindowTooLarge {
        /// Window size declared by the frame.
        required: u64,
        /// Largest window the decoder accepts.
        limit: u64,
    },

    /// Content checksum mismatch.
    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed from decoded content.
        computed: u32,
    },

    /// The frame was produced with a different dictionary.
    #[error("Dictionary mismatch: frame requires dictionary {expected}, got {found}")]
    DictionaryMismatch {
        /// Dictionary id recorded in the frame header.
        expected: u32,
        /// Dictionary id supplied to the decoder (0 if none).
        found: u32,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of data: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Decompression called after the end of the stream was reached.
    #[error("Already at the end of a zstd data stream")]
    EndOfStream,

    /// Operation not supported in the current mode.
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: String,
    },

    /// Text encoding error.
    #[error("Encoding error: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },
}

/// Result type alias for zframe operations.
pub type Result<T> = std::result::Result<T, ZframeError>;

/// Broad error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid parameter key, value, mode or mode string.
    Config,
    /// Unknown magic, malformed header or corrupted block data.
    Format,
    /// Checksum or dictionary mismatch.
    Integrity,
    /// Input ended before a frame's logical end.
    UnexpectedEnd,
    /// Decompression attempted past the end of the stream.
    EndOfStream,
    /// Operation not supported by this object or mode.
    Unsupported,
    /// Underlying I/O failure.
    Io,
    /// Text encoding or decoding failure.
    Encoding,
}

impl ZframeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidConfig { .. }
            | Self::ValueOutOfRange { .. }
            | Self::UnsupportedParameter { .. }
            | Self::ParameterOutOfBounds { .. } => ErrorKind::Config,
            Self::InvalidMagic { .. }
            | Self::InvalidHeader { .. }
            | Self::CorruptedData { .. }
            | Self::InvalidDistance { .. }
            | Self::WindowTooLarge { .. } => ErrorKind::Format,
            Self::ChecksumMismatch { .. } | Self::DictionaryMismatch { .. } => {
                ErrorKind::Integrity
            }
            Self::UnexpectedEof { .. } => ErrorKind::UnexpectedEnd,
            Self::EndOfStream => ErrorKind::EndOfStream,
            Self::UnsupportedOperation { .. } => ErrorKind::Unsupported,
            Self::EncodingError { .. } => ErrorKind::Encoding,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a value out of range error.
    pub fn value_out_of_range(name: impl Into<String>, value: i64) -> Self {
        Self::ValueOutOfRange {
            name: name.into(),
            value,
        }
    }

    /// Create an unsupported parameter error.
    pub fn unsupported_parameter(name: impl Into<String>) -> Self {
        Self::UnsupportedParameter { name: name.into() }
    }

    /// Create a parameter out of bounds error.
    pub fn out_of_bounds(name: impl Into<String>, value: i32, min: i32, max: i32) -> Self {
        Self::ParameterOutOfBounds {
            name: name.into(),
            value,
            min,
            max,
        }
    }

    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history_size: usize) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create a dictionary mismatch error.
    pub fn dictionary_mismatch(expected: u32, found: u32) -> Self {
        Self::DictionaryMismatch { expected, found }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }
}

impl From<io::Error> for ZframeError {
    fn from(err: io::Error) -> Self {
        if !err
            .get_ref()
            .is_some_and(|inner| inner.is::<ZframeError>())
        {
            return Self::Io(err);
        }
        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<ZframeError>() {
                Ok(zerr) => *zerr,
                Err(other) => Self::Io(io::Error::new(kind, other)),
            },
            None => Self::Io(io::Error::from(kind)),
        }
    }
}

impl From<ZframeError> for io::Error {
    fn from(err: ZframeError) -> Self {
        let kind = match err.kind() {
            ErrorKind::Io => {
                if let ZframeError::Io(inner) = err {
                    return inner;
                }
                io::ErrorKind::Other
            }
            ErrorKind::Config => io::ErrorKind::InvalidInput,
            ErrorKind::Format | ErrorKind::Integrity | ErrorKind::Encoding => {
                io::ErrorKind::InvalidData
            }
            ErrorKind::UnexpectedEnd | ErrorKind::EndOfStream => io::ErrorKind::UnexpectedEof,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ZframeError::invalid_magic(vec![0x28, 0xB5, 0x2F, 0xFD], vec![0x1F, 0x8B]);
        assert!(err.to_string().contains("Invalid magic"));

        let err = ZframeError::checksum_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("0x12345678"));
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = ZframeError::out_of_bounds("window_log", 40, 10, 31);
        assert!(err.to_string().contains("window_log"));
        assert!(err.to_string().contains("[10, 31]"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ZframeError::value_out_of_range("level", 1 << 40).kind(),
            ErrorKind::Config
        );
        assert_eq!(
            ZframeError::unsupported_parameter("nb_workers").kind(),
            ErrorKind::Config
        );
        assert_eq!(ZframeError::corrupted(0, "bad").kind(), ErrorKind::Format);
        assert_eq!(
            ZframeError::dictionary_mismatch(1, 2).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            ZframeError::unexpected_eof(4).kind(),
            ErrorKind::UnexpectedEnd
        );
        assert_eq!(ZframeError::EndOfStream.kind(), ErrorKind::EndOfStream);
        assert_eq!(ZframeError::unsupported("seek").kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ZframeError = io_err.into();
        assert!(matches!(err, ZframeError::Io(_)));
    }

    #[test]
    fn test_round_trip_through_io_error() {
        let io_err: io::Error = ZframeError::checksum_mismatch(1, 2).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back: ZframeError = io_err.into();
        assert!(matches!(
            back,
            ZframeError::ChecksumMismatch {
                expected: 1,
                computed: 2
            }
        ));
    }

    #[test]
    fn test_plain_io_error_is_not_rewrapped() {
        let original = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let io_err: io::Error = ZframeError::Io(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
    }
}
