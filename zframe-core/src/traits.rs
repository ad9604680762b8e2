//! Flush directives and compression levels shared by every session type.

use crate::error::{Result, ZframeError};

/// How far a compression call should push data out.
///
/// The numeric values follow `ZSTD_EndDirective`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndDirective {
    /// Buffer input for best compression; emit only full blocks.
    #[default]
    Continue,
    /// Emit all pending input as a block without closing the frame.
    FlushBlock,
    /// Emit all pending input and close the frame.
    FlushFrame,
}

impl EndDirective {
    /// Numeric value of the directive.
    pub fn value(self) -> i32 {
        match self {
            Self::Continue => 0,
            Self::FlushBlock => 1,
            Self::FlushFrame => 2,
        }
    }

    /// Whether this directive is one of the two flush modes.
    pub fn is_flush(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl TryFrom<i32> for EndDirective {
    type Error = ZframeError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Continue),
            1 => Ok(Self::FlushBlock),
            2 => Ok(Self::FlushFrame),
            other => Err(ZframeError::invalid_config(format!(
                "mode must be Continue (0), FlushBlock (1) or FlushFrame (2), got {other}"
            ))),
        }
    }
}

/// Compression level.
///
/// Negative levels trade ratio for speed, positive levels up to
/// [`CompressionLevel::MAX`] trade speed for ratio. Out-of-range levels are
/// clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    /// Fastest level.
    pub const MIN: Self = Self(-(1 << 17));
    /// Default level.
    pub const DEFAULT: Self = Self(3);
    /// Strongest level.
    pub const MAX: Self = Self(22);

    /// Create a level, clamping to `[MIN, MAX]`. Zero selects the default.
    pub fn new(level: i32) -> Self {
        if level == 0 {
            return Self::DEFAULT;
        }
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Create a level from a wide integer.
    ///
    /// Values that do not fit in `i32` are rejected; representable values
    /// outside the level range are clamped.
    pub fn try_from_i64(level: i64) -> Result<Self> {
        let narrow = i32::try_from(level)
            .map_err(|_| ZframeError::value_out_of_range("compression_level", level))?;
        Ok(Self::new(narrow))
    }

    /// Get the level value.
    pub fn level(&self) -> i32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i32> for CompressionLevel {
    fn from(level: i32) -> Self {
        Self::new(level)
    }
}
