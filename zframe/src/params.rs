//! Parameter sets for compression and decompression sessions.
//!
//! Values are stored as given and validated against the codec's bounds when
//! the first frame starts. Only representability is checked up front.

use std::collections::BTreeMap;

use zframe_codec::{
    BlockCodec, CompressionParameter, DecompressionParameter, ParamOverrides, Strategy,
};
use zframe_core::error::{Result, ZframeError};
use zframe_core::CompressionLevel;

fn narrow(name: &str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| ZframeError::value_out_of_range(name, value))
}

/// Ordered compression parameter values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionOptions {
    values: BTreeMap<CompressionParameter, i32>,
}

/// Frame-level switches derived from [`CompressionOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags {
    /// Record the content size when known.
    pub content_size: bool,
    /// Append a content checksum.
    pub checksum: bool,
    /// Record the dictionary id.
    pub dict_id: bool,
}

impl Default for FrameFlags {
    fn default() -> Self {
        Self {
            content_size: true,
            checksum: true,
            dict_id: true,
        }
    }
}

impl CompressionOptions {
    /// Empty option set: every key at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter.
    ///
    /// Fails with `ValueOutOfRange` when `value` does not fit in `i32`.
    pub fn set(&mut self, key: CompressionParameter, value: i64) -> Result<&mut Self> {
        let value = narrow(key.name(), value)?;
        self.values.insert(key, value);
        Ok(self)
    }

    /// Builder form of [`CompressionOptions::set`].
    pub fn with(mut self, key: CompressionParameter, value: i64) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Stored value of a parameter.
    pub fn get(&self, key: CompressionParameter) -> Option<i32> {
        self.values.get(&key).copied()
    }

    /// Remove a parameter, restoring its default.
    pub fn remove(&mut self, key: CompressionParameter) -> Option<i32> {
        self.values.remove(&key)
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (CompressionParameter, i32)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    /// Nonzero value of a non-flag key.
    fn explicit(&self, key: CompressionParameter) -> Option<i32> {
        self.get(key).filter(|&v| v != 0)
    }

    fn flag(&self, key: CompressionParameter, default: bool) -> bool {
        self.get(key).map_or(default, |v| v != 0)
    }

    /// Check every value against the bounds `codec` reports.
    ///
    /// The level is exempt: out-of-range levels are clamped.
    pub fn validate(&self, codec: &dyn BlockCodec) -> Result<()> {
        for (key, value) in self.iter() {
            if key == CompressionParameter::CompressionLevel {
                continue;
            }
            if value == 0 && !key.is_flag() {
                continue;
            }
            let bounds = codec
                .compression_bounds(key)
                .ok_or_else(|| ZframeError::unsupported_parameter(key.name()))?;
            if !bounds.contains(value) {
                return Err(ZframeError::out_of_bounds(
                    key.name(),
                    value,
                    bounds.lower,
                    bounds.upper,
                ));
            }
        }
        Ok(())
    }

    /// Compression level, clamped.
    pub fn level(&self) -> CompressionLevel {
        self.get(CompressionParameter::CompressionLevel)
            .map_or(CompressionLevel::DEFAULT, CompressionLevel::new)
    }

    /// Frame header switches.
    pub fn frame_flags(&self) -> FrameFlags {
        let defaults = FrameFlags::default();
        FrameFlags {
            content_size: self.flag(CompressionParameter::ContentSizeFlag, defaults.content_size),
            checksum: self.flag(CompressionParameter::ChecksumFlag, defaults.checksum),
            dict_id: self.flag(CompressionParameter::DictIdFlag, defaults.dict_id),
        }
    }

    /// Explicit values that replace level table entries.
    ///
    /// Call after [`CompressionOptions::validate`]; values are assumed to be
    /// within bounds.
    pub fn overrides(&self) -> ParamOverrides {
        use CompressionParameter as P;
        let small = |key| self.explicit(key).map(|v| v as u8);
        ParamOverrides {
            window_log: small(P::WindowLog),
            hash_log: small(P::HashLog),
            chain_log: small(P::ChainLog),
            search_log: small(P::SearchLog),
            min_match: small(P::MinMatch),
            target_length: self.explicit(P::TargetLength).map(|v| v as u32),
            strategy: self.explicit(P::Strategy).and_then(Strategy::from_value),
            enable_ldm: self.flag(P::EnableLongDistanceMatching, false),
            ldm_hash_log: small(P::LdmHashLog),
            ldm_min_match: self.explicit(P::LdmMinMatch).map(|v| v as u32),
            ldm_bucket_size_log: small(P::LdmBucketSizeLog),
            ldm_hash_rate_log: small(P::LdmHashRateLog),
        }
    }

    /// Worker threads; 0 compresses on the caller's thread.
    pub fn nb_workers(&self) -> usize {
        self.explicit(CompressionParameter::NbWorkers)
            .map_or(0, |v| v.max(0) as usize)
    }

    /// Bytes per worker job, 0 for the default.
    pub fn job_size(&self) -> usize {
        self.explicit(CompressionParameter::JobSize)
            .map_or(0, |v| v.max(0) as usize)
    }

    /// Overlap log, 0 for the default.
    pub fn overlap_log(&self) -> u8 {
        self.explicit(CompressionParameter::OverlapLog)
            .map_or(0, |v| v.clamp(0, 9) as u8)
    }
}

/// Decompression parameter values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompressionOptions {
    values: BTreeMap<DecompressionParameter, i32>,
}

impl DecompressionOptions {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter.
    pub fn set(&mut self, key: DecompressionParameter, value: i64) -> Result<&mut Self> {
        let value = narrow(key.name(), value)?;
        self.values.insert(key, value);
        Ok(self)
    }

    /// Builder form of [`DecompressionOptions::set`].
    pub fn with(mut self, key: DecompressionParameter, value: i64) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Stored value of a parameter.
    pub fn get(&self, key: DecompressionParameter) -> Option<i32> {
        self.values.get(&key).copied()
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (DecompressionParameter, i32)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    /// Check every value against the bounds `codec` reports.
    pub fn validate(&self, codec: &dyn BlockCodec) -> Result<()> {
        for (key, value) in self.iter() {
            let bounds = codec
                .decompression_bounds(key)
                .ok_or_else(|| ZframeError::unsupported_parameter(key.name()))?;
            if value != 0 && !bounds.contains(value) {
                return Err(ZframeError::out_of_bounds(
                    key.name(),
                    value,
                    bounds.lower,
                    bounds.upper,
                ));
            }
        }
        Ok(())
    }

    /// Largest window the decoder accepts.
    pub fn max_window_size(&self) -> u64 {
        let log = self
            .get(DecompressionParameter::WindowLogMax)
            .filter(|&v| v != 0)
            .map_or(DecompressionParameter::DEFAULT_WINDOW_LOG_MAX, |v| v as u32);
        1u64 << log.min(63)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zframe_codec::ZstdBlockCodec;

    #[test]
    fn test_unrepresentable_value_fails_immediately() {
        let mut options = CompressionOptions::new();
        let err = options
            .set(CompressionParameter::WindowLog, 1 << 40)
            .unwrap_err();
        assert!(matches!(err, ZframeError::ValueOutOfRange { .. }));
        assert!(options.is_empty());

        let err = CompressionOptions::new()
            .with(CompressionParameter::CompressionLevel, i64::from(i32::MIN) - 1)
            .unwrap_err();
        assert!(matches!(err, ZframeError::ValueOutOfRange { .. }));
    }

    #[test]
    fn test_bounds_checked_lazily() {
        let options = CompressionOptions::new()
            .with(CompressionParameter::WindowLog, 40)
            .unwrap();
        let err = options.validate(&ZstdBlockCodec::new()).unwrap_err();
        match err {
            ZframeError::ParameterOutOfBounds { name, value, min, max } => {
                assert_eq!(name, "window_log");
                assert_eq!((value, min, max), (40, 10, 31));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_zero_means_default_except_flags() {
        let options = CompressionOptions::new()
            .with(CompressionParameter::WindowLog, 0)
            .unwrap()
            .with(CompressionParameter::ContentSizeFlag, 0)
            .unwrap();
        options.validate(&ZstdBlockCodec::new()).unwrap();
        assert_eq!(options.overrides().window_log, None);
        assert!(!options.frame_flags().content_size);

        let options = CompressionOptions::new()
            .with(CompressionParameter::ChecksumFlag, 2)
            .unwrap();
        assert!(options.validate(&ZstdBlockCodec::new()).is_err());
    }

    #[test]
    fn test_level_is_clamped_not_rejected() {
        let options = CompressionOptions::new()
            .with(CompressionParameter::CompressionLevel, 1000)
            .unwrap();
        options.validate(&ZstdBlockCodec::new()).unwrap();
        assert_eq!(options.level(), CompressionLevel::MAX);
        assert_eq!(CompressionOptions::new().level(), CompressionLevel::DEFAULT);
    }

    #[test]
    fn test_overrides_and_flags() {
        let options = CompressionOptions::new()
            .with(CompressionParameter::Strategy, 5)
            .unwrap()
            .with(CompressionParameter::MinMatch, 4)
            .unwrap()
            .with(CompressionParameter::EnableLongDistanceMatching, 1)
            .unwrap()
            .with(CompressionParameter::ChecksumFlag, 1)
            .unwrap();
        let overrides = options.overrides();
        assert_eq!(overrides.strategy, Some(Strategy::Lazy2));
        assert_eq!(overrides.min_match, Some(4));
        assert!(overrides.enable_ldm);
        assert_eq!(
            options.frame_flags(),
            FrameFlags {
                content_size: true,
                checksum: true,
                dict_id: true
            }
        );
        let keys: Vec<_> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                CompressionParameter::MinMatch,
                CompressionParameter::Strategy,
                CompressionParameter::EnableLongDistanceMatching,
                CompressionParameter::ChecksumFlag,
            ]
        );
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn test_workers_unsupported_without_parallel() {
        let options = CompressionOptions::new()
            .with(CompressionParameter::NbWorkers, 2)
            .unwrap();
        let err = options.validate(&ZstdBlockCodec::new()).unwrap_err();
        assert!(matches!(err, ZframeError::UnsupportedParameter { .. }));
    }

    #[test]
    fn test_window_log_max() {
        let options = DecompressionOptions::new();
        assert_eq!(options.max_window_size(), 1 << 27);
        let options = DecompressionOptions::new()
            .with(DecompressionParameter::WindowLogMax, 31)
            .unwrap();
        options.validate(&ZstdBlockCodec::new()).unwrap();
        assert_eq!(options.max_window_size(), 1 << 31);

        let options = DecompressionOptions::new()
            .with(DecompressionParameter::WindowLogMax, 5)
            .unwrap();
        assert!(matches!(
            options.validate(&ZstdBlockCodec::new()),
            Err(ZframeError::ParameterOutOfBounds { .. })
        ));
    }
}
