//! Parameter keys, their bounds, and resolution of block parameters.
//!
//! Compression starts from a row of the level table, applies explicit
//! overrides, and finally shrinks the window and tables to fit the source
//! when its size is known.

use zframe_core::CompressionLevel;

/// Inclusive range of accepted values for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Smallest accepted value.
    pub lower: i32,
    /// Largest accepted value.
    pub upper: i32,
}

impl Bounds {
    /// Create a range.
    pub const fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    /// Whether `value` lies inside the range.
    pub fn contains(&self, value: i32) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

/// Match finding strategy, from fastest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
    /// Single hash probe.
    Fast = 1,
    /// Two hash probes.
    Dfast = 2,
    /// Hash chain, first acceptable match.
    Greedy = 3,
    /// Hash chain with one step of lazy evaluation.
    Lazy = 4,
    /// Hash chain with two steps of lazy evaluation.
    Lazy2 = 5,
    /// Deeper lazy2 search.
    Btlazy2 = 6,
    /// Lazy2 with an early-exit target length.
    Btopt = 7,
    /// Like `Btopt`, searching further.
    Btultra = 8,
    /// Strongest search.
    Btultra2 = 9,
}

impl Strategy {
    /// Numeric value used by the parameter interface.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Strategy for a numeric value.
    pub fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::Fast,
            2 => Self::Dfast,
            3 => Self::Greedy,
            4 => Self::Lazy,
            5 => Self::Lazy2,
            6 => Self::Btlazy2,
            7 => Self::Btopt,
            8 => Self::Btultra,
            9 => Self::Btultra2,
            _ => return None,
        })
    }
}

/// Compression parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompressionParameter {
    /// Compression level.
    CompressionLevel,
    /// Log2 of the window size.
    WindowLog,
    /// Log2 of the hash table size.
    HashLog,
    /// Log2 of the chain table size.
    ChainLog,
    /// Log2 of the number of chain steps per search.
    SearchLog,
    /// Minimum match length.
    MinMatch,
    /// Strategy dependent length target.
    TargetLength,
    /// Match finding strategy.
    Strategy,
    /// Enable long-distance matching.
    EnableLongDistanceMatching,
    /// Log2 of the long-distance table size.
    LdmHashLog,
    /// Minimum long-distance match length.
    LdmMinMatch,
    /// Log2 of the long-distance bucket size.
    LdmBucketSizeLog,
    /// Log2 of the long-distance insertion rate.
    LdmHashRateLog,
    /// Write the content size when known.
    ContentSizeFlag,
    /// Append a content checksum.
    ChecksumFlag,
    /// Write the dictionary id.
    DictIdFlag,
    /// Number of worker threads; 0 compresses on the caller's thread.
    NbWorkers,
    /// Bytes per worker job.
    JobSize,
    /// History shared between consecutive jobs, as a fraction of the window.
    OverlapLog,
}

impl CompressionParameter {
    /// Every key, in declaration order.
    pub const ALL: [Self; 19] = [
        Self::CompressionLevel,
        Self::WindowLog,
        Self::HashLog,
        Self::ChainLog,
        Self::SearchLog,
        Self::MinMatch,
        Self::TargetLength,
        Self::Strategy,
        Self::EnableLongDistanceMatching,
        Self::LdmHashLog,
        Self::LdmMinMatch,
        Self::LdmBucketSizeLog,
        Self::LdmHashRateLog,
        Self::ContentSizeFlag,
        Self::ChecksumFlag,
        Self::DictIdFlag,
        Self::NbWorkers,
        Self::JobSize,
        Self::OverlapLog,
    ];

    /// Parameter name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::CompressionLevel => "compression_level",
            Self::WindowLog => "window_log",
            Self::HashLog => "hash_log",
            Self::ChainLog => "chain_log",
            Self::SearchLog => "search_log",
            Self::MinMatch => "min_match",
            Self::TargetLength => "target_length",
            Self::Strategy => "strategy",
            Self::EnableLongDistanceMatching => "enable_long_distance_matching",
            Self::LdmHashLog => "ldm_hash_log",
            Self::LdmMinMatch => "ldm_min_match",
            Self::LdmBucketSizeLog => "ldm_bucket_size_log",
            Self::LdmHashRateLog => "ldm_hash_rate_log",
            Self::ContentSizeFlag => "content_size_flag",
            Self::ChecksumFlag => "checksum_flag",
            Self::DictIdFlag => "dict_id_flag",
            Self::NbWorkers => "nb_workers",
            Self::JobSize => "job_size",
            Self::OverlapLog => "overlap_log",
        }
    }

    /// Whether the key is one of the on/off flags, for which 0 means off.
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Self::EnableLongDistanceMatching
                | Self::ContentSizeFlag
                | Self::ChecksumFlag
                | Self::DictIdFlag
        )
    }

    /// Accepted values with the default codec, or `None` when this build
    /// does not support the key.
    pub fn bounds(self) -> Option<Bounds> {
        let bounds = match self {
            Self::CompressionLevel => {
                Bounds::new(CompressionLevel::MIN.level(), CompressionLevel::MAX.level())
            }
            Self::WindowLog => Bounds::new(10, 31),
            Self::HashLog | Self::ChainLog => Bounds::new(6, 30),
            Self::SearchLog => Bounds::new(1, 30),
            Self::MinMatch => Bounds::new(3, 7),
            Self::TargetLength => Bounds::new(0, 131_072),
            Self::Strategy => Bounds::new(1, 9),
            Self::EnableLongDistanceMatching
            | Self::ContentSizeFlag
            | Self::ChecksumFlag
            | Self::DictIdFlag => Bounds::new(0, 1),
            Self::LdmHashLog => Bounds::new(6, 30),
            Self::LdmMinMatch => Bounds::new(4, 4096),
            Self::LdmBucketSizeLog => Bounds::new(1, 8),
            Self::LdmHashRateLog => Bounds::new(0, 25),
            Self::NbWorkers | Self::JobSize | Self::OverlapLog => return Self::parallel_bounds(self),
        };
        Some(bounds)
    }

    #[cfg(feature = "parallel")]
    fn parallel_bounds(self) -> Option<Bounds> {
        match self {
            Self::NbWorkers => Some(Bounds::new(0, 200)),
            Self::JobSize => Some(Bounds::new(0, 1 << 30)),
            Self::OverlapLog => Some(Bounds::new(0, 9)),
            _ => None,
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn parallel_bounds(self) -> Option<Bounds> {
        None
    }
}

/// Decompression parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecompressionParameter {
    /// Log2 of the largest window the decoder accepts.
    WindowLogMax,
}

impl DecompressionParameter {
    /// Default for [`DecompressionParameter::WindowLogMax`].
    pub const DEFAULT_WINDOW_LOG_MAX: u32 = 27;

    /// Parameter name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::WindowLogMax => "window_log_max",
        }
    }

    /// Accepted values.
    pub fn bounds(self) -> Option<Bounds> {
        match self {
            Self::WindowLogMax => Some(Bounds::new(10, 31)),
        }
    }
}

/// Long-distance matching configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LdmParams {
    /// Log2 of the table size.
    pub hash_log: u8,
    /// Minimum match length.
    pub min_match: u32,
    /// Log2 of entries per bucket.
    pub bucket_size_log: u8,
    /// One position in `2^hash_rate_log` is inserted.
    pub hash_rate_log: u8,
}

/// Explicit parameter values that replace level table entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamOverrides {
    /// Window log.
    pub window_log: Option<u8>,
    /// Hash log.
    pub hash_log: Option<u8>,
    /// Chain log.
    pub chain_log: Option<u8>,
    /// Search log.
    pub search_log: Option<u8>,
    /// Minimum match.
    pub min_match: Option<u8>,
    /// Target length.
    pub target_length: Option<u32>,
    /// Strategy.
    pub strategy: Option<Strategy>,
    /// Long-distance matching switch.
    pub enable_ldm: bool,
    /// LDM hash log.
    pub ldm_hash_log: Option<u8>,
    /// LDM minimum match.
    pub ldm_min_match: Option<u32>,
    /// LDM bucket size log.
    pub ldm_bucket_size_log: Option<u8>,
    /// LDM hash rate log.
    pub ldm_hash_rate_log: Option<u8>,
}

/// Fully resolved parameters for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockParams {
    /// Log2 of the window size.
    pub window_log: u8,
    /// Log2 of the hash table size.
    pub hash_log: u8,
    /// Log2 of the chain table size.
    pub chain_log: u8,
    /// Log2 of chain steps per search.
    pub search_log: u8,
    /// Minimum match length.
    pub min_match: u8,
    /// Strategy dependent length target; for negative levels, the
    /// acceleration factor.
    pub target_length: u32,
    /// Match finding strategy.
    pub strategy: Strategy,
    /// Long-distance matching, when enabled.
    pub ldm: Option<LdmParams>,
}

/// Window log used when long-distance matching is enabled.
pub const LDM_WINDOW_LOG: u8 = 27;

/// Largest table log actually allocated.
pub const MAX_TABLE_LOG: u8 = 22;

// wlog, clog, hlog, slog, mml, tlen, strategy
const LEVEL_TABLE: [(u8, u8, u8, u8, u8, u32, Strategy); 23] = [
    (19, 12, 13, 1, 6, 1, Strategy::Fast),
    (19, 13, 14, 1, 7, 0, Strategy::Fast),
    (20, 15, 16, 1, 6, 0, Strategy::Fast),
    (21, 16, 17, 1, 5, 0, Strategy::Dfast),
    (21, 18, 18, 1, 5, 0, Strategy::Dfast),
    (21, 18, 19, 3, 5, 2, Strategy::Greedy),
    (21, 18, 19, 3, 5, 4, Strategy::Lazy),
    (21, 19, 20, 4, 5, 8, Strategy::Lazy),
    (21, 19, 20, 4, 5, 16, Strategy::Lazy2),
    (22, 20, 21, 4, 5, 16, Strategy::Lazy2),
    (22, 21, 22, 5, 5, 16, Strategy::Lazy2),
    (22, 21, 22, 6, 5, 16, Strategy::Lazy2),
    (22, 22, 23, 6, 5, 32, Strategy::Lazy2),
    (22, 22, 22, 4, 5, 32, Strategy::Btlazy2),
    (22, 22, 23, 5, 5, 32, Strategy::Btlazy2),
    (22, 23, 23, 6, 5, 32, Strategy::Btlazy2),
    (22, 22, 22, 5, 5, 48, Strategy::Btopt),
    (23, 23, 22, 5, 4, 64, Strategy::Btopt),
    (23, 23, 22, 6, 3, 64, Strategy::Btultra),
    (23, 24, 22, 7, 3, 256, Strategy::Btultra2),
    (25, 25, 23, 7, 3, 256, Strategy::Btultra2),
    (26, 26, 24, 7, 3, 512, Strategy::Btultra2),
    (27, 27, 25, 9, 3, 999, Strategy::Btultra2),
];

impl BlockParams {
    /// Parameters of a level, before any adjustment.
    pub fn for_level(level: CompressionLevel) -> Self {
        let level = level.level();
        let row = if level < 0 { 0 } else { level.clamp(1, 22) as usize };
        let (window_log, chain_log, hash_log, search_log, min_match, target_length, strategy) =
            LEVEL_TABLE[row];
        let target_length = if level < 0 {
            level.unsigned_abs()
        } else {
            target_length
        };
        Self {
            window_log,
            hash_log,
            chain_log,
            search_log,
            min_match,
            target_length,
            strategy,
            ldm: None,
        }
    }

    /// Resolve the parameters of a frame.
    ///
    /// `source_size` is the content size when known; `dict_size` the bytes of
    /// history that precede it.
    pub fn resolve(
        level: CompressionLevel,
        overrides: &ParamOverrides,
        source_size: Option<u64>,
        dict_size: usize,
    ) -> Self {
        let mut params = Self::for_level(level);
        if overrides.enable_ldm {
            params.window_log = LDM_WINDOW_LOG;
        }

        if let Some(v) = overrides.window_log {
            params.window_log = v;
        }
        if let Some(v) = overrides.hash_log {
            params.hash_log = v;
        }
        if let Some(v) = overrides.chain_log {
            params.chain_log = v;
        }
        if let Some(v) = overrides.search_log {
            params.search_log = v;
        }
        if let Some(v) = overrides.min_match {
            params.min_match = v;
        }
        if let Some(v) = overrides.target_length {
            params.target_length = v;
        }
        if let Some(v) = overrides.strategy {
            params.strategy = v;
        }

        if let Some(size) = source_size {
            let total = size.saturating_add(dict_size as u64).max(1);
            if total < 1 << 30 {
                let source_log = if total <= 1 {
                    1
                } else {
                    (64 - (total - 1).leading_zeros()) as u8
                };
                params.window_log = params.window_log.min(source_log.max(10));
            }
        }
        params.hash_log = params.hash_log.min(params.window_log + 1);
        params.chain_log = params.chain_log.min(params.window_log + 1);

        if overrides.enable_ldm {
            let hash_log = overrides
                .ldm_hash_log
                .unwrap_or_else(|| params.window_log.saturating_sub(7).max(6));
            params.ldm = Some(LdmParams {
                hash_log,
                min_match: overrides.ldm_min_match.unwrap_or(64),
                bucket_size_log: overrides.ldm_bucket_size_log.unwrap_or(3),
                hash_rate_log: overrides
                    .ldm_hash_rate_log
                    .unwrap_or_else(|| params.window_log.saturating_sub(hash_log)),
            });
        }
        params
    }

    /// Window size in bytes.
    pub fn window_size(&self) -> u64 {
        1u64 << self.window_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_table_rows() {
        let p = BlockParams::for_level(CompressionLevel::DEFAULT);
        assert_eq!(p.window_log, 21);
        assert_eq!(p.strategy, Strategy::Dfast);

        let p = BlockParams::for_level(CompressionLevel::new(19));
        assert_eq!((p.window_log, p.chain_log, p.hash_log), (23, 24, 22));
        assert_eq!(p.strategy, Strategy::Btultra2);
    }

    #[test]
    fn test_negative_level_accelerates() {
        let p = BlockParams::for_level(CompressionLevel::new(-5));
        assert_eq!(p.strategy, Strategy::Fast);
        assert_eq!(p.target_length, 5);
    }

    #[test]
    fn test_small_source_shrinks_window() {
        let p = BlockParams::resolve(
            CompressionLevel::new(19),
            &ParamOverrides::default(),
            Some(5000),
            0,
        );
        assert_eq!(p.window_log, 13);
        assert!(p.hash_log <= 14);
        assert!(p.chain_log <= 14);

        let p = BlockParams::resolve(CompressionLevel::DEFAULT, &ParamOverrides::default(), Some(0), 0);
        assert_eq!(p.window_log, 10);
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = ParamOverrides {
            window_log: Some(18),
            strategy: Some(Strategy::Lazy2),
            min_match: Some(4),
            ..ParamOverrides::default()
        };
        let p = BlockParams::resolve(CompressionLevel::new(1), &overrides, None, 0);
        assert_eq!(p.window_log, 18);
        assert_eq!(p.strategy, Strategy::Lazy2);
        assert_eq!(p.min_match, 4);
    }

    #[test]
    fn test_ldm_defaults() {
        let overrides = ParamOverrides {
            enable_ldm: true,
            ..ParamOverrides::default()
        };
        let p = BlockParams::resolve(CompressionLevel::DEFAULT, &overrides, None, 0);
        assert_eq!(p.window_log, LDM_WINDOW_LOG);
        let ldm = p.ldm.unwrap();
        assert_eq!(ldm.hash_log, 20);
        assert_eq!(ldm.hash_rate_log, 7);
        assert_eq!(ldm.min_match, 64);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(
            CompressionParameter::CompressionLevel.bounds(),
            Some(Bounds::new(-131_072, 22))
        );
        assert!(CompressionParameter::WindowLog.bounds().unwrap().contains(31));
        assert!(!CompressionParameter::MinMatch.bounds().unwrap().contains(8));
        assert_eq!(
            DecompressionParameter::WindowLogMax.bounds(),
            Some(Bounds::new(10, 31))
        );
        assert!(CompressionParameter::ChecksumFlag.is_flag());
        assert_eq!(CompressionParameter::ALL.len(), 19);
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn test_worker_keys_unsupported_without_parallel() {
        assert!(CompressionParameter::NbWorkers.bounds().is_none());
        assert!(CompressionParameter::OverlapLog.bounds().is_none());
    }

    #[test]
    fn test_strategy_values() {
        assert_eq!(Strategy::from_value(9), Some(Strategy::Btultra2));
        assert_eq!(Strategy::Greedy.value(), 3);
        assert!(Strategy::from_value(0).is_none());
    }
}
