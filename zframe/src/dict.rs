//! Dictionaries.
//!
//! A [`ZstdDict`] is immutable and cheap to clone. Structured dictionaries
//! (magic, id, entropy tables, content) are parsed once at construction;
//! raw dictionaries are pure history.
//!
//! Sessions never use a dictionary directly but through a [`DictUsage`],
//! which selects how it is loaded:
//!
//! | Mode | Entropy tables | Match index | Frame dictionary id |
//! |---|---|---|---|
//! | `Digested` | shared | shared, cached per parameter set | yes |
//! | `Undigested` | parsed per session | built per session | yes |
//! | `Prefix` | none | built per session | no |
//!
//! `Auto` is digested for decompression and undigested for compression.
//! Digested and undigested loading produce identical output.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use zframe_codec::{
    BlockCodec, BlockParams, DICT_MAGIC, DictionaryIndex, DictionaryView, EntropyTables,
    ParamOverrides, ZstdBlockCodec,
};
use zframe_core::error::{Result, ZframeError};
use zframe_core::CompressionLevel;

/// Shortest accepted dictionary.
pub const MIN_DICT_SIZE: usize = 8;

struct DictInner {
    content: Vec<u8>,
    dict_id: u32,
    is_raw: bool,
    /// Start of the history part of `content`.
    history_start: usize,
    entropy: Option<Arc<EntropyTables>>,
    indexes: Mutex<BTreeMap<BlockParams, DictionaryIndex>>,
}

/// A compression dictionary.
#[derive(Clone)]
pub struct ZstdDict {
    inner: Arc<DictInner>,
}

impl fmt::Debug for ZstdDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdDict")
            .field("dict_id", &self.inner.dict_id)
            .field("is_raw", &self.inner.is_raw)
            .field("size", &self.inner.content.len())
            .finish()
    }
}

fn magic_id(content: &[u8]) -> Option<u32> {
    let header = content.get(..8)?;
    if u32::from_le_bytes([header[0], header[1], header[2], header[3]]) != DICT_MAGIC {
        return None;
    }
    Some(u32::from_le_bytes([header[4], header[5], header[6], header[7]]))
}

impl ZstdDict {
    /// Create a dictionary from its bytes.
    ///
    /// Content shorter than 8 bytes is rejected. With `is_raw == false` the
    /// content must be a structured dictionary. The id is read from the
    /// header whenever the content starts with the dictionary magic, even
    /// for raw dictionaries.
    pub fn new(content: impl Into<Vec<u8>>, is_raw: bool) -> Result<Self> {
        let content = content.into();
        if content.len() < MIN_DICT_SIZE {
            return Err(ZframeError::invalid_config(format!(
                "dictionary content must be at least {MIN_DICT_SIZE} bytes, got {}",
                content.len()
            )));
        }
        let dict_id = magic_id(&content).unwrap_or(0);

        let (entropy, history_start) = if is_raw {
            (None, 0)
        } else {
            if magic_id(&content).is_none() {
                return Err(ZframeError::invalid_magic(
                    DICT_MAGIC.to_le_bytes(),
                    &content[..4],
                ));
            }
            let (tables, used) = EntropyTables::parse(&content[8..])?;
            (Some(Arc::new(tables)), 8 + used)
        };

        Ok(Self {
            inner: Arc::new(DictInner {
                content,
                dict_id,
                is_raw,
                history_start,
                entropy,
                indexes: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    /// Train a dictionary of at most `target_size` bytes with the default
    /// codec.
    pub fn train<S: AsRef<[u8]>>(samples: &[S], target_size: usize) -> Result<Self> {
        Self::train_with(&ZstdBlockCodec::new(), samples, target_size)
    }

    /// Train a dictionary with `codec`'s training primitive.
    ///
    /// The result is a structured dictionary whose tables come from
    /// compressing the samples at the default level.
    pub fn train_with<S: AsRef<[u8]>>(
        codec: &dyn BlockCodec,
        samples: &[S],
        target_size: usize,
    ) -> Result<Self> {
        let samples: Vec<&[u8]> = samples.iter().map(AsRef::as_ref).collect();
        check_training_input(&samples, target_size)?;
        let content = codec.train_content(&samples, target_size)?;
        debug!(
            samples = samples.len(),
            target_size,
            content = content.len(),
            "trained dictionary content"
        );
        build_structured(codec, &content, &samples, target_size, CompressionLevel::DEFAULT)
    }

    /// Re-derive the entropy tables of `base` from `samples` compressed at
    /// `level`.
    pub fn finalize<S: AsRef<[u8]>>(
        base: &ZstdDict,
        samples: &[S],
        target_size: usize,
        level: i32,
    ) -> Result<Self> {
        let codec = ZstdBlockCodec::new();
        let samples: Vec<&[u8]> = samples.iter().map(AsRef::as_ref).collect();
        check_training_input(&samples, target_size)?;
        debug!(
            base_id = base.dict_id(),
            samples = samples.len(),
            target_size,
            level,
            "finalizing dictionary"
        );
        build_structured(
            &codec,
            base.history(),
            &samples,
            target_size,
            CompressionLevel::new(level),
        )
    }

    /// The dictionary bytes as given.
    pub fn dict_content(&self) -> &[u8] {
        &self.inner.content
    }

    /// Dictionary id, 0 when the content carries none.
    pub fn dict_id(&self) -> u32 {
        self.inner.dict_id
    }

    /// Whether the dictionary is raw content.
    pub fn is_raw(&self) -> bool {
        self.inner.is_raw
    }

    /// Use as a prefix: raw history with no tables and no id.
    pub fn as_prefix(&self) -> DictUsage {
        DictUsage::new(self, DictMode::Prefix)
    }

    /// Use with shared, cached tables and match index.
    pub fn as_digested_dict(&self) -> DictUsage {
        DictUsage::new(self, DictMode::Digested)
    }

    /// Use with tables and index prepared per session.
    pub fn as_undigested_dict(&self) -> DictUsage {
        DictUsage::new(self, DictMode::Undigested)
    }

    /// History that precedes frame content.
    fn history(&self) -> &[u8] {
        &self.inner.content[self.inner.history_start..]
    }

    /// Cached match index for the parameters' key, built on first use.
    fn shared_index(&self, codec: &dyn BlockCodec, params: &BlockParams) -> DictionaryIndex {
        let key = codec.index_key(params);
        let mut indexes = self
            .inner
            .indexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        indexes
            .entry(key)
            .or_insert_with(|| {
                debug!(dict_id = self.dict_id(), ?key, "building dictionary index");
                codec.index_dictionary(self.history(), &key)
            })
            .clone()
    }
}

fn check_training_input(samples: &[&[u8]], target_size: usize) -> Result<()> {
    if samples.is_empty() {
        return Err(ZframeError::invalid_config("no samples to train on"));
    }
    if target_size == 0 {
        return Err(ZframeError::invalid_config(
            "dictionary target size must be positive",
        ));
    }
    Ok(())
}

fn build_structured(
    codec: &dyn BlockCodec,
    content: &[u8],
    samples: &[&[u8]],
    target_size: usize,
    level: CompressionLevel,
) -> Result<ZstdDict> {
    let largest = samples.iter().map(|s| s.len() as u64).max();
    let params = BlockParams::resolve(level, &ParamOverrides::default(), largest, content.len());
    let stats = codec.gather_statistics(content, samples, &params)?;
    let tables = EntropyTables::from_statistics(&stats)?;
    let bytes = zframe_codec::train::assemble_dictionary(content, &tables, target_size)?;
    ZstdDict::new(bytes, false)
}

/// How a session loads a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DictMode {
    /// Digested for decompression, undigested for compression.
    #[default]
    Auto,
    /// Shared tables and match index.
    Digested,
    /// Tables and index prepared per session.
    Undigested,
    /// Raw history with no tables and no id.
    Prefix,
}

/// A dictionary together with its loading mode.
#[derive(Debug, Clone)]
pub struct DictUsage {
    dict: ZstdDict,
    mode: DictMode,
}

impl DictUsage {
    /// Pair a dictionary with a mode.
    pub fn new(dict: &ZstdDict, mode: DictMode) -> Self {
        Self {
            dict: dict.clone(),
            mode,
        }
    }

    /// The dictionary.
    pub fn dict(&self) -> &ZstdDict {
        &self.dict
    }

    /// The loading mode.
    pub fn mode(&self) -> DictMode {
        self.mode
    }

    /// Dictionary id written to and expected in frame headers.
    pub(crate) fn frame_dict_id(&self) -> u32 {
        if self.mode == DictMode::Prefix || self.dict.is_raw() {
            0
        } else {
            self.dict.dict_id()
        }
    }

    /// Bytes of history that precede frame content.
    pub(crate) fn history(&self) -> &[u8] {
        match self.mode {
            DictMode::Prefix => self.dict.dict_content(),
            _ => self.dict.history(),
        }
    }

    fn entropy(&self, digested: bool) -> Result<Option<Arc<EntropyTables>>> {
        if self.mode == DictMode::Prefix {
            return Ok(None);
        }
        let Some(shared) = &self.dict.inner.entropy else {
            return Ok(None);
        };
        if digested {
            return Ok(Some(Arc::clone(shared)));
        }
        let (tables, _) = EntropyTables::parse(&self.dict.dict_content()[8..])?;
        Ok(Some(Arc::new(tables)))
    }

    /// Load for a compression frame with `params`.
    pub(crate) fn prepare_compression(
        &self,
        codec: &dyn BlockCodec,
        params: &BlockParams,
    ) -> Result<PreparedDict> {
        let digested = self.mode == DictMode::Digested;
        let index = digested.then(|| self.dict.shared_index(codec, params));
        Ok(PreparedDict {
            usage: self.clone(),
            entropy: self.entropy(digested)?,
            index,
        })
    }

    /// Load for decompression.
    pub(crate) fn prepare_decompression(&self) -> Result<PreparedDict> {
        let digested = matches!(self.mode, DictMode::Auto | DictMode::Digested);
        Ok(PreparedDict {
            usage: self.clone(),
            entropy: self.entropy(digested)?,
            index: None,
        })
    }
}

impl From<&ZstdDict> for DictUsage {
    fn from(dict: &ZstdDict) -> Self {
        Self::new(dict, DictMode::Auto)
    }
}

impl From<ZstdDict> for DictUsage {
    fn from(dict: ZstdDict) -> Self {
        Self { dict, mode: DictMode::Auto }
    }
}

/// A dictionary loaded for one session.
#[derive(Debug, Clone)]
pub(crate) struct PreparedDict {
    usage: DictUsage,
    entropy: Option<Arc<EntropyTables>>,
    index: Option<DictionaryIndex>,
}

impl PreparedDict {
    pub(crate) fn frame_dict_id(&self) -> u32 {
        self.usage.frame_dict_id()
    }

    pub(crate) fn history(&self) -> &[u8] {
        self.usage.history()
    }

    pub(crate) fn view(&self) -> DictionaryView<'_> {
        DictionaryView {
            content: self.usage.history(),
            entropy: self.entropy.as_deref(),
            index: self.index.as_ref(),
        }
    }
}
