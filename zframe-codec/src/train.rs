//! Dictionary training.
//!
//! Content selection scores fixed-size segments of the samples by how many
//! samples share their 8-byte substrings (d-mers). The samples are split
//! into epochs; each epoch contributes its best segment, and the d-mers of
//! a chosen segment stop counting for later epochs. Segments are placed so
//! that the first choice ends up closest to the data being compressed.
//!
//! Entropy statistics for finalization come from parsing the samples with
//! the dictionary content as history.

use std::collections::{HashMap, HashSet};

use crate::entropy::{DICT_MAGIC, EntropyStatistics, EntropyTables};
use crate::fse::highbit;
use crate::literals::BLOCK_SIZE_MAX;
use crate::matcher::{MatchFinder, MatcherConfig};
use crate::params::BlockParams;
use crate::sequences::{literal_length_code, match_length_code};
use zframe_core::error::{Result, ZframeError};
use zframe_core::xxhash::xxhash64;

const DMER: usize = 8;

/// Smallest dictionary id handed to generated dictionaries.
const MIN_DICT_ID: u64 = 32_768;

/// Generated ids stay below `2^31`.
const DICT_ID_RANGE: u64 = (1 << 31) - MIN_DICT_ID;

/// Shortest content that satisfies the default repeat offsets.
const MIN_CONTENT: usize = 8;

fn segment_size(capacity: usize) -> usize {
    (capacity / 16).clamp(16, 1024).max(DMER)
}

/// D-mer key of every position in the concatenated samples; `None` where
/// the d-mer would cross a sample boundary.
fn dmer_keys(samples: &[&[u8]]) -> Vec<Option<u64>> {
    let mut keys = Vec::with_capacity(samples.iter().map(|s| s.len()).sum());
    for sample in samples {
        for pos in 0..sample.len() {
            let key = sample.get(pos..pos + DMER).map(|bytes| {
                let mut raw = [0u8; DMER];
                raw.copy_from_slice(bytes);
                u64::from_le_bytes(raw)
            });
            keys.push(key);
        }
    }
    keys
}

/// Number of samples containing each d-mer.
fn sample_frequencies(samples: &[&[u8]], keys: &[Option<u64>]) -> HashMap<u64, u32> {
    let mut freqs = HashMap::new();
    let mut start = 0;
    for sample in samples {
        let seen: HashSet<u64> = keys[start..start + sample.len()]
            .iter()
            .flatten()
            .copied()
            .collect();
        for key in seen {
            *freqs.entry(key).or_insert(0) += 1;
        }
        start += sample.len();
    }
    freqs
}

/// Best segment of `k` positions in `keys[begin..end]`; first maximum wins.
fn best_segment(
    keys: &[Option<u64>],
    begin: usize,
    end: usize,
    k: usize,
    freqs: &HashMap<u64, u32>,
) -> Option<(usize, u64)> {
    if end < begin + k {
        return None;
    }
    let freq = |key: u64| u64::from(freqs.get(&key).copied().unwrap_or(0));
    let mut active: HashMap<u64, u32> = HashMap::new();
    let mut score = 0u64;
    let mut best: Option<(usize, u64)> = None;

    for pos in begin..end {
        if let Some(key) = keys[pos] {
            let count = active.entry(key).or_insert(0);
            if *count == 0 {
                score += freq(key);
            }
            *count += 1;
        }
        if pos + 1 < begin + k {
            continue;
        }
        let seg_start = pos + 1 - k;
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((seg_start, score));
        }
        if let Some(key) = keys[seg_start] {
            if let Some(count) = active.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    active.remove(&key);
                    score -= freq(key);
                }
            }
        }
    }
    best.filter(|&(_, s)| s > 0)
}

/// Select up to `capacity` bytes of dictionary content from `samples`.
pub fn train_content(samples: &[&[u8]], capacity: usize) -> Result<Vec<u8>> {
    if samples.is_empty() || capacity == 0 {
        return Err(ZframeError::invalid_config(
            "training needs samples and a nonzero capacity",
        ));
    }
    let flat: Vec<u8> = samples.concat();
    let keys = dmer_keys(samples);
    let mut freqs = sample_frequencies(samples, &keys);

    let k = segment_size(capacity);
    let epochs = (capacity / k).max(1);
    let epoch_size = (flat.len() / epochs).max(k);

    let mut chosen: Vec<&[u8]> = Vec::new();
    let mut size = 0;
    let mut begin = 0;
    while begin < flat.len() && size < capacity {
        let end = (begin + epoch_size).min(flat.len());
        if let Some((start, _)) = best_segment(&keys, begin, end, k, &freqs) {
            let take = k.min(capacity - size);
            chosen.push(&flat[start..start + take]);
            size += take;
            for key in keys[start..start + k].iter().flatten() {
                if let Some(freq) = freqs.get_mut(key) {
                    *freq = 0;
                }
            }
        }
        begin = end;
    }

    if chosen.is_empty() {
        let start = flat.len().saturating_sub(capacity);
        return Ok(flat[start..].to_vec());
    }
    Ok(chosen.iter().rev().flat_map(|s| s.iter().copied()).collect())
}

/// Count literal bytes and sequence codes produced by parsing every sample
/// with `content` as preceding history.
pub fn gather_statistics(
    content: &[u8],
    samples: &[&[u8]],
    params: &BlockParams,
) -> Result<EntropyStatistics> {
    if samples.is_empty() {
        return Err(ZframeError::invalid_config("no samples to gather statistics from"));
    }
    let mut template = MatchFinder::new(MatcherConfig::from(params));
    template.load_dictionary(content);
    let mut finder = template.clone();

    let mut stats = EntropyStatistics::default();
    for sample in samples {
        finder.clone_from(&template);
        for block in sample.chunks(BLOCK_SIZE_MAX) {
            finder.append(block);
            let (sequences, literals) = finder.parse_block(block.len());
            for &byte in &literals {
                stats.literals[usize::from(byte)] += 1;
            }
            for seq in &sequences {
                stats.literal_lengths[usize::from(literal_length_code(seq.literal_length))] += 1;
                stats.match_lengths[usize::from(match_length_code(seq.match_length))] += 1;
                stats.offsets[highbit(seq.offset + 3) as usize] += 1;
            }
        }
    }
    Ok(stats)
}

/// Dictionary id derived from the content.
pub fn content_dict_id(content: &[u8]) -> u32 {
    (xxhash64(content) % DICT_ID_RANGE + MIN_DICT_ID) as u32
}

/// Assemble a structured dictionary no larger than `target_size`,
/// dropping content from the front when needed.
pub fn assemble_dictionary(
    content: &[u8],
    tables: &EntropyTables,
    target_size: usize,
) -> Result<Vec<u8>> {
    let mut entropy = Vec::new();
    tables.write(&mut entropy)?;
    let header = 8 + entropy.len();
    if header + MIN_CONTENT > target_size {
        return Err(ZframeError::invalid_config(format!(
            "dictionary size {target_size} is too small for its {header} byte header"
        )));
    }
    let room = target_size - header;
    let content = &content[content.len().saturating_sub(room)..];
    if content.len() < MIN_CONTENT {
        return Err(ZframeError::invalid_config(format!(
            "dictionary content of {} bytes is too small",
            content.len()
        )));
    }

    let mut out = Vec::with_capacity(header + content.len());
    out.extend_from_slice(&DICT_MAGIC.to_le_bytes());
    out.extend_from_slice(&content_dict_id(content).to_le_bytes());
    out.extend_from_slice(&entropy);
    out.extend_from_slice(content);
    Ok(out)
}
