//! Match finding over a sliding history buffer.
//!
//! The finder keeps the frame history (dictionary content first, then every
//! block seen so far) in one buffer, indexed by a hash table and a chain
//! table. Table entries hold `position + 1`, so zero means empty. When the
//! buffer grows past twice the window, the oldest bytes are dropped and all
//! table entries are rebased.
//!
//! Parsing follows the strategy: a single hash probe for the fast
//! strategies, chain search with optional lazy evaluation for the others,
//! and an optional long-distance table for far matches.

use crate::literals::BLOCK_SIZE_MAX;
use crate::params::{BlockParams, LdmParams, MAX_TABLE_LOG, Strategy};
use crate::sequences::Sequence;

/// Minimum match length the format can express.
pub const MIN_MATCH: usize = 3;

/// Largest window the finder keeps history for.
const MAX_HISTORY_LOG: u8 = 30;

/// Upper limit on chain steps per search.
const MAX_ATTEMPTS: usize = 1 << 12;

const HASH_PRIME: u32 = 2_654_435_761;

/// Matcher settings derived from block parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatcherConfig {
    strategy: Strategy,
    window_log: u8,
    hash_log: u8,
    chain_log: u8,
    search_log: u8,
    min_match: usize,
    target_length: u32,
    ldm: Option<LdmParams>,
}

impl From<&BlockParams> for MatcherConfig {
    fn from(params: &BlockParams) -> Self {
        Self {
            strategy: params.strategy,
            window_log: params.window_log.min(MAX_HISTORY_LOG),
            hash_log: params.hash_log.min(MAX_TABLE_LOG),
            chain_log: params.chain_log.min(MAX_TABLE_LOG),
            search_log: params.search_log,
            min_match: usize::from(params.min_match).max(MIN_MATCH),
            target_length: params.target_length,
            ldm: params.ldm,
        }
    }
}

impl MatcherConfig {
    fn uses_chain(&self) -> bool {
        self.strategy != Strategy::Fast
    }

    fn hash_bytes(&self) -> usize {
        if self.min_match == 3 { 3 } else { 4 }
    }

    fn attempts(&self) -> usize {
        let deep = 1usize << self.search_log.min(12);
        let attempts = match self.strategy {
            Strategy::Fast => 1,
            Strategy::Dfast => 2,
            Strategy::Greedy | Strategy::Lazy | Strategy::Lazy2 => deep,
            Strategy::Btlazy2 | Strategy::Btopt | Strategy::Btultra | Strategy::Btultra2 => {
                deep * 2
            }
        };
        attempts.min(MAX_ATTEMPTS)
    }

    fn lazy_depth(&self) -> usize {
        match self.strategy {
            Strategy::Fast | Strategy::Dfast | Strategy::Greedy => 0,
            Strategy::Lazy => 1,
            _ => 2,
        }
    }

    /// Match length that ends a search early.
    fn sufficient_length(&self) -> usize {
        match self.strategy {
            Strategy::Btopt | Strategy::Btultra | Strategy::Btultra2 if self.target_length > 0 => {
                self.target_length as usize
            }
            _ => usize::MAX,
        }
    }

    /// Extra step on misses; negative levels store their acceleration in
    /// the target length.
    fn acceleration(&self) -> usize {
        if self.strategy == Strategy::Fast {
            (self.target_length as usize).min(64)
        } else {
            0
        }
    }

    /// Settings that shape the index tables.
    pub fn table_key(&self) -> (u8, u8, bool, usize, Option<LdmParams>) {
        (
            self.hash_log,
            self.chain_log,
            self.uses_chain(),
            self.hash_bytes(),
            self.ldm,
        )
    }

    fn window_size(&self) -> usize {
        1usize << self.window_log
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    length: usize,
    offset: usize,
}

impl Match {
    /// Rough benefit in bits: longer is better, farther costs offset bits.
    fn gain(&self) -> i64 {
        4 * self.length as i64 - i64::from((self.offset as u32 + 1).ilog2())
    }
}

/// Length of the common prefix of `data[a..]` and `data[b..]`, up to `limit`.
fn common_prefix(data: &[u8], a: usize, b: usize, limit: usize) -> usize {
    let mut len = 0;
    while len + 8 <= limit {
        let x = read_u64(data, a + len) ^ read_u64(data, b + len);
        if x != 0 {
            return len + (x.trailing_zeros() / 8) as usize;
        }
        len += 8;
    }
    while len < limit && data[a + len] == data[b + len] {
        len += 1;
    }
    len
}

#[inline]
fn read_u64(data: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn rebase(entry: &mut u32, shift: u32) {
    *entry = entry.saturating_sub(shift);
}

/// Hash chain match finder.
#[derive(Debug, Clone)]
pub struct MatchFinder {
    config: MatcherConfig,
    buffer: Vec<u8>,
    /// Bytes dropped from the front of `buffer`.
    dropped: u64,
    /// Dictionary bytes preceding the frame content.
    dict_len: u64,
    hash_table: Vec<u32>,
    chain_table: Vec<u32>,
    next_to_update: usize,
    ldm: Option<LdmTable>,
    /// History before this position has been scanned by the LDM table.
    ldm_next: usize,
    ldm_matches: Vec<LdmMatch>,
    ldm_cursor: usize,
}

impl MatchFinder {
    /// Create a finder with empty history.
    pub fn new(config: MatcherConfig) -> Self {
        let chain_size = if config.uses_chain() {
            1 << config.chain_log
        } else {
            0
        };
        Self {
            config,
            buffer: Vec::new(),
            dropped: 0,
            dict_len: 0,
            hash_table: vec![0; 1 << config.hash_log],
            chain_table: vec![0; chain_size],
            next_to_update: 0,
            ldm: config.ldm.map(LdmTable::new),
            ldm_next: 0,
            ldm_matches: Vec::new(),
            ldm_cursor: 0,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.dropped = 0;
        self.dict_len = 0;
        self.hash_table.fill(0);
        self.chain_table.fill(0);
        self.next_to_update = 0;
        if let Some(ldm) = self.ldm.as_mut() {
            ldm.clear();
        }
        self.ldm_next = 0;
        self.ldm_matches.clear();
        self.ldm_cursor = 0;
    }

    /// Forget all history, then index `content` as preceding history.
    pub fn load_dictionary(&mut self, content: &[u8]) {
        self.reset();
        self.buffer.extend_from_slice(content);
        self.dict_len = content.len() as u64;
        self.index_all();
    }

    /// Take over a prepared dictionary index, keeping this finder's window.
    ///
    /// Returns `false` when the index tables have a different shape.
    pub fn adopt(&mut self, index: &MatchFinder) -> bool {
        if index.config.table_key() != self.config.table_key() {
            return false;
        }
        let config = self.config;
        self.clone_from(index);
        self.config = config;
        true
    }

    /// Append data and index it without producing sequences.
    pub fn extend_history(&mut self, data: &[u8]) {
        self.append(data);
        self.index_all();
    }

    fn index_all(&mut self) {
        let end = self.buffer.len();
        self.insert_up_to(end);
        if let Some(ldm) = self.ldm.as_mut() {
            ldm.scan(&self.buffer, self.ldm_next, end, None);
        }
        self.ldm_next = end;
    }

    /// Append a block to the history, dropping old bytes when needed.
    pub fn append(&mut self, data: &[u8]) {
        let keep = self.config.window_size();
        let limit = keep * 2 + BLOCK_SIZE_MAX;
        if self.buffer.len() + data.len() > limit && self.buffer.len() > keep {
            let shift = self.buffer.len() - keep;
            self.buffer.drain(..shift);
            self.dropped += shift as u64;
            let shift32 = u32::try_from(shift).unwrap_or(u32::MAX);
            self.hash_table.iter_mut().for_each(|e| rebase(e, shift32));
            self.chain_table.iter_mut().for_each(|e| rebase(e, shift32));
            self.next_to_update = self.next_to_update.saturating_sub(shift);
            self.ldm_next = self.ldm_next.saturating_sub(shift);
            if let Some(ldm) = self.ldm.as_mut() {
                ldm.rebase(shift32);
            }
        }
        self.buffer.extend_from_slice(data);
    }

    #[inline]
    fn hash(&self, pos: usize) -> usize {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buffer[pos..pos + 4]);
        let mut value = u32::from_le_bytes(bytes);
        if self.config.hash_bytes() == 3 {
            value <<= 8;
        }
        (value.wrapping_mul(HASH_PRIME) >> (32 - u32::from(self.config.hash_log))) as usize
    }

    fn insert_up_to(&mut self, target: usize) {
        let chain_mask = self.chain_table.len().wrapping_sub(1);
        while self.next_to_update < target && self.next_to_update + 4 <= self.buffer.len() {
            let pos = self.next_to_update;
            let h = self.hash(pos);
            if !self.chain_table.is_empty() {
                self.chain_table[pos & chain_mask] = self.hash_table[h];
            }
            self.hash_table[h] = (pos + 1) as u32;
            self.next_to_update += 1;
        }
    }

    /// Farthest distance a match starting at `pos` may reach back.
    fn max_distance(&self, pos: usize) -> usize {
        let frame_pos = (self.dropped + pos as u64).saturating_sub(self.dict_len);
        let window = self.config.window_size();
        if frame_pos <= window as u64 { pos } else { window.min(pos) }
    }

    fn find_match(&self, pos: usize, end: usize) -> Option<Match> {
        let min_match = self.config.min_match;
        if pos + 4 > end || pos + min_match > end {
            return None;
        }
        let limit = end - pos;
        let max_distance = self.max_distance(pos);
        let sufficient = self.config.sufficient_length();
        let chain_size = self.chain_table.len();
        let chain_mask = chain_size.wrapping_sub(1);

        let mut candidate = self.hash_table[self.hash(pos)] as usize;
        let mut attempts = self.config.attempts();
        let mut best: Option<Match> = None;
        let mut best_len = min_match - 1;

        while candidate != 0 && attempts > 0 {
            let p = candidate - 1;
            if p >= pos {
                break;
            }
            let distance = pos - p;
            if distance > max_distance {
                break;
            }

            // Quick reject on the byte that would extend the best match.
            if self.buffer[p + best_len] == self.buffer[pos + best_len] {
                let len = common_prefix(&self.buffer, p, pos, limit);
                if len > best_len {
                    best_len = len;
                    best = Some(Match {
                        length: len,
                        offset: distance,
                    });
                    if len == limit || len >= sufficient {
                        break;
                    }
                }
            }

            attempts -= 1;
            candidate = if chain_size == 0 || distance >= chain_size {
                0
            } else {
                self.chain_table[p & chain_mask] as usize
            };
        }
        best
    }

    fn ldm_match_at(&mut self, pos: usize) -> Option<Match> {
        while let Some(m) = self.ldm_matches.get(self.ldm_cursor) {
            if m.pos < pos {
                self.ldm_cursor += 1;
                continue;
            }
            if m.pos == pos {
                return Some(Match {
                    length: m.length,
                    offset: m.offset,
                });
            }
            break;
        }
        None
    }

    fn best_match(&mut self, pos: usize, end: usize) -> Option<Match> {
        self.insert_up_to(pos);
        let regular = self.find_match(pos, end);
        match (regular, self.ldm_match_at(pos)) {
            (Some(r), Some(l)) if l.length > r.length => Some(l),
            (None, Some(l)) => Some(l),
            (r, _) => r,
        }
    }

    /// Split the last `len` bytes of the history into sequences.
    ///
    /// Returns the sequences and the literal bytes, trailing literals
    /// included.
    pub fn parse_block(&mut self, len: usize) -> (Vec<Sequence>, Vec<u8>) {
        let end = self.buffer.len();
        let start = end - len;

        self.ldm_matches.clear();
        self.ldm_cursor = 0;
        if let Some(mut ldm) = self.ldm.take() {
            let limits = DistanceLimits {
                dropped: self.dropped,
                dict_len: self.dict_len,
                window: self.config.window_size(),
            };
            self.ldm_matches = ldm.scan(&self.buffer, start, end, Some(limits));
            self.ldm = Some(ldm);
        }
        self.ldm_next = end;

        let mut sequences = Vec::new();
        let mut literals = Vec::with_capacity(len / 2);
        let skip_log = if self.config.strategy == Strategy::Fast { 6 } else { 8 };
        let acceleration = self.config.acceleration();
        let lazy_depth = self.config.lazy_depth();

        let mut anchor = start;
        let mut pos = start;
        while pos + MIN_MATCH < end {
            let Some(mut found) = self.best_match(pos, end) else {
                pos += 1 + ((pos - anchor) >> skip_log) + acceleration;
                continue;
            };

            let mut match_pos = pos;
            for _ in 0..lazy_depth {
                let next = match_pos + 1;
                if next + MIN_MATCH >= end {
                    break;
                }
                match self.best_match(next, end) {
                    Some(candidate) if candidate.gain() > found.gain() + 4 => {
                        found = candidate;
                        match_pos = next;
                    }
                    _ => break,
                }
            }

            literals.extend_from_slice(&self.buffer[anchor..match_pos]);
            sequences.push(Sequence {
                literal_length: (match_pos - anchor) as u32,
                match_length: found.length as u32,
                offset: found.offset as u32,
            });
            pos = match_pos + found.length;
            anchor = pos;
        }

        literals.extend_from_slice(&self.buffer[anchor..end]);
        self.insert_up_to(end);
        (sequences, literals)
    }
}

#[derive(Debug, Clone, Copy)]
struct DistanceLimits {
    dropped: u64,
    dict_len: u64,
    window: usize,
}

impl DistanceLimits {
    fn max_distance(&self, pos: usize) -> usize {
        let frame_pos = (self.dropped + pos as u64).saturating_sub(self.dict_len);
        if frame_pos <= self.window as u64 {
            pos
        } else {
            self.window.min(pos)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LdmMatch {
    pos: usize,
    length: usize,
    offset: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct LdmEntry {
    position: u32,
    checksum: u32,
}

const LDM_PRIME: u64 = 0x9E37_79B1_85EB_CA87;

/// Rolling-hash table of sampled positions for long-distance matches.
#[derive(Debug, Clone)]
struct LdmTable {
    params: LdmParams,
    bucket_log: u8,
    entries: Vec<LdmEntry>,
    next_slot: Vec<u8>,
    power: u64,
}

impl LdmTable {
    fn new(params: LdmParams) -> Self {
        let hash_log = params.hash_log.min(MAX_TABLE_LOG);
        let bucket_size_log = params.bucket_size_log.min(hash_log);
        let bucket_log = hash_log - bucket_size_log;
        let window = params.min_match.max(4) as usize;
        let power = (1..window).fold(1u64, |acc, _| acc.wrapping_mul(LDM_PRIME));
        Self {
            params: LdmParams {
                hash_log,
                bucket_size_log,
                ..params
            },
            bucket_log,
            entries: vec![LdmEntry::default(); 1 << hash_log],
            next_slot: vec![0; 1 << bucket_log],
            power,
        }
    }

    fn clear(&mut self) {
        self.entries.fill(LdmEntry::default());
        self.next_slot.fill(0);
    }

    fn rebase(&mut self, shift: u32) {
        for entry in &mut self.entries {
            rebase(&mut entry.position, shift);
        }
    }

    #[inline]
    fn mix(hash: u64) -> u64 {
        (hash ^ (hash >> 31)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Roll over `data[start..end]`, inserting sampled positions. With
    /// `limits`, also collect non-overlapping matches against earlier
    /// entries.
    fn scan(
        &mut self,
        data: &[u8],
        start: usize,
        end: usize,
        limits: Option<DistanceLimits>,
    ) -> Vec<LdmMatch> {
        let window = self.params.min_match.max(4) as usize;
        let mut matches = Vec::new();
        if end < start + window {
            return matches;
        }

        let value = |b: u8| u64::from(b) + 1;
        let mut hash = data[start..start + window]
            .iter()
            .fold(0u64, |h, &b| h.wrapping_mul(LDM_PRIME).wrapping_add(value(b)));
        let rate_mask = (1u64 << self.params.hash_rate_log) - 1;
        let bucket_size = 1usize << self.params.bucket_size_log;
        let mut last_end = start;

        for pos in start..=end - window {
            if pos > start {
                hash = hash
                    .wrapping_sub(value(data[pos - 1]).wrapping_mul(self.power))
                    .wrapping_mul(LDM_PRIME)
                    .wrapping_add(value(data[pos + window - 1]));
            }
            let mixed = Self::mix(hash);
            if (mixed >> 16) & rate_mask != 0 {
                continue;
            }

            let bucket = if self.bucket_log == 0 {
                0
            } else {
                (mixed >> (64 - u32::from(self.bucket_log))) as usize
            };
            let checksum = mixed as u32;
            let slots = bucket * bucket_size..(bucket + 1) * bucket_size;

            if let Some(limits) = limits.filter(|_| pos >= last_end) {
                let max_distance = limits.max_distance(pos);
                let mut best: Option<LdmMatch> = None;
                for entry in &self.entries[slots.clone()] {
                    if entry.position == 0 || entry.checksum != checksum {
                        continue;
                    }
                    let candidate = entry.position as usize - 1;
                    if candidate >= pos || pos - candidate > max_distance {
                        continue;
                    }
                    let length = common_prefix(data, candidate, pos, end - pos);
                    if length >= window && best.is_none_or(|b| length > b.length) {
                        best = Some(LdmMatch {
                            pos,
                            length,
                            offset: pos - candidate,
                        });
                    }
                }
                if let Some(found) = best {
                    last_end = pos + found.length;
                    matches.push(found);
                }
            }

            let slot = usize::from(self.next_slot[bucket]);
            self.entries[slots.start + slot] = LdmEntry {
                position: (pos + 1) as u32,
                checksum,
            };
            self.next_slot[bucket] = ((slot + 1) % bucket_size) as u8;
        }
        matches
    }
}
