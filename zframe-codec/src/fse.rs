//! Finite State Entropy (FSE) coding.
//!
//! FSE is the tANS variant used by Zstandard for sequence codes and for
//! compressed Huffman weights. A table is described by a *normalized
//! distribution*: one count per symbol summing to `1 << table_log`, where
//! `-1` marks a "less than one" probability that still owns a single state.
//!
//! Both directions share the same symbol spreading, so a table built by the
//! encoder from a distribution decodes with the table the decoder builds from
//! the serialized form of that distribution.

use std::sync::OnceLock;
use zframe_core::bitstream::{BackwardBitReader, BitWriter, ForwardBitReader};
use zframe_core::error::{Result, ZframeError};

/// Smallest accuracy log representable in a table description.
pub const MIN_TABLE_LOG: u8 = 5;

/// Largest accuracy log this implementation accepts.
pub const MAX_TABLE_LOG: u8 = 12;

#[inline]
pub(crate) fn highbit(value: u32) -> u32 {
    debug_assert!(value > 0);
    31 - value.leading_zeros()
}

/// Normalized symbol distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    counts: Vec<i16>,
    table_log: u8,
}

impl Distribution {
    /// Wrap normalized counts, checking that they fill the table exactly.
    pub fn new(counts: Vec<i16>, table_log: u8) -> Result<Self> {
        if table_log > MAX_TABLE_LOG {
            return Err(ZframeError::corrupted(
                0,
                format!("FSE table log {table_log} exceeds {MAX_TABLE_LOG}"),
            ));
        }
        let mut total: i32 = 0;
        for &count in &counts {
            if count < -1 {
                return Err(ZframeError::corrupted(0, "invalid FSE normalized count"));
            }
            total += i32::from(count.abs());
        }
        if total != 1 << table_log {
            return Err(ZframeError::corrupted(
                0,
                format!("FSE counts sum to {total}, expected {}", 1 << table_log),
            ));
        }
        if counts.len() > 256 {
            return Err(ZframeError::corrupted(0, "FSE alphabet too large"));
        }
        Ok(Self { counts, table_log })
    }

    /// Normalized counts indexed by symbol.
    pub fn counts(&self) -> &[i16] {
        &self.counts
    }

    /// Accuracy log.
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Whether `symbol` has at least one state.
    pub fn covers(&self, symbol: u8) -> bool {
        self.counts
            .get(usize::from(symbol))
            .is_some_and(|&c| c != 0)
    }

    /// Estimated cost in bits of coding the given symbol histogram.
    ///
    /// Returns `None` when a used symbol has no state in this table.
    pub fn estimate_cost(&self, histogram: &[u32]) -> Option<f64> {
        let log = f64::from(self.table_log);
        let mut bits = 0.0;
        for (symbol, &count) in histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let norm = *self.counts.get(symbol)?;
            let cost = match norm {
                0 => return None,
                -1 => log,
                n => log - f64::from(n).log2(),
            };
            bits += f64::from(count) * cost;
        }
        Some(bits)
    }

    /// Build a distribution from raw symbol counts.
    ///
    /// Every symbol with a nonzero count receives at least one state. The
    /// result is deterministic for a given histogram.
    pub fn from_histogram(histogram: &[u32], table_log: u8) -> Result<Self> {
        let alphabet = histogram
            .iter()
            .rposition(|&c| c > 0)
            .map_or(0, |last| last + 1);
        let present = histogram.iter().filter(|&&c| c > 0).count();
        if present == 0 {
            return Err(ZframeError::invalid_config("cannot normalize an empty histogram"));
        }
        let table_size: u64 = 1 << table_log;
        if present as u64 > table_size {
            return Err(ZframeError::invalid_config(format!(
                "{present} symbols do not fit an FSE table of log {table_log}"
            )));
        }

        let total: u64 = histogram.iter().map(|&c| u64::from(c)).sum();
        let mut counts = vec![0i64; alphabet];
        let mut remainders = vec![0u64; alphabet];
        let mut assigned: i64 = 0;
        for symbol in 0..alphabet {
            let count = u64::from(histogram[symbol]);
            if count == 0 {
                continue;
            }
            let scaled = count * table_size;
            counts[symbol] = ((scaled / total) as i64).max(1);
            remainders[symbol] = scaled % total;
            assigned += counts[symbol];
        }

        let target = table_size as i64;
        // Hand out missing states by largest remainder.
        while assigned < target {
            let mut best = None;
            for symbol in 0..alphabet {
                if histogram[symbol] == 0 {
                    continue;
                }
                match best {
                    None => best = Some(symbol),
                    Some(b) if remainders[symbol] > remainders[b] => best = Some(symbol),
                    _ => {}
                }
            }
            let Some(symbol) = best else { break };
            counts[symbol] += 1;
            remainders[symbol] = 0;
            assigned += 1;
            if remainders.iter().all(|&r| r == 0) {
                // Every remainder consumed: refill from the raw counts.
                for (r, &c) in remainders.iter_mut().zip(histogram) {
                    *r = u64::from(c);
                }
            }
        }
        // Take surplus states from the largest counts.
        while assigned > target {
            let mut best = None;
            for symbol in 0..alphabet {
                if counts[symbol] <= 1 {
                    continue;
                }
                match best {
                    None => best = Some(symbol),
                    Some(b) if counts[symbol] > counts[b] => best = Some(symbol),
                    _ => {}
                }
            }
            let Some(symbol) = best else { break };
            counts[symbol] -= 1;
            assigned -= 1;
        }

        Self::new(counts.into_iter().map(|c| c as i16).collect(), table_log)
    }

    /// Parse a serialized table description.
    ///
    /// Returns the distribution and the number of bytes consumed.
    pub fn read(data: &[u8], max_symbol: u8, max_log: u8) -> Result<(Self, usize)> {
        let mut reader = ForwardBitReader::new(data);
        let table_log = reader.read_bits(4)? as u8 + MIN_TABLE_LOG;
        if table_log > max_log {
            return Err(ZframeError::corrupted(
                0,
                format!("FSE accuracy log {table_log} exceeds maximum {max_log}"),
            ));
        }

        let max_symbol = usize::from(max_symbol);
        let mut remaining: i32 = (1 << table_log) + 1;
        let mut threshold: i32 = 1 << table_log;
        let mut nb_bits = table_log + 1;
        let mut counts: Vec<i16> = Vec::new();
        let mut previous_zero = false;

        while remaining > 1 && counts.len() <= max_symbol {
            if previous_zero {
                let mut run_end = counts.len();
                loop {
                    let repeat = reader.read_bits(2)? as usize;
                    run_end += repeat;
                    if repeat != 3 {
                        break;
                    }
                }
                if run_end > max_symbol {
                    return Err(ZframeError::corrupted(
                        reader.bytes_consumed() as u64,
                        "FSE zero run exceeds alphabet",
                    ));
                }
                counts.resize(run_end, 0);
            }

            let max = 2 * threshold - 1 - remaining;
            let bits = reader.peek_bits(nb_bits) as i32;
            let mut value;
            if (bits & (threshold - 1)) < max {
                value = bits & (threshold - 1);
                reader.skip_bits(nb_bits - 1)?;
            } else {
                value = bits & (2 * threshold - 1);
                if value >= threshold {
                    value -= max;
                }
                reader.skip_bits(nb_bits)?;
            }

            let count = value - 1;
            remaining -= count.abs();
            if remaining < 1 {
                return Err(ZframeError::corrupted(
                    reader.bytes_consumed() as u64,
                    "FSE counts exceed table size",
                ));
            }
            counts.push(count as i16);
            previous_zero = count == 0;

            while remaining < threshold {
                nb_bits -= 1;
                threshold >>= 1;
            }
        }

        if remaining != 1 {
            return Err(ZframeError::corrupted(
                reader.bytes_consumed() as u64,
                "FSE table description does not fill the table",
            ));
        }

        let consumed = reader.bytes_consumed();
        Ok((Self::new(counts, table_log)?, consumed))
    }

    /// Serialize the table description.
    pub fn write(&self, writer: &mut BitWriter) {
        let table_log = self.table_log;
        writer.write_bits(u64::from(table_log - MIN_TABLE_LOG), 4);

        let mut remaining: i32 = (1 << table_log) + 1;
        let mut threshold: i32 = 1 << table_log;
        let mut nb_bits = table_log + 1;
        let mut symbol = 0usize;
        let mut previous_zero = false;
        let alphabet = self.counts.len();

        while symbol < alphabet && remaining > 1 {
            if previous_zero {
                let mut start = symbol;
                while symbol < alphabet && self.counts[symbol] == 0 {
                    symbol += 1;
                }
                if symbol == alphabet {
                    break;
                }
                while symbol >= start + 24 {
                    start += 24;
                    writer.write_bits(0xFFFF, 16);
                }
                while symbol >= start + 3 {
                    start += 3;
                    writer.write_bits(3, 2);
                }
                writer.write_bits((symbol - start) as u64, 2);
            }

            let count = i32::from(self.counts[symbol]);
            symbol += 1;
            let max = 2 * threshold - 1 - remaining;
            remaining -= count.abs();
            let mut value = count + 1;
            if value >= threshold {
                value += max;
            }
            let width = if value < max { nb_bits - 1 } else { nb_bits };
            writer.write_bits(value as u64, width);
            previous_zero = value == 1;

            while remaining < threshold {
                nb_bits -= 1;
                threshold >>= 1;
            }
        }
    }

    /// Serialize into a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        self.write(&mut writer);
        writer.finish()
    }
}

/// Smallest table log that fits `symbols` distinct symbols, within limits.
pub fn choose_table_log(total: usize, symbols: usize, max_log: u8) -> u8 {
    let by_total = if total > 1 {
        (highbit((total - 1) as u32) as u8).saturating_sub(2)
    } else {
        MIN_TABLE_LOG
    };
    let by_symbols = if symbols > 1 {
        highbit((symbols - 1) as u32) as u8 + 2
    } else {
        MIN_TABLE_LOG
    };
    by_total.max(by_symbols).clamp(MIN_TABLE_LOG, max_log)
}

/// Spread symbols over the state table.
fn spread_symbols(dist: &Distribution) -> Result<Vec<u8>> {
    let size = 1usize << dist.table_log;
    let mask = size - 1;
    let mut table = vec![0u8; size];
    let mut high_threshold = size - 1;

    for (symbol, &count) in dist.counts.iter().enumerate() {
        if count == -1 {
            table[high_threshold] = symbol as u8;
            high_threshold = high_threshold.wrapping_sub(1);
        }
    }

    let step = (size >> 1) + (size >> 3) + 3;
    let mut position = 0usize;
    for (symbol, &count) in dist.counts.iter().enumerate() {
        for _ in 0..count.max(0) {
            table[position] = symbol as u8;
            position = (position + step) & mask;
            while position > high_threshold {
                position = (position + step) & mask;
            }
        }
    }

    if position != 0 {
        return Err(ZframeError::corrupted(0, "FSE symbol spreading failed"));
    }
    Ok(table)
}

/// One decoding state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeEntry {
    /// Symbol emitted in this state.
    pub symbol: u8,
    /// Bits to read for the next state.
    pub nb_bits: u8,
    /// Base of the next state.
    pub baseline: u16,
}

/// FSE decoding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTable {
    table_log: u8,
    entries: Vec<DecodeEntry>,
}

impl DecodeTable {
    /// Build from a normalized distribution.
    pub fn new(dist: &Distribution) -> Result<Self> {
        let size = 1u32 << dist.table_log;
        let spread = spread_symbols(dist)?;
        let mut next: Vec<u32> = dist
            .counts
            .iter()
            .map(|&c| if c == -1 { 1 } else { c.max(0) as u32 })
            .collect();

        let entries = spread
            .iter()
            .map(|&symbol| {
                let state = next[usize::from(symbol)];
                next[usize::from(symbol)] += 1;
                let nb_bits = u32::from(dist.table_log) - highbit(state);
                DecodeEntry {
                    symbol,
                    nb_bits: nb_bits as u8,
                    baseline: ((state << nb_bits) - size) as u16,
                }
            })
            .collect();

        Ok(Self {
            table_log: dist.table_log,
            entries,
        })
    }

    /// Table emitting one symbol forever (RLE mode).
    pub fn rle(symbol: u8) -> Self {
        Self {
            table_log: 0,
            entries: vec![DecodeEntry {
                symbol,
                nb_bits: 0,
                baseline: 0,
            }],
        }
    }

    /// Accuracy log.
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Read an initial state.
    #[inline]
    pub fn init_state(&self, reader: &mut BackwardBitReader<'_>) -> Result<usize> {
        Ok(reader.read_bits(self.table_log)? as usize)
    }

    /// Symbol for `state`.
    #[inline]
    pub fn symbol(&self, state: usize) -> u8 {
        self.entries[state].symbol
    }

    /// Transition to the next state.
    #[inline]
    pub fn update_state(&self, state: usize, reader: &mut BackwardBitReader<'_>) -> Result<usize> {
        let entry = self.entries[state];
        Ok(usize::from(entry.baseline) + reader.read_bits(entry.nb_bits)? as usize)
    }

    /// Transition, treating bits past the stream start as zero.
    #[inline]
    pub fn update_state_padded(&self, state: usize, reader: &mut BackwardBitReader<'_>) -> usize {
        let entry = self.entries[state];
        usize::from(entry.baseline) + reader.read_bits_padded(entry.nb_bits) as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SymbolTransform {
    delta_nb_bits: u32,
    delta_find_state: i32,
}

/// FSE encoding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeTable {
    table_log: u8,
    state_table: Vec<u16>,
    transforms: Vec<SymbolTransform>,
    counts: Vec<i16>,
}

impl EncodeTable {
    /// Build from a normalized distribution.
    pub fn new(dist: &Distribution) -> Result<Self> {
        let table_log = u32::from(dist.table_log);
        let size = 1u32 << table_log;
        let spread = spread_symbols(dist)?;

        let mut cumul = Vec::with_capacity(dist.counts.len() + 1);
        cumul.push(0u32);
        for &count in &dist.counts {
            let width = if count == -1 { 1 } else { count.max(0) as u32 };
            cumul.push(cumul[cumul.len() - 1] + width);
        }

        let mut state_table = vec![0u16; size as usize];
        for (u, &symbol) in spread.iter().enumerate() {
            let slot = &mut cumul[usize::from(symbol)];
            state_table[*slot as usize] = (size + u as u32) as u16;
            *slot += 1;
        }

        let mut total: i32 = 0;
        let transforms = dist
            .counts
            .iter()
            .map(|&count| match count {
                0 => SymbolTransform {
                    delta_nb_bits: ((table_log + 1) << 16) - size,
                    delta_find_state: 0,
                },
                -1 | 1 => {
                    let t = SymbolTransform {
                        delta_nb_bits: (table_log << 16) - size,
                        delta_find_state: total - 1,
                    };
                    total += 1;
                    t
                }
                n => {
                    let n = n as u32;
                    let max_bits_out = table_log - highbit(n - 1);
                    let min_state_plus = n << max_bits_out;
                    let t = SymbolTransform {
                        delta_nb_bits: (max_bits_out << 16) - min_state_plus,
                        delta_find_state: total - n as i32,
                    };
                    total += n as i32;
                    t
                }
            })
            .collect();

        Ok(Self {
            table_log: dist.table_log,
            state_table,
            transforms,
            counts: dist.counts.clone(),
        })
    }

    /// Accuracy log.
    pub fn table_log(&self) -> u8 {
        self.table_log
    }

    /// Whether `symbol` can be encoded.
    pub fn covers(&self, symbol: u8) -> bool {
        self.counts
            .get(usize::from(symbol))
            .is_some_and(|&c| c != 0)
    }

    #[inline]
    fn next_state(&self, value: u32, nb_bits_out: u32, transform: SymbolTransform) -> u32 {
        let index = (value >> nb_bits_out) as i32 + transform.delta_find_state;
        u32::from(self.state_table[index as usize])
    }

    /// Initial encoder state for the last symbol of a run.
    pub fn init_state(&self, symbol: u8) -> u32 {
        let transform = self.transforms[usize::from(symbol)];
        let nb_bits_out = (transform.delta_nb_bits + (1 << 15)) >> 16;
        let value = (nb_bits_out << 16).wrapping_sub(transform.delta_nb_bits);
        self.next_state(value, nb_bits_out, transform)
    }

    /// Encode `symbol`, emitting the transition bits.
    #[inline]
    pub fn encode(&self, state: &mut u32, symbol: u8, writer: &mut BitWriter) {
        let transform = self.transforms[usize::from(symbol)];
        let nb_bits_out = (*state + transform.delta_nb_bits) >> 16;
        writer.write_bits(u64::from(*state), nb_bits_out as u8);
        *state = self.next_state(*state, nb_bits_out, transform);
    }

    /// Write the final state so the decoder can start from it.
    pub fn flush(&self, state: u32, writer: &mut BitWriter) {
        writer.write_bits(u64::from(state), self.table_log);
    }
}

/// Default literal length distribution.
pub const LITERAL_LENGTH_DEFAULT: [i16; 36] = [
    4, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 2, 1, 1, 1, 1, 1,
    -1, -1, -1, -1,
];
/// Accuracy log of the default literal length distribution.
pub const LITERAL_LENGTH_DEFAULT_LOG: u8 = 6;

/// Default match length distribution.
pub const MATCH_LENGTH_DEFAULT: [i16; 53] = [
    1, 4, 3, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1, -1, -1,
];
/// Accuracy log of the default match length distribution.
pub const MATCH_LENGTH_DEFAULT_LOG: u8 = 6;

/// Default offset code distribution.
pub const OFFSET_DEFAULT: [i16; 29] = [
    1, 1, 1, 1, 1, 1, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1, -1, -1, -1, -1,
];
/// Accuracy log of the default offset code distribution.
pub const OFFSET_DEFAULT_LOG: u8 = 5;

/// Encoder and decoder tables for one predefined distribution.
#[derive(Debug)]
pub struct PredefinedTables {
    /// The distribution.
    pub distribution: Distribution,
    /// Decoding table.
    pub decode: DecodeTable,
    /// Encoding table.
    pub encode: EncodeTable,
}

impl PredefinedTables {
    fn build(counts: &[i16], log: u8) -> Self {
        // The constant distributions are valid by construction.
        let distribution = Distribution {
            counts: counts.to_vec(),
            table_log: log,
        };
        let decode = DecodeTable::new(&distribution).unwrap_or_else(|_| DecodeTable::rle(0));
        let encode = EncodeTable::new(&distribution).unwrap_or_else(|_| EncodeTable {
            table_log: 0,
            state_table: Vec::new(),
            transforms: Vec::new(),
            counts: Vec::new(),
        });
        Self {
            distribution,
            decode,
            encode,
        }
    }
}

/// Predefined literal length tables.
pub fn literal_length_default() -> &'static PredefinedTables {
    static TABLES: OnceLock<PredefinedTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        PredefinedTables::build(&LITERAL_LENGTH_DEFAULT, LITERAL_LENGTH_DEFAULT_LOG)
    })
}

/// Predefined match length tables.
pub fn match_length_default() -> &'static PredefinedTables {
    static TABLES: OnceLock<PredefinedTables> = OnceLock::new();
    TABLES.get_or_init(|| PredefinedTables::build(&MATCH_LENGTH_DEFAULT, MATCH_LENGTH_DEFAULT_LOG))
}

/// Predefined offset code tables.
pub fn offset_default() -> &'static PredefinedTables {
    static TABLES: OnceLock<PredefinedTables> = OnceLock::new();
    TABLES.get_or_init(|| PredefinedTables::build(&OFFSET_DEFAULT, OFFSET_DEFAULT_LOG))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_run(table: &EncodeTable, symbols: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::new();
        let (&last, rest) = symbols.split_last().unwrap();
        let mut state = table.init_state(last);
        for &symbol in rest.iter().rev() {
            table.encode(&mut state, symbol, &mut writer);
        }
        table.flush(state, &mut writer);
        writer.finish_with_end_mark()
    }

    fn decode_run(table: &DecodeTable, stream: &[u8], count: usize) -> Vec<u8> {
        let mut reader = BackwardBitReader::new(stream).unwrap();
        let mut state = table.init_state(&mut reader).unwrap();
        let mut out = Vec::new();
        for i in 0..count {
            out.push(table.symbol(state));
            if i + 1 < count {
                state = table.update_state(state, &mut reader).unwrap();
            }
        }
        assert!(reader.is_empty());
        out
    }

    #[test]
    fn test_predefined_distributions_are_valid() {
        assert_eq!(literal_length_default().decode.table_log(), 6);
        assert_eq!(match_length_default().decode.table_log(), 6);
        assert_eq!(offset_default().decode.table_log(), 5);
        assert!(Distribution::new(LITERAL_LENGTH_DEFAULT.to_vec(), 6).is_ok());
        assert!(Distribution::new(MATCH_LENGTH_DEFAULT.to_vec(), 6).is_ok());
        assert!(Distribution::new(OFFSET_DEFAULT.to_vec(), 5).is_ok());
    }

    #[test]
    fn test_predefined_offset_table_head() {
        // First states of the predefined offset table, per RFC 8878.
        let table = &offset_default().decode;
        let expected = [(0u8, 5u8, 0u16), (6, 4, 0), (9, 5, 0), (15, 5, 0), (21, 5, 0)];
        for (state, &(symbol, nb_bits, baseline)) in expected.iter().enumerate() {
            let entry = table.entries[state];
            assert_eq!((entry.symbol, entry.nb_bits, entry.baseline), (symbol, nb_bits, baseline));
        }
    }

    #[test]
    fn test_encode_decode_predefined() {
        let tables = literal_length_default();
        let symbols: Vec<u8> = (0..200u32).map(|i| ((i * 7) % 36) as u8).collect();
        let stream = encode_run(&tables.encode, &symbols);
        assert_eq!(decode_run(&tables.decode, &stream, symbols.len()), symbols);
    }

    #[test]
    fn test_normalize_and_code_skewed_histogram() {
        let mut histogram = vec![0u32; 20];
        histogram[0] = 1000;
        histogram[3] = 10;
        histogram[7] = 1;
        histogram[19] = 250;
        let dist = Distribution::from_histogram(&histogram, 6).unwrap();
        assert!(dist.covers(7));
        assert!(!dist.covers(1));

        let symbols: Vec<u8> = [0u8, 0, 19, 3, 0, 7, 0, 19, 0, 0, 3].repeat(9);
        let encode = EncodeTable::new(&dist).unwrap();
        let decode = DecodeTable::new(&dist).unwrap();
        let stream = encode_run(&encode, &symbols);
        assert_eq!(decode_run(&decode, &stream, symbols.len()), symbols);
    }

    #[test]
    fn test_description_round_trip() {
        let histogram: Vec<u32> = (0..40u32).map(|i| if i % 5 == 2 { 0 } else { i * i + 1 }).collect();
        let dist = Distribution::from_histogram(&histogram, 8).unwrap();
        let bytes = dist.to_bytes();
        let (parsed, consumed) = Distribution::read(&bytes, 63, 9).unwrap();
        assert_eq!(parsed, dist);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_description_with_low_probability_symbols() {
        let dist = Distribution::new(MATCH_LENGTH_DEFAULT.to_vec(), 6).unwrap();
        let bytes = dist.to_bytes();
        let (parsed, _) = Distribution::read(&bytes, 52, 6).unwrap();
        assert_eq!(parsed, dist);
    }

    #[test]
    fn test_description_rejects_excessive_log() {
        let dist = Distribution::from_histogram(&[5, 9, 30], 9).unwrap();
        let bytes = dist.to_bytes();
        assert!(Distribution::read(&bytes, 2, 8).is_err());
    }

    #[test]
    fn test_cost_estimate() {
        let dist = Distribution::from_histogram(&[1, 1], 5).unwrap();
        let cost = dist.estimate_cost(&[10, 10]).unwrap();
        assert!((cost - 20.0).abs() < 1e-9);
        assert!(dist.estimate_cost(&[1, 1, 1]).is_none());
    }

    #[test]
    fn test_choose_table_log_bounds() {
        assert_eq!(choose_table_log(1, 1, 9), MIN_TABLE_LOG);
        assert_eq!(choose_table_log(100_000, 40, 9), 9);
        assert!(choose_table_log(64, 50, 9) >= 7);
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        assert!(Distribution::new(vec![10, 10], 5).is_err());
        assert!(Distribution::new(vec![-2, 34], 5).is_err());
    }
}
