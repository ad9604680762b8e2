//! XXHash64 for Zstandard content checksums and dictionary ids.
//!
//! Frames store the lower 32 bits of XXH64 with seed 0. The streaming
//! [`XxHash64`] hasher lets sessions checksum content as it passes through,
//! without keeping the whole frame in memory.

const PRIME64_1: u64 = 0x9E3779B185EBCA87;
const PRIME64_2: u64 = 0xC2B2AE3D27D4EB4F;
const PRIME64_3: u64 = 0x165667B19E3779F9;
const PRIME64_4: u64 = 0x85EBCA77C2B2AE63;
const PRIME64_5: u64 = 0x27D4EB2F165667C5;

/// Compute XXH64 hash of data with seed 0.
pub fn xxhash64(data: &[u8]) -> u64 {
    xxhash64_with_seed(data, 0)
}

/// Compute XXH64 hash with custom seed.
pub fn xxhash64_with_seed(data: &[u8], seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.update(data);
    hasher.finish()
}

/// Compute the 32-bit content checksum stored in Zstandard frames.
pub fn xxhash64_checksum(data: &[u8]) -> u32 {
    xxhash64(data) as u32
}

/// Incremental XXHash64 hasher for streaming data.
#[derive(Debug, Clone)]
pub struct XxHash64 {
    seed: u64,
    acc: [u64; 4],
    buffer: [u8; 32],
    buffer_len: usize,
    total_len: u64,
}

impl XxHash64 {
    /// Create a new hasher with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a new hasher with custom seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            acc: initial_accumulators(seed),
            buffer: [0; 32],
            buffer_len: 0,
            total_len: 0,
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.total_len += data.len() as u64;
        let mut pos = 0;

        if self.buffer_len > 0 {
            let to_copy = (32 - self.buffer_len).min(data.len());
            self.buffer[self.buffer_len..self.buffer_len + to_copy]
                .copy_from_slice(&data[..to_copy]);
            self.buffer_len += to_copy;
            pos = to_copy;

            if self.buffer_len < 32 {
                return;
            }
            let stripe = self.buffer;
            self.consume_stripe(&stripe);
            self.buffer_len = 0;
        }

        while pos + 32 <= data.len() {
            self.consume_stripe(&data[pos..pos + 32]);
            pos += 32;
        }

        let remaining = data.len() - pos;
        if remaining > 0 {
            self.buffer[..remaining].copy_from_slice(&data[pos..]);
            self.buffer_len = remaining;
        }
    }

    fn consume_stripe(&mut self, stripe: &[u8]) {
        for (lane, acc) in self.acc.iter_mut().enumerate() {
            *acc = round64(*acc, read_u64_le(&stripe[lane * 8..]));
        }
    }

    /// Produce the 64-bit digest of everything fed so far.
    pub fn finish(&self) -> u64 {
        let mut hash = if self.total_len >= 32 {
            let [v1, v2, v3, v4] = self.acc;
            let mut h = v1
                .rotate_left(1)
                .wrapping_add(v2.rotate_left(7))
                .wrapping_add(v3.rotate_left(12))
                .wrapping_add(v4.rotate_left(18));
            for v in self.acc {
                h = merge_round64(h, v);
            }
            h
        } else {
            self.seed.wrapping_add(PRIME64_5)
        };

        hash = hash.wrapping_add(self.total_len);

        let remaining = &self.buffer[..self.buffer_len];
        let mut pos = 0;

        while pos + 8 <= remaining.len() {
            let k = round64(0, read_u64_le(&remaining[pos..]));
            hash ^= k;
            hash = hash
                .rotate_left(27)
                .wrapping_mul(PRIME64_1)
                .wrapping_add(PRIME64_4);
            pos += 8;
        }

        if pos + 4 <= remaining.len() {
            let k = (read_u32_le(&remaining[pos..]) as u64).wrapping_mul(PRIME64_1);
            hash ^= k;
            hash = hash
                .rotate_left(23)
                .wrapping_mul(PRIME64_2)
                .wrapping_add(PRIME64_3);
            pos += 4;
        }

        while pos < remaining.len() {
            hash ^= (remaining[pos] as u64).wrapping_mul(PRIME64_5);
            hash = hash.rotate_left(11).wrapping_mul(PRIME64_1);
            pos += 1;
        }

        // Final avalanche
        hash ^= hash >> 33;
        hash = hash.wrapping_mul(PRIME64_2);
        hash ^= hash >> 29;
        hash = hash.wrapping_mul(PRIME64_3);
        hash ^= hash >> 32;

        hash
    }

    /// Lower 32 bits of the digest, as stored in a frame checksum.
    pub fn checksum32(&self) -> u32 {
        self.finish() as u32
    }

    /// Reset the hasher to its initial state.
    pub fn reset(&mut self) {
        *self = Self::with_seed(self.seed);
    }
}

impl Default for XxHash64 {
    fn default() -> Self {
        Self::new()
    }
}

fn initial_accumulators(seed: u64) -> [u64; 4] {
    [
        seed.wrapping_add(PRIME64_1).wrapping_add(PRIME64_2),
        seed.wrapping_add(PRIME64_2),
        seed,
        seed.wrapping_sub(PRIME64_1),
    ]
}

#[inline]
fn round64(acc: u64, input: u64) -> u64 {
    acc.wrapping_add(input.wrapping_mul(PRIME64_2))
        .rotate_left(31)
        .wrapping_mul(PRIME64_1)
}

#[inline]
fn merge_round64(mut acc: u64, val: u64) -> u64 {
    let val = round64(0, val);
    acc ^= val;
    acc.wrapping_mul(PRIME64_1).wrapping_add(PRIME64_4)
}

#[inline]
fn read_u64_le(data: &[u8]) -> u64 {
    u64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}

#[inline]
fn read_u32_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_xxhash64_empty() {
        assert_eq!(xxhash64(&[]), 0xEF46DB3751D8E999);
    }

    #[test]
    fn test_xxhash64_abc() {
        assert_eq!(xxhash64(b"abc"), 0x44BC2CF5AD770999);
    }

    #[test]
    fn test_checksum_is_lower_32_bits() {
        let data = b"test data";
        assert_eq!(xxhash64_checksum(data), xxhash64(data) as u32);
    }

    #[test]
    fn test_streaming_matches_one_shot_at_any_split() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 7 + 3) as u8).collect();
        let expected = xxhash64(&data);

        for split in [0, 1, 7, 31, 32, 33, 64, 100, 199, 200] {
            let mut hasher = XxHash64::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            assert_eq!(hasher.finish(), expected, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut hasher = XxHash64::new();
        for byte in data {
            hasher.update(std::slice::from_ref(byte));
        }
        assert_eq!(hasher.finish(), xxhash64(data));
    }

    #[test]
    fn test_reset() {
        let mut hasher = XxHash64::new();
        hasher.update(b"garbage");
        hasher.reset();
        hasher.update(b"abc");
        assert_eq!(hasher.finish(), 0x44BC2CF5AD770999);
    }

    proptest! {
        #[test]
        fn prop_chunked_update_matches_one_shot(
            data in proptest::collection::vec(any::<u8>(), 0..300),
            chunk in 1usize..40,
        ) {
            let mut hasher = XxHash64::new();
            for piece in data.chunks(chunk) {
                hasher.update(piece);
            }
            prop_assert_eq!(hasher.finish(), xxhash64(&data));
        }
    }
}
