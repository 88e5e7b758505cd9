//! Per-chunk bloom index over case-folded 4-grams.
//!
//! Each chunk carries a plain bit array summarizing the 4-grams present in
//! its file contents. The filter is stored verbatim in the chunk record
//! together with its hash iteration count, so a future optimization can
//! test a query's literal 4-grams against the filter and skip
//! decompression of chunks that cannot match.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

/// Minimum useful filter size; smaller indices are not stored at all.
const MIN_INDEX_SIZE: usize = 1024;

/// Per-byte ASCII case folding used for index keys.
#[inline]
pub fn casefold(b: u8) -> u8 {
    b.to_ascii_lowercase()
}

/// Pack four case-folded bytes into a 32-bit key.
///
/// Key 0 is reserved as the empty-slot sentinel of [`NgramSet`]; callers
/// skip it.
#[inline]
pub fn ngram(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

#[inline]
fn hash_pair(key: u32) -> (u64, u64) {
    // Two independent seeded hashers; reusing one hasher after finish()
    // corrupts the distribution.
    let mut hasher1 = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher1.write_u32(key);

    let mut hasher2 = RandomState::with_seeds(
        0x517cc1b727220a95,
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
    )
    .build_hasher();
    hasher2.write_u32(key);

    (hasher1.finish(), hasher2.finish())
}

/// A counting-less bloom filter stored as a raw byte array.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    data: Vec<u8>,
}

impl BloomFilter {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Wrap filter bytes read back from a chunk record.
    #[allow(dead_code)]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Set the `iterations` bit positions derived from `key`.
    #[inline]
    pub fn insert(&mut self, key: u32, iterations: u32) {
        let num_bits = (self.data.len() * 8) as u64;
        let (h1, h2) = hash_pair(key);

        for i in 0..iterations as u64 {
            // Double hashing: h(i) = h1 + i*h2
            let bit = (h1.wrapping_add(i.wrapping_mul(h2)) % num_bits) as usize;
            self.data[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Returns false if `key` is definitely absent, true if possibly present.
    #[allow(dead_code)]
    #[inline]
    pub fn contains(&self, key: u32, iterations: u32) -> bool {
        let num_bits = (self.data.len() * 8) as u64;
        let (h1, h2) = hash_pair(key);

        for i in 0..iterations as u64 {
            let bit = (h1.wrapping_add(i.wrapping_mul(h2)) % num_bits) as usize;
            if self.data[bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Open-addressed scratch set for deduplicating 4-gram keys before they
/// are applied to the filter, so each distinct key costs its bit writes
/// exactly once. Zero is the empty-slot sentinel; capacity stays a power
/// of two and doubles once load reaches 50%.
pub struct NgramSet {
    data: Vec<u32>,
    len: usize,
}

impl NgramSet {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            data: vec![0u32; capacity],
            len: 0,
        }
    }

    pub fn insert(&mut self, key: u32) {
        debug_assert!(key != 0);

        if self.len * 2 >= self.data.len() {
            self.grow();
        }

        let mask = self.data.len() - 1;
        let mut slot = (hash_pair(key).1 as usize) & mask;

        while self.data[slot] != key {
            if self.data[slot] == 0 {
                self.data[slot] = key;
                self.len += 1;
                break;
            }

            slot = (slot + 7) & mask;
        }
    }

    fn grow(&mut self) {
        let mut bigger = NgramSet::with_capacity(self.data.len() * 2);
        for &key in &self.data {
            if key != 0 {
                bigger.insert(key);
            }
        }
        *self = bigger;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().copied().filter(|&key| key != 0)
    }
}

impl Default for NgramSet {
    fn default() -> Self {
        Self::new()
    }
}

/// A materialized chunk index: filter bytes plus the hash iteration count
/// that was used to fill them. An empty `data` means "not indexed".
#[derive(Debug, Default)]
pub struct ChunkIndex {
    pub data: Vec<u8>,
    pub iterations: u32,
}

/// Choose the number of hash iterations for `item_count` keys in a filter
/// of `index_size` bytes: round(ln 2 * m / n) clamped to [1, 16].
///
/// http://pages.cs.wisc.edu/~cao/papers/summary-cache/node8.html
pub fn hash_iterations(index_size: usize, item_count: usize) -> u32 {
    if item_count == 0 {
        return 1;
    }

    let m = (index_size * 8) as f64;
    let n = item_count as f64;
    let k = (std::f64::consts::LN_2 * m / n).round();

    (k as u32).clamp(1, 16)
}

/// Build the bloom index for one chunk's file contents.
///
/// Keys are 4-grams of case-folded bytes with no `\n` in any position;
/// grams that cross lines would never help a single-line match. The index
/// is sized at `content.len() / 50` (expected ~10% of the compressed
/// payload at typical compression ratios) and skipped entirely below
/// [`MIN_INDEX_SIZE`].
pub fn build_chunk_index(content: &[u8]) -> ChunkIndex {
    let index_size = content.len() / 50;
    if index_size < MIN_INDEX_SIZE {
        return ChunkIndex::default();
    }

    let mut ngrams = NgramSet::new();

    for window in content.windows(4) {
        let (a, b, c, d) = (window[0], window[1], window[2], window[3]);
        if a != b'\n' && b != b'\n' && c != b'\n' && d != b'\n' {
            let key = ngram(casefold(a), casefold(b), casefold(c), casefold(d));
            if key != 0 {
                ngrams.insert(key);
            }
        }
    }

    let iterations = hash_iterations(index_size, ngrams.len());

    let mut filter = BloomFilter::new(index_size);
    for key in ngrams.iter() {
        filter.insert(key, iterations);
    }

    ChunkIndex {
        data: filter.data,
        iterations,
    }
}
