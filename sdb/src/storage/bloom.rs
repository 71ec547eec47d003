//! `BloomPage`: a fixed-size bit array over a `FileChunk`'s key set,
//! sized to hit a 10% target false-positive rate.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use bit_vec::BitVec;

const MIN_BYTES: usize = 1024;
const MAX_BYTES: usize = 256 * 1024;
const NUM_HASHES: u32 = 3;

/// `min(256 KiB, next_pow2_KiB_geq(⌈0.599 × numKeys⌉))`, floored at
/// 1 KiB (see DESIGN.md Open Question resolution for the rounding
/// rule).
pub fn recommend_num_bytes(num_keys: u64) -> usize {
    let raw = ((num_keys as f64) * 0.599).ceil() as usize;
    let raw = raw.max(1);

    let mut kib = raw.div_ceil(1024).max(1);
    kib = kib.next_power_of_two();
    let bytes = kib * 1024;

    bytes.clamp(MIN_BYTES, MAX_BYTES)
}

fn hash_with_seed(key: &[u8], seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

/// A fixed-size Bloom filter over opaque byte keys, using double
/// hashing (`h_i(x) = h1(x) + i * h2(x)`) to derive `NUM_HASHES` bit
/// positions from two underlying hashes.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec,
}

impl BloomFilter {
    pub fn with_byte_size(num_bytes: usize) -> Self {
        Self {
            bits: BitVec::from_elem(num_bytes.max(1) * 8, false),
        }
    }

    pub fn for_num_keys(num_keys: u64) -> Self {
        Self::with_byte_size(recommend_num_bytes(num_keys))
    }

    fn num_bits(&self) -> u64 {
        self.bits.len() as u64
    }

    fn positions(&self, key: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let h1 = hash_with_seed(key, 0x5bd1e995);
        let h2 = hash_with_seed(key, 0xc2b2ae35);
        let num_bits = self.num_bits();
        (0..NUM_HASHES as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }

    pub fn insert(&mut self, key: &[u8]) {
        for pos in self.positions(key) {
            self.bits.set(pos as usize, true);
        }
    }

    /// `true` means "maybe present"; `false` means "definitely absent".
    pub fn check(&self, key: &[u8]) -> bool {
        self.positions(key).all(|pos| self.bits.get(pos as usize).unwrap_or(false))
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bits: BitVec::from_bytes(&bytes),
        }
    }
}
