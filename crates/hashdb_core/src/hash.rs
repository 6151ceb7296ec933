//! Key hashing.

use xxhash_rust::xxh3::xxh3_64;

/// 32-bit hash of `key`; the directory indexes on its top bits.
#[must_use]
pub fn hash_key(key: &[u8]) -> u32 {
    (xxh3_64(key) >> 32) as u32
}
