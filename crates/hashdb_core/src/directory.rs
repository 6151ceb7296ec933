//! Extendible-hash directory.
//!
//! `2^bits` bucket offsets indexed by the top `bits` bits of a key hash.
//! Several consecutive entries point at the same bucket while that bucket's
//! local depth is below the directory's.

use crate::error::{CoreError, CoreResult};
use std::collections::HashSet;

/// Deepest directory supported; keeps its byte length within `u32`.
pub const MAX_DIR_BITS: u32 = 28;

/// In-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<u64>,
}

impl Directory {
    /// Creates a directory of `2^bits` entries all pointing at `bucket`.
    #[must_use]
    pub fn new(bits: u32, bucket: u64) -> Self {
        Self {
            entries: vec![bucket; 1usize << bits],
        }
    }

    /// Decodes a directory block of `2^bits` little-endian offsets.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the block length does not match `bits`.
    pub fn decode(data: &[u8], bits: u32) -> CoreResult<Self> {
        if data.len() != 8usize << bits {
            return Err(CoreError::invalid_format(format!(
                "directory block of {} bytes for {bits} bits",
                data.len()
            )));
        }

        let entries = data
            .chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                u64::from_le_bytes(bytes)
            })
            .collect();
        Ok(Self { entries })
    }

    /// Encodes the directory block.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|e| e.to_le_bytes()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a directory has at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.entries.len() * 8
    }

    /// Directory depth.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.entries.len().trailing_zeros()
    }

    /// Entry index selected by `hash`.
    #[must_use]
    pub fn index_for(&self, hash: u32) -> usize {
        match self.bits() {
            0 => 0,
            bits => (hash >> (32 - bits)) as usize,
        }
    }

    /// Bucket offset for `hash`.
    #[must_use]
    pub fn bucket_for(&self, hash: u32) -> u64 {
        self.entries[self.index_for(hash)]
    }

    /// Bucket offset at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> u64 {
        self.entries[index]
    }

    /// Doubles the directory; entry `i` becomes entries `2i` and `2i + 1`.
    pub fn double(&mut self) {
        self.entries = self.entries.iter().flat_map(|&e| [e, e]).collect();
    }

    /// Repoints every entry referencing `old` after that bucket split to
    /// local depth `depth`: entries whose bit at that depth is clear get
    /// `low`, the others `high`.
    pub fn repoint(&mut self, old: u64, depth: u32, low: u64, high: u64) {
        let shift = self.bits() - depth;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if *entry == old {
                *entry = if (index >> shift) & 1 == 1 { high } else { low };
            }
        }
    }

    /// Distinct bucket offsets in directory order.
    #[must_use]
    pub fn buckets(&self) -> Vec<u64> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .copied()
            .filter(|entry| seen.insert(*entry))
            .collect()
    }
}
