//! Bucket blocks.
//!
//! A bucket is one fixed-size block holding every entry whose hash prefix
//! maps to it. Entries are stored inline:
//!
//! ```text
//! local bits  u32
//! count       u32
//! count x { hash u32, key_len u32, value_len u32, key, value }
//! ```
//!
//! The remainder of the block is zero.

use crate::error::{CoreError, CoreResult};

/// Bytes taken by the bucket's own fields.
pub const BUCKET_HEADER_LEN: usize = 8;

/// Bytes taken by an entry's fixed fields.
pub const ENTRY_HEADER_LEN: usize = 12;

/// Encoded size of an entry with the given key and value lengths.
#[must_use]
pub const fn entry_len(key_len: usize, value_len: usize) -> usize {
    ENTRY_HEADER_LEN + key_len + value_len
}

/// Largest entry a bucket of `bucket_size` bytes can hold.
#[must_use]
pub const fn max_entry_len(bucket_size: u32) -> usize {
    bucket_size as usize - BUCKET_HEADER_LEN
}

/// One key/value pair and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    /// Hash of `key`.
    pub hash: u32,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
}

impl BucketEntry {
    fn encoded_len(&self) -> usize {
        entry_len(self.key.len(), self.value.len())
    }
}

/// In-memory bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bucket {
    /// Local depth: number of hash bits shared by every entry.
    pub bits: u32,
    entries: Vec<BucketEntry>,
    used: usize,
}

impl Bucket {
    /// Creates an empty bucket of local depth `bits`.
    #[must_use]
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            entries: Vec::new(),
            used: BUCKET_HEADER_LEN,
        }
    }

    /// Decodes a bucket block.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if an entry runs past the block.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < BUCKET_HEADER_LEN {
            return Err(CoreError::invalid_format("bucket block too short"));
        }

        let bits = read_u32(data, 0);
        let count = read_u32(data, 4) as usize;
        let mut bucket = Self::new(bits);
        let mut at = BUCKET_HEADER_LEN;

        for _ in 0..count {
            if at + ENTRY_HEADER_LEN > data.len() {
                return Err(CoreError::invalid_format("bucket entry header truncated"));
            }
            let hash = read_u32(data, at);
            let key_len = read_u32(data, at + 4) as usize;
            let value_len = read_u32(data, at + 8) as usize;
            at += ENTRY_HEADER_LEN;

            let end = at
                .checked_add(key_len)
                .and_then(|n| n.checked_add(value_len))
                .filter(|&n| n <= data.len())
                .ok_or_else(|| CoreError::invalid_format("bucket entry runs past block"))?;

            bucket.push(BucketEntry {
                hash,
                key: data[at..at + key_len].to_vec(),
                value: data[at + key_len..end].to_vec(),
            });
            at = end;
        }

        Ok(bucket)
    }

    /// Encodes the bucket into a zero-padded block of `size` bytes.
    #[must_use]
    pub fn to_block(&self, size: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.hash.to_le_bytes());
            buf.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(entry.value.len() as u32).to_le_bytes());
            buf.extend_from_slice(&entry.key);
            buf.extend_from_slice(&entry.value);
        }
        debug_assert!(buf.len() <= size as usize, "bucket overflows its block");
        buf.resize(size as usize, 0);
        buf
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bucket holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded bytes in use, including the bucket header.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Iterates over the entries.
    pub fn entries(&self) -> impl Iterator<Item = &BucketEntry> {
        self.entries.iter()
    }

    fn position(&self, hash: u32, key: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.hash == hash && e.key == key)
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, hash: u32, key: &[u8]) -> Option<&[u8]> {
        self.position(hash, key)
            .map(|i| self.entries[i].value.as_slice())
    }

    /// Returns `true` if storing `value` under `key` keeps the bucket within
    /// `capacity` bytes, counting the space freed by any existing value.
    #[must_use]
    pub fn fits(&self, hash: u32, key: &[u8], value_len: usize, capacity: u32) -> bool {
        let freed = self
            .position(hash, key)
            .map_or(0, |i| self.entries[i].encoded_len());
        self.used - freed + entry_len(key.len(), value_len) <= capacity as usize
    }

    /// Stores `value` under `key`, replacing any existing value.
    pub fn upsert(&mut self, hash: u32, key: &[u8], value: &[u8]) {
        if let Some(i) = self.position(hash, key) {
            let entry = &mut self.entries[i];
            self.used = self.used - entry.value.len() + value.len();
            entry.value = value.to_vec();
        } else {
            self.push(BucketEntry {
                hash,
                key: key.to_vec(),
                value: value.to_vec(),
            });
        }
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&mut self, hash: u32, key: &[u8]) -> bool {
        match self.position(hash, key) {
            Some(i) => {
                let entry = self.entries.swap_remove(i);
                self.used -= entry.encoded_len();
                true
            }
            None => false,
        }
    }

    /// Splits into two buckets of depth `bits + 1`, separated by the hash
    /// bit at that depth. The first holds entries with the bit clear.
    #[must_use]
    pub fn split(&self) -> (Self, Self) {
        let depth = self.bits + 1;
        let mut low = Self::new(depth);
        let mut high = Self::new(depth);
        for entry in &self.entries {
            if (entry.hash >> (32 - depth)) & 1 == 1 {
                high.push(entry.clone());
            } else {
                low.push(entry.clone());
            }
        }
        (low, high)
    }

    fn push(&mut self, entry: BucketEntry) {
        self.used += entry.encoded_len();
        self.entries.push(entry);
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_block() {
        let block = Bucket::new(3).to_block(512);
        assert_eq!(block.len(), 512);
        let decoded = Bucket::decode(&block).unwrap();
        assert_eq!(decoded.bits, 3);
        assert!(decoded.is_empty());
        assert_eq!(decoded.used(), BUCKET_HEADER_LEN);
    }

    #[test]
    fn upsert_get_remove() {
        let mut bucket = Bucket::new(0);
        bucket.upsert(7, b"k\0ey", b"v1");
        assert_eq!(bucket.get(7, b"k\0ey"), Some(&b"v1"[..]));
        assert_eq!(bucket.get(8, b"k\0ey"), None);

        bucket.upsert(7, b"k\0ey", b"longer value");
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.used(), BUCKET_HEADER_LEN + entry_len(4, 12));

        assert!(bucket.remove(7, b"k\0ey"));
        assert!(!bucket.remove(7, b"k\0ey"));
        assert_eq!(bucket.used(), BUCKET_HEADER_LEN);
    }

    #[test]
    fn decode_reads_back_entries() {
        let mut bucket = Bucket::new(2);
        bucket.upsert(1, b"a", b"");
        bucket.upsert(2, b"", b"empty key");
        bucket.upsert(3, b"ccc", &[0u8; 40]);

        let decoded = Bucket::decode(&bucket.to_block(512)).unwrap();
        assert_eq!(decoded, bucket);
    }

    #[test]
    fn fits_accounts_for_replaced_value() {
        let mut bucket = Bucket::new(0);
        let capacity = (BUCKET_HEADER_LEN + entry_len(1, 20)) as u32;
        assert!(bucket.fits(1, b"k", 20, capacity));
        bucket.upsert(1, b"k", &[0u8; 20]);

        assert!(bucket.fits(1, b"k", 20, capacity));
        assert!(!bucket.fits(1, b"k", 21, capacity));
        assert!(!bucket.fits(2, b"j", 0, capacity));
    }

    #[test]
    fn split_separates_on_next_bit() {
        let mut bucket = Bucket::new(1);
        bucket.upsert(0x0000_0001, b"a", b"1");
        bucket.upsert(0x4000_0000, b"b", b"2");
        bucket.upsert(0x8000_0000, b"c", b"3");
        bucket.upsert(0xC000_0000, b"d", b"4");

        let (low, high) = bucket.split();
        assert_eq!(low.bits, 2);
        assert_eq!(high.bits, 2);
        let low_keys: Vec<_> = low.entries().map(|e| e.key.clone()).collect();
        let high_keys: Vec<_> = high.entries().map(|e| e.key.clone()).collect();
        assert_eq!(low_keys, vec![b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(high_keys, vec![b"b".to_vec(), b"d".to_vec()]);
        assert_eq!(low.used() + high.used(), bucket.used() + BUCKET_HEADER_LEN);
    }

    #[test]
    fn decode_rejects_overrunning_entry() {
        let mut block = Bucket::new(0).to_block(64);
        block[4] = 1; // count
        block[8 + 4] = 200; // key_len
        assert!(Bucket::decode(&block).is_err());
    }

    #[test]
    fn max_entry_len_leaves_room_for_header() {
        assert_eq!(max_entry_len(512), 504);
    }
}
