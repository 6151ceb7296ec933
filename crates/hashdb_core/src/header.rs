//! File header: the root every open trusts.
//!
//! The header occupies the first block of the file. It records the block
//! geometry, where the directory lives and how large it is, and the
//! allocation cursor. It is always the last thing a commit writes, so the
//! on-disk copy only ever describes a directory and buckets that are
//! already fully on disk.
//!
//! ```text
//! 0   magic "HXDB"        4
//! 4   format version      2
//! 6   reserved            2
//! 8   block size          4
//! 12  bucket size         4
//! 16  directory bits      4
//! 20  directory length    4
//! 24  directory offset    8
//! 32  next free block     8
//! ```
//!
//! All integers are little-endian; the rest of the block is zero.

use crate::config::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{CoreError, CoreResult};

/// Magic bytes at the start of every database file.
pub const HEADER_MAGIC: [u8; 4] = *b"HXDB";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Encoded length of the header fields.
pub const HEADER_LEN: usize = 40;

/// In-memory copy of the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Unit of all block-aligned allocation; also the header's own length.
    pub block_size: u32,
    /// Size of one bucket block.
    pub bucket_size: u32,
    /// log2 of the number of directory entries.
    pub dir_bits: u32,
    /// Directory length in bytes.
    pub dir_size: u32,
    /// File offset of the directory.
    pub dir: u64,
    /// First unallocated offset.
    pub next_block: u64,
}

impl Header {
    /// Encodes the header into a full, zero-padded block.
    #[must_use]
    pub fn to_block(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.block_size as usize);
        buf.extend_from_slice(&HEADER_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&self.block_size.to_le_bytes());
        buf.extend_from_slice(&self.bucket_size.to_le_bytes());
        buf.extend_from_slice(&self.dir_bits.to_le_bytes());
        buf.extend_from_slice(&self.dir_size.to_le_bytes());
        buf.extend_from_slice(&self.dir.to_le_bytes());
        buf.extend_from_slice(&self.next_block.to_le_bytes());
        buf.resize(self.block_size as usize, 0);
        buf
    }

    /// Decodes and validates a header from the start of the file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the magic, version or geometry is wrong.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(CoreError::invalid_format("header too short"));
        }
        if data[0..4] != HEADER_MAGIC {
            return Err(CoreError::invalid_format("invalid header magic"));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported format version {version}"
            )));
        }

        let header = Self {
            block_size: read_u32(data, 8),
            bucket_size: read_u32(data, 12),
            dir_bits: read_u32(data, 16),
            dir_size: read_u32(data, 20),
            dir: read_u64(data, 24),
            next_block: read_u64(data, 32),
        };
        header.check()?;
        Ok(header)
    }

    fn check(&self) -> CoreResult<()> {
        if !block_size_ok(self.block_size) {
            return Err(CoreError::invalid_format(format!(
                "bad block size {}",
                self.block_size
            )));
        }
        if !block_size_ok(self.bucket_size) || self.bucket_size % self.block_size != 0 {
            return Err(CoreError::invalid_format(format!(
                "bad bucket size {} for {}-byte blocks",
                self.bucket_size, self.block_size
            )));
        }
        if self.dir_bits >= 32 || u64::from(self.dir_size) != 8u64 << self.dir_bits {
            return Err(CoreError::invalid_format(format!(
                "directory of {} bytes does not match {} bits",
                self.dir_size, self.dir_bits
            )));
        }
        let in_bounds = self
            .dir
            .checked_add(u64::from(self.dir_size))
            .filter(|&end| end <= self.next_block)
            .is_some();
        if self.dir < u64::from(self.block_size) || !in_bounds {
            return Err(CoreError::invalid_format(format!(
                "directory at {} outside allocated space",
                self.dir
            )));
        }
        Ok(())
    }
}

fn block_size_ok(size: u32) -> bool {
    size.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            block_size: 512,
            bucket_size: 512,
            dir_bits: 6,
            dir_size: 512,
            dir: 512,
            next_block: 1536,
        }
    }

    #[test]
    fn block_is_padded_to_block_size() {
        let block = sample().to_block();
        assert_eq!(block.len(), 512);
        assert_eq!(&block[0..4], b"HXDB");
        assert!(block[HEADER_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_reads_back_fields() {
        let header = sample();
        assert_eq!(Header::decode(&header.to_block()).unwrap(), header);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut block = sample().to_block();
        block[0] = b'X';
        assert!(Header::decode(&block).is_err());
    }

    #[test]
    fn decode_rejects_future_version() {
        let mut block = sample().to_block();
        block[4] = 9;
        assert!(Header::decode(&block).is_err());
    }

    #[test]
    fn decode_rejects_mismatched_directory() {
        let mut header = sample();
        header.dir_size = 256;
        assert!(Header::decode(&header.to_block()).is_err());
    }

    #[test]
    fn decode_rejects_directory_past_allocation() {
        let mut header = sample();
        header.next_block = 600;
        assert!(Header::decode(&header.to_block()).is_err());
    }

    #[test]
    fn decode_rejects_tiny_bucket_size() {
        let mut header = sample();
        header.bucket_size = 4;
        let err = Header::decode(&header.to_block()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn decode_rejects_bucket_not_a_block_multiple() {
        let mut header = sample();
        header.block_size = 1024;
        header.bucket_size = 512;
        header.dir = 1024;
        header.next_block = 3072;
        assert!(Header::decode(&header.to_block()).is_err());
    }

    #[test]
    fn decode_rejects_block_below_minimum() {
        let mut header = sample();
        header.block_size = 64;
        header.bucket_size = 64;
        assert!(Header::decode(&header.to_block()).is_err());
    }

    #[test]
    fn decode_rejects_directory_offset_overflow() {
        let mut header = sample();
        header.dir = u64::MAX - 100;
        header.next_block = u64::MAX;
        let err = Header::decode(&header.to_block()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        assert!(Header::decode(&[0u8; 10]).is_err());
    }
}
