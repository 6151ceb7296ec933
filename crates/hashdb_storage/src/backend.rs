//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level positioned storage backend for hashdb.
///
/// Storage backends are **opaque byte stores**. Writes go through a cursor
/// (`seek` then `write`) so the caller can check both the landed position and
/// the number of bytes accepted. hashdb owns all format interpretation.
///
/// # Invariants
///
/// - `seek` returns the position the cursor actually landed on
/// - `write` writes at the cursor and advances it by the returned count
/// - `read_at` returns exactly the bytes previously written at that offset
///   and does not disturb the cursor as seen by the next `seek`
/// - `sync` returns only after all prior writes are on stable storage
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Moves the write cursor to `offset`.
    ///
    /// Returns the position the cursor landed on. Callers compare it against
    /// the requested offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the positioning call itself fails.
    fn seek(&mut self, offset: u64) -> StorageResult<u64>;

    /// Writes `data` at the cursor.
    ///
    /// Returns the number of bytes written, which may be less than
    /// `data.len()` if the device stops accepting data part way through.
    /// Writing past the end grows the storage.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing could be written.
    fn write(&mut self, data: &[u8]) -> StorageResult<usize>;

    /// Forces all previous writes to stable storage.
    ///
    /// This is the durability barrier: after it returns successfully, every
    /// byte written before the call survives a crash or power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Returns `true` if a memory-mapped view of the storage is attached.
    ///
    /// A mapped view is a second path by which bytes reach the page cache,
    /// so callers treat its presence as a reason to sync conservatively.
    fn is_mapped(&self) -> bool {
        false
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn seek(&mut self, offset: u64) -> StorageResult<u64> {
        (**self).seek(offset)
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        (**self).write(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn is_mapped(&self) -> bool {
        (**self).is_mapped()
    }
}
