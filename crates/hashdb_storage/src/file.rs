//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Advisory lock flavours for [`FileBackend::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Single writer, no concurrent readers.
    Exclusive,
    /// Any number of readers, no writer.
    Shared,
}

/// A file-based storage backend.
///
/// This backend provides persistent storage using OS file APIs.
/// Data survives process restarts.
///
/// # Durability
///
/// Writes go straight to the file; `sync()` calls `File::sync_all()` to
/// ensure data is on disk.
///
/// # Mapped view
///
/// A backend opened with [`FileBackend::open_mapped`] keeps a read-only
/// memory map of the file and serves reads from it. The map is refreshed on
/// every `sync()` so it covers blocks appended since. While the view is
/// attached, [`StorageBackend::is_mapped`] reports `true`.
///
/// # Example
///
/// ```no_run
/// use hashdb_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.db")).unwrap();
/// backend.seek(0).unwrap();
/// backend.write(b"persistent data").unwrap();
/// backend.sync().unwrap();  // Ensure data is durable
/// ```
#[derive(Debug)]
pub struct FileBackend {
    file: RwLock<File>,
    size: RwLock<u64>,
    map: RwLock<Option<Mmap>>,
    mapped: bool,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Self::from_file(file, false)
    }

    /// Opens an existing file without write access.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file, false)
    }

    /// Opens or creates a file backend with a memory-mapped read view.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open_mapped(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let backend = Self::from_file(file, true)?;
        backend.remap()?;
        Ok(backend)
    }

    fn from_file(file: File, mapped: bool) -> StorageResult<Self> {
        let size = file.metadata()?.len();

        Ok(Self {
            file: RwLock::new(file),
            size: RwLock::new(size),
            map: RwLock::new(None),
            mapped,
        })
    }

    /// Takes a non-blocking advisory lock on the file.
    ///
    /// The lock is released when the backend is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another handle holds a
    /// conflicting lock.
    pub fn lock(&self, mode: LockMode) -> StorageResult<()> {
        let file = self.file.read();
        // Qualified so newer toolchains do not pick std's inherent `File` locks.
        let result = match mode {
            LockMode::Exclusive => FileExt::try_lock_exclusive(&*file),
            LockMode::Shared => FileExt::try_lock_shared(&*file),
        };
        result.map_err(|_| StorageError::Locked)
    }

    #[allow(unsafe_code)]
    fn remap(&self) -> StorageResult<()> {
        if !self.mapped {
            return Ok(());
        }

        let file = self.file.read();
        let mut map = self.map.write();
        if file.metadata()?.len() == 0 {
            *map = None;
            return Ok(());
        }

        // SAFETY: the file is held open for the life of the map and this
        // backend only ever grows it.
        *map = Some(unsafe { Mmap::map(&*file)? });
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        if let Some(map) = self.map.read().as_ref() {
            if end <= map.len() as u64 {
                return Ok(map[offset as usize..end as usize].to_vec());
            }
        }

        let mut file = self.file.write();
        let cursor = file.stream_position()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        file.seek(SeekFrom::Start(cursor))?;

        Ok(buffer)
    }

    fn seek(&mut self, offset: u64) -> StorageResult<u64> {
        Ok(self.file.write().seek(SeekFrom::Start(offset))?)
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        let mut file = self.file.write();
        let mut written = 0;

        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Report the partial count; the caller decides what a short write means.
                Err(_) if written > 0 => break,
                Err(e) => return Err(e.into()),
            }
        }

        let end = file.stream_position()?;
        let mut size = self.size.write();
        if end > *size {
            *size = end;
        }

        Ok(written)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        self.remap()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }
}
