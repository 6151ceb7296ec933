//! Database handle.

use crate::bucket::{entry_len, max_entry_len, Bucket};
use crate::cache::BucketCache;
use crate::config::Config;
use crate::directory::{Directory, MAX_DIR_BITS};
use crate::error::{CoreError, CoreResult};
use crate::fatal::FatalHandler;
use crate::hash::hash_key;
use crate::header::{Header, HEADER_LEN};
use crate::io;
use crate::update::DirtyFlags;
use hashdb_storage::{FileBackend, LockMode, StorageBackend, StorageError};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How [`Database::store`] treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Overwrite the existing value.
    #[default]
    Replace,
    /// Fail with [`CoreError::KeyExists`].
    Insert,
}

/// Point-in-time figures about an open database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Allocation unit in bytes.
    pub block_size: u32,
    /// Bucket block size in bytes.
    pub bucket_size: u32,
    /// Directory depth.
    pub dir_bits: u32,
    /// Number of directory entries.
    pub dir_entries: usize,
    /// Number of distinct buckets referenced by the directory.
    pub buckets: usize,
    /// File offset of the directory.
    pub dir_offset: u64,
    /// First unallocated offset.
    pub next_block: u64,
    /// Current size of the file.
    pub file_size: u64,
    /// Buckets resident in the cache.
    pub cached_buckets: usize,
    /// Whether barriers are deferred.
    pub fast_write: bool,
    /// Whether a memory-mapped view is attached.
    pub mapped: bool,
}

/// An open hashdb file.
///
/// `Database` owns the file, an in-memory copy of the header and the
/// directory, and a bounded cache of buckets. Every mutating call stages its
/// changes in memory and commits them before returning, writing buckets
/// first and the header last so that the file always opens to the state of
/// some completed commit.
///
/// A handle is used by one thread at a time; all operations take `&mut self`.
///
/// # Storage faults
///
/// A failed seek, a short write, or a failed barrier while committing leaves
/// the file in a state the handle can no longer reason about. Such faults
/// are not returned: the fatal-error handler (see
/// [`Database::set_fatal_handler`]) is called and the process exits with
/// status 1.
///
/// # Example
///
/// ```rust,ignore
/// use hashdb_core::{Database, StoreMode};
/// use std::path::Path;
///
/// let mut db = Database::open(Path::new("data.hdb"))?;
/// db.store(b"alpha", b"1", StoreMode::Replace)?;
/// assert_eq!(db.fetch(b"alpha")?, Some(b"1".to_vec()));
/// db.close()?;
/// ```
pub struct Database {
    /// Configuration the handle was opened with.
    config: Config,
    /// The database file.
    pub(crate) storage: Box<dyn StorageBackend>,
    /// In-memory header; the on-disk copy is replaced at the end of a commit.
    pub(crate) header: Header,
    /// In-memory directory.
    pub(crate) directory: Directory,
    /// Resident buckets.
    pub(crate) cache: BucketCache,
    /// Regions awaiting a commit.
    pub(crate) dirty: DirtyFlags,
    /// Defer barriers on ordinary commits.
    pub(crate) fast_write: bool,
    /// Receives the message of an unrecoverable fault.
    pub(crate) fatal_handler: Option<FatalHandler>,
    /// Buffer lent out by the compatibility fetch accessor.
    pub(crate) fetch_slot: Option<Vec<u8>>,
    /// Whether mutations are rejected.
    read_only: bool,
    /// Set once the handle must no longer touch the file.
    pub(crate) closed: bool,
}

impl Database {
    /// Opens or creates a database file with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Database::open_with_config`].
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens or creates a database file.
    ///
    /// The file is locked for the lifetime of the handle: exclusively for a
    /// writer, shared for a read-only handle.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing and may not be created (`NotFound`)
    /// - The file exists and `error_if_exists` is set (`AlreadyExists`)
    /// - Another handle holds a conflicting lock (`DatabaseLocked`)
    /// - The file is not a hashdb file (`InvalidFormat`)
    /// - I/O errors occur
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        config.validate()?;

        let exists = path.exists();
        if !exists && (config.read_only || !config.create_if_missing) {
            return Err(CoreError::NotFound);
        }

        let backend = if config.read_only {
            FileBackend::open_read_only(path)?
        } else if config.memory_map {
            FileBackend::open_mapped(path)?
        } else {
            FileBackend::open(path)?
        };

        let mode = if config.read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        backend.lock(mode).map_err(|e| match e {
            StorageError::Locked => CoreError::DatabaseLocked,
            other => CoreError::Storage(other),
        })?;

        debug!(path = %path.display(), ?mode, "locked database file");
        Self::open_with_backend(config, Box::new(backend))
    }

    /// Opens a database over an arbitrary backend.
    ///
    /// An empty backend is initialized: a header block, a directory of one
    /// block, and a single empty bucket are written and synced.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Database::open_with_config`], except
    /// those tied to locking.
    pub fn open_with_backend(config: Config, storage: Box<dyn StorageBackend>) -> CoreResult<Self> {
        config.validate()?;

        if storage.size()? == 0 {
            if config.read_only || !config.create_if_missing {
                return Err(CoreError::NotFound);
            }
            Self::create(config, storage)
        } else {
            if config.error_if_exists {
                return Err(CoreError::AlreadyExists);
            }
            Self::load(config, storage)
        }
    }

    fn create(config: Config, storage: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let block_size = config.block_size;
        let block = u64::from(block_size);
        let dir_bits = (block_size / 8).trailing_zeros();
        let bucket_offset = 2 * block;

        let header = Header {
            block_size,
            bucket_size: block_size,
            dir_bits,
            dir_size: block_size,
            dir: block,
            next_block: 3 * block,
        };
        let directory = Directory::new(dir_bits, bucket_offset);
        let mut db = Self::assemble(config, storage, header, directory);

        let slot = db.claim_slot()?;
        db.cache.replace(slot, bucket_offset, Bucket::new(0), false);
        db.cache.set_current(slot);
        db.mark_current_changed();
        db.dirty.directory_changed = true;
        db.dirty.header_changed = true;

        let result = db
            .end_update()
            .and_then(|()| io::sync(db.storage.as_mut()))
            .map_err(CoreError::from);
        db.escalate(result)?;

        info!(block_size, dir_bits, "created database");
        Ok(db)
    }

    fn load(config: Config, storage: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let size = storage.size()?;
        let prefix = storage.read_at(0, HEADER_LEN)?;
        let header = Header::decode(&prefix)?;

        let dir_end = header.dir.checked_add(u64::from(header.dir_size));
        if dir_end.filter(|&end| end <= size).is_none() {
            return Err(CoreError::invalid_format(format!(
                "directory at {} runs past end of file ({size} bytes)",
                header.dir
            )));
        }
        let block = storage.read_at(header.dir, header.dir_size as usize)?;
        let directory = Directory::decode(&block, header.dir_bits)?;

        info!(
            block_size = header.block_size,
            dir_bits = header.dir_bits,
            size,
            "opened database"
        );
        Ok(Self::assemble(config, storage, header, directory))
    }

    fn assemble(
        config: Config,
        storage: Box<dyn StorageBackend>,
        header: Header,
        directory: Directory,
    ) -> Self {
        Self {
            cache: BucketCache::new(config.cache_size),
            fast_write: config.fast_write,
            fatal_handler: config.fatal_handler.clone(),
            read_only: config.read_only,
            storage,
            header,
            directory,
            dirty: DirtyFlags::default(),
            fetch_slot: None,
            closed: false,
            config,
        }
    }

    /// Looks up the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket cannot be read or decoded.
    pub fn fetch(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let hash = hash_key(key);
        let result = self
            .bucket_for(hash)
            .map(|index| self.cache.slot(index).bucket.get(hash, key).map(<[u8]>::to_vec));
        self.escalate(result)
    }

    /// Returns `true` if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket cannot be read or decoded.
    pub fn contains(&mut self, key: &[u8]) -> CoreResult<bool> {
        let hash = hash_key(key);
        let result = self
            .bucket_for(hash)
            .map(|index| self.cache.slot(index).bucket.get(hash, key).is_some());
        self.escalate(result)
    }

    /// Stores `value` under `key` and commits.
    ///
    /// A full bucket is split, doubling the directory first when the bucket
    /// is already as deep as the directory, until the entry fits.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The handle is read-only (`ReadOnly`)
    /// - `mode` is [`StoreMode::Insert`] and `key` exists (`KeyExists`)
    /// - The entry cannot fit in an empty bucket (`EntryTooLarge`)
    /// - Colliding hashes would need a directory deeper than supported
    ///   (`DirectoryFull`)
    pub fn store(&mut self, key: &[u8], value: &[u8], mode: StoreMode) -> CoreResult<()> {
        self.ensure_writable()?;

        let size = entry_len(key.len(), value.len());
        let capacity = max_entry_len(self.header.bucket_size);
        if size > capacity {
            return Err(CoreError::EntryTooLarge { size, capacity });
        }

        let hash = hash_key(key);
        self.update(|db| db.store_entry(hash, key, value, mode))
    }

    fn store_entry(
        &mut self,
        hash: u32,
        key: &[u8],
        value: &[u8],
        mode: StoreMode,
    ) -> CoreResult<()> {
        loop {
            let index = self.bucket_for(hash)?;
            let bucket = &self.cache.slot(index).bucket;

            if mode == StoreMode::Insert && bucket.get(hash, key).is_some() {
                return Err(CoreError::KeyExists);
            }
            if bucket.fits(hash, key, value.len(), self.header.bucket_size) {
                self.cache.slot_mut(index).bucket.upsert(hash, key, value);
                self.mark_current_changed();
                return Ok(());
            }

            self.split_bucket(index)?;
        }
    }

    /// Removes `key` and commits. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only handle, or an error if a bucket
    /// cannot be read.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        self.ensure_writable()?;

        let hash = hash_key(key);
        self.update(|db| {
            let index = db.bucket_for(hash)?;
            let removed = db.cache.slot_mut(index).bucket.remove(hash, key);
            if removed {
                db.mark_current_changed();
            }
            Ok(removed)
        })
    }

    /// Returns every key, bucket by bucket in directory order.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket cannot be read or decoded.
    pub fn keys(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        let result = self.collect_keys();
        self.escalate(result)
    }

    fn collect_keys(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for offset in self.directory.buckets() {
            let index = self.load_bucket(offset)?;
            keys.extend(self.cache.slot(index).bucket.entries().map(|e| e.key.clone()));
        }
        Ok(keys)
    }

    /// Commits anything staged and issues a barrier regardless of the
    /// fast-write setting.
    ///
    /// # Errors
    ///
    /// Storage faults are fatal; this only returns `Ok` in practice.
    pub fn sync(&mut self) -> CoreResult<()> {
        if self.read_only {
            return Ok(());
        }
        let result = self
            .end_update()
            .and_then(|()| io::sync(self.storage.as_mut()))
            .map_err(CoreError::from);
        self.escalate(result)
    }

    /// Commits, syncs and releases the file.
    ///
    /// # Errors
    ///
    /// Storage faults are fatal; this only returns `Ok` in practice.
    pub fn close(mut self) -> CoreResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.sync();
        self.closed = true;
        self.fetch_slot = None;
        debug!("closed database");
        result
    }

    /// Turns deferred barriers on or off for later commits.
    pub fn set_fast_write(&mut self, enabled: bool) {
        self.fast_write = enabled;
    }

    /// Returns whether barriers are deferred.
    #[must_use]
    pub fn fast_write(&self) -> bool {
        self.fast_write
    }

    /// Installs the handler called with the message of an unrecoverable
    /// storage fault. The process still exits with status 1 if the handler
    /// returns.
    pub fn set_fatal_handler<F>(&mut self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.fatal_handler = Some(Arc::new(handler));
    }

    /// Removes the fatal-error handler; faults are reported on stderr.
    pub fn clear_fatal_handler(&mut self) {
        self.fatal_handler = None;
    }

    /// Returns the configuration the handle was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` if mutations are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Collects figures about the file and the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the file size cannot be read.
    pub fn stats(&self) -> CoreResult<DatabaseStats> {
        Ok(DatabaseStats {
            block_size: self.header.block_size,
            bucket_size: self.header.bucket_size,
            dir_bits: self.header.dir_bits,
            dir_entries: self.directory.len(),
            buckets: self.directory.buckets().len(),
            dir_offset: self.header.dir,
            next_block: self.header.next_block,
            file_size: self.storage.size()?,
            cached_buckets: self.cache.len(),
            fast_write: self.fast_write,
            mapped: self.storage.is_mapped(),
        })
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        if self.read_only {
            Err(CoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Makes the bucket for `hash` current and returns its slot.
    fn bucket_for(&mut self, hash: u32) -> CoreResult<usize> {
        let offset = self.directory.bucket_for(hash);
        self.load_bucket(offset)
    }

    /// Makes the bucket at `offset` current, reading it if not cached.
    pub(crate) fn load_bucket(&mut self, offset: u64) -> CoreResult<usize> {
        if let Some(index) = self.cache.find(offset) {
            self.make_current(index);
            return Ok(index);
        }

        let block = self
            .storage
            .read_at(offset, self.header.bucket_size as usize)?;
        let bucket = Bucket::decode(&block)?;
        let index = self.claim_slot()?;
        self.cache.replace(index, offset, bucket, false);
        self.make_current(index);
        Ok(index)
    }

    /// Returns a slot for a new bucket, writing out a changed victim first.
    pub(crate) fn claim_slot(&mut self) -> CoreResult<usize> {
        match self.cache.claim() {
            Ok(index) => Ok(index),
            Err(index) => {
                if self.cache.slot(index).changed {
                    self.write_bucket(index)?;
                }
                Ok(index)
            }
        }
    }

    /// Switches the current slot. A pending current-bucket write becomes a
    /// pending other-bucket write.
    pub(crate) fn make_current(&mut self, index: usize) {
        if self.cache.current() != Some(index) && self.dirty.bucket_changed {
            self.dirty.bucket_changed = false;
            self.dirty.second_changed = true;
        }
        self.cache.set_current(index);
    }

    pub(crate) fn mark_current_changed(&mut self) {
        if let Some(index) = self.cache.current() {
            self.cache.slot_mut(index).changed = true;
            self.dirty.bucket_changed = true;
        }
    }

    /// Reserves `len` bytes, rounded up to whole blocks, at the end of the
    /// allocated space.
    pub(crate) fn allocate(&mut self, len: u32) -> u64 {
        let block = u64::from(self.header.block_size);
        let offset = self.header.next_block;
        self.header.next_block += u64::from(len).div_ceil(block) * block;
        self.dirty.header_changed = true;
        offset
    }

    /// Doubles the directory into a newly allocated region. The old region
    /// stays valid until the header naming the new one is written.
    pub(crate) fn grow_directory(&mut self) -> CoreResult<()> {
        let bits = self.directory.bits();
        if bits >= MAX_DIR_BITS {
            return Err(CoreError::DirectoryFull { bits });
        }

        self.directory.double();
        let size = u32::try_from(self.directory.byte_len())
            .map_err(|_| CoreError::DirectoryFull { bits })?;
        self.header.dir = self.allocate(size);
        self.header.dir_size = size;
        self.header.dir_bits = bits + 1;
        self.dirty.directory_changed = true;

        debug!(bits = bits + 1, offset = self.header.dir, "grew directory");
        Ok(())
    }

    /// Splits the bucket in slot `index` into two newly allocated buckets.
    fn split_bucket(&mut self, index: usize) -> CoreResult<()> {
        let old_offset = self.cache.slot(index).offset;
        let depth = self.cache.slot(index).bucket.bits;
        if depth >= self.directory.bits() {
            self.grow_directory()?;
        }

        let (low, high) = self.cache.slot(index).bucket.split();
        let low_offset = self.allocate(self.header.bucket_size);
        let high_offset = self.allocate(self.header.bucket_size);
        self.directory
            .repoint(old_offset, depth + 1, low_offset, high_offset);
        self.dirty.directory_changed = true;

        // The low half takes over the current slot.
        debug_assert_eq!(self.cache.current(), Some(index));
        self.cache.replace(index, low_offset, low, false);
        self.mark_current_changed();

        let other = self.claim_slot()?;
        self.cache.replace(other, high_offset, high, true);
        self.dirty.second_changed = true;

        debug!(
            from = old_offset,
            low = low_offset,
            high = high_offset,
            depth = depth + 1,
            "split bucket"
        );
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("header", &self.header)
            .field("cached_buckets", &self.cache.len())
            .field("dirty", &self.dirty)
            .field("fast_write", &self.fast_write)
            .field("read_only", &self.read_only)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to close database cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashdb_storage::InMemoryBackend;
    use hashdb_testkit::RecordingBackend;
    use std::collections::HashMap;

    fn small_config() -> Config {
        Config::new().block_size(512).cache_size(4)
    }

    fn open_memory(config: Config) -> Database {
        Database::open_with_backend(config, Box::new(InMemoryBackend::new())).unwrap()
    }

    #[test]
    fn create_lays_out_header_directory_and_bucket() {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let db = Database::open_with_backend(small_config(), Box::new(backend)).unwrap();

        assert_eq!(db.header.dir, 512);
        assert_eq!(db.header.dir_bits, 6);
        assert_eq!(db.header.next_block, 1536);
        assert_eq!(db.directory.buckets(), vec![1024]);
        assert_eq!(log.writes(), vec![(1024, 512), (512, 512), (0, 512)]);
        assert!(log.sync_count() >= 1);
    }

    #[test]
    fn store_fetch_delete() {
        let mut db = open_memory(small_config());

        db.store(b"alpha", b"1", StoreMode::Replace).unwrap();
        db.store(b"beta", b"2", StoreMode::Replace).unwrap();
        assert_eq!(db.fetch(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert!(db.contains(b"beta").unwrap());

        db.store(b"alpha", b"one", StoreMode::Replace).unwrap();
        assert_eq!(db.fetch(b"alpha").unwrap(), Some(b"one".to_vec()));

        assert!(db.delete(b"alpha").unwrap());
        assert!(!db.delete(b"alpha").unwrap());
        assert_eq!(db.fetch(b"alpha").unwrap(), None);
    }

    #[test]
    fn insert_refuses_existing_key() {
        let mut db = open_memory(small_config());
        db.store(b"k", b"v", StoreMode::Insert).unwrap();

        let err = db.store(b"k", b"w", StoreMode::Insert).unwrap_err();
        assert!(matches!(err, CoreError::KeyExists));
        assert_eq!(db.fetch(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let mut db = open_memory(small_config());
        let err = db.store(b"k", &[0u8; 600], StoreMode::Replace).unwrap_err();
        assert!(matches!(err, CoreError::EntryTooLarge { capacity: 504, .. }));
    }

    #[test]
    fn many_keys_split_and_grow_directory() {
        let mut db = open_memory(small_config());
        let mut model = HashMap::new();

        for i in 0..2000u32 {
            let key = format!("key-{i}").into_bytes();
            let value = i.to_le_bytes().repeat(4);
            db.store(&key, &value, StoreMode::Replace).unwrap();
            model.insert(key, value);
        }

        assert!(db.header.dir_bits > 6);
        assert_eq!(db.directory.len(), 1usize << db.header.dir_bits);
        assert!(db.cache.len() <= 4);
        for (key, value) in &model {
            assert_eq!(db.fetch(key).unwrap().as_ref(), Some(value));
        }
        assert_eq!(db.keys().unwrap().len(), model.len());
        assert_eq!(db.dirty, DirtyFlags::default());
    }

    #[test]
    fn split_moves_halves_to_fresh_blocks() {
        let mut db = open_memory(small_config());
        let before = db.header.next_block;

        let mut i = 0u32;
        while db.directory.buckets().len() == 1 {
            db.store(format!("k{i}").as_bytes(), &[1u8; 40], StoreMode::Replace)
                .unwrap();
            i += 1;
        }

        let buckets = db.directory.buckets();
        assert!(!buckets.contains(&1024));
        assert!(buckets.iter().all(|&b| b >= before));
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut db = open_memory(small_config());
        db.store(b"k", b"v", StoreMode::Replace).unwrap();
        let image = db
            .storage
            .read_at(0, db.storage.size().unwrap() as usize)
            .unwrap();

        let mut reader = Database::open_with_backend(
            small_config().read_only(true),
            Box::new(InMemoryBackend::with_data(image)),
        )
        .unwrap();
        assert_eq!(reader.fetch(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(matches!(
            reader.store(b"k", b"w", StoreMode::Replace),
            Err(CoreError::ReadOnly)
        ));
        assert!(matches!(reader.delete(b"k"), Err(CoreError::ReadOnly)));
    }

    #[test]
    fn empty_backend_without_create_is_not_found() {
        let result = Database::open_with_backend(
            small_config().create_if_missing(false),
            Box::new(InMemoryBackend::new()),
        );
        assert!(matches!(result, Err(CoreError::NotFound)));
    }

    #[test]
    fn garbage_is_invalid_format() {
        let result = Database::open_with_backend(
            small_config(),
            Box::new(InMemoryBackend::with_data(vec![0xAB; 2048])),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    fn image_with(header: &Header) -> Vec<u8> {
        let mut image = header.to_block();
        image.resize(1536, 0);
        for slot in 0..64 {
            let at = 512 + slot * 8;
            image[at..at + 8].copy_from_slice(&1024u64.to_le_bytes());
        }
        image
    }

    fn valid_header() -> Header {
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
    fn tiny_bucket_size_is_refused_at_open() {
        let mut header = valid_header();
        header.bucket_size = 4;
        let result = Database::open_with_backend(
            small_config(),
            Box::new(InMemoryBackend::with_data(image_with(&header))),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn overflowing_directory_offset_is_refused_at_open() {
        let mut header = valid_header();
        header.dir = u64::MAX - 100;
        header.next_block = u64::MAX;
        let result = Database::open_with_backend(
            small_config(),
            Box::new(InMemoryBackend::with_data(image_with(&header))),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn directory_past_end_of_file_is_refused_at_open() {
        let mut header = valid_header();
        header.next_block = 4096;
        header.dir = 2048;
        let result = Database::open_with_backend(
            small_config(),
            Box::new(InMemoryBackend::with_data(image_with(&header))),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn well_formed_image_opens() {
        let mut db = Database::open_with_backend(
            small_config(),
            Box::new(InMemoryBackend::with_data(image_with(&valid_header()))),
        )
        .unwrap();
        db.store(b"k", b"v", StoreMode::Replace).unwrap();
        assert_eq!(db.fetch(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn stats_reflect_layout() {
        let mut db = open_memory(small_config().fast_write(true));
        db.store(b"a", b"b", StoreMode::Replace).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.block_size, 512);
        assert_eq!(stats.dir_entries, 64);
        assert_eq!(stats.buckets, 1);
        assert!(stats.fast_write);
        assert!(!stats.mapped);
        assert_eq!(stats.file_size, 1536);
    }

    #[test]
    fn fast_write_can_be_toggled() {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let mut db = Database::open_with_backend(small_config(), Box::new(backend)).unwrap();

        db.set_fast_write(true);
        assert!(db.fast_write());
        log.clear();
        for i in 0..200u32 {
            db.store(&i.to_le_bytes(), &[0u8; 32], StoreMode::Replace)
                .unwrap();
        }
        assert_eq!(log.sync_count(), 0);

        db.set_fast_write(false);
        db.sync().unwrap();
        assert_eq!(log.sync_count(), 1);
    }
}
