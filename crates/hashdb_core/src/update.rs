//! Committing staged changes to the file.
//!
//! Mutations only touch memory: they edit cached buckets, the directory and
//! the header, and raise the matching dirty flag. [`Database::end_update`]
//! then pushes everything out in a fixed order:
//!
//! 1. the current bucket
//! 2. every other changed bucket
//! 3. the directory
//! 4. the header
//!
//! Leaves go first, the root last. The header is the only thing an open
//! trusts, so until step 4 lands the file still describes the previous
//! commit, whose buckets and directory are untouched on disk: split buckets
//! and a doubled directory are always written to freshly allocated blocks.
//!
//! Durability barriers follow the fast-write setting. With fast write off,
//! or whenever a mapped view is attached, the header write is synced, and so
//! is a directory write that is not followed by a header write in the same
//! commit. When the header does follow, its barrier covers the directory
//! written just before it on the same file.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::fatal::{self, StorageFault};
use crate::io;
use tracing::{debug, error};

/// Which in-memory regions differ from their on-disk image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirtyFlags {
    /// The current cache slot is stale.
    pub bucket_changed: bool,
    /// Some other cache slot may be stale.
    pub second_changed: bool,
    /// The directory is stale.
    pub directory_changed: bool,
    /// The header is stale.
    pub header_changed: bool,
}

impl DirtyFlags {
    /// Returns `true` if any region awaits a commit.
    pub fn any(self) -> bool {
        self.bucket_changed || self.second_changed || self.directory_changed || self.header_changed
    }
}

impl Database {
    /// Whether writes must be followed by a barrier.
    pub(crate) fn needs_barrier(&self) -> bool {
        !self.fast_write || self.storage.is_mapped()
    }

    /// Writes the header block at offset zero.
    pub(crate) fn write_header(&mut self) -> Result<(), StorageFault> {
        let block = self.header.to_block();
        io::write_block(self.storage.as_mut(), 0, &block)?;

        if self.needs_barrier() {
            io::sync(self.storage.as_mut())?;
        }
        Ok(())
    }

    /// Writes the bucket cached in slot `index` and marks it clean.
    pub(crate) fn write_bucket(&mut self, index: usize) -> Result<(), StorageFault> {
        let slot = self.cache.slot(index);
        let block = slot.bucket.to_block(self.header.bucket_size);
        io::write_block(self.storage.as_mut(), slot.offset, &block)?;
        self.cache.slot_mut(index).changed = false;
        Ok(())
    }

    /// Flushes every staged change to the file.
    ///
    /// A flag is cleared only after its region has been written. A second
    /// call with nothing staged performs no I/O.
    pub(crate) fn end_update(&mut self) -> Result<(), StorageFault> {
        if !self.dirty.any() {
            return Ok(());
        }

        let mut buckets = 0usize;
        let directory = self.dirty.directory_changed;
        let header = self.dirty.header_changed;

        if self.dirty.bucket_changed {
            if let Some(current) = self.cache.current() {
                self.write_bucket(current)?;
                self.dirty.bucket_changed = false;
                buckets += 1;
            }
        }

        if self.dirty.second_changed {
            for index in self.cache.changed_slots() {
                self.write_bucket(index)?;
                buckets += 1;
            }
            self.dirty.second_changed = false;
        }

        if self.dirty.directory_changed {
            let block = self.directory.to_bytes();
            debug_assert_eq!(block.len(), self.header.dir_size as usize);
            io::write_block(self.storage.as_mut(), self.header.dir, &block)?;
            self.dirty.directory_changed = false;

            if !self.dirty.header_changed && self.needs_barrier() {
                io::sync(self.storage.as_mut())?;
            }
        }

        if self.dirty.header_changed {
            self.write_header()?;
            self.dirty.header_changed = false;
        }

        debug!(buckets, directory, header, "committed update");
        Ok(())
    }

    /// Routes a fatal fault to the fatal-error handler; passes anything
    /// else through.
    ///
    /// Every public operation funnels its result through here, so a
    /// [`CoreError::Fatal`] never reaches a caller.
    pub(crate) fn escalate<T>(&mut self, result: CoreResult<T>) -> CoreResult<T> {
        match result {
            Err(CoreError::Fatal(fault)) => self.fatal(&fault),
            other => other,
        }
    }

    fn fatal(&mut self, fault: &StorageFault) -> ! {
        // Nothing may touch the file again, not even the close in `Drop`.
        self.closed = true;
        error!(
            kind = ?fault.kind(),
            offset = fault.offset(),
            detail = fault.detail(),
            "unrecoverable storage fault"
        );
        fatal::terminate(self.fatal_handler.as_ref(), fault.kind().message())
    }

    /// Runs `stage` and commits whatever it staged, even if it failed part
    /// way; staged state is always self-consistent.
    pub(crate) fn update<T>(
        &mut self,
        stage: impl FnOnce(&mut Self) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let staged = stage(self);
        let staged = self.escalate(staged);
        let committed = self.end_update().map_err(CoreError::from);
        self.escalate(committed)?;
        staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::config::Config;
    use crate::directory::Directory;
    use crate::StoreMode;
    use hashdb_storage::InMemoryBackend;
    use hashdb_testkit::{FaultyBackend, IoEvent, IoLog, RecordingBackend};

    const BLOCK: u32 = 512;
    const HEADER_AT: u64 = 0;
    const DIR_AT: u64 = 512;
    const CURRENT_AT: u64 = 1024;
    const OTHER_AT: u64 = 1536;

    /// A fresh database with the created bucket current in slot 0 and a
    /// second bucket cached in slot 1. The log is cleared.
    fn fixture(config: Config, mapped: bool) -> (Database, IoLog) {
        let backend = RecordingBackend::new().mapped(mapped);
        let log = backend.log();
        let mut db = Database::open_with_backend(config.block_size(BLOCK), Box::new(backend))
            .unwrap();

        assert_eq!(db.header.dir, DIR_AT);
        assert_eq!(db.cache.slot(db.cache.current().unwrap()).offset, CURRENT_AT);
        let other = db.claim_slot().unwrap();
        assert_eq!(db.allocate(BLOCK), OTHER_AT);
        db.cache.replace(other, OTHER_AT, Bucket::new(0), false);

        db.dirty = DirtyFlags::default();
        log.clear();
        (db, log)
    }

    fn stage(db: &mut Database, flags: DirtyFlags) {
        if flags.bucket_changed {
            db.mark_current_changed();
        }
        if flags.second_changed {
            let other = db.cache.find(OTHER_AT).unwrap();
            db.cache.slot_mut(other).changed = true;
            db.dirty.second_changed = true;
        }
        db.dirty.directory_changed = flags.directory_changed;
        db.dirty.header_changed = flags.header_changed;
    }

    fn subset(bits: u8) -> DirtyFlags {
        DirtyFlags {
            bucket_changed: bits & 1 != 0,
            second_changed: bits & 2 != 0,
            directory_changed: bits & 4 != 0,
            header_changed: bits & 8 != 0,
        }
    }

    fn write(offset: u64, len: u32) -> IoEvent {
        IoEvent::Write {
            offset,
            len: len as usize,
        }
    }

    /// Trace expected with fast write off and no mapping.
    fn expected_trace(flags: DirtyFlags) -> Vec<IoEvent> {
        let mut trace = Vec::new();
        if flags.bucket_changed {
            trace.push(write(CURRENT_AT, BLOCK));
        }
        if flags.second_changed {
            trace.push(write(OTHER_AT, BLOCK));
        }
        if flags.directory_changed {
            trace.push(write(DIR_AT, BLOCK));
            if !flags.header_changed {
                trace.push(IoEvent::Sync);
            }
        }
        if flags.header_changed {
            trace.push(write(HEADER_AT, BLOCK));
            trace.push(IoEvent::Sync);
        }
        trace
    }

    #[test]
    fn every_flag_subset_writes_its_regions_in_order() {
        for bits in 0..16u8 {
            let flags = subset(bits);
            let (mut db, log) = fixture(Config::new(), false);
            stage(&mut db, flags);

            db.end_update().unwrap();

            assert_eq!(log.durability_trace(), expected_trace(flags), "flags {flags:?}");
            assert_eq!(db.dirty, DirtyFlags::default(), "flags {flags:?}");
            assert!(db.cache.changed_slots().is_empty(), "flags {flags:?}");
        }
    }

    #[test]
    fn current_bucket_alone_is_one_write_without_barrier() {
        let (mut db, log) = fixture(Config::new(), false);
        db.mark_current_changed();

        db.end_update().unwrap();

        assert_eq!(log.durability_trace(), vec![write(CURRENT_AT, BLOCK)]);
        assert_eq!(log.sync_count(), 0);
    }

    #[test]
    fn directory_barrier_is_skipped_when_header_follows() {
        let (mut db, log) = fixture(Config::new(), false);
        db.dirty.directory_changed = true;
        db.dirty.header_changed = true;

        db.end_update().unwrap();

        assert_eq!(
            log.durability_trace(),
            vec![write(DIR_AT, BLOCK), write(HEADER_AT, BLOCK), IoEvent::Sync]
        );
    }

    #[test]
    fn fast_write_defers_barriers() {
        let (mut db, log) = fixture(Config::new().fast_write(true), false);
        db.dirty.directory_changed = true;
        db.end_update().unwrap();

        db.dirty.header_changed = true;
        db.end_update().unwrap();

        assert_eq!(log.writes().len(), 2);
        assert_eq!(log.sync_count(), 0);
    }

    #[test]
    fn mapped_view_forces_barriers_despite_fast_write() {
        let (mut db, log) = fixture(Config::new().fast_write(true), true);
        db.dirty.directory_changed = true;
        db.end_update().unwrap();
        assert_eq!(log.sync_count(), 1);

        db.dirty.header_changed = true;
        db.end_update().unwrap();
        assert_eq!(log.sync_count(), 2);
    }

    #[test]
    fn header_write_syncs_without_fast_write_regardless_of_mapping() {
        for mapped in [false, true] {
            let (mut db, log) = fixture(Config::new(), mapped);
            db.write_header().unwrap();
            assert_eq!(
                log.durability_trace(),
                vec![write(HEADER_AT, BLOCK), IoEvent::Sync]
            );
        }
    }

    #[test]
    fn second_commit_with_nothing_staged_is_silent() {
        let (mut db, log) = fixture(Config::new(), false);
        stage(&mut db, subset(0b1111));
        db.end_update().unwrap();
        log.clear();

        db.end_update().unwrap();

        assert!(log.is_empty());
    }

    #[test]
    fn grown_directory_then_header() {
        let (mut db, log) = fixture(Config::new(), false);
        // Start from a 16-entry directory.
        db.directory = Directory::new(4, CURRENT_AT);
        db.header.dir_bits = 4;
        db.header.dir_size = 128;
        db.dirty = DirtyFlags::default();

        db.grow_directory().unwrap();
        assert_eq!(db.directory.len(), 32);
        assert_eq!(db.header.dir_size, 256);
        let new_dir = db.header.dir;
        assert_eq!(new_dir, 2048);

        db.end_update().unwrap();

        assert_eq!(
            log.durability_trace(),
            vec![write(new_dir, 256), write(HEADER_AT, BLOCK), IoEvent::Sync]
        );
        assert!(!db.dirty.directory_changed);
        assert!(!db.dirty.header_changed);
    }

    #[test]
    fn moving_current_hands_obligation_to_second_flag() {
        let (mut db, log) = fixture(Config::new(), false);
        db.mark_current_changed();
        let other = db.cache.find(OTHER_AT).unwrap();
        db.make_current(other);

        assert!(!db.dirty.bucket_changed);
        assert!(db.dirty.second_changed);

        db.end_update().unwrap();
        assert_eq!(log.writes(), vec![(CURRENT_AT, BLOCK as usize)]);
    }

    #[test]
    #[should_panic(expected = "fatal: write error")]
    fn short_write_during_commit_reaches_handler() {
        let backend = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        let plan = backend.plan();
        let config = Config::new()
            .block_size(BLOCK)
            .fatal_handler(|msg| panic!("fatal: {msg}"));
        let mut db = Database::open_with_backend(config, Box::new(backend)).unwrap();

        plan.short_write_after(0);
        let _ = db.store(b"key", b"value", StoreMode::Replace);
    }

    #[test]
    #[should_panic(expected = "fatal: lseek error")]
    fn misplaced_seek_during_commit_reaches_handler() {
        let backend = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        let plan = backend.plan();
        let config = Config::new()
            .block_size(BLOCK)
            .fatal_handler(|msg| panic!("fatal: {msg}"));
        let mut db = Database::open_with_backend(config, Box::new(backend)).unwrap();

        plan.misseek_after(0);
        let _ = db.store(b"key", b"value", StoreMode::Replace);
    }
}
