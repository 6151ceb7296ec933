//! Fault injection for the write path.
//!
//! [`FaultyBackend`] wraps another backend and misbehaves on command: a
//! write that stops half way, a seek that lands somewhere else, or a sync
//! that fails. The controls live in a shared [`FaultPlan`] so a test can arm
//! them after the backend has been handed to a database.
//!
//! ## Usage
//!
//! ```rust
//! use hashdb_testkit::FaultyBackend;
//! use hashdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = FaultyBackend::new(Box::new(InMemoryBackend::new()));
//! let plan = backend.plan();
//! plan.short_write_after(0);
//!
//! backend.seek(0).unwrap();
//! assert_eq!(backend.write(b"abcd").unwrap(), 2);
//! assert!(plan.has_fired());
//! ```

use hashdb_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const DISARMED: usize = usize::MAX;

/// Shared switches controlling a [`FaultyBackend`].
#[derive(Debug)]
pub struct FaultPlan {
    writes: AtomicUsize,
    seeks: AtomicUsize,
    syncs: AtomicUsize,
    short_write_at: AtomicUsize,
    misseek_at: AtomicUsize,
    fail_sync_at: AtomicUsize,
    fired: AtomicBool,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            writes: AtomicUsize::new(0),
            seeks: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            short_write_at: AtomicUsize::new(DISARMED),
            misseek_at: AtomicUsize::new(DISARMED),
            fail_sync_at: AtomicUsize::new(DISARMED),
            fired: AtomicBool::new(false),
        }
    }
}

impl FaultPlan {
    /// Lets `skip` more writes through, then makes the next one short.
    pub fn short_write_after(&self, skip: usize) {
        let base = self.writes.load(Ordering::SeqCst);
        self.short_write_at.store(base + skip, Ordering::SeqCst);
    }

    /// Lets `skip` more seeks through, then lands the next one off target.
    pub fn misseek_after(&self, skip: usize) {
        let base = self.seeks.load(Ordering::SeqCst);
        self.misseek_at.store(base + skip, Ordering::SeqCst);
    }

    /// Lets `skip` more syncs through, then fails the next one.
    pub fn fail_sync_after(&self, skip: usize) {
        let base = self.syncs.load(Ordering::SeqCst);
        self.fail_sync_at.store(base + skip, Ordering::SeqCst);
    }

    /// Returns whether any armed fault has been triggered.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Disarms every fault and resets the counters.
    pub fn reset(&self) {
        self.writes.store(0, Ordering::SeqCst);
        self.seeks.store(0, Ordering::SeqCst);
        self.syncs.store(0, Ordering::SeqCst);
        self.short_write_at.store(DISARMED, Ordering::SeqCst);
        self.misseek_at.store(DISARMED, Ordering::SeqCst);
        self.fail_sync_at.store(DISARMED, Ordering::SeqCst);
        self.fired.store(false, Ordering::SeqCst);
    }

    fn trip(&self, counter: &AtomicUsize, at: &AtomicUsize) -> bool {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n == at.load(Ordering::SeqCst) {
            at.store(DISARMED, Ordering::SeqCst);
            self.fired.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }
}

/// A storage backend wrapper that fails on demand.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    plan: Arc<FaultPlan>,
}

impl FaultyBackend {
    /// Creates a new faulty backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            plan: Arc::new(FaultPlan::default()),
        }
    }

    /// Returns the shared fault controls.
    pub fn plan(&self) -> Arc<FaultPlan> {
        Arc::clone(&self.plan)
    }
}

impl std::fmt::Debug for FaultyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyBackend")
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn seek(&mut self, offset: u64) -> StorageResult<u64> {
        let landed = self.inner.seek(offset)?;
        if self.plan.trip(&self.plan.seeks, &self.plan.misseek_at) {
            return Ok(landed.wrapping_add(1));
        }
        Ok(landed)
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        if self.plan.trip(&self.plan.writes, &self.plan.short_write_at) {
            let partial = data.len() / 2;
            return self.inner.write(&data[..partial]);
        }
        self.inner.write(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.plan.trip(&self.plan.syncs, &self.plan.fail_sync_at) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated failure during sync",
            )));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn is_mapped(&self) -> bool {
        self.inner.is_mapped()
    }
}
