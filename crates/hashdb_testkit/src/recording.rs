//! I/O recording for commit-order tests.
//!
//! [`RecordingBackend`] behaves like an in-memory backend but appends every
//! call that touches the write path to a shared [`IoLog`]. The log handle is
//! cloned out before the backend is boxed into a database, so a test can
//! inspect exactly which blocks were written, in which order, and where the
//! durability barriers fell.

use hashdb_storage::{InMemoryBackend, StorageBackend, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// One observed call on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoEvent {
    /// Cursor moved to the given offset.
    Seek(u64),
    /// `len` bytes written starting at `offset`.
    Write {
        /// Offset the write started at.
        offset: u64,
        /// Number of bytes written.
        len: usize,
    },
    /// Durability barrier.
    Sync,
}

/// Shared, cloneable log of [`IoEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct IoLog {
    events: Arc<Mutex<Vec<IoEvent>>>,
}

impl IoLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: IoEvent) {
        self.events.lock().push(event);
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<IoEvent> {
        self.events.lock().clone()
    }

    /// Returns `(offset, len)` for every write, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(u64, usize)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                IoEvent::Write { offset, len } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of durability barriers issued.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, IoEvent::Sync))
            .count()
    }

    /// Returns only writes and syncs, the two events that matter for ordering.
    #[must_use]
    pub fn durability_trace(&self) -> Vec<IoEvent> {
        self.events
            .lock()
            .iter()
            .copied()
            .filter(|e| matches!(e, IoEvent::Write { .. } | IoEvent::Sync))
            .collect()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// An in-memory backend that records its write-path calls.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    inner: InMemoryBackend,
    log: IoLog,
    cursor: u64,
    mapped: bool,
}

impl RecordingBackend {
    /// Creates an empty recording backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording backend over existing bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            inner: InMemoryBackend::with_data(data),
            ..Self::default()
        }
    }

    /// Makes the backend report an attached memory-mapped view.
    #[must_use]
    pub fn mapped(mut self, mapped: bool) -> Self {
        self.mapped = mapped;
        self
    }

    /// Returns a handle to the shared event log.
    #[must_use]
    pub fn log(&self) -> IoLog {
        self.log.clone()
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.inner.data()
    }
}

impl StorageBackend for RecordingBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn seek(&mut self, offset: u64) -> StorageResult<u64> {
        self.log.push(IoEvent::Seek(offset));
        self.cursor = self.inner.seek(offset)?;
        Ok(self.cursor)
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        let written = self.inner.write(data)?;
        self.log.push(IoEvent::Write {
            offset: self.cursor,
            len: written,
        });
        self.cursor += written as u64;
        Ok(written)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.log.push(IoEvent::Sync);
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }
}
