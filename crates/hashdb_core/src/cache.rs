//! Bounded bucket cache.
//!
//! Holds up to `capacity` buckets, each with its own dirty flag. One slot
//! is *current*: the bucket the running operation last touched. Slots are
//! reused with a clock hand that never selects the current slot.

use crate::bucket::Bucket;

/// A cached bucket.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    /// File offset of the bucket block.
    pub offset: u64,
    /// In-memory contents.
    pub bucket: Bucket,
    /// The on-disk block is stale.
    pub changed: bool,
}

/// Fixed-capacity set of cached buckets.
#[derive(Debug)]
pub struct BucketCache {
    slots: Vec<CacheSlot>,
    capacity: usize,
    current: Option<usize>,
    hand: usize,
}

impl BucketCache {
    /// Creates an empty cache of `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            current: None,
            hand: 0,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no bucket is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot caching the bucket at `offset`.
    #[must_use]
    pub fn find(&self, offset: u64) -> Option<usize> {
        self.slots.iter().position(|s| s.offset == offset)
    }

    /// Index of the current slot.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Makes `index` the current slot.
    pub fn set_current(&mut self, index: usize) {
        debug_assert!(index < self.slots.len());
        self.current = Some(index);
    }

    /// Slot at `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> &CacheSlot {
        &self.slots[index]
    }

    /// Mutable slot at `index`.
    pub fn slot_mut(&mut self, index: usize) -> &mut CacheSlot {
        &mut self.slots[index]
    }

    /// Indices of slots whose block is stale.
    #[must_use]
    pub fn changed_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.changed)
            .map(|(i, _)| i)
            .collect()
    }

    /// Picks the slot to hold a new bucket.
    ///
    /// Returns `Ok(index)` of a free slot that was appended, or
    /// `Err(index)` of an occupied slot the caller must flush (if changed)
    /// before overwriting with [`BucketCache::replace`].
    pub fn claim(&mut self) -> Result<usize, usize> {
        if self.slots.len() < self.capacity {
            self.slots.push(CacheSlot {
                offset: u64::MAX,
                bucket: Bucket::default(),
                changed: false,
            });
            return Ok(self.slots.len() - 1);
        }

        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();
            if Some(index) != self.current {
                return Err(index);
            }
        }
    }

    /// Overwrites slot `index`.
    pub fn replace(&mut self, index: usize, offset: u64, bucket: Bucket, changed: bool) {
        self.slots[index] = CacheSlot {
            offset,
            bucket,
            changed,
        };
    }
}
