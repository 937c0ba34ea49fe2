//! Size-classed reuse pool for receive buffers.
//!
//! Receives happen at high frequency with one dominant buffer size, so
//! [`BufferPool`] keeps previously used segments grouped by power-of-two
//! size class instead of allocating per read. Allocation never fails: an
//! empty class falls back to a fresh segment. Segments return to their class
//! implicitly when the [`PooledSegment`] guard drops, so callers do no
//! bookkeeping. The pool is shared by every connection of a host and is safe
//! for concurrent use; each borrowed segment belongs to exactly one
//! connection at a time.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use bytes::BytesMut;
use dashmap::DashMap;

/// Smallest size class handed out, regardless of the requested size.
const MIN_SEGMENT_BYTES: usize = 256;

/// Segments retained per class before further returns are dropped, bounding
/// the memory an idle pool can hold.
const MAX_RETAINED_PER_CLASS: usize = 64;

fn size_class(size: usize) -> usize {
    size.max(MIN_SEGMENT_BYTES)
        .checked_next_power_of_two()
        .unwrap_or(size)
}

#[derive(Default)]
struct ClassShards {
    classes: DashMap<usize, Vec<BytesMut>>,
}

impl ClassShards {
    fn take(&self, class: usize) -> Option<BytesMut> {
        self.classes.get_mut(&class).and_then(|mut free| free.pop())
    }

    fn put_back(&self, class: usize, storage: BytesMut) {
        let mut free = self.classes.entry(class).or_default();
        if free.len() < MAX_RETAINED_PER_CLASS {
            free.push(storage);
        }
    }

    fn retained(&self, class: usize) -> usize {
        self.classes.get(&class).map_or(0, |free| free.len())
    }
}

/// Shared, size-classed buffer allocator.
///
/// Cloning yields another handle to the same pool. Inject one instance per
/// host rather than relying on a process-wide singleton, so tests can swap
/// in a fresh pool.
#[derive(Clone, Default)]
pub struct BufferPool {
    shards: Arc<ClassShards>,
}

impl BufferPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Borrow a segment of at least `size` bytes.
    ///
    /// Draws from the matching size class when one is free, otherwise
    /// allocates fresh. Never fails.
    #[must_use]
    pub fn allocate(&self, size: usize) -> PooledSegment {
        let class = size_class(size);
        let storage = self
            .shards
            .take(class)
            .unwrap_or_else(|| BytesMut::zeroed(class));
        PooledSegment {
            storage,
            len: size,
            class,
            shards: Arc::clone(&self.shards),
        }
    }

    /// Number of free segments currently retained for `size`'s class.
    #[must_use]
    pub fn retained_for(&self, size: usize) -> usize { self.shards.retained(size_class(size)) }
}

/// A borrowed segment that rejoins its size class when dropped.
pub struct PooledSegment {
    storage: BytesMut,
    len: usize,
    class: usize,
    shards: Arc<ClassShards>,
}

impl PooledSegment {
    /// Usable length of the segment, as requested from the pool.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    /// True when a zero-length segment was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

impl Deref for PooledSegment {
    type Target = [u8];

    fn deref(&self) -> &[u8] { &self.storage[..self.len] }
}

impl DerefMut for PooledSegment {
    fn deref_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.storage[..len]
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        self.shards.put_back(self.class, storage);
    }
}
