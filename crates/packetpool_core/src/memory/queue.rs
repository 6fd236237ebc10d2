//! # Buffer Queue
//!
//! Bounded FIFO of pool blocks with a payload length per entry.
//!
//! ```text
//!            head                 tail
//!             │                    │
//!   entries: [B3:60][B0:1514][B7:42][ ][ ][ ]
//!   members: bit 0, bit 3, bit 7 set
//! ```
//!
//! The membership bitmap rejects a second enqueue of a block that is still
//! queued. The queue runs under its pool's lock, so resolving a block against
//! the pool and updating the ring happen in one critical section.
//!
//! ## Safety Note
//!
//! The ring lives in an `UnsafeCell` and is only touched while the pool
//! lock is held.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;

use tracing::{debug, warn};

use super::bitmap::BlockBitmap;
use super::pool::{BlockRef, MemoryPool};
use crate::config::DEFAULT_BITMAP_WORDS;
use crate::error::{EnqueueError, PoolError, PoolResult};
use crate::sync::{DefaultLock, PoolLock};

/// A dequeued block and the payload length stored with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedBlock {
    /// The block; ownership returns to the caller.
    pub block: BlockRef,
    /// Payload length recorded at enqueue time.
    pub len: usize,
}

#[derive(Clone, Copy, Default)]
struct Slot {
    index: usize,
    len: usize,
}

struct Ring<const WORDS: usize> {
    slots: Box<[Slot]>,
    head: usize,
    tail: usize,
    count: usize,
    members: BlockBitmap<WORDS>,
}

impl<const WORDS: usize> Ring<WORDS> {
    fn push(&mut self, index: usize, len: usize) {
        self.slots[self.tail] = Slot { index, len };
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
        self.members.set(index);
    }

    fn pop(&mut self) -> Slot {
        let slot = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        self.members.clear(slot.index);
        slot
    }
}

/// FIFO of blocks from one [`MemoryPool`].
///
/// The queue borrows its pool, so the pool outlives it. Dropping a queue does
/// not free the blocks still in it: drain it first or those blocks stay
/// allocated.
///
/// # Example
///
/// ```rust,ignore
/// let pool = MemoryPool::new(1536, 32)?;
/// let queue = BufferQueue::new(&pool, 8)?;
///
/// let block = pool.allocate(true).unwrap();
/// queue.enqueue_with_length(block, 60)?;
/// assert_eq!(queue.enqueue(block), Err(EnqueueError::AlreadyQueued(block.index())));
///
/// let entry = queue.dequeue_with_length().unwrap();
/// pool.free(entry.block)?;
/// ```
pub struct BufferQueue<'pool, R: PoolLock = DefaultLock, const WORDS: usize = DEFAULT_BITMAP_WORDS>
{
    pool: &'pool MemoryPool<R, WORDS>,
    capacity: usize,
    ring: UnsafeCell<Ring<WORDS>>,
}

// SAFETY: the ring is only accessed through `with_ring`, which holds the
// pool lock for the whole access.
unsafe impl<R: PoolLock, const WORDS: usize> Sync for BufferQueue<'_, R, WORDS> {}

impl<'pool, R: PoolLock, const WORDS: usize> BufferQueue<'pool, R, WORDS> {
    /// Creates an empty queue of `capacity` entries on `pool`.
    ///
    /// # Errors
    ///
    /// - [`PoolError::ZeroCapacity`]
    /// - [`PoolError::CapacityExceedsPool`] if `capacity > pool.block_count()`
    pub fn new(pool: &'pool MemoryPool<R, WORDS>, capacity: usize) -> PoolResult<Self> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        if capacity > pool.block_count() {
            return Err(PoolError::CapacityExceedsPool {
                capacity,
                block_count: pool.block_count(),
            });
        }

        debug!(capacity, "created buffer queue");

        Ok(Self {
            pool,
            capacity,
            ring: UnsafeCell::new(Ring {
                slots: vec![Slot::default(); capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
                members: BlockBitmap::new(),
            }),
        })
    }

    /// Runs `f` on the ring with the pool lock held.
    fn with_ring<T>(&self, f: impl FnOnce(&mut Ring<WORDS>) -> T) -> T {
        let _guard = self.pool.lock_state();
        // SAFETY: every access to the ring goes through here, under the lock.
        let ring = unsafe { &mut *self.ring.get() };
        f(ring)
    }

    /// Appends a block with payload length 0.
    ///
    /// # Errors
    ///
    /// See [`BufferQueue::enqueue_with_length`].
    pub fn enqueue(&self, block: BlockRef) -> Result<(), EnqueueError> {
        self.enqueue_with_length(block, 0)
    }

    /// Appends a block and the length of the payload it carries.
    ///
    /// On success the queue owns the block until it is dequeued.
    ///
    /// # Errors
    ///
    /// - [`EnqueueError::Full`] if the queue holds `capacity` entries
    /// - [`EnqueueError::ForeignBlock`] / [`EnqueueError::OutOfRange`] if the
    ///   block does not belong to this queue's pool
    /// - [`EnqueueError::AlreadyQueued`] if the block is still in this queue
    ///
    /// A refused enqueue changes nothing.
    pub fn enqueue_with_length(&self, block: BlockRef, len: usize) -> Result<(), EnqueueError> {
        let result = self.with_ring(|ring| {
            if ring.count == self.capacity {
                return Err(EnqueueError::Full);
            }
            let index = self.pool.check(block).map_err(|e| match e {
                PoolError::OutOfRange { index, .. } => EnqueueError::OutOfRange(index),
                _ => EnqueueError::ForeignBlock,
            })?;
            if ring.members.test(index) {
                return Err(EnqueueError::AlreadyQueued(index));
            }
            ring.push(index, len);
            Ok(())
        });

        if let Err(err) = result {
            match err {
                EnqueueError::Full => debug!(capacity = self.capacity, "queue full"),
                _ => warn!(error = %err, "enqueue rejected"),
            }
        }
        result
    }

    /// Removes the oldest block. Returns `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<BlockRef> {
        self.dequeue_with_length().map(|entry| entry.block)
    }

    /// Removes the oldest block together with its payload length.
    pub fn dequeue_with_length(&self) -> Option<QueuedBlock> {
        let slot = self.with_ring(|ring| (ring.count > 0).then(|| ring.pop()))?;
        Some(self.entry(slot))
    }

    /// Removes up to `max_count` blocks in FIFO order, appending them to `out`.
    ///
    /// All entries are taken in one critical section. Returns how many were
    /// taken, which is `min(count, max_count)`; never waits for more.
    pub fn dequeue_batch_with_length(&self, out: &mut Vec<QueuedBlock>, max_count: usize) -> usize {
        self.drain_into(out, max_count, |entry| entry)
    }

    /// Like [`BufferQueue::dequeue_batch_with_length`], discarding lengths.
    pub fn dequeue_batch(&self, out: &mut Vec<BlockRef>, max_count: usize) -> usize {
        self.drain_into(out, max_count, |entry| entry.block)
    }

    fn drain_into<T>(&self, out: &mut Vec<T>, max_count: usize, map: impl Fn(QueuedBlock) -> T) -> usize {
        // Reserve outside the lock so the critical section never allocates.
        out.reserve(max_count.min(self.capacity));
        self.with_ring(|ring| {
            let taken = ring.count.min(max_count);
            for _ in 0..taken {
                let slot = ring.pop();
                out.push(map(self.entry(slot)));
            }
            taken
        })
    }

    /// Oldest block, without removing it.
    pub fn peek(&self) -> Option<BlockRef> {
        self.peek_with_length().map(|entry| entry.block)
    }

    /// Oldest block and its length, without removing it.
    pub fn peek_with_length(&self) -> Option<QueuedBlock> {
        let slot = self.with_ring(|ring| {
            if ring.count == 0 {
                None
            } else {
                Some(ring.slots[ring.head])
            }
        })?;
        Some(self.entry(slot))
    }

    /// Whether `block` currently has an entry in this queue.
    pub fn contains(&self, block: BlockRef) -> bool {
        match self.pool.check(block) {
            Ok(index) => self.with_ring(|ring| ring.members.test(index)),
            Err(_) => false,
        }
    }

    /// Number of queued entries.
    pub fn count(&self) -> usize {
        self.with_ring(|ring| ring.count)
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether the queue holds `capacity` entries.
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    /// Maximum number of entries.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The pool this queue draws from.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &'pool MemoryPool<R, WORDS> {
        self.pool
    }

    #[inline]
    fn entry(&self, slot: Slot) -> QueuedBlock {
        QueuedBlock {
            block: self.pool.handle(slot.index),
            len: slot.len,
        }
    }
}

impl<R: PoolLock, const WORDS: usize> fmt::Debug for BufferQueue<'_, R, WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferQueue")
            .field("capacity", &self.capacity)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl<R: PoolLock, const WORDS: usize> Drop for BufferQueue<'_, R, WORDS> {
    fn drop(&mut self) {
        let left = self.ring.get_mut().count;
        if left > 0 {
            warn!(left, "buffer queue dropped with blocks still queued; they stay allocated");
        }
    }
}
