//! # Pool Allocator
//!
//! Fixed-size block allocator for packet and DMA buffers.
//!
//! Blocks are carved from one aligned arena and tracked by two bitmaps under
//! a single lock. Callers hold [`BlockRef`] handles (arena + index) instead of
//! raw addresses; [`MemoryPool::block_ptr`] and [`MemoryPool::resolve_ptr`]
//! convert at the hardware boundary.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::lock_api::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::arena::Arena;
use super::bitmap::BlockBitmap;
use crate::config::{align_up, PoolConfig, ALIGNMENT, DEFAULT_BITMAP_WORDS};
use crate::error::{PoolError, PoolResult};
use crate::sync::{DefaultLock, PoolLock};

/// Source of pool identities, so a handle from one pool is never accepted
/// by another.
static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to a block in a [`MemoryPool`].
///
/// A handle is the pool-agnostic form of a block pointer: it names the pool
/// that issued it and the block index. It is `Copy`, so the pool can detect
/// (but not prevent) double frees and stale use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockRef {
    /// Identity of the issuing pool.
    pool: u32,
    /// Index into the pool.
    index: usize,
}

impl BlockRef {
    /// Block index within its pool.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Allocation state of a block, as recorded by the pool bitmaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Available for allocation.
    Free,
    /// Held by software.
    Allocated,
    /// Held, and annotated as handed to a hardware/DMA producer.
    HwOwned,
}

/// Bitmaps guarded by the pool lock.
pub(crate) struct PoolState<const WORDS: usize> {
    /// Set = free.
    free: BlockBitmap<WORDS>,
    /// Set = allocated on behalf of hardware. Advisory only.
    hw_owned: BlockBitmap<WORDS>,
}

/// A fixed-block memory pool.
///
/// All blocks have the same size, rounded up to [`ALIGNMENT`], and start on
/// an [`ALIGNMENT`] boundary so they can be handed directly to DMA engines.
///
/// # Thread Safety
///
/// Every bitmap update happens under one `R` lock, which queues built on the
/// pool share. `R` is the host mutex by default; bare-metal targets use
/// [`IrqLock`](crate::IrqLock).
///
/// # Example
///
/// ```rust,ignore
/// let pool = MemoryPool::new(1536, 32)?;
///
/// let block = pool.allocate(false).expect("pool exhausted");
/// unsafe { pool.bytes_mut(block)? }[..4].copy_from_slice(&[1, 2, 3, 4]);
///
/// pool.free(block)?;
/// ```
pub struct MemoryPool<R: PoolLock = DefaultLock, const WORDS: usize = DEFAULT_BITMAP_WORDS> {
    /// Identity stamped into every handle.
    id: u32,
    /// Backing storage.
    arena: Arena,
    /// Block size as requested.
    requested_block_size: usize,
    /// Block size rounded up to the alignment; all indexing uses this.
    block_size: usize,
    /// Number of blocks.
    block_count: usize,
    /// Bitmaps.
    state: Mutex<R, PoolState<WORDS>>,
}

impl MemoryPool {
    /// Creates a pool with the default host lock and bitmap size.
    ///
    /// # Errors
    ///
    /// See [`MemoryPool::create`].
    pub fn new(block_size: usize, block_count: usize) -> PoolResult<Self> {
        Self::create(block_size, block_count)
    }
}

impl<R: PoolLock, const WORDS: usize> MemoryPool<R, WORDS> {
    /// Largest block count this pool type can track.
    pub const MAX_BLOCKS: usize = BlockBitmap::<WORDS>::CAPACITY;

    /// Creates a pool of `block_count` blocks of at least `block_size` bytes.
    ///
    /// The arena is allocated and zeroed up front. Nothing is allocated later.
    ///
    /// # Errors
    ///
    /// - [`PoolError::ZeroBlockSize`] / [`PoolError::ZeroBlockCount`]
    /// - [`PoolError::TooManyBlocks`] if `block_count > MAX_BLOCKS`
    /// - [`PoolError::ArenaAllocation`] if the arena cannot be allocated
    pub fn create(block_size: usize, block_count: usize) -> PoolResult<Self> {
        if block_size == 0 {
            return Err(PoolError::ZeroBlockSize);
        }
        if block_count == 0 {
            return Err(PoolError::ZeroBlockCount);
        }
        if block_count > Self::MAX_BLOCKS {
            return Err(PoolError::TooManyBlocks {
                requested: block_count,
                max: Self::MAX_BLOCKS,
            });
        }

        let too_large = PoolError::ArenaAllocation {
            size: usize::MAX,
            align: ALIGNMENT,
        };
        let aligned = align_up(block_size).ok_or_else(|| too_large.clone())?;
        let arena_size = aligned.checked_mul(block_count).ok_or(too_large)?;
        let arena = Arena::new_zeroed(arena_size, ALIGNMENT)?;

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            pool = id,
            block_size, aligned, block_count, "created memory pool"
        );

        Ok(Self {
            id,
            arena,
            requested_block_size: block_size,
            block_size: aligned,
            block_count,
            state: Mutex::new(PoolState {
                free: BlockBitmap::with_low_bits(block_count),
                hw_owned: BlockBitmap::new(),
            }),
        })
    }

    /// Creates a pool from a loaded configuration.
    ///
    /// # Errors
    ///
    /// See [`MemoryPool::create`].
    pub fn from_config(config: &PoolConfig) -> PoolResult<Self> {
        Self::create(config.block_size, config.block_count)
    }

    /// Allocates one block.
    ///
    /// Scans the free bitmap word by word and takes the lowest free index.
    /// `for_hardware` marks the block as hardware-owned until it is freed.
    ///
    /// Returns `None` when every block is in use; never waits.
    pub fn allocate(&self, for_hardware: bool) -> Option<BlockRef> {
        let allocated = {
            let mut state = self.state.lock();
            let index = state.free.first_set_below(self.block_count);
            if let Some(index) = index {
                state.free.clear(index);
                if for_hardware {
                    state.hw_owned.set(index);
                }
            }
            index
        };

        match allocated {
            Some(index) => Some(self.handle(index)),
            None => {
                trace!(pool = self.id, "no free block");
                None
            }
        }
    }

    /// Returns a block to the pool, clearing its hardware annotation.
    ///
    /// # Errors
    ///
    /// - [`PoolError::ForeignBlock`] / [`PoolError::OutOfRange`] for a handle
    ///   this pool did not issue
    /// - [`PoolError::DoubleFree`] if the block is already free
    ///
    /// In every error case the pool is left unchanged.
    pub fn free(&self, block: BlockRef) -> PoolResult<()> {
        let index = self.check(block).map_err(|e| self.rejected(e))?;

        let was_free = {
            let mut state = self.state.lock();
            let was_free = state.free.test(index);
            if !was_free {
                state.hw_owned.clear(index);
                state.free.set(index);
            }
            was_free
        };

        if was_free {
            warn!(pool = self.id, index, "block already free, ignoring");
            return Err(PoolError::DoubleFree(index));
        }
        Ok(())
    }

    /// Frees the block containing `ptr`.
    ///
    /// Entry point for completion paths that only have the DMA address.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidPointer`] for an address outside the arena, plus
    /// everything [`MemoryPool::free`] reports.
    pub fn free_ptr(&self, ptr: *const u8) -> PoolResult<()> {
        let block = self.resolve_ptr(ptr)?;
        self.free(block)
    }

    /// Resolves an address inside the arena back to its block.
    ///
    /// Interior addresses resolve to the block that contains them.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidPointer`] if `ptr` lies outside the arena.
    pub fn resolve_ptr(&self, ptr: *const u8) -> PoolResult<BlockRef> {
        let addr = ptr as usize;
        let base = self.arena.base().as_ptr() as usize;
        if addr < base || addr - base >= self.arena.len() {
            return Err(self.rejected(PoolError::InvalidPointer { addr }));
        }

        let index = (addr - base) / self.block_size;
        if index >= self.block_count {
            return Err(self.rejected(PoolError::OutOfRange {
                index,
                block_count: self.block_count,
            }));
        }
        Ok(self.handle(index))
    }

    /// Start address of a block, for handing to hardware.
    ///
    /// # Errors
    ///
    /// Fails for a handle this pool did not issue.
    pub fn block_ptr(&self, block: BlockRef) -> PoolResult<NonNull<u8>> {
        let index = self.check(block)?;
        Ok(self.arena.ptr_at(index * self.block_size))
    }

    /// Handle for block `index`, regardless of its state.
    ///
    /// # Errors
    ///
    /// [`PoolError::OutOfRange`] if `index >= block_count`.
    pub fn block_at(&self, index: usize) -> PoolResult<BlockRef> {
        if index >= self.block_count {
            return Err(PoolError::OutOfRange {
                index,
                block_count: self.block_count,
            });
        }
        Ok(self.handle(index))
    }

    /// Current state of a block.
    ///
    /// # Errors
    ///
    /// Fails for a handle this pool did not issue.
    pub fn block_state(&self, block: BlockRef) -> PoolResult<BlockState> {
        let index = self.check(block)?;
        let state = self.state.lock();
        Ok(if state.free.test(index) {
            BlockState::Free
        } else if state.hw_owned.test(index) {
            BlockState::HwOwned
        } else {
            BlockState::Allocated
        })
    }

    /// Read access to a block's bytes.
    ///
    /// # Safety
    ///
    /// The caller must currently own `block` (got it from `allocate` or a
    /// dequeue and has not freed or enqueued it since), and nobody may write
    /// the block while the slice lives.
    ///
    /// # Errors
    ///
    /// Fails for a handle this pool did not issue.
    pub unsafe fn bytes(&self, block: BlockRef) -> PoolResult<&[u8]> {
        let index = self.check(block)?;
        Ok(unsafe { self.arena.slice(index * self.block_size, self.block_size) })
    }

    /// Write access to a block's bytes.
    ///
    /// # Safety
    ///
    /// The caller must currently own `block` and hold no other reference to
    /// its bytes while the slice lives. Two live `bytes_mut` slices for the
    /// same block are undefined behaviour.
    ///
    /// # Errors
    ///
    /// Fails for a handle this pool did not issue.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self, block: BlockRef) -> PoolResult<&mut [u8]> {
        let index = self.check(block)?;
        Ok(unsafe { self.arena.slice_mut(index * self.block_size, self.block_size) })
    }

    /// Number of free blocks. One popcount per bitmap word.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().free.count_ones()
    }

    /// Number of allocated blocks.
    #[must_use]
    pub fn used(&self) -> usize {
        self.block_count - self.available()
    }

    /// Number of blocks currently annotated as hardware-owned.
    #[must_use]
    pub fn hw_owned_count(&self) -> usize {
        self.state.lock().hw_owned.count_ones()
    }

    /// Aligned block size in bytes.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Block size as passed to `create`.
    #[inline]
    #[must_use]
    pub const fn requested_block_size(&self) -> usize {
        self.requested_block_size
    }

    /// Total number of blocks.
    #[inline]
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Validates a handle and returns its index.
    pub(crate) fn check(&self, block: BlockRef) -> PoolResult<usize> {
        if block.pool != self.id {
            return Err(PoolError::ForeignBlock);
        }
        if block.index >= self.block_count {
            return Err(PoolError::OutOfRange {
                index: block.index,
                block_count: self.block_count,
            });
        }
        Ok(block.index)
    }

    /// Builds a handle for an index already known to be in range.
    #[inline]
    pub(crate) const fn handle(&self, index: usize) -> BlockRef {
        BlockRef {
            pool: self.id,
            index,
        }
    }

    /// Takes the pool lock. Queues use this to share it.
    #[inline]
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, R, PoolState<WORDS>> {
        self.state.lock()
    }

    fn rejected(&self, err: PoolError) -> PoolError {
        warn!(pool = self.id, error = %err, "rejected block");
        err
    }
}

impl<R: PoolLock, const WORDS: usize> fmt::Debug for MemoryPool<R, WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("id", &self.id)
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

impl<R: PoolLock, const WORDS: usize> Drop for MemoryPool<R, WORDS> {
    fn drop(&mut self) {
        let outstanding = self.block_count - self.state.get_mut().free.count_ones();
        if outstanding > 0 {
            warn!(pool = self.id, outstanding, "destroying pool with blocks still allocated");
        } else {
            debug!(pool = self.id, "destroyed memory pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{HostInterrupts, IrqLock};

    #[test]
    fn test_pool_create_rejects_bad_geometry() {
        assert_eq!(MemoryPool::new(0, 10).unwrap_err(), PoolError::ZeroBlockSize);
        assert_eq!(MemoryPool::new(64, 0).unwrap_err(), PoolError::ZeroBlockCount);
        assert_eq!(
            MemoryPool::new(64, 257).unwrap_err(),
            PoolError::TooManyBlocks {
                requested: 257,
                max: 256
            }
        );
        assert!(matches!(
            MemoryPool::new(usize::MAX - 4, 2).unwrap_err(),
            PoolError::ArenaAllocation { .. }
        ));
    }

    #[test]
    fn test_pool_block_size_is_aligned() {
        let pool = MemoryPool::new(1600, 10).unwrap();
        assert_eq!(pool.block_size(), 1600);
        assert_eq!(pool.requested_block_size(), 1600);

        let pool = MemoryPool::new(100, 4).unwrap();
        assert_eq!(pool.block_size(), 128);
        assert_eq!(pool.requested_block_size(), 100);

        for i in 0..4 {
            let ptr = pool.block_ptr(pool.block_at(i).unwrap()).unwrap();
            assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        }
    }

    #[test]
    fn test_pool_allocate_free() {
        let pool = MemoryPool::new(64, 10).unwrap();
        assert_eq!(pool.available(), 10);

        let block = pool.allocate(false).unwrap();
        assert_eq!(block.index(), 0);
        assert_eq!(pool.available(), 9);
        assert_eq!(pool.used(), 1);

        pool.free(block).unwrap();
        assert_eq!(pool.available(), 10);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_pool_full() {
        let pool = MemoryPool::new(64, 2).unwrap();
        let _a = pool.allocate(false).unwrap();
        let _b = pool.allocate(false).unwrap();
        assert!(pool.allocate(false).is_none());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_pool_reuse_lowest_index() {
        let pool = MemoryPool::new(64, 3).unwrap();
        let a = pool.allocate(false).unwrap();
        let b = pool.allocate(false).unwrap();
        pool.free(a).unwrap();

        let c = pool.allocate(false).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.index(), b.index());
    }

    #[test]
    fn test_pool_double_free_is_reported_and_ignored() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let block = pool.allocate(false).unwrap();
        pool.free(block).unwrap();
        let available = pool.available();

        assert_eq!(pool.free(block), Err(PoolError::DoubleFree(0)));
        assert_eq!(pool.available(), available);
    }

    #[test]
    fn test_pool_rejects_foreign_handle() {
        let a = MemoryPool::new(64, 4).unwrap();
        let b = MemoryPool::new(64, 4).unwrap();
        let block = a.allocate(false).unwrap();

        assert_eq!(b.free(block), Err(PoolError::ForeignBlock));
        assert_eq!(b.available(), 4);
        assert_eq!(a.available(), 3);
    }

    #[test]
    fn test_pool_hw_owned_annotation() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let hw = pool.allocate(true).unwrap();
        let sw = pool.allocate(false).unwrap();

        assert_eq!(pool.block_state(hw).unwrap(), BlockState::HwOwned);
        assert_eq!(pool.block_state(sw).unwrap(), BlockState::Allocated);
        assert_eq!(pool.hw_owned_count(), 1);

        pool.free(hw).unwrap();
        assert_eq!(pool.block_state(hw).unwrap(), BlockState::Free);
        assert_eq!(pool.hw_owned_count(), 0);

        // Re-allocated for software: the old annotation must not come back.
        let again = pool.allocate(false).unwrap();
        assert_eq!(again.index(), hw.index());
        assert_eq!(pool.block_state(again).unwrap(), BlockState::Allocated);
    }

    #[test]
    fn test_pool_pointer_round_trip() {
        let pool = MemoryPool::new(100, 70).unwrap();
        for i in 0..pool.block_count() {
            let block = pool.block_at(i).unwrap();
            let ptr = pool.block_ptr(block).unwrap();
            assert_eq!(pool.resolve_ptr(ptr.as_ptr()).unwrap(), block);

            // Interior address resolves to the containing block.
            let inner = ptr.as_ptr().wrapping_add(pool.block_size() - 1);
            assert_eq!(pool.resolve_ptr(inner).unwrap().index(), i);
        }
    }

    #[test]
    fn test_pool_rejects_pointer_outside_arena() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let block = pool.allocate(false).unwrap();
        let base = pool.block_ptr(pool.block_at(0).unwrap()).unwrap().as_ptr();

        let past_end = base.wrapping_add(64 * 4);
        assert!(matches!(
            pool.free_ptr(past_end),
            Err(PoolError::InvalidPointer { .. })
        ));
        let before = base.wrapping_sub(1);
        assert!(matches!(
            pool.free_ptr(before),
            Err(PoolError::InvalidPointer { .. })
        ));
        assert_eq!(pool.used(), 1);

        pool.free_ptr(pool.block_ptr(block).unwrap().as_ptr()).unwrap();
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_pool_block_at_out_of_range() {
        let pool = MemoryPool::new(64, 4).unwrap();
        assert_eq!(
            pool.block_at(4).unwrap_err(),
            PoolError::OutOfRange {
                index: 4,
                block_count: 4
            }
        );
    }

    #[test]
    fn test_pool_blocks_start_zeroed_and_hold_data() {
        let pool = MemoryPool::new(64, 2).unwrap();
        let a = pool.allocate(false).unwrap();
        let b = pool.allocate(false).unwrap();

        unsafe {
            assert!(pool.bytes(a).unwrap().iter().all(|&x| x == 0));
            pool.bytes_mut(a).unwrap().fill(0x5A);
            assert!(pool.bytes(b).unwrap().iter().all(|&x| x == 0));
            assert!(pool.bytes(a).unwrap().iter().all(|&x| x == 0x5A));
        }
    }

    #[test]
    fn test_pool_with_irq_lock() {
        let pool: MemoryPool<IrqLock<HostInterrupts>> = MemoryPool::create(64, 8).unwrap();
        let block = pool.allocate(true).unwrap();
        assert!(HostInterrupts::enabled());
        assert_eq!(pool.available(), 7);
        pool.free(block).unwrap();
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_pool_small_bitmap() {
        let pool: MemoryPool<DefaultLock, 1> = MemoryPool::create(32, 64).unwrap();
        assert_eq!(MemoryPool::<DefaultLock, 1>::MAX_BLOCKS, 64);
        for _ in 0..64 {
            assert!(pool.allocate(false).is_some());
        }
        assert!(pool.allocate(false).is_none());
        assert!(matches!(
            MemoryPool::<DefaultLock, 1>::create(32, 65),
            Err(PoolError::TooManyBlocks { .. })
        ));
    }
}
