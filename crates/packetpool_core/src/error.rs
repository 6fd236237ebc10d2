//! # Pool Error Types
//!
//! All errors that can occur in the pool and queue layer. Nothing here is
//! fatal: every variant leaves the pool and queue state untouched.

use thiserror::Error;

/// Errors reported by [`MemoryPool`](crate::MemoryPool) and queue creation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Requested block size was zero.
    #[error("block size must be greater than zero")]
    ZeroBlockSize,

    /// Requested block count was zero.
    #[error("block count must be greater than zero")]
    ZeroBlockCount,

    /// Requested block count exceeds what the bitmap can track.
    #[error("block count {requested} exceeds maximum {max}")]
    TooManyBlocks {
        /// The count that was asked for.
        requested: usize,
        /// The static ceiling.
        max: usize,
    },

    /// The arena could not be allocated.
    #[error("failed to allocate arena of {size} bytes aligned to {align}")]
    ArenaAllocation {
        /// Total arena size in bytes.
        size: usize,
        /// Required alignment.
        align: usize,
    },

    /// Queue capacity was zero.
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    /// Queue capacity is larger than the pool backing it.
    #[error("queue capacity {capacity} exceeds pool block count {block_count}")]
    CapacityExceedsPool {
        /// Requested capacity.
        capacity: usize,
        /// Blocks in the pool.
        block_count: usize,
    },

    /// Handle was issued by a different pool.
    #[error("block handle belongs to another pool")]
    ForeignBlock,

    /// Block index is not below the pool's block count.
    #[error("block index {index} out of range (block count {block_count})")]
    OutOfRange {
        /// Offending index.
        index: usize,
        /// Blocks in the pool.
        block_count: usize,
    },

    /// Address does not lie inside the pool arena.
    #[error("address {addr:#x} is outside the pool arena")]
    InvalidPointer {
        /// Offending address.
        addr: usize,
    },

    /// Block was already free.
    #[error("block {0} is already free")]
    DoubleFree(usize),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Reasons an enqueue was refused. All are expected under backpressure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue already holds `capacity` entries.
    #[error("queue is full")]
    Full,

    /// Handle was issued by a different pool than the queue's.
    #[error("block handle belongs to another pool")]
    ForeignBlock,

    /// Block index is not below the pool's block count.
    #[error("block index {0} out of range")]
    OutOfRange(usize),

    /// Block already has a live entry in this queue.
    #[error("block {0} is already queued")]
    AlreadyQueued(usize),
}
