//! # PACKETPOOL Core
//!
//! Deterministic buffer management for interrupt-driven, zero-copy packet I/O:
//! - Fixed-size, DMA-aligned blocks carved from one pre-allocated arena
//! - O(word-count) allocation via bitmap scan
//! - FIFO handoff queue that refuses to hold the same block twice
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations after creation** - arena and rings are sized up front
//! 2. **Short critical sections** - only bit tests, bit sets and arithmetic run under the lock
//! 3. **Never block** - an empty pool or queue is reported, not waited on
//!
//! ## Ownership Protocol
//!
//! ```text
//!   allocate ──> caller ──> enqueue ──> queue ──> dequeue ──> caller ──> free
//!                  │                                             │
//!                  └───────────────────── free ──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use packetpool_core::{BufferQueue, MemoryPool};
//!
//! let pool = MemoryPool::new(1536, 32)?;
//! let rx = BufferQueue::new(&pool, 16)?;
//!
//! let block = pool.allocate(true).ok_or(Dropped)?;
//! rx.enqueue_with_length(block, 60)?;
//!
//! let packet = rx.dequeue_with_length().unwrap();
//! pool.free(packet.block)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bitops;
pub mod config;
pub mod error;
pub mod memory;
pub mod sync;

pub use config::{PoolConfig, ALIGNMENT, DEFAULT_BITMAP_WORDS, MAX_BLOCKS};
pub use error::{EnqueueError, PoolError, PoolResult};
pub use memory::{BlockBitmap, BlockRef, BlockState, BufferQueue, MemoryPool, QueuedBlock};
pub use sync::{DefaultLock, HostInterrupts, InterruptMask, IrqLock, PoolLock};
