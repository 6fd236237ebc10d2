//! # Memory Management
//!
//! Pre-allocated block pool and the FIFO used to hand blocks between a
//! producer (receive ISR, DMA completion) and a consumer (protocol stack).
//!
//! ## Design Philosophy
//!
//! All memory is allocated once when the pool is created. Afterwards:
//! - No heap allocations
//! - Block state lives in two bitmaps (free, hardware-owned)
//! - Predictable, flat latency
//!
//! ## Block States
//!
//! | free bit | hw bit | state              |
//! |----------|--------|--------------------|
//! | 1        | 0      | free               |
//! | 0        | 0      | allocated          |
//! | 0        | 1      | allocated, hw-owned|

mod arena;
mod bitmap;
mod pool;
mod queue;

pub use bitmap::BlockBitmap;
pub use pool::{BlockRef, BlockState, MemoryPool};
pub use queue::{BufferQueue, QueuedBlock};
