//! # Device Error Types

use packetpool_core::{EnqueueError, PoolError};
use thiserror::Error;

/// Errors reported by [`NetDevice`](crate::NetDevice).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// The underlying pool rejected an operation.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// The receive queue refused a block.
    #[error("queue error: {0}")]
    Enqueue(#[from] EnqueueError),

    /// No free block for a transmit or receive buffer.
    #[error("no free buffer in pool")]
    NoBuffer,

    /// Nothing is waiting in the receive queue.
    #[error("no packet available")]
    NoPacket,

    /// Frame does not fit in one pool block.
    #[error("frame of {len} bytes exceeds block size {max}")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Block size of the pool.
        max: usize,
    },

    /// The peer end of the wire was dropped.
    #[error("link down")]
    LinkDown,

    /// Invalid device configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for device operations.
pub type NetResult<T> = Result<T, NetError>;
