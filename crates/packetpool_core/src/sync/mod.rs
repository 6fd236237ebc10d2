//! # Mutual Exclusion for Pool State
//!
//! One lock per pool guards the pool bitmaps and every queue built on that
//! pool. The same critical sections have to run in two environments:
//!
//! ```text
//! Host (threads):         lock = scheduler mutex    (parking_lot::RawMutex)
//! Bare metal (one core):  lock = mask interrupts     (IrqLock<M>)
//! ```
//!
//! Both are [`lock_api::RawMutex`] implementations, so pool code is written
//! once against [`PoolLock`]. Critical sections must stay short and must not
//! allocate, log, or call back into the pool.
//!
//! [`lock_api::RawMutex`]: parking_lot::lock_api::RawMutex

mod irq_lock;

pub use irq_lock::{HostInterrupts, InterruptMask, IrqLock};

use parking_lot::lock_api::RawMutex;

/// Lock usable as the pool lock.
///
/// Blanket-implemented for every raw mutex that can be shared across threads.
pub trait PoolLock: RawMutex + Send + Sync {}

impl<T: RawMutex + Send + Sync> PoolLock for T {}

/// Lock used when no lock type is named: the host scheduler mutex.
pub type DefaultLock = parking_lot::RawMutex;
