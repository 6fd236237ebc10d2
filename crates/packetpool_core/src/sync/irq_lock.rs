//! # Interrupt-Mask Lock
//!
//! Single-core lock: taking it masks interrupts, releasing it restores the
//! previous interrupt state. An interrupt handler can therefore never observe
//! a half-updated bitmap.
//!
//! ## Safety Note
//!
//! Implementing `lock_api::RawMutex` is an unsafe trait impl.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::lock_api::{GuardNoSend, RawMutex};

/// Platform hook for masking and unmasking interrupts on the current core.
pub trait InterruptMask {
    /// Masks interrupts and returns whether they were enabled before.
    fn disable() -> bool;

    /// Re-enables interrupts if `was_enabled` is true.
    fn restore(was_enabled: bool);
}

/// Raw lock built from an [`InterruptMask`].
///
/// Nested acquisition from the same core is a programmer error: with
/// interrupts masked nobody can release the lock and the core spins forever.
pub struct IrqLock<M: InterruptMask> {
    /// Set while the lock is held.
    held: AtomicBool,
    /// Interrupt state saved by the current holder.
    was_enabled: AtomicBool,
    _mask: PhantomData<fn() -> M>,
}

impl<M: InterruptMask> IrqLock<M> {
    fn acquire(&self, was_enabled: bool) -> bool {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.was_enabled.store(was_enabled, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

unsafe impl<M: InterruptMask> RawMutex for IrqLock<M> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        held: AtomicBool::new(false),
        was_enabled: AtomicBool::new(false),
        _mask: PhantomData,
    };

    // The saved interrupt state belongs to the core that took the lock.
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let was_enabled = M::disable();
        while !self.acquire(was_enabled) {
            // Only reachable when another core (or host thread) holds it.
            std::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        let was_enabled = M::disable();
        if self.acquire(was_enabled) {
            true
        } else {
            M::restore(was_enabled);
            false
        }
    }

    unsafe fn unlock(&self) {
        let was_enabled = self.was_enabled.load(Ordering::Relaxed);
        self.held.store(false, Ordering::Release);
        M::restore(was_enabled);
    }

    fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

thread_local! {
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Host stand-in for a core's interrupt-enable flag.
///
/// Each thread plays one core. Lets `IrqLock` pools run in host tests and
/// simulations with the same nesting behaviour as on hardware.
pub struct HostInterrupts;

impl HostInterrupts {
    /// Whether interrupts are currently enabled on this thread.
    #[must_use]
    pub fn enabled() -> bool {
        INTERRUPTS_ENABLED.with(Cell::get)
    }
}

impl InterruptMask for HostInterrupts {
    fn disable() -> bool {
        INTERRUPTS_ENABLED.with(|flag| flag.replace(false))
    }

    fn restore(was_enabled: bool) {
        if was_enabled {
            INTERRUPTS_ENABLED.with(|flag| flag.set(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::lock_api::Mutex;
    use std::sync::Arc;
    use std::thread;

    type IrqMutex<T> = Mutex<IrqLock<HostInterrupts>, T>;

    #[test]
    fn test_lock_masks_and_restores() {
        let lock: IrqMutex<u32> = IrqMutex::new(0);
        assert!(HostInterrupts::enabled());
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(!HostInterrupts::enabled());
        }
        assert!(HostInterrupts::enabled());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_lock_inside_masked_section_keeps_mask() {
        // Interrupt handler context: interrupts already masked on entry.
        let lock: IrqMutex<()> = IrqMutex::new(());
        let was_enabled = HostInterrupts::disable();
        drop(lock.lock());
        assert!(!HostInterrupts::enabled());
        HostInterrupts::restore(was_enabled);
        assert!(HostInterrupts::enabled());
    }

    #[test]
    fn test_try_lock_contended() {
        let lock: IrqMutex<()> = IrqMutex::new(());
        let guard = lock.lock();
        let other = thread::scope(|s| s.spawn(|| lock.try_lock().is_some()).join().unwrap());
        assert!(!other);
        drop(guard);
        assert!(lock.try_lock().is_some());
        assert!(HostInterrupts::enabled());
    }

    #[test]
    fn test_threads_serialise() {
        let lock = Arc::new(IrqMutex::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 40_000);
    }
}
