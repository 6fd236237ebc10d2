//! # Block Arena
//!
//! One contiguous, aligned, zero-initialised allocation that the pool slices
//! into fixed-size blocks.
//!
//! ## Safety Note
//!
//! The arena hands out raw byte ranges. Exclusive use of a range is granted
//! by the pool's ownership protocol, not by the borrow checker, so this module
//! needs unsafe code for the allocation itself and for slicing.

#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{PoolError, PoolResult};

/// Owned, aligned byte region.
///
/// # Thread Safety
///
/// The arena itself is immutable after creation. Concurrent access to the
/// bytes is governed by block ownership: only the current owner of a block
/// touches that block's range.
pub(crate) struct Arena {
    /// Base of the allocation.
    base: NonNull<u8>,
    /// Layout used for allocation, needed again for deallocation.
    layout: Layout,
}

// SAFETY: the arena is a plain owned allocation; all shared access goes
// through block ranges whose exclusivity the pool protocol guarantees.
unsafe impl Send for Arena {}
// SAFETY: see above.
unsafe impl Sync for Arena {}

impl Arena {
    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ArenaAllocation`] if the layout is invalid or the
    /// allocator refuses the request.
    pub(crate) fn new_zeroed(size: usize, align: usize) -> PoolResult<Self> {
        let err = PoolError::ArenaAllocation { size, align };
        if size == 0 {
            return Err(err);
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| err.clone())?;

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(err)?;

        Ok(Self { base, layout })
    }

    /// Base address of the arena.
    #[inline]
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size in bytes.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Pointer to `offset` bytes into the arena.
    ///
    /// Caller guarantees `offset < len()`.
    #[inline]
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.len());
        // SAFETY: offset is inside the allocation, so the result is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Shared view of `len` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// The range must be in bounds and no one may write to it while the
    /// returned slice lives.
    #[inline]
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.len());
        unsafe { std::slice::from_raw_parts(self.ptr_at(offset).as_ptr(), len) }
    }

    /// Mutable view of `len` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// The range must be in bounds and no other reference to it may exist
    /// while the returned slice lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(offset + len <= self.len());
        unsafe { std::slice::from_raw_parts_mut(self.ptr_at(offset).as_ptr(), len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base was returned by alloc_zeroed with this layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}
