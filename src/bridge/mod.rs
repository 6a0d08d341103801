//! Native buffer bridge.
//!
//! Extraction results can be returned as arrays, or deposited into a
//! buffer allocated outside any managed heap so the native side reads
//! them in place with no copy on the return path. [`NativeBuffer`] is that
//! allocation: exactly-sized, address-stable, writable only through
//! bounds-checked calls.
//!
//! The source design had no release path at all; here the buffer is a
//! scoped resource freed on drop, with [`NativeBuffer::into_raw`] /
//! [`NativeBuffer::from_raw`] to move ownership across the FFI boundary
//! when the native side wants to hold it longer than the call.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use tracing::debug;

use crate::error::BridgeError;

/// Alignment of every allocation, so deposited 16/32-bit sample arrays
/// can be read in place through the raw address.
const BUFFER_ALIGN: usize = 8;

/// A fixed-capacity byte region outside the managed heap.
///
/// The region is zero-initialized at allocation and 8-byte aligned, so
/// reading back an unwritten range is defined and narrowed sample arrays
/// can be viewed in place. The address never changes for the lifetime of
/// the buffer.
#[derive(Debug)]
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
}

// The buffer is an exclusively-owned region; moving it between threads is
// sound, shared access is not offered.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    /// Allocate a buffer of exactly `capacity` bytes.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ZeroCapacity`] for a zero-byte request and
    /// [`BridgeError::AllocationFailed`] if the allocator refuses.
    pub fn allocate(capacity: usize) -> Result<Self, BridgeError> {
        if capacity == 0 {
            return Err(BridgeError::ZeroCapacity);
        }
        let layout = Layout::from_size_align(capacity, BUFFER_ALIGN)
            .map_err(|_| BridgeError::AllocationFailed { capacity })?;

        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr =
            NonNull::new(raw).ok_or(BridgeError::AllocationFailed { capacity })?;

        debug!(capacity, "allocated native buffer");
        Ok(Self { ptr, capacity })
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The stable address of the region, handed to native callers for
    /// in-place reads.
    pub fn address(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Copy `source` into the region starting at byte 0.
    ///
    /// # Errors
    ///
    /// [`BridgeError::BufferOverflow`] if `source.len() > capacity`; the
    /// region is untouched in that case.
    pub fn write(&mut self, source: &[u8]) -> Result<(), BridgeError> {
        self.write_at(0, source)
    }

    /// Copy `source` into the region starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::BufferOverflow`] if the write would run past the end
    /// of the region; no byte is copied in that case.
    pub fn write_at(&mut self, offset: usize, source: &[u8]) -> Result<(), BridgeError> {
        let end = offset.checked_add(source.len());
        match end {
            Some(end) if end <= self.capacity => {
                // SAFETY: offset..end is within the allocation, and `source`
                // cannot overlap it because we hold the region exclusively.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        source.as_ptr(),
                        self.ptr.as_ptr().add(offset),
                        source.len(),
                    );
                }
                Ok(())
            }
            _ => Err(BridgeError::BufferOverflow {
                capacity: self.capacity,
                offset,
                requested: source.len(),
            }),
        }
    }

    /// Read-only view of the whole region.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region is valid for capacity bytes and
        // zero-initialized at allocation.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    /// Give up ownership, returning the raw address and capacity.
    ///
    /// The region is no longer freed on drop; reconstruct with
    /// [`NativeBuffer::from_raw`] to release it.
    pub fn into_raw(self) -> (*mut u8, usize) {
        let parts = (self.ptr.as_ptr(), self.capacity);
        std::mem::forget(self);
        parts
    }

    /// Reclaim ownership of a region produced by [`NativeBuffer::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` and `capacity` must come from exactly one `into_raw` call and
    /// must not be reclaimed twice.
    pub unsafe fn from_raw(ptr: *mut u8, capacity: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, capacity })
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        // SAFETY: allocate() only constructs buffers with this exact
        // layout, and into_raw() forgets self before ownership moves.
        unsafe {
            if let Ok(layout) = Layout::from_size_align(self.capacity, BUFFER_ALIGN) {
                dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
