//! Pool blocks acquired from the system allocator
//!
//! A block is a power-of-two sized region aligned to its own size. It
//! is carved into the data areas of several small segments, so every
//! segment's data is aligned to the segment size and one allocator
//! call is amortised over the whole block.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use super::error::BlockError;

/// A block of memory allocated by the system allocator
#[derive(Debug, PartialEq)]
pub struct Block {
    /// Pointer to memory
    ptr: NonNull<u8>,
    /// Size of block
    size: usize,
}

impl Block {
    pub fn new(size: usize) -> Result<Self, BlockError> {
        if !size.is_power_of_two() {
            Err(BlockError::BadSize)
        } else {
            Ok(Block {
                ptr: Self::alloc_block(size)?,
                size,
            })
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Split the block into `count` equal areas of `area_bytes`
    pub fn areas(&self, area_bytes: usize) -> impl Iterator<Item = NonNull<u8>> + '_ {
        debug_assert!(area_bytes > 0 && self.size % area_bytes == 0);
        (0..self.size / area_bytes).map(move |i| {
            // SAFETY: i * area_bytes < size, so the offset stays inside
            // the allocation and the result is non-null
            unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(i * area_bytes)) }
        })
    }

    /// Whether `ptr` points inside this block
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.ptr.as_ptr() as usize;
        let p = ptr as usize;
        p >= start && p < start + self.size
    }

    fn alloc_block(size: usize) -> Result<NonNull<u8>, BlockError> {
        let layout = Layout::from_size_align(size, size).map_err(|_| BlockError::BadSize)?;
        // SAFETY: layout has non-zero size (a power of two)
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(BlockError::OOM)
    }

    fn dealloc_block(ptr: NonNull<u8>, size: usize) {
        // SAFETY: ptr was returned by alloc_block with this same layout
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, size)) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        Self::dealloc_block(self.ptr, self.size);
    }
}

/// Fill `len` bytes at `ptr` with `byte`
///
/// # Safety
///
/// `ptr..ptr + len` must lie within a live allocation owned by the
/// caller.
pub unsafe fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
    std::ptr::write_bytes(ptr.as_ptr(), byte, len);
}
