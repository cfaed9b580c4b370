//! Data area of a big segment
//!
//! A memory region that contains a single big object. Unlike a pool
//! [`Block`](super::block::Block) it is sized from the object's actual
//! chunk count and needn't be a power of two.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use super::error::BlockError;

#[derive(Debug)]
pub struct LargeObjectBlock {
    /// Pointer to memory
    ptr: NonNull<u8>,
    /// Layout of the allocation
    layout: Layout,
}

impl LargeObjectBlock {
    /// Allocate a zeroed region of `size` bytes aligned to `align`
    pub fn new(size: usize, align: usize) -> Result<Self, BlockError> {
        let layout = Layout::from_size_align(size.max(1), align).map_err(|_| BlockError::BadSize)?;
        // SAFETY: layout has non-zero size; the result is checked for
        // null before use and is owned exclusively by this block
        let ptr = unsafe { alloc_zeroed(layout) };
        Ok(LargeObjectBlock {
            ptr: NonNull::new(ptr).ok_or(BlockError::OOM)?,
            layout,
        })
    }

    /// Pointer to the writeable memory area
    pub fn space(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Get the actual allocated size of this block
    pub fn allocated_size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for LargeObjectBlock {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in `new` with exactly this layout
        // and is released once, here
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
