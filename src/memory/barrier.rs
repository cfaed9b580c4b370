//! Old-to-new registration
//!
//! A young collection only finds young objects reachable from old
//! ones through the old-to-new set, so every store of a younger
//! reference into an older object must be registered. Runtimes can
//! call [`Heap::register_old_to_new`] after their own stores, or store
//! references through [`Heap::write_ref`], which does both.

use super::cptr::ObjRef;
use super::error::HeapError;
use super::heap::Heap;

impl Heap {
    /// Note that `from` now holds a reference to `to`
    ///
    /// `from` joins the old-to-new set when `to` is in a strictly
    /// younger generation. Uncollected objects are always generation
    /// two, so any collectable reference they take registers them.
    pub fn register_old_to_new(&mut self, from: ObjRef, to: ObjRef) {
        if from.is_none() || to.is_none() {
            return;
        }
        if self.generation_of(to) < self.generation_of(from) {
            self.store
                .segment_mut(from.segment())
                .add_old_to_new(from.offset());
        }
    }

    /// Store `to` in reference slot `slot` of `from` and register the
    /// edge
    pub fn write_ref(&mut self, from: ObjRef, slot: usize, to: ObjRef) -> Result<(), HeapError> {
        let range = self.ref_range(from, slot)?;
        self.bytes_mut(from)[range].copy_from_slice(&to.to_raw().to_le_bytes());
        self.register_old_to_new(from, to);
        Ok(())
    }
}
