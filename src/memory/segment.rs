//! Segments
//!
//! A segment holds either one big object or an array of equal sized
//! slots for small objects of a single kind. All per-object state
//! (allocation, generation, marks, old-to-new membership) lives in
//! chunk sets on the segment rather than in object headers, so object
//! data is exactly what the runtime asked for.

use std::fmt::{self, Debug};
use std::ptr::NonNull;

use super::chunkset::ChunkSet;
use super::kind::KindId;
use super::lob::LargeObjectBlock;

/// Age tier of an object
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generation {
    /// Newly allocated
    Zero = 0,
    /// Survived one collection
    One = 1,
    /// Survived a full collection, or never collected
    Two = 2,
}

impl Generation {
    pub const ALL: [Generation; 3] = [Generation::Zero, Generation::One, Generation::Two];

    /// The generation a survivor of a collection at `level` moves to
    pub fn promoted(self, level: Generation) -> Generation {
        match (level, self) {
            (Generation::Two, _) => Generation::Two,
            (_, Generation::Zero) => Generation::One,
            _ => Generation::Two,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Generation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Generation::Zero),
            1 => Ok(Generation::One),
            2 => Ok(Generation::Two),
            other => Err(other),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Where a segment's data lives
pub enum Backing {
    /// An area carved from a pool block
    Pooled(NonNull<u8>),
    /// A dedicated allocation for one big object
    Big(LargeObjectBlock),
}

pub struct Segment {
    kind: KindId,
    /// Chunks per object
    chunks: usize,
    backing: Backing,
    /// Offsets at which objects start
    slots: ChunkSet,
    /// Slots not holding an object
    free: ChunkSet,
    gen1: ChunkSet,
    gen2: ChunkSet,
    marked: ChunkSet,
    old_to_new: ChunkSet,
    /// Lengths by chunk offset, for kinds keeping a side table
    lengths: Option<Box<[u32]>>,
    /// Whether the segment is queued on its kind's free list
    pub(crate) on_free_list: bool,
}

impl Segment {
    /// A small segment with every slot free
    pub fn small(
        kind: KindId,
        chunks: usize,
        segment_chunks: usize,
        data: NonNull<u8>,
        stored_length: bool,
    ) -> Self {
        let slots = ChunkSet::slot_starts(chunks, segment_chunks);
        Segment {
            kind,
            chunks,
            backing: Backing::Pooled(data),
            slots,
            free: slots,
            gen1: ChunkSet::new(),
            gen2: ChunkSet::new(),
            marked: ChunkSet::new(),
            old_to_new: ChunkSet::new(),
            lengths: stored_length.then(|| vec![0; segment_chunks].into_boxed_slice()),
            on_free_list: false,
        }
    }

    /// A big segment whose single slot is free
    pub fn big(kind: KindId, chunks: usize, data: LargeObjectBlock, stored_length: bool) -> Self {
        let slots = ChunkSet::single(0);
        Segment {
            kind,
            chunks,
            backing: Backing::Big(data),
            slots,
            free: slots,
            gen1: ChunkSet::new(),
            gen2: ChunkSet::new(),
            marked: ChunkSet::new(),
            old_to_new: ChunkSet::new(),
            lengths: stored_length.then(|| vec![0; 1].into_boxed_slice()),
            on_free_list: false,
        }
    }

    pub fn kind(&self) -> KindId {
        self.kind
    }

    /// Chunks occupied by each object in the segment
    pub fn object_chunks(&self) -> usize {
        self.chunks
    }

    pub fn is_big(&self) -> bool {
        matches!(self.backing, Backing::Big(_))
    }

    /// Start of the segment's data
    pub fn base(&self) -> NonNull<u8> {
        match &self.backing {
            Backing::Pooled(ptr) => *ptr,
            Backing::Big(lob) => lob.space(),
        }
    }

    pub fn into_backing(self) -> Backing {
        self.backing
    }

    pub fn slots(&self) -> ChunkSet {
        self.slots
    }

    pub fn free(&self) -> ChunkSet {
        self.free
    }

    /// Slots holding an object
    pub fn allocated(&self) -> ChunkSet {
        self.slots.without(self.free)
    }

    pub fn is_allocated(&self, offset: usize) -> bool {
        self.slots.contains(offset) && !self.free.contains(offset)
    }

    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.free == self.slots
    }

    /// Allocated objects in `generation`
    pub fn in_generation(&self, generation: Generation) -> ChunkSet {
        let allocated = self.allocated();
        match generation {
            Generation::Zero => allocated.without(self.gen1 | self.gen2),
            Generation::One => allocated & self.gen1,
            Generation::Two => allocated & self.gen2,
        }
    }

    /// Allocated objects of generation `level` or younger
    pub fn in_scope(&self, level: Generation) -> ChunkSet {
        match level {
            Generation::Zero => self.in_generation(Generation::Zero),
            Generation::One => self.allocated().without(self.gen2),
            Generation::Two => self.allocated(),
        }
    }

    pub fn generation(&self, offset: usize) -> Generation {
        if self.gen2.contains(offset) {
            Generation::Two
        } else if self.gen1.contains(offset) {
            Generation::One
        } else {
            Generation::Zero
        }
    }

    pub fn set_generation(&mut self, offset: usize, generation: Generation) {
        match generation {
            Generation::Zero => {
                self.gen1.remove(offset);
                self.gen2.remove(offset);
            }
            Generation::One => {
                self.gen1.insert(offset);
                self.gen2.remove(offset);
            }
            Generation::Two => {
                self.gen1.remove(offset);
                self.gen2.insert(offset);
            }
        }
    }

    /// Claim the lowest free slot
    pub fn take_free(&mut self) -> Option<usize> {
        let offset = self.free.first()?;
        self.free.remove(offset);
        Some(offset)
    }

    /// Return a slot to the free set, forgetting its state
    pub fn release_slot(&mut self, offset: usize) {
        debug_assert!(self.is_allocated(offset));
        self.free.insert(offset);
        self.gen1.remove(offset);
        self.gen2.remove(offset);
        self.marked.remove(offset);
        self.old_to_new.remove(offset);
        if let Some(lengths) = &mut self.lengths {
            lengths[offset] = 0;
        }
    }

    pub fn is_marked(&self, offset: usize) -> bool {
        self.marked.contains(offset)
    }

    pub fn mark(&mut self, offset: usize) {
        self.marked.insert(offset);
    }

    pub fn marked(&self) -> ChunkSet {
        self.marked
    }

    pub fn clear_marks(&mut self) {
        self.marked.clear();
    }

    pub fn old_to_new(&self) -> ChunkSet {
        self.old_to_new
    }

    pub fn in_old_to_new(&self, offset: usize) -> bool {
        self.old_to_new.contains(offset)
    }

    pub fn add_old_to_new(&mut self, offset: usize) {
        self.old_to_new.insert(offset);
    }

    pub fn remove_old_to_new(&mut self, offset: usize) {
        self.old_to_new.remove(offset);
    }

    pub fn clear_old_to_new(&mut self) {
        self.old_to_new.clear();
    }

    pub fn stored_length(&self, offset: usize) -> Option<u32> {
        self.lengths.as_ref().map(|lengths| lengths[offset])
    }

    pub fn set_length(&mut self, offset: usize, length: u32) {
        if let Some(lengths) = &mut self.lengths {
            lengths[offset] = length;
        }
    }
}

impl Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:p} kind {} x{}{}{}",
            self.base().as_ptr(),
            self.kind,
            self.chunks,
            if self.is_big() { " big" } else { "" },
            if self.on_free_list { " (free list)" } else { "" }
        )?;
        writeln!(f, "  alloc {:?}", self.allocated())?;
        writeln!(f, "  gen1  {:?}", self.gen1)?;
        writeln!(f, "  gen2  {:?}", self.gen2)?;
        writeln!(f, "  o2n   {:?}", self.old_to_new)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn pooled_segment(chunks: usize) -> Segment {
        Segment::small(KindId(0), chunks, 64, NonNull::dangling(), true)
    }

    #[test]
    pub fn test_promotion_ladder() {
        assert_eq!(Generation::Zero.promoted(Generation::Zero), Generation::One);
        assert_eq!(Generation::Zero.promoted(Generation::One), Generation::One);
        assert_eq!(Generation::One.promoted(Generation::One), Generation::Two);
        assert_eq!(Generation::Zero.promoted(Generation::Two), Generation::Two);
        assert_eq!(Generation::try_from(3u8), Err(3));
    }

    #[test]
    pub fn test_take_and_release() {
        let mut segment = pooled_segment(16);
        assert_eq!(segment.slots().len(), 4);
        assert!(segment.is_empty());

        let a = segment.take_free().unwrap();
        let b = segment.take_free().unwrap();
        assert_eq!((a, b), (0, 16));
        assert!(segment.is_allocated(16));
        assert!(!segment.is_allocated(1));

        segment.set_generation(a, Generation::Two);
        segment.set_length(a, 7);
        segment.add_old_to_new(a);
        segment.release_slot(a);
        assert_eq!(segment.generation(a), Generation::Zero);
        assert_eq!(segment.stored_length(a), Some(0));
        assert!(!segment.in_old_to_new(a));
        assert_eq!(segment.take_free(), Some(0));
    }

    #[test]
    pub fn test_generation_sets() {
        let mut segment = pooled_segment(1);
        for _ in 0..3 {
            segment.take_free();
        }
        segment.set_generation(1, Generation::One);
        segment.set_generation(2, Generation::Two);

        assert_eq!(segment.in_generation(Generation::Zero).iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(segment.in_generation(Generation::One).iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(segment.in_scope(Generation::One).iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(segment.in_scope(Generation::Two).len(), 3);

        segment.set_generation(1, Generation::Two);
        assert_eq!(segment.generation(1), Generation::Two);
        assert!(segment.in_generation(Generation::One).is_empty());
    }
}
