//! Per-segment sets of chunk offsets
//!
//! Every membership a segment tracks (slot starts, free slots,
//! generations, marks, old-to-new) is one 64 bit map indexed by chunk
//! offset, so whole-segment set operations are single word operations.

use std::fmt::Debug;
use std::ops::{BitAnd, BitOr, Not};

use bitmaps::Bitmap;

use super::cptr::MAX_SEGMENT_CHUNKS;

/// A set of chunk offsets within one segment
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSet(Bitmap<MAX_SEGMENT_CHUNKS>);

impl ChunkSet {
    pub fn new() -> Self {
        ChunkSet(Bitmap::new())
    }

    /// Offsets at which objects of `chunks` chunks start in a segment
    /// of `segment_chunks` chunks
    pub fn slot_starts(chunks: usize, segment_chunks: usize) -> Self {
        debug_assert!(chunks > 0 && segment_chunks <= MAX_SEGMENT_CHUNKS);
        let mut set = ChunkSet::new();
        let mut offset = 0;
        while offset + chunks <= segment_chunks {
            set.insert(offset);
            offset += chunks;
        }
        set
    }

    /// The set containing only `offset`
    pub fn single(offset: usize) -> Self {
        let mut set = ChunkSet::new();
        set.insert(offset);
        set
    }

    pub fn insert(&mut self, offset: usize) {
        debug_assert!(offset < MAX_SEGMENT_CHUNKS);
        self.0.set(offset, true);
    }

    pub fn remove(&mut self, offset: usize) {
        debug_assert!(offset < MAX_SEGMENT_CHUNKS);
        self.0.set(offset, false);
    }

    pub fn contains(&self, offset: usize) -> bool {
        debug_assert!(offset < MAX_SEGMENT_CHUNKS);
        self.0.get(offset)
    }

    /// Lowest offset in the set
    pub fn first(&self) -> Option<usize> {
        self.0.first_index()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0 = Bitmap::new();
    }

    /// Members of `self` not in `other`
    pub fn without(self, other: ChunkSet) -> ChunkSet {
        self & !other
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (&self.0).into_iter()
    }
}

impl BitAnd for ChunkSet {
    type Output = ChunkSet;

    fn bitand(self, rhs: Self) -> Self::Output {
        ChunkSet(self.0 & rhs.0)
    }
}

impl BitOr for ChunkSet {
    type Output = ChunkSet;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChunkSet(self.0 | rhs.0)
    }
}

impl Not for ChunkSet {
    type Output = ChunkSet;

    fn not(self) -> Self::Output {
        ChunkSet(!self.0)
    }
}

impl Debug for ChunkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let word: u64 = self.0.into_value();
        write!(f, "{:#018x}", word.reverse_bits())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_slot_starts() {
        let starts = ChunkSet::slot_starts(3, 64);
        assert_eq!(starts.len(), 21);
        assert!(starts.contains(0));
        assert!(starts.contains(60));
        assert!(!starts.contains(63));
        assert_eq!(ChunkSet::slot_starts(64, 64).len(), 1);
        assert_eq!(ChunkSet::slot_starts(1, 16).len(), 16);
        assert_eq!(ChunkSet::slot_starts(8, 16).iter().collect::<Vec<_>>(), vec![0, 8]);
    }

    #[test]
    pub fn test_set_algebra() {
        let starts = ChunkSet::slot_starts(2, 8);
        let mut free = ChunkSet::new();
        free.insert(2);
        free.insert(6);
        let allocated = starts.without(free);
        assert_eq!(allocated.iter().collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!((allocated | free), starts);
        assert_eq!((allocated & free), ChunkSet::new());
        assert_eq!(free.first(), Some(2));
    }

    #[test]
    pub fn test_insert_remove() {
        let mut set = ChunkSet::new();
        assert!(set.is_empty());
        set.insert(63);
        assert!(set.contains(63));
        assert_eq!(set.len(), 1);
        set.remove(63);
        assert!(set.is_empty());
        set.insert(5);
        set.clear();
        assert_eq!(set.first(), None);
    }

    #[test]
    pub fn test_debug_shows_low_offsets_first() {
        assert_eq!(format!("{:?}", ChunkSet::single(0)), "0x8000000000000000");
    }
}
