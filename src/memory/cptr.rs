//! Compressed object references
//!
//! An object is identified by a 32 bit value combining the index of
//! its segment with the chunk offset of the object inside the
//! segment. References are independent of the address space layout
//! and are half the width of a pointer on 64 bit targets.

use std::fmt;

/// Bits of a reference used for the in-segment chunk offset
pub const OFFSET_BITS: u32 = 6;

/// Upper bound on chunks per segment imposed by the encoding
pub const MAX_SEGMENT_CHUNKS: usize = 1 << OFFSET_BITS;

const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;

/// Number of segment indexes the encoding can express. The last
/// index is unusable because its final offset is the `NONE` value.
pub const MAX_SEGMENTS: usize = (u32::MAX >> OFFSET_BITS) as usize;

/// Index of a segment in the segment table
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentIndex(pub(crate) u32);

impl SegmentIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compressed reference to a heap object
///
/// Equal references denote the same slot. Once an object is swept its
/// slot may be handed out again, so references must not be held
/// across a collection unless reachable from the roots.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjRef(u32);

impl ObjRef {
    /// The reference denoting no object
    pub const NONE: ObjRef = ObjRef(u32::MAX);

    pub(crate) fn new(segment: SegmentIndex, offset: usize) -> Self {
        debug_assert!(segment.as_usize() < MAX_SEGMENTS);
        debug_assert!(offset < MAX_SEGMENT_CHUNKS);
        ObjRef((segment.0 << OFFSET_BITS) | offset as u32)
    }

    /// Segment containing the object
    pub fn segment(self) -> SegmentIndex {
        SegmentIndex(self.0 >> OFFSET_BITS)
    }

    /// Chunk offset of the object within its segment
    pub fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }

    pub fn is_none(self) -> bool {
        self == ObjRef::NONE
    }

    pub fn is_some(self) -> bool {
        self != ObjRef::NONE
    }

    /// `None` for the `NONE` reference
    pub fn get(self) -> Option<ObjRef> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    /// Raw encoding, for storing references inside object data
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// Rebuild a reference from its raw encoding
    pub fn from_raw(raw: u32) -> Self {
        ObjRef(raw)
    }
}

impl Default for ObjRef {
    fn default() -> Self {
        ObjRef::NONE
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "#none")
        } else {
            write!(f, "#{}:{}", self.segment(), self.offset())
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_decomposition() {
        let r = ObjRef::new(SegmentIndex(1234), 37);
        assert_eq!(r.segment(), SegmentIndex(1234));
        assert_eq!(r.offset(), 37);
        assert_eq!(r.to_raw(), (1234 << 6) | 37);
        assert_eq!(format!("{:?}", r), "#1234:37");
    }

    #[test]
    pub fn test_none_is_distinct() {
        let last = ObjRef::new(SegmentIndex((MAX_SEGMENTS - 1) as u32), 62);
        assert!(last.is_some());
        assert_ne!(last, ObjRef::NONE);
        assert!(ObjRef::NONE.is_none());
        assert_eq!(ObjRef::NONE.get(), None);
        assert_eq!(ObjRef::default(), ObjRef::NONE);
    }

    #[test]
    pub fn test_raw_round_trip_preserves_equality() {
        let r = ObjRef::new(SegmentIndex(9), 4);
        assert_eq!(ObjRef::from_raw(r.to_raw()), r);
    }
}
