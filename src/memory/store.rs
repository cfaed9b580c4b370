//! The segment store
//!
//! Owns the segment table, the pool blocks that small segments are
//! carved from and the allocations behind big segments. Translating a
//! reference to an address is an index into the table plus a shift.

use std::ptr::NonNull;

use log::trace;

use super::block::Block;
use super::config::HeapConfig;
use super::cptr::{ObjRef, SegmentIndex, MAX_SEGMENTS};
use super::error::{BlockError, StoreError};
use super::kind::KindId;
use super::lob::LargeObjectBlock;
use super::segment::{Backing, Segment};

pub struct SegmentStore {
    /// Segment table; `None` marks a vacant index
    segments: Vec<Option<Segment>>,
    /// Vacant indexes available for reuse
    vacant: Vec<SegmentIndex>,
    /// Pool blocks, kept for the life of the store
    blocks: Vec<Block>,
    /// Unused small segment data areas
    spare: Vec<NonNull<u8>>,
    chunk_bits: u32,
    segment_chunks: usize,
    segments_per_block: usize,
    max_segments: usize,
    /// Segments currently reserved
    reserved: usize,
    /// Big segments currently reserved
    big: usize,
    big_bytes: usize,
}

impl SegmentStore {
    pub fn new(config: &HeapConfig) -> Self {
        SegmentStore {
            segments: vec![],
            vacant: vec![],
            blocks: vec![],
            spare: vec![],
            chunk_bits: config.chunk_bytes.trailing_zeros(),
            segment_chunks: config.segment_chunks,
            segments_per_block: config.segments_per_block,
            max_segments: config.max_segments,
            reserved: 0,
            big: 0,
            big_bytes: 0,
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        1 << self.chunk_bits
    }

    pub fn segment_chunks(&self) -> usize {
        self.segment_chunks
    }

    pub fn segment_bytes(&self) -> usize {
        self.segment_chunks << self.chunk_bits
    }

    /// Reserve a small segment for `kind`, all of whose slots are free
    pub fn reserve_small(
        &mut self,
        kind: KindId,
        chunks: usize,
        stored_length: bool,
    ) -> Result<SegmentIndex, StoreError> {
        self.check_limit()?;
        let data = match self.spare.pop() {
            Some(data) => data,
            None => self.grow_pool()?,
        };
        let segment = Segment::small(kind, chunks, self.segment_chunks, data, stored_length);
        let index = self.install(segment);
        trace!("reserved small segment {} for kind {}", index, kind);
        Ok(index)
    }

    /// Reserve a segment holding a single object of `chunks` chunks
    pub fn reserve_big(
        &mut self,
        kind: KindId,
        chunks: usize,
        stored_length: bool,
    ) -> Result<SegmentIndex, StoreError> {
        self.check_limit()?;
        let bytes = chunks
            .checked_mul(self.chunk_bytes())
            .ok_or(BlockError::BadSize)?;
        let data = LargeObjectBlock::new(bytes, self.chunk_bytes())?;
        self.big += 1;
        self.big_bytes += data.allocated_size();
        let index = self.install(Segment::big(kind, chunks, data, stored_length));
        trace!("reserved big segment {} for kind {} ({} chunks)", index, kind, chunks);
        Ok(index)
    }

    /// Give a segment's memory back and make its index vacant
    pub fn release(&mut self, index: SegmentIndex) {
        if let Some(segment) = self.segments[index.as_usize()].take() {
            match segment.into_backing() {
                Backing::Pooled(data) => self.spare.push(data),
                Backing::Big(lob) => {
                    self.big -= 1;
                    self.big_bytes -= lob.allocated_size();
                }
            }
            self.reserved -= 1;
            self.vacant.push(index);
            trace!("released segment {}", index);
        }
    }

    fn check_limit(&self) -> Result<(), StoreError> {
        if self.reserved >= self.max_segments {
            Err(StoreError::SegmentLimit {
                limit: self.max_segments,
            })
        } else {
            Ok(())
        }
    }

    /// Allocate a new pool block, keep all but one of its areas spare
    /// and return that one
    fn grow_pool(&mut self) -> Result<NonNull<u8>, StoreError> {
        let block = Block::new(self.segment_bytes() * self.segments_per_block)?;
        // lowest areas are handed out first
        self.spare
            .extend(block.areas(self.segment_bytes()).collect::<Vec<_>>().into_iter().rev());
        self.blocks.push(block);
        trace!("pool grown to {} blocks", self.blocks.len());
        self.spare.pop().ok_or(StoreError::Block(BlockError::OOM))
    }

    fn install(&mut self, segment: Segment) -> SegmentIndex {
        self.reserved += 1;
        match self.vacant.pop() {
            Some(index) => {
                self.segments[index.as_usize()] = Some(segment);
                index
            }
            None => {
                debug_assert!(self.segments.len() < MAX_SEGMENTS);
                self.segments.push(Some(segment));
                SegmentIndex((self.segments.len() - 1) as u32)
            }
        }
    }

    pub fn get(&self, index: SegmentIndex) -> Option<&Segment> {
        self.segments.get(index.as_usize()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: SegmentIndex) -> Option<&mut Segment> {
        self.segments
            .get_mut(index.as_usize())
            .and_then(Option::as_mut)
    }

    /// The segment at a reserved index
    pub fn segment(&self, index: SegmentIndex) -> &Segment {
        match self.get(index) {
            Some(segment) => segment,
            None => panic!("segment {} is not reserved", index),
        }
    }

    pub fn segment_mut(&mut self, index: SegmentIndex) -> &mut Segment {
        match self.get_mut(index) {
            Some(segment) => segment,
            None => panic!("segment {} is not reserved", index),
        }
    }

    /// Address of the first byte of an object's data
    pub fn chunk_address(&self, obj: ObjRef) -> NonNull<u8> {
        let base = self.segment(obj.segment()).base();
        // SAFETY: offset is below the segment's chunk count so the
        // result lies inside the segment's data area
        unsafe { NonNull::new_unchecked(base.as_ptr().add(obj.offset() << self.chunk_bits)) }
    }

    /// Whether `obj` names an allocated object
    pub fn is_valid(&self, obj: ObjRef) -> bool {
        obj.is_some()
            && self
                .get(obj.segment())
                .map_or(false, |segment| segment.is_allocated(obj.offset()))
    }

    /// Reserved segments with their indexes
    pub fn iter(&self) -> impl Iterator<Item = (SegmentIndex, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SegmentIndex(i as u32), s)))
    }

    /// Indexes of reserved segments
    pub fn indices(&self) -> Vec<SegmentIndex> {
        self.iter().map(|(i, _)| i).collect()
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn big(&self) -> usize {
        self.big
    }

    pub fn limit(&self) -> usize {
        self.max_segments
    }

    /// Bytes obtained from the system allocator
    pub fn total_bytes(&self) -> usize {
        self.blocks.iter().map(Block::size).sum::<usize>() + self.big_bytes
    }

    /// Small segment areas held for reuse
    pub fn spare(&self) -> usize {
        self.spare.len()
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, segment) in self.iter() {
            write!(f, "[{index}] {segment:?}")?;
        }
        writeln!(
            f,
            "{} segments ({} big), {} pool blocks, {} spare areas",
            self.reserved,
            self.big,
            self.blocks.len(),
            self.spare.len()
        )
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn store(max_segments: usize) -> SegmentStore {
        SegmentStore::new(
            &HeapConfig::default()
                .with_chunk_bytes(16)
                .with_data_alignment(16)
                .with_segments_per_block(4)
                .with_max_segments(max_segments),
        )
    }

    #[test]
    pub fn test_small_segments_share_blocks() {
        let mut store = store(16);
        let a = store.reserve_small(KindId(0), 1, false).unwrap();
        let b = store.reserve_small(KindId(1), 2, false).unwrap();
        assert_eq!(store.reserved(), 2);
        assert_eq!(store.total_bytes(), 4 * 1024);
        assert_eq!(store.spare(), 2);

        let base_a = store.segment(a).base().as_ptr() as usize;
        let base_b = store.segment(b).base().as_ptr() as usize;
        assert_eq!(base_a % 1024, 0);
        assert_eq!(base_b - base_a, 1024);
    }

    #[test]
    pub fn test_chunk_address() {
        let mut store = store(16);
        let index = store.reserve_small(KindId(0), 4, false).unwrap();
        let base = store.segment(index).base().as_ptr() as usize;
        let obj = ObjRef::new(index, 8);
        assert_eq!(store.chunk_address(obj).as_ptr() as usize, base + 8 * 16);
    }

    #[test]
    pub fn test_limit_and_release() {
        let mut store = store(2);
        let a = store.reserve_small(KindId(0), 1, false).unwrap();
        store.reserve_big(KindId(1), 100, true).unwrap();
        assert_eq!(store.big(), 1);
        assert_eq!(
            store.reserve_small(KindId(0), 1, false),
            Err(StoreError::SegmentLimit { limit: 2 })
        );

        store.release(a);
        assert!(store.get(a).is_none());
        let c = store.reserve_small(KindId(2), 1, false).unwrap();
        assert_eq!(c, a);
        assert_eq!(store.segment(c).kind(), KindId(2));
    }

    #[test]
    pub fn test_big_segment_sized_from_chunks() {
        let mut store = store(4);
        let index = store.reserve_big(KindId(0), 1000, false).unwrap();
        assert!(store.segment(index).is_big());
        assert_eq!(store.segment(index).object_chunks(), 1000);
        assert_eq!(store.total_bytes(), 16 * 1000);
        store.release(index);
        assert_eq!(store.total_bytes(), 0);
        assert_eq!(store.big(), 0);
    }

    #[test]
    pub fn test_validity() {
        let mut store = store(4);
        let index = store.reserve_small(KindId(0), 2, false).unwrap();
        let offset = store.segment_mut(index).take_free().unwrap();
        assert!(store.is_valid(ObjRef::new(index, offset)));
        assert!(!store.is_valid(ObjRef::new(index, offset + 1)));
        assert!(!store.is_valid(ObjRef::new(index, offset + 2)));
        assert!(!store.is_valid(ObjRef::new(SegmentIndex(9), 0)));
        assert!(!store.is_valid(ObjRef::NONE));
    }
}
