//! The allocation front end
//!
//! [`Heap`] owns the segment store, the validated kind table and one
//! free list per small kind. A free list is a queue of segments of its
//! kind that have at least one free slot; allocation takes the lowest
//! free slot of the segment at the front and reserves a fresh segment
//! when the queue is empty.
//!
//! Objects are addressed by [`ObjRef`] only. Their data can be read and
//! written through [`Heap::bytes`] and [`Heap::bytes_mut`], or as
//! references through [`Heap::read_ref`] and [`Heap::write_ref`].

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::ptr::NonNull;

use log::{trace, warn};

use super::block;
use super::collect::Tracer;
use super::config::{HeapConfig, FREED_PATTERN};
use super::cptr::{ObjRef, SegmentIndex};
use super::error::{ConfigError, HeapContext, HeapError, StoreError};
use super::kind::{AuxLength, Chunks, KindId, KindSpec, KindTable, ObjectLayout, TypeTag};
use super::metrics::{GcMetrics, HeapStats, SizeClass};
use super::segment::{Generation, Segment};
use super::store::SegmentStore;

/// Bytes occupied by a reference stored in object data
pub const REF_BYTES: usize = std::mem::size_of::<u32>();

pub struct Heap {
    config: HeapConfig,
    layout: Box<dyn ObjectLayout>,
    kinds: KindTable,
    pub(crate) store: SegmentStore,
    /// Segments with free slots, per kind
    pub(crate) free_lists: Vec<VecDeque<SegmentIndex>>,
    /// Allocations since the last collection
    pub(crate) allocations: usize,
    /// Collections since the last level one or two collection
    pub(crate) young_collections: usize,
    /// Level one collections since the last full collection
    pub(crate) level1_collections: usize,
    pub(crate) metrics: GcMetrics,
}

// SAFETY: the heap exclusively owns every block and segment area it
// points into and the layout is itself Send. It is not Sync; shared
// access only hands out shared slices.
unsafe impl Send for Heap {}

impl Heap {
    /// Build a heap, validating the configuration and the kind table
    pub fn new<L: ObjectLayout + 'static>(config: HeapConfig, layout: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let kinds = KindTable::new(layout.kinds(), config.segment_chunks)?;
        let free_lists = vec![VecDeque::new(); kinds.len()];
        Ok(Heap {
            store: SegmentStore::new(&config),
            config,
            layout: Box::new(layout),
            kinds,
            free_lists,
            allocations: 0,
            young_collections: 0,
            level1_collections: 0,
            metrics: GcMetrics::default(),
        })
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn kinds(&self) -> &KindTable {
        &self.kinds
    }

    /// Allocate an object of type `tag` and `length`
    ///
    /// The object is zero filled and starts in generation zero, or in
    /// generation two if its kind is uncollected. Exhaustion is
    /// reported as [`HeapError::Exhausted`] and leaves the heap
    /// unchanged.
    pub fn alloc(&mut self, tag: TypeTag, length: usize) -> Result<ObjRef, HeapError> {
        let kind = self.layout.kind_for(tag, length);
        let spec = *self
            .kinds
            .get(kind)
            .ok_or(HeapError::UnknownKind { tag, kind })?;
        if spec.tag != tag {
            return Err(HeapError::KindMismatch {
                tag,
                kind,
                kind_tag: spec.tag,
            });
        }

        let stored_length = match spec.length {
            AuxLength::Stored => Some(u32::try_from(length).map_err(|_| {
                HeapError::InvalidAllocationSize {
                    requested_chunks: length,
                    max_chunks: u32::MAX as usize,
                }
            })?),
            AuxLength::Constant(expected) if length != expected as usize => {
                return Err(HeapError::LengthMismatch {
                    tag,
                    kind,
                    length,
                    expected,
                });
            }
            _ => None,
        };
        if let Chunks::Fixed(chunks) = spec.chunks {
            let requested_chunks = self.layout.chunks_for(tag, length);
            if requested_chunks > chunks {
                return Err(HeapError::InvalidAllocationSize {
                    requested_chunks,
                    max_chunks: chunks,
                });
            }
        }

        let obj = match spec.chunks {
            Chunks::Fixed(chunks) => self.alloc_small(kind, &spec, chunks)?,
            Chunks::Big => {
                let chunks = self.layout.chunks_for(tag, length).max(1);
                let max_chunks = self.max_big_chunks();
                if chunks > max_chunks {
                    return Err(HeapError::InvalidAllocationSize {
                        requested_chunks: chunks,
                        max_chunks,
                    });
                }
                self.alloc_big(kind, &spec, chunks)?
            }
        };

        let capacity = self.capacity(obj);
        // SAFETY: the slot was just claimed and spans `capacity` bytes
        unsafe { block::fill(self.store.chunk_address(obj), capacity, 0) };

        let segment = self.store.segment_mut(obj.segment());
        if spec.uncollected {
            segment.set_generation(obj.offset(), Generation::Two);
        }
        if let Some(length) = stored_length {
            segment.set_length(obj.offset(), length);
        }

        self.allocations += 1;
        self.metrics.record_allocation(
            capacity,
            SizeClass::classify(capacity / self.store.chunk_bytes(), spec.is_big()),
        );
        Ok(obj)
    }

    fn alloc_small(&mut self, kind: KindId, spec: &KindSpec, chunks: usize) -> Result<ObjRef, HeapError> {
        let list = kind.as_usize();
        loop {
            let index = match self.free_lists[list].front() {
                Some(index) => *index,
                None => {
                    let index = self
                        .store
                        .reserve_small(kind, chunks, spec.length == AuxLength::Stored)
                        .map_err(|e| self.exhausted(e, kind, chunks))?;
                    self.store.segment_mut(index).on_free_list = true;
                    self.free_lists[list].push_back(index);
                    index
                }
            };

            let segment = self.store.segment_mut(index);
            let taken = segment.take_free();
            if !segment.has_free() {
                segment.on_free_list = false;
                self.free_lists[list].pop_front();
            }
            if let Some(offset) = taken {
                return Ok(ObjRef::new(index, offset));
            }
        }
    }

    fn alloc_big(&mut self, kind: KindId, spec: &KindSpec, chunks: usize) -> Result<ObjRef, HeapError> {
        let index = self
            .store
            .reserve_big(kind, chunks, spec.length == AuxLength::Stored)
            .map_err(|e| self.exhausted(e, kind, chunks))?;
        let offset = self
            .store
            .segment_mut(index)
            .take_free()
            .ok_or(HeapError::Dangling(ObjRef::new(index, 0)))?;
        Ok(ObjRef::new(index, offset))
    }

    /// Largest chunk count a big object may request
    pub fn max_big_chunks(&self) -> usize {
        isize::MAX as usize / self.store.chunk_bytes()
    }

    fn exhausted(&self, error: StoreError, kind: KindId, chunks: usize) -> HeapError {
        let context = self.context(kind, chunks);
        warn!("allocation failed ({}): {}", error, context);
        HeapError::Exhausted { context }
    }

    fn context(&self, kind: KindId, requested_chunks: usize) -> HeapContext {
        HeapContext {
            segments: self.store.reserved(),
            segment_limit: self.store.limit(),
            big_segments: self.store.big(),
            objects: self.stats().total_objects(),
            kind,
            requested_chunks,
        }
    }

    /// Allocate, and on exhaustion run a full collection and try once
    /// more
    ///
    /// Any reference the caller still needs must be reachable from
    /// `tracer`'s roots, or it may be swept by the collection.
    pub fn alloc_with_retry<T: Tracer + ?Sized>(
        &mut self,
        tag: TypeTag,
        length: usize,
        tracer: &mut T,
    ) -> Result<ObjRef, HeapError> {
        match self.alloc(tag, length) {
            Err(e) if e.is_exhausted() => {
                self.metrics.retry_stats.total_attempts += 1;
                self.collect(Generation::Two, tracer);
                let retried = self.alloc(tag, length);
                match &retried {
                    Ok(_) => self.metrics.retry_stats.successful += 1,
                    Err(e) => {
                        self.metrics.retry_stats.failed += 1;
                        warn!("allocation failed after full collection: {}", e);
                    }
                }
                retried
            }
            result => result,
        }
    }

    /// Return an object's slot for reuse without waiting for a
    /// collection
    pub fn free(&mut self, obj: ObjRef) -> Result<(), HeapError> {
        if !self.store.is_valid(obj) {
            return Err(HeapError::Dangling(obj));
        }
        if self.is_uncollected(obj) {
            return Err(HeapError::NotCollectable(obj));
        }
        self.release_object(obj);
        self.metrics.allocation_stats.explicit_frees += 1;

        let index = obj.segment();
        if let Some(segment) = self.store.get_mut(index) {
            if !segment.on_free_list {
                segment.on_free_list = true;
                self.free_lists[segment.kind().as_usize()].push_back(index);
            }
        }
        Ok(())
    }

    /// Release an allocated object's slot, returning the chunks it
    /// held. A big segment goes back to the system immediately; small
    /// segments stay reserved.
    pub(crate) fn release_object(&mut self, obj: ObjRef) -> usize {
        let capacity = self.capacity(obj);
        if self.config.debug_fill {
            // SAFETY: the object is allocated and spans `capacity` bytes
            unsafe { block::fill(self.store.chunk_address(obj), capacity, FREED_PATTERN) };
        }
        let segment = self.store.segment_mut(obj.segment());
        segment.release_slot(obj.offset());
        let chunks = segment.object_chunks();
        if segment.is_big() {
            self.store.release(obj.segment());
        }
        trace!("released {:?}", obj);
        chunks
    }

    fn segment(&self, obj: ObjRef) -> &Segment {
        self.store.segment(obj.segment())
    }

    /// Whether `obj` names a currently allocated object
    pub fn is_allocated(&self, obj: ObjRef) -> bool {
        self.store.is_valid(obj)
    }

    /// Address of the first chunk of `obj`
    pub fn chunk_address(&self, obj: ObjRef) -> NonNull<u8> {
        self.store.chunk_address(obj)
    }

    pub fn segment_of(&self, obj: ObjRef) -> SegmentIndex {
        obj.segment()
    }

    pub fn kind_of(&self, obj: ObjRef) -> KindId {
        self.segment(obj).kind()
    }

    pub fn type_of(&self, obj: ObjRef) -> TypeTag {
        self.kinds.spec(self.kind_of(obj)).tag
    }

    pub fn generation_of(&self, obj: ObjRef) -> Generation {
        self.segment(obj).generation(obj.offset())
    }

    pub fn is_uncollected(&self, obj: ObjRef) -> bool {
        self.kinds.spec(self.kind_of(obj)).uncollected
    }

    pub fn in_old_to_new(&self, obj: ObjRef) -> bool {
        self.segment(obj).in_old_to_new(obj.offset())
    }

    /// Chunks occupied by `obj`
    pub fn chunks_of(&self, obj: ObjRef) -> usize {
        self.segment(obj).object_chunks()
    }

    /// Bytes available in `obj`'s data
    pub fn capacity(&self, obj: ObjRef) -> usize {
        self.chunks_of(obj) * self.store.chunk_bytes()
    }

    /// The length recorded for `obj`, if its kind records one
    pub fn length_of(&self, obj: ObjRef) -> Option<usize> {
        match self.kinds.spec(self.kind_of(obj)).length {
            AuxLength::None => None,
            AuxLength::Stored => self
                .segment(obj)
                .stored_length(obj.offset())
                .map(|n| n as usize),
            AuxLength::Constant(n) => Some(n as usize),
        }
    }

    /// Object data, bounded by the object's chunk capacity
    pub fn bytes(&self, obj: ObjRef) -> &[u8] {
        debug_assert!(self.is_allocated(obj));
        // SAFETY: the slot lies in memory owned by the heap and the
        // shared borrow of the heap excludes writers
        unsafe { std::slice::from_raw_parts(self.chunk_address(obj).as_ptr(), self.capacity(obj)) }
    }

    pub fn bytes_mut(&mut self, obj: ObjRef) -> &mut [u8] {
        debug_assert!(self.is_allocated(obj));
        let capacity = self.capacity(obj);
        // SAFETY: as for `bytes`, with the exclusive borrow of the heap
        // excluding every other access
        unsafe { std::slice::from_raw_parts_mut(self.chunk_address(obj).as_ptr(), capacity) }
    }

    /// Reference slots that fit in `obj`'s data
    pub fn ref_capacity(&self, obj: ObjRef) -> usize {
        self.capacity(obj) / REF_BYTES
    }

    /// The reference stored in slot `slot` of `obj`'s data
    pub fn read_ref(&self, obj: ObjRef, slot: usize) -> Result<ObjRef, HeapError> {
        let range = self.ref_range(obj, slot)?;
        let mut raw = [0u8; REF_BYTES];
        raw.copy_from_slice(&self.bytes(obj)[range]);
        Ok(ObjRef::from_raw(u32::from_le_bytes(raw)))
    }

    pub(crate) fn ref_range(&self, obj: ObjRef, slot: usize) -> Result<std::ops::Range<usize>, HeapError> {
        if !self.store.is_valid(obj) {
            return Err(HeapError::Dangling(obj));
        }
        let capacity = self.capacity(obj);
        slot.checked_mul(REF_BYTES)
            .filter(|start| *start < capacity && capacity - start >= REF_BYTES)
            .map(|start| start..start + REF_BYTES)
            .ok_or(HeapError::FieldOutOfRange {
                obj,
                slot,
                capacity,
            })
    }

    /// Hex dump of an object's chunks
    pub fn dump_object(&self, obj: ObjRef) -> String {
        format!(
            "{:?} type {} kind {} gen {}\n{}",
            obj,
            self.type_of(obj),
            self.kind_of(obj),
            self.generation_of(obj),
            pretty_hex::pretty_hex(&self.bytes(obj))
        )
    }

    /// Snapshot of heap occupancy
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total_bytes: self.store.total_bytes(),
            big_segments: self.store.big(),
            small_segments: self.store.reserved() - self.store.big(),
            ..Default::default()
        };
        for (_, segment) in self.store.iter() {
            let chunks = segment.object_chunks();
            if self.kinds.spec(segment.kind()).uncollected {
                let count = segment.allocated().len();
                stats.uncollected += count;
                stats.uncollected_chunks += count * chunks;
            } else {
                for generation in Generation::ALL {
                    let count = segment.in_generation(generation).len();
                    stats.objects[generation.index()] += count;
                    stats.chunks[generation.index()] += count * chunks;
                }
            }
            stats.old_to_new += segment.old_to_new().len();
        }
        stats
    }

    /// Cumulative collector metrics
    pub fn metrics(&self) -> GcMetrics {
        self.metrics.snapshot()
    }

    /// The collection level the configured policy calls for now, if
    /// any
    pub fn policy_requires_collection(&self) -> Option<Generation> {
        let policy = &self.config.policy;
        if self.allocations < policy.young_threshold {
            None
        } else if self.young_collections + 1 < policy.level1_every.max(1) {
            Some(Generation::Zero)
        } else if self.level1_collections + 1 < policy.level2_every.max(1) {
            Some(Generation::One)
        } else {
            Some(Generation::Two)
        }
    }

    /// Track collection cadence for the policy
    pub(crate) fn note_collection(&mut self, level: Generation) {
        self.allocations = 0;
        match level {
            Generation::Zero => self.young_collections += 1,
            Generation::One => {
                self.young_collections = 0;
                self.level1_collections += 1;
            }
            Generation::Two => {
                self.young_collections = 0;
                self.level1_collections = 0;
            }
        }
    }
}

impl Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.stats())?;
        for (kind, list) in self.free_lists.iter().enumerate() {
            if !list.is_empty() {
                writeln!(f, "free list {}: {:?}", kind, list)?;
            }
        }
        write!(f, "{:?}", self.store)
    }
}

/// Read-only access to the heap while the collector runs
pub struct HeapView<'h> {
    heap: &'h Heap,
}

impl<'h> HeapView<'h> {
    pub fn new(heap: &'h Heap) -> Self {
        HeapView { heap }
    }

    pub fn bytes(&self, obj: ObjRef) -> &'h [u8] {
        self.heap.bytes(obj)
    }

    pub fn read_ref(&self, obj: ObjRef, slot: usize) -> Result<ObjRef, HeapError> {
        self.heap.read_ref(obj, slot)
    }

    pub fn ref_capacity(&self, obj: ObjRef) -> usize {
        self.heap.ref_capacity(obj)
    }

    pub fn length_of(&self, obj: ObjRef) -> Option<usize> {
        self.heap.length_of(obj)
    }

    pub fn type_of(&self, obj: ObjRef) -> TypeTag {
        self.heap.type_of(obj)
    }

    pub fn kind_of(&self, obj: ObjRef) -> KindId {
        self.heap.kind_of(obj)
    }

    pub fn generation_of(&self, obj: ObjRef) -> Generation {
        self.heap.generation_of(obj)
    }
}
