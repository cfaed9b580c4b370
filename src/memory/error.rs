//! Error types for the heap
//!
//! Only allocation exhaustion is a normal, recoverable outcome. The
//! other variants report configuration bugs or API misuse.

use std::fmt;

use thiserror::Error;

use super::cptr::ObjRef;
use super::kind::{KindId, TypeTag};

/// Failure to obtain memory for a pool block or a big segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block size must be a power of two")]
    BadSize,
    #[error("system allocator refused a block")]
    OOM,
}

/// Failure to reserve a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("segment limit of {limit} reached")]
    SegmentLimit { limit: usize },
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Invalid heap configuration, detected when the heap is built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chunk size {0} is not a power of two of at least 8 bytes")]
    ChunkSize(usize),
    #[error("segment chunk count {0} is not a power of two between 1 and 64")]
    SegmentChunks(usize),
    #[error("segments per block {0} is not a non-zero power of two")]
    SegmentsPerBlock(usize),
    #[error("data alignment {alignment} must be a power of two no larger than the chunk size {chunk_bytes}")]
    Alignment {
        alignment: usize,
        chunk_bytes: usize,
    },
    #[error("maximum segment count {requested} exceeds the reference encoding limit {limit}")]
    TooManySegments { requested: usize, limit: usize },
    #[error("kind {kind} needs {chunks} chunks but segments hold {segment_chunks}")]
    KindTooLarge {
        kind: KindId,
        chunks: usize,
        segment_chunks: usize,
    },
    #[error("kind {0} has a zero chunk count")]
    EmptyKind(KindId),
    #[error("kind table is empty or larger than {0} entries")]
    KindCount(usize),
}

/// Occupancy of the heap at the time of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapContext {
    /// Segments currently reserved
    pub segments: usize,
    /// Configured ceiling on segments
    pub segment_limit: usize,
    /// Big segments among those reserved
    pub big_segments: usize,
    /// Live objects of all generations
    pub objects: usize,
    /// Kind that was requested
    pub kind: KindId,
    /// Chunks that were requested
    pub requested_chunks: usize,
}

impl HeapContext {
    /// Fraction of the segment ceiling in use, as a percentage
    pub fn segment_utilisation_percent(&self) -> f64 {
        if self.segment_limit == 0 {
            0.0
        } else {
            (self.segments as f64 / self.segment_limit as f64) * 100.0
        }
    }
}

impl fmt::Display for HeapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind {} ({} chunks) | heap: {}/{} segments ({:.1}%), {} big, {} objects",
            self.kind,
            self.requested_chunks,
            self.segments,
            self.segment_limit,
            self.segment_utilisation_percent(),
            self.big_segments,
            self.objects
        )
    }
}

/// Heap-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// No free slot and no segment could be reserved. Recoverable by
    /// a full collection and a single retry.
    #[error("heap exhausted: {context}")]
    Exhausted { context: HeapContext },
    /// The layout mapped a type to a kind outside the table
    #[error("layout mapped type {tag} to unknown kind {kind}")]
    UnknownKind { tag: TypeTag, kind: KindId },
    /// The layout mapped a type to a kind of another type
    #[error("layout mapped type {tag} to kind {kind} of type {kind_tag}")]
    KindMismatch {
        tag: TypeTag,
        kind: KindId,
        kind_tag: TypeTag,
    },
    /// A length other than the one shared by every object of the kind
    #[error("type {tag} has constant length {expected} in kind {kind}, requested {length}")]
    LengthMismatch {
        tag: TypeTag,
        kind: KindId,
        length: usize,
        expected: u32,
    },
    /// More chunks than the kind holds, or a big object larger than
    /// the heap can address
    #[error("invalid allocation size: {requested_chunks} chunks exceeds maximum {max_chunks}")]
    InvalidAllocationSize {
        requested_chunks: usize,
        max_chunks: usize,
    },
    /// Explicit free of an object whose kind is never collected
    #[error("object {0:?} is of an uncollected kind")]
    NotCollectable(ObjRef),
    /// Explicit free of a reference that names no allocated object
    #[error("object {0:?} is not allocated")]
    Dangling(ObjRef),
    /// Field access beyond the object's chunk capacity
    #[error("field {slot} is outside object {obj:?} ({capacity} bytes)")]
    FieldOutOfRange {
        obj: ObjRef,
        slot: usize,
        capacity: usize,
    },
}

impl HeapError {
    /// True for the only recoverable error
    pub fn is_exhausted(&self) -> bool {
        matches!(self, HeapError::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let context = HeapContext {
            segments: 3,
            segment_limit: 4,
            big_segments: 1,
            objects: 70,
            kind: KindId(2),
            requested_chunks: 1,
        };
        let message = HeapError::Exhausted { context }.to_string();
        assert!(message.starts_with("heap exhausted: kind 2 (1 chunks)"));
        assert!(message.contains("3/4 segments (75.0%)"));
    }

    #[test]
    fn test_store_error_from_block_error() {
        let e: StoreError = BlockError::OOM.into();
        assert_eq!(e, StoreError::Block(BlockError::OOM));
    }
}
