//! Heap configuration
//!
//! Fixed at construction. Geometry (chunk and segment sizes, the
//! segment ceiling) is checked here; the kind table is checked against
//! it by [`super::kind::KindTable::new`].

use super::cptr::{MAX_SEGMENTS, MAX_SEGMENT_CHUNKS};
use super::error::ConfigError;

/// Alignment of object data required for SIMD loads on the target
pub const fn default_data_alignment() -> usize {
    if cfg!(target_feature = "avx512f") {
        64
    } else if cfg!(target_feature = "avx") {
        32
    } else if cfg!(any(
        target_arch = "x86_64",
        target_arch = "x86",
        target_arch = "aarch64",
        target_arch = "arm"
    )) {
        16
    } else {
        std::mem::align_of::<u64>()
    }
}

/// Byte written over freed chunks when `debug_fill` is set
pub const FREED_PATTERN: u8 = 0xfb;

/// When the heap suggests collecting, and at what level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    /// Allocations after which a collection is due
    pub young_threshold: usize,
    /// Every this many collections, collect generation 1 too
    pub level1_every: usize,
    /// Every this many level 1 collections, collect everything
    pub level2_every: usize,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        CollectionPolicy {
            young_threshold: 10_000,
            level1_every: 4,
            level2_every: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes per chunk
    pub chunk_bytes: usize,
    /// Chunks per small segment
    pub segment_chunks: usize,
    /// Ceiling on reserved segments, small and big
    pub max_segments: usize,
    /// Small segments carved from each pool block
    pub segments_per_block: usize,
    /// Alignment guaranteed for the start of every object
    pub data_alignment: usize,
    /// Overwrite freed chunks with [`FREED_PATTERN`]
    pub debug_fill: bool,
    /// Validate every reference yielded by tracing callbacks
    pub check_refs: bool,
    pub policy: CollectionPolicy,
}

impl Default for HeapConfig {
    fn default() -> Self {
        let data_alignment = default_data_alignment();
        HeapConfig {
            chunk_bytes: data_alignment.max(16),
            segment_chunks: MAX_SEGMENT_CHUNKS,
            max_segments: 1 << 20,
            segments_per_block: 16,
            data_alignment,
            debug_fill: cfg!(debug_assertions),
            check_refs: false,
            policy: CollectionPolicy::default(),
        }
    }
}

impl HeapConfig {
    pub fn with_chunk_bytes(self, chunk_bytes: usize) -> Self {
        HeapConfig {
            chunk_bytes,
            ..self
        }
    }

    pub fn with_segment_chunks(self, segment_chunks: usize) -> Self {
        HeapConfig {
            segment_chunks,
            ..self
        }
    }

    pub fn with_max_segments(self, max_segments: usize) -> Self {
        HeapConfig {
            max_segments,
            ..self
        }
    }

    pub fn with_segments_per_block(self, segments_per_block: usize) -> Self {
        HeapConfig {
            segments_per_block,
            ..self
        }
    }

    pub fn with_data_alignment(self, data_alignment: usize) -> Self {
        HeapConfig {
            data_alignment,
            ..self
        }
    }

    pub fn with_debug_fill(self, debug_fill: bool) -> Self {
        HeapConfig { debug_fill, ..self }
    }

    pub fn with_check_refs(self, check_refs: bool) -> Self {
        HeapConfig { check_refs, ..self }
    }

    pub fn with_policy(self, policy: CollectionPolicy) -> Self {
        HeapConfig { policy, ..self }
    }

    /// Bytes in a small segment's data area
    pub fn segment_bytes(&self) -> usize {
        self.chunk_bytes * self.segment_chunks
    }

    /// Bytes in a pool block
    pub fn block_bytes(&self) -> usize {
        self.segment_bytes() * self.segments_per_block
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.chunk_bytes.is_power_of_two() || self.chunk_bytes < 8 {
            return Err(ConfigError::ChunkSize(self.chunk_bytes));
        }

        if !self.segment_chunks.is_power_of_two() || self.segment_chunks > MAX_SEGMENT_CHUNKS {
            return Err(ConfigError::SegmentChunks(self.segment_chunks));
        }

        if !self.segments_per_block.is_power_of_two() {
            return Err(ConfigError::SegmentsPerBlock(self.segments_per_block));
        }

        if !self.data_alignment.is_power_of_two() || self.data_alignment > self.chunk_bytes {
            return Err(ConfigError::Alignment {
                alignment: self.data_alignment,
                chunk_bytes: self.chunk_bytes,
            });
        }

        if self.max_segments > MAX_SEGMENTS {
            return Err(ConfigError::TooManySegments {
                requested: self.max_segments,
                limit: MAX_SEGMENTS,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_default_is_valid() {
        let config = HeapConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!(config.chunk_bytes >= config.data_alignment);
        assert_eq!(config.segment_bytes(), config.chunk_bytes * 64);
    }

    #[test]
    pub fn test_bad_geometry() {
        let config = HeapConfig::default();
        assert_eq!(
            config.clone().with_chunk_bytes(24).validate(),
            Err(ConfigError::ChunkSize(24))
        );
        assert_eq!(
            config.clone().with_segment_chunks(128).validate(),
            Err(ConfigError::SegmentChunks(128))
        );
        assert_eq!(
            config.clone().with_segments_per_block(0).validate(),
            Err(ConfigError::SegmentsPerBlock(0))
        );
        assert!(config
            .clone()
            .with_chunk_bytes(16)
            .with_data_alignment(32)
            .validate()
            .is_err());
        assert!(config
            .with_max_segments(MAX_SEGMENTS + 1)
            .validate()
            .is_err());
    }
}
