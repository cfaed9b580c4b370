//! Heap statistics and collector metrics
//!
//! [`HeapStats`] is a snapshot of occupancy computed on request.
//! [`GcMetrics`] accumulates over the life of the heap. Per-allocation
//! size class counters sit on the allocation fast path and are only
//! kept in debug builds or with the `gc-telemetry` feature.

use std::fmt;
use std::time::{Duration, Instant};

use itertools::Itertools;

use super::segment::Generation;

/// Instantaneous heap occupancy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live collectable objects by generation
    pub objects: [usize; 3],
    /// Chunks held by live collectable objects by generation
    pub chunks: [usize; 3],
    /// Live objects of uncollected kinds
    pub uncollected: usize,
    /// Chunks held by uncollected objects
    pub uncollected_chunks: usize,
    /// Small segments reserved
    pub small_segments: usize,
    /// Big segments reserved
    pub big_segments: usize,
    /// Bytes obtained from the system allocator
    pub total_bytes: usize,
    /// Members of the old-to-new set
    pub old_to_new: usize,
}

impl HeapStats {
    /// Live objects of every kind
    pub fn total_objects(&self) -> usize {
        self.objects.iter().sum::<usize>() + self.uncollected
    }

    pub fn segments(&self) -> usize {
        self.small_segments + self.big_segments
    }

    pub fn in_generation(&self, generation: Generation) -> usize {
        self.objects[generation.index()]
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let by_generation = Generation::ALL
            .iter()
            .map(|g| {
                format!(
                    "gen{}: {} ({} chunks)",
                    g,
                    self.objects[g.index()],
                    self.chunks[g.index()]
                )
            })
            .join(", ");
        writeln!(f, "{by_generation}, uncollected: {}", self.uncollected)?;
        write!(
            f,
            "segments: {} small, {} big, {} bytes, old-to-new: {}",
            self.small_segments, self.big_segments, self.total_bytes, self.old_to_new
        )
    }
}

/// What a single collection did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub level: Generation,
    /// Objects reached during marking
    pub marked: usize,
    /// Objects swept
    pub freed: usize,
    /// Chunks returned by sweeping
    pub freed_chunks: usize,
    /// Survivors whose generation changed
    pub promoted: usize,
    /// Small segments released because they became empty
    pub segments_released: usize,
    /// Members of the old-to-new set after rebuilding
    pub old_to_new: usize,
    pub duration: Duration,
}

impl fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {}: marked {}, freed {} ({} chunks), promoted {}, released {} segments, old-to-new {}, {:?}",
            self.level,
            self.marked,
            self.freed,
            self.freed_chunks,
            self.promoted,
            self.segments_released,
            self.old_to_new,
            self.duration
        )
    }
}

/// Comprehensive collector metrics
#[derive(Debug, Clone)]
pub struct GcMetrics {
    pub collection_stats: CollectionStats,
    pub allocation_stats: AllocationStats,
    pub retry_stats: RetryStats,
    pub performance_counters: PerformanceCounters,
}

impl Default for GcMetrics {
    fn default() -> Self {
        GcMetrics {
            collection_stats: CollectionStats::default(),
            allocation_stats: AllocationStats::default(),
            retry_stats: RetryStats::default(),
            performance_counters: PerformanceCounters::new(),
        }
    }
}

/// Collection counts and timing
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Collections performed at each level
    pub collections: [u64; 3],
    pub total_gc_time: Duration,
    pub average_collection_time: Duration,
    pub last_collection_time: Option<Duration>,
    pub last_collection_at: Option<Instant>,
    /// Objects swept since the heap was created
    pub total_freed: u64,
    /// Promotions since the heap was created
    pub total_promoted: u64,
    /// Empty small segments released since the heap was created
    pub segments_released: u64,
}

impl CollectionStats {
    pub fn total_collections(&self) -> u64 {
        self.collections.iter().sum()
    }

    pub(crate) fn record(&mut self, report: &CollectionReport) {
        self.collections[report.level.index()] += 1;
        self.total_gc_time += report.duration;
        self.average_collection_time = self
            .total_gc_time
            .checked_div(self.total_collections() as u32)
            .unwrap_or_default();
        self.last_collection_time = Some(report.duration);
        self.last_collection_at = Some(Instant::now());
        self.total_freed += report.freed as u64;
        self.total_promoted += report.promoted as u64;
        self.segments_released += report.segments_released as u64;
    }
}

/// Allocation counts
#[derive(Debug, Clone, Default)]
pub struct AllocationStats {
    pub total_objects_allocated: u64,
    pub total_bytes_allocated: u64,
    /// Explicit frees through `Heap::free`
    pub explicit_frees: u64,
    /// Objects per second over the heap's lifetime
    pub allocation_rate_ops: f64,
    pub size_class_distribution: SizeClassStats,
}

/// Distribution of allocations by size
#[derive(Debug, Clone, Default)]
pub struct SizeClassStats {
    /// Single chunk objects (count, total bytes)
    pub single: (u64, u64),
    /// Multi chunk objects in shared segments (count, total bytes)
    pub small: (u64, u64),
    /// Objects with a segment to themselves (count, total bytes)
    pub big: (u64, u64),
}

/// Size class of an allocation, for telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Single,
    Small,
    Big,
}

impl SizeClass {
    pub fn classify(chunks: usize, big: bool) -> Self {
        if big {
            SizeClass::Big
        } else if chunks == 1 {
            SizeClass::Single
        } else {
            SizeClass::Small
        }
    }
}

/// Full collections forced by allocation failure
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
}

impl RetryStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_attempts as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceCounters {
    pub heap_created_at: Instant,
    pub heap_lifetime: Duration,
    /// GC time as a share of heap lifetime
    pub gc_overhead_percent: f64,
}

impl PerformanceCounters {
    fn new() -> Self {
        PerformanceCounters {
            heap_created_at: Instant::now(),
            heap_lifetime: Duration::ZERO,
            gc_overhead_percent: 0.0,
        }
    }
}

impl GcMetrics {
    /// Fast path allocation counter
    pub(crate) fn record_allocation(&mut self, bytes: usize, size_class: SizeClass) {
        self.allocation_stats.total_objects_allocated += 1;
        self.allocation_stats.total_bytes_allocated += bytes as u64;

        #[cfg(any(debug_assertions, feature = "gc-telemetry"))]
        {
            let distribution = &mut self.allocation_stats.size_class_distribution;
            let entry = match size_class {
                SizeClass::Single => &mut distribution.single,
                SizeClass::Small => &mut distribution.small,
                SizeClass::Big => &mut distribution.big,
            };
            entry.0 += 1;
            entry.1 += bytes as u64;
        }
        #[cfg(not(any(debug_assertions, feature = "gc-telemetry")))]
        let _ = size_class;
    }

    /// Fill in values derived from the counters
    pub(crate) fn snapshot(&self) -> GcMetrics {
        let mut metrics = self.clone();
        let counters = &mut metrics.performance_counters;
        counters.heap_lifetime = counters.heap_created_at.elapsed();

        let lifetime = counters.heap_lifetime.as_secs_f64();
        if lifetime > 0.0 {
            metrics.allocation_stats.allocation_rate_ops =
                metrics.allocation_stats.total_objects_allocated as f64 / lifetime;
            counters.gc_overhead_percent =
                metrics.collection_stats.total_gc_time.as_secs_f64() / lifetime * 100.0;
        }
        metrics
    }
}
