//! Command line argument handling with clap v4

use clap::Parser;

use crate::memory::{CollectionPolicy, HeapConfig};

use super::workload::WorkloadSettings;

/// Run a randomised allocation workload against the segmented heap
#[derive(Parser, Debug, Clone)]
#[command(name = "segheap")]
#[command(about = "Exercise a segmented generational heap")]
#[command(version)]
pub struct SegheapCli {
    /// Seed for the workload's random choices
    #[arg(long = "seed", default_value_t = 0)]
    pub seed: u64,

    /// Number of workload steps
    #[arg(short = 'n', long = "steps", default_value_t = 100_000)]
    pub steps: usize,

    /// Number of root slots the workload keeps live
    #[arg(short = 'l', long = "live", default_value_t = 256)]
    pub live: usize,

    /// Integer vector length that forces the big object path
    #[arg(long = "big-length", default_value_t = 512)]
    pub big_length: usize,

    /// Make one allocation in this many a big integer vector
    #[arg(long = "big-every", default_value_t = 500)]
    pub big_every: u32,

    /// Bytes per chunk (power of two, at least 8)
    #[arg(long = "chunk-bytes")]
    pub chunk_bytes: Option<usize>,

    /// Chunks per small segment (power of two, at most 64)
    #[arg(long = "segment-chunks")]
    pub segment_chunks: Option<usize>,

    /// Ceiling on reserved segments
    #[arg(long = "max-segments")]
    pub max_segments: Option<usize>,

    /// Small segments per pool block
    #[arg(long = "segments-per-block")]
    pub segments_per_block: Option<usize>,

    /// Allocations between policy collections
    #[arg(long = "young-threshold")]
    pub young_threshold: Option<usize>,

    /// Collect generation one every this many collections
    #[arg(long = "level1-every")]
    pub level1_every: Option<usize>,

    /// Collect everything every this many generation one collections
    #[arg(long = "level2-every")]
    pub level2_every: Option<usize>,

    /// Overwrite freed objects with a fill pattern
    #[arg(long = "debug-fill")]
    pub debug_fill: bool,

    /// Validate every reference the tracer yields
    #[arg(long = "check-refs")]
    pub check_refs: bool,

    /// Dump the heap to stderr after the run
    #[arg(long = "dump-heap")]
    pub dump_heap: bool,

    /// Print statistics to stderr before exiting
    #[arg(short = 'S', long = "statistics")]
    pub statistics: bool,
}

impl SegheapCli {
    /// Heap configuration from defaults overridden by the command line
    pub fn heap_config(&self) -> HeapConfig {
        let defaults = HeapConfig::default();
        let policy = CollectionPolicy {
            young_threshold: self
                .young_threshold
                .unwrap_or(defaults.policy.young_threshold),
            level1_every: self.level1_every.unwrap_or(defaults.policy.level1_every),
            level2_every: self.level2_every.unwrap_or(defaults.policy.level2_every),
        };
        let chunk_bytes = self.chunk_bytes.unwrap_or(defaults.chunk_bytes);
        HeapConfig {
            chunk_bytes,
            segment_chunks: self.segment_chunks.unwrap_or(defaults.segment_chunks),
            max_segments: self.max_segments.unwrap_or(defaults.max_segments),
            segments_per_block: self
                .segments_per_block
                .unwrap_or(defaults.segments_per_block),
            data_alignment: defaults.data_alignment.min(chunk_bytes),
            debug_fill: self.debug_fill || defaults.debug_fill,
            check_refs: self.check_refs,
            policy,
        }
    }

    pub fn workload(&self) -> WorkloadSettings {
        WorkloadSettings {
            seed: self.seed,
            steps: self.steps,
            live: self.live.max(1),
            big_length: self.big_length,
            big_every: self.big_every.max(1),
        }
    }
}
