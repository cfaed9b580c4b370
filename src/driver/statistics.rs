//! Capture and report statistics for a workload run

use std::{fmt::Display, time::Duration};

use indexmap::IndexMap;

use crate::memory::{GcMetrics, HeapStats};

#[derive(Default, Debug)]
pub struct Timings {
    timings: IndexMap<String, Duration>,
}

impl Timings {
    pub fn record<T: AsRef<str>>(&mut self, name: T, elapsed: Duration) {
        self.timings.insert(name.as_ref().to_string(), elapsed);
    }

    pub fn get<T: AsRef<str>>(&self, name: T) -> Option<Duration> {
        self.timings.get(name.as_ref()).copied()
    }

    pub fn merge(&mut self, other: Timings) {
        self.timings.extend(other.timings);
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.timings.keys().map(|k| k.len()).max().unwrap_or(0) + 1;

        for (k, v) in &self.timings {
            writeln!(f, "{:width$}: {:14.9}s", k, v.as_secs_f64(), width = width)?;
        }
        Ok(())
    }
}

/// The statistics captured during a run
#[derive(Default, Debug)]
pub struct Statistics {
    steps: u64,
    allocations: u64,
    mutations: u64,
    /// Most live objects seen after any collection
    peak_objects: usize,
    collections: [u64; 3],
    freed: u64,
    promoted: u64,
    retries: u64,
    heap: Option<HeapStats>,
    timings: Timings,
}

impl Statistics {
    pub fn record_step(&mut self) {
        self.steps += 1;
    }

    pub fn record_allocation(&mut self) {
        self.allocations += 1;
    }

    pub fn record_mutation(&mut self) {
        self.mutations += 1;
    }

    pub fn observe_live(&mut self, objects: usize) {
        self.peak_objects = self.peak_objects.max(objects);
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn peak_objects(&self) -> usize {
        self.peak_objects
    }

    /// Take collector totals and the final occupancy from the heap
    pub fn absorb(&mut self, metrics: &GcMetrics, heap: HeapStats) {
        self.collections = metrics.collection_stats.collections;
        self.freed = metrics.collection_stats.total_freed;
        self.promoted = metrics.collection_stats.total_promoted;
        self.retries = metrics.retry_stats.total_attempts;
        self.timings
            .record("collector", metrics.collection_stats.total_gc_time);
        self.heap = Some(heap);
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn timings_mut(&mut self) -> &mut Timings {
        &mut self.timings
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Steps          : {:10}", self.steps)?;
        writeln!(f, "Allocations    : {:10}", self.allocations)?;
        writeln!(f, "Mutations      : {:10}", self.mutations)?;
        writeln!(f, "Peak objects   : {:10}", self.peak_objects)?;
        writeln!(
            f,
            "Collections    : {:10} (gen0 {}, gen1 {}, gen2 {})",
            self.collections.iter().sum::<u64>(),
            self.collections[0],
            self.collections[1],
            self.collections[2]
        )?;
        writeln!(f, "Freed          : {:10}", self.freed)?;
        writeln!(f, "Promoted       : {:10}", self.promoted)?;
        writeln!(f, "Retries        : {:10}", self.retries)?;
        if let Some(heap) = &self.heap {
            writeln!(f)?;
            writeln!(f, "{}", heap)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.timings)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_timings_keep_insertion_order() {
        let mut timings = Timings::default();
        timings.record("workload", Duration::from_millis(20));
        timings.record("collector", Duration::from_millis(5));
        let text = timings.to_string();
        let workload = text.find("workload").unwrap();
        let collector = text.find("collector").unwrap();
        assert!(workload < collector);
        assert_eq!(timings.get("collector"), Some(Duration::from_millis(5)));
    }

    #[test]
    pub fn test_empty_timings_display() {
        assert_eq!(Timings::default().to_string(), "");
    }
}
