//! A randomised mutator
//!
//! Keeps a fixed number of root slots and, at each step, either
//! allocates an object into a random slot, links two rooted objects
//! (exercising the old-to-new barrier), or clears a slot. The
//! runtime's collection policy decides when to collect.

use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::memory::{Generation, ObjRef};
use crate::model::types::{type_name, CELL, PAIR, SYMBOL, VECTOR};
use crate::model::{ModelError, Runtime};

use super::statistics::Statistics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSettings {
    pub seed: u64,
    pub steps: usize,
    /// Root slots kept by the workload
    pub live: usize,
    /// Length of the integer vectors that take the big object path
    pub big_length: usize,
    /// One allocation in this many is big
    pub big_every: u32,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        WorkloadSettings {
            seed: 0,
            steps: 10_000,
            live: 64,
            big_length: 512,
            big_every: 500,
        }
    }
}

pub struct Workload {
    settings: WorkloadSettings,
    rng: StdRng,
}

impl Workload {
    pub fn new(settings: WorkloadSettings) -> Self {
        let rng = StdRng::seed_from_u64(settings.seed);
        Workload { settings, rng }
    }

    /// Run the workload, finishing with a full collection
    pub fn run(&mut self, runtime: &mut Runtime) -> Result<Statistics, ModelError> {
        let mut stats = Statistics::default();
        let start = Instant::now();

        let base = runtime.roots().len();
        for _ in 0..self.settings.live {
            runtime.push_root(runtime.nil());
        }

        for step in 0..self.settings.steps {
            stats.record_step();
            if step % 1024 == 0 {
                stats.observe_live(runtime.heap().stats().total_objects());
            }
            match self.rng.gen_range(0..10) {
                0..=5 => {
                    self.allocate(runtime, base)?;
                    stats.record_allocation();
                }
                6..=8 => {
                    self.link(runtime, base)?;
                    stats.record_mutation();
                }
                _ => {
                    let slot = self.slot(base);
                    runtime.set_root(slot, runtime.nil());
                }
            }
        }
        stats
            .timings_mut()
            .record("workload", start.elapsed());

        let start = Instant::now();
        let report = runtime.collect(Generation::Two);
        stats.timings_mut().record("final collection", start.elapsed());
        info!("final collection: {}", report);

        stats.observe_live(runtime.heap().stats().total_objects());
        stats.absorb(&runtime.heap().metrics(), runtime.heap().stats());
        runtime.truncate_roots(base);
        Ok(stats)
    }

    fn slot(&mut self, base: usize) -> usize {
        base + self.rng.gen_range(0..self.settings.live)
    }

    fn pick(&mut self, runtime: &Runtime, base: usize) -> ObjRef {
        let slot = self.slot(base);
        runtime.root(slot)
    }

    fn allocate(&mut self, runtime: &mut Runtime, base: usize) -> Result<(), ModelError> {
        let slot = self.slot(base);
        let obj = match self.rng.gen_range(0..6) {
            0 => {
                let length = if self.rng.gen_ratio(1, self.settings.big_every) {
                    self.settings.big_length
                } else {
                    self.rng.gen_range(0..20)
                };
                let values: Vec<i64> = (0..length).map(|i| i as i64).collect();
                runtime.int_vec(&values)?
            }
            1 | 2 => {
                let car = self.pick(runtime, base);
                let cdr = self.pick(runtime, base);
                runtime.pair(car, cdr)?
            }
            3 => {
                let value = self.pick(runtime, base);
                let n = self.rng.gen();
                runtime.cell(value, n)?
            }
            4 => {
                let length = self.rng.gen_range(0..12);
                runtime.vector(length)?
            }
            _ => {
                let id = self.rng.gen_range(0..64);
                runtime.symbol(id)?
            }
        };
        runtime.set_root(slot, obj);
        Ok(())
    }

    /// Store one rooted object into another
    fn link(&mut self, runtime: &mut Runtime, base: usize) -> Result<(), ModelError> {
        let target = self.pick(runtime, base);
        let value = self.pick(runtime, base);
        let tag = runtime.heap().type_of(target);
        match tag {
            PAIR if self.rng.gen_bool(0.5) => runtime.set_car(target, value)?,
            PAIR => runtime.set_cdr(target, value)?,
            CELL => runtime.set_cell_value(target, value)?,
            SYMBOL => runtime.set_symbol_value(target, value)?,
            VECTOR => {
                let length = runtime.vector_len(target);
                if length > 0 {
                    let index = self.rng.gen_range(0..length);
                    runtime.vector_set(target, index, value)?;
                }
            }
            _ => debug!("no reference fields in {}", type_name(tag)),
        }
        Ok(())
    }
}
