//! Collector benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use segheap::memory::{Generation, HeapConfig, ObjRef};
use segheap::model::Runtime;

fn runtime() -> Runtime {
    Runtime::new(HeapConfig::default().with_debug_fill(false))
        .unwrap()
        .with_auto_collect(false)
}

/// Allocate `n` pairs chained into a list, returning them all
fn allocate_pairs(rt: &mut Runtime, n: usize) -> Vec<ObjRef> {
    let mut tail = rt.nil();
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let car = rt.nil();
        tail = rt.pair(car, tail).unwrap();
        pairs.push(tail);
    }
    pairs
}

/// Benchmark: allocate objects then collect with no survivors
fn bench_alloc_then_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_alloc_then_collect");

    for count in [256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut rt = runtime();
                // Allocate unrooted garbage
                let _pairs = allocate_pairs(&mut rt, count);
                black_box(rt.collect(Generation::Two));
            });
        });
    }
    group.finish();
}

/// Benchmark: collect with varying percentage of survivors
fn bench_collect_with_survivors(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_collect_with_survivors");

    let total = 1024;
    for survivor_pct in [0, 25, 50, 75, 100] {
        group.bench_with_input(
            BenchmarkId::new("pct", survivor_pct),
            &survivor_pct,
            |b, &pct| {
                b.iter(|| {
                    let mut rt = runtime();
                    let mut ints = Vec::with_capacity(total);
                    for i in 0..total {
                        ints.push(rt.int_vec(&[i as i64; 3]).unwrap());
                    }
                    // Retain a fraction as roots
                    for obj in ints.into_iter().take(total * pct / 100) {
                        rt.push_root(obj);
                    }
                    black_box(rt.collect(Generation::Zero));
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: young collections over a rooted old list
fn bench_young_collection_with_old_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_young_over_old");

    for count in [1024, 8192] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut rt = runtime();
            let pairs = allocate_pairs(&mut rt, count);
            if let Some(head) = pairs.last() {
                rt.push_root(*head);
            }
            rt.collect(Generation::Two);
            b.iter(|| {
                allocate_pairs(&mut rt, 256);
                black_box(rt.collect(Generation::Zero));
            });
        });
    }
    group.finish();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    bench_alloc_then_collect(c);
    bench_collect_with_survivors(c);
    bench_young_collection_with_old_data(c);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
