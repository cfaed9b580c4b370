//! Allocation benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use segheap::memory::HeapConfig;
use segheap::model::Runtime;

/// Collections run on the default policy, so costs include them
fn runtime() -> Runtime {
    Runtime::new(HeapConfig::default().with_debug_fill(false)).unwrap()
}

/// Allocate a single pair of nils
fn alloc_pair(rt: &mut Runtime) {
    let nil = rt.nil();
    black_box(rt.pair(nil, nil).unwrap());
}

/// Allocate an integer vector holding `values`
fn alloc_int_vec(rt: &mut Runtime, values: &[i64]) {
    black_box(rt.int_vec(values).unwrap());
}

/// Allocate, link and read back a vector
fn vector_round_trip(rt: &mut Runtime) {
    let v = rt.vector(8).unwrap();
    rt.push_root(v);
    let nil = rt.nil();
    let cell = rt.cell(nil, 1).unwrap();
    rt.vector_set(v, 3, cell).unwrap();
    black_box(rt.vector_get(v, 3).unwrap());
    rt.pop_root();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut rt = runtime();
    c.bench_function("alloc_pair", |b| {
        b.iter(|| alloc_pair(&mut rt));
    });
    c.bench_function("vector_round_trip", |b| {
        b.iter(|| vector_round_trip(&mut rt));
    });

    let mut group = c.benchmark_group("alloc_int_vec");
    for len in [1, 16, 64, 4096] {
        let values = vec![7i64; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, values| {
            b.iter(|| alloc_int_vec(&mut rt, values));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
