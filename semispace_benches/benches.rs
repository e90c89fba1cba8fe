//! Allocation and collection benchmarks
//!
//! Run with: `cargo bench -p semispace_benches`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use semispace_example::Machine;
use semispace_gc::{HandleScope, HeapOptions, HeapOptionsBuilder};

fn options(heap_size: usize) -> HeapOptions {
    HeapOptionsBuilder::new()
        .heap_size(heap_size)
        .gc_stress_test(false)
        .poison_from_space(false)
        .build()
}

/// Bump allocation of short-lived numbers, including the collections they trigger
fn allocation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");

    group.bench_function("numbers_10000", |b| {
        let mut machine = Machine::new(options(1024 * 1024)).unwrap();
        b.iter(|| {
            for i in 0..10_000 {
                black_box(machine.num(i).unwrap());
            }
        });
    });

    group.bench_function("vectors_1000", |b| {
        let mut machine = Machine::new(options(1024 * 1024)).unwrap();
        b.iter(|| {
            for len in 0..1000 {
                black_box(machine.vector(len % 32).unwrap());
            }
        });
    });

    group.finish();
}

/// Pause time of a single collection for a live list of each length
fn collection_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection");

    for length in [100usize, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("live_list", length), &length, |b, &n| {
            let mut machine = Machine::new(options(4 * 1024 * 1024)).unwrap();
            let values: Vec<i64> = (0..n as i64).collect();

            let scope = HandleScope::new();
            let list = machine.list(&values).unwrap().map(|list| scope.handle(list));

            b.iter(|| machine.collect());

            black_box(list.map(|list| list.get()));
        });
    }

    group.bench_function("all_garbage", |b| {
        let mut machine = Machine::new(options(1024 * 1024)).unwrap();
        b.iter(|| {
            for i in 0..1000 {
                machine.num(i).unwrap();
            }
            machine.collect();
        });
    });

    group.finish();
}

criterion_group!(benches, allocation_benchmark, collection_benchmark);
criterion_main!(benches);
