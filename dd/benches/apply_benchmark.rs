// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Benchmarks of the apply kernels on transition-system shaped workloads.
//!
//! Run with:
//! ```bash
//! cargo bench --bench apply_benchmark
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dd::manager::PairSide;
use dd::mtbdd::ValueOp;
use dd::odd::Odd;
use dd::{DdManager, Ref, ValueKind};

/// A ring of 2^bits states: the transition relation increments the counter
/// modulo the ring size.
fn ring_transitions(manager: &DdManager, bits: usize) -> (dd::Metavariable, Ref) {
    let counter = manager.new_metavariable("counter", bits);
    let size = 1u64 << bits;
    let mut transitions = manager.zero;
    for state in 0..size {
        let source = manager.encode(&counter, PairSide::Rows, state);
        let target = manager.encode(&counter, PairSide::Columns, (state + 1) % size);
        let edge = manager.apply_and(source, target);
        transitions = manager.apply_or(transitions, edge);
    }
    (counter, transitions)
}

fn bench_conjunction_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/and_chain");
    for num_vars in [50usize, 100, 200] {
        group.bench_with_input(BenchmarkId::new("and", num_vars), &num_vars, |b, &n| {
            b.iter(|| {
                let manager = DdManager::new();
                let literals: Vec<Ref> =
                    (0..n).map(|_| manager.literal(manager.new_variable())).collect();
                literals
                    .into_iter()
                    .fold(manager.one, |acc, lit| manager.apply_and(acc, lit))
            });
        });
    }
    group.finish();
}

fn bench_reachability(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/reachability");
    group.sample_size(20);
    for bits in [6usize, 8, 10] {
        group.bench_with_input(BenchmarkId::new("ring", bits), &bits, |b, &bits| {
            b.iter(|| {
                let manager = DdManager::new();
                let (counter, transitions) = ring_transitions(&manager, bits);
                let pairs = counter.pairs().to_vec();
                let mut reached = manager.encode(&counter, PairSide::Rows, 0);
                loop {
                    let image = manager.relational_image(reached, transitions, &pairs);
                    let next = manager.apply_or(reached, image);
                    if next == reached {
                        break;
                    }
                    reached = next;
                }
                reached
            });
        });
    }
    group.finish();
}

fn bench_value_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/value_apply");
    for bits in [8usize, 10, 12] {
        group.bench_with_input(BenchmarkId::new("plus_times", bits), &bits, |b, &bits| {
            let manager = DdManager::new();
            let counter = manager.new_metavariable("counter", bits);
            let rows = counter.row_variables();
            let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
            let size = 1usize << bits;
            let values: Vec<f64> = (0..size).map(|i| i as f64 / size as f64).collect();
            let f = odd.from_vector(&manager, &values).unwrap();
            b.iter(|| {
                let doubled = manager.apply(ValueOp::Plus, f, f).unwrap();
                manager.apply(ValueOp::Times, doubled, f).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_matrix_vector_abstraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/abstract_sum");
    group.sample_size(20);
    for bits in [6usize, 8] {
        group.bench_with_input(BenchmarkId::new("ring_step", bits), &bits, |b, &bits| {
            let manager = DdManager::new();
            let (counter, transitions) = ring_transitions(&manager, bits);
            let matrix = manager.from_bdd(transitions, ValueKind::Double);
            let rows = counter.row_variables();
            let odd = Odd::from_bdd(&manager, manager.one, &rows).unwrap();
            let size = 1usize << bits;
            let values: Vec<f64> = (0..size).map(|i| i as f64).collect();
            let vector = odd.from_vector(&manager, &values).unwrap();
            let column_cube = manager.metavariable_cube(&counter, PairSide::Columns);
            let pairs = counter.pairs().to_vec();
            b.iter(|| {
                // one symbolic matrix-vector product: v'(s) = sum_t M(s, t) v(t)
                let over_columns = manager.swap_variables(vector, &pairs);
                let product = manager.apply(ValueOp::Times, matrix, over_columns).unwrap();
                manager.abstract_sum(product, column_cube).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_conjunction_chain,
    bench_reachability,
    bench_value_apply,
    bench_matrix_vector_abstraction,
);

criterion_main!(benches);
