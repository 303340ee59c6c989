//! Observable Array Benchmarks
//!
//! Measures the cost of one mutation of a patched array, including the diff
//! that produces its change records, against the same mutation on a plain
//! array.
//!
//! Run with: cargo bench -p lattice-props --bench array_ops

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_props::diff::compare;
use lattice_props::{ArrayRef, ArraySignal, Event, Payload, ReactiveCell, Value};

fn values(len: usize) -> Vec<Value> {
    (0..len).map(|n| Value::from(n as i64)).collect()
}

fn observed(len: usize) -> ArraySignal {
    let signal = ArraySignal::with_array("bench", ArrayRef::from_vec(values(len)), false)
        .expect("plain array attaches");
    signal
        .subscribe(
            Event::ArrayChange,
            Arc::new(|p: &Payload<'_>| {
                black_box(p.changes().map(|changes| changes.len()));
            }),
        )
        .expect("array cells accept arrayChange");
    signal
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop");
    for len in [10usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("plain", len), &len, |b, &len| {
            let array = ArrayRef::from_vec(values(len));
            b.iter(|| {
                array.push(Value::from(1)).ok();
                black_box(array.pop());
            });
        });
        group.bench_with_input(BenchmarkId::new("observed", len), &len, |b, &len| {
            let signal = observed(len);
            let raw = signal.array();
            b.iter(|| {
                raw.push(Value::from(1)).ok();
                black_box(raw.pop());
            });
        });
    }
    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse");
    for len in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("observed", len), &len, |b, &len| {
            let signal = observed(len);
            b.iter(|| signal.reverse());
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for len in [100usize, 1_000] {
        let old = values(len);
        let mut new = old.clone();
        new.rotate_left(len / 3);
        group.bench_with_input(BenchmarkId::new("rotate", len), &len, |b, _| {
            b.iter(|| black_box(compare(&old, &new)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_reverse, bench_diff);
criterion_main!(benches);
