//! Benchmark: attach/detach cost on wide and deep trees.
//!
//! Attach and detach touch |ancestors of the parent| x |subtree| rows, so a
//! deep chain stresses the ancestor side and a wide fan stresses the
//! subtree side.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use treeclosure::db::schema::initialize_database;
use treeclosure::{ClosureIndex, MemoryClosure, NodeId, SqliteClosure, TestCaseForest};

/// A chain `1 -> 2 -> ... -> depth` plus a detached root `depth + 1` with
/// `width` children.
fn build<I: ClosureIndex>(index: &mut I, depth: i64, width: i64) -> (NodeId, NodeId) {
    for id in 1..=depth {
        index.insert(NodeId(id)).unwrap();
        if id > 1 {
            index.attach(NodeId(id), NodeId(id - 1)).unwrap();
        }
    }
    let subtree = NodeId(depth + 1);
    index.insert(subtree).unwrap();
    for child in 0..width {
        let child = NodeId(depth + 2 + child);
        index.insert(child).unwrap();
        index.attach(child, subtree).unwrap();
    }
    (subtree, NodeId(depth))
}

const SHAPES: [(i64, i64); 3] = [(8, 8), (64, 8), (8, 256)];

fn bench_memory_attach_detach(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_attach_detach");
    for (depth, width) in SHAPES {
        let rows = (depth as u64) * (width as u64 + 1);
        group.throughput(Throughput::Elements(rows));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{depth}x{width}")),
            &(depth, width),
            |b, &(depth, width)| {
                b.iter_batched(
                    || {
                        let mut index = MemoryClosure::<TestCaseForest>::new();
                        let ends = build(&mut index, depth, width);
                        (index, ends)
                    },
                    |(mut index, (subtree, parent))| {
                        index.attach(subtree, parent).unwrap();
                        index.detach(subtree).unwrap();
                        index
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_sqlite_attach_detach(c: &mut Criterion) {
    let mut group = c.benchmark_group("sqlite_attach_detach");
    for (depth, width) in SHAPES {
        let conn = initialize_database(":memory:").unwrap();
        let mut index = SqliteClosure::<TestCaseForest>::new(&conn);
        let (subtree, parent) = build(&mut index, depth, width);
        group.bench_function(BenchmarkId::from_parameter(format!("{depth}x{width}")), |b| {
            b.iter(|| {
                index.attach(subtree, parent).unwrap();
                index.detach(subtree).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let conn = initialize_database(":memory:").unwrap();
    let mut sql = SqliteClosure::<TestCaseForest>::new(&conn);
    let mut mem = MemoryClosure::<TestCaseForest>::new();
    let (subtree, parent) = build(&mut sql, 64, 256);
    build(&mut mem, 64, 256);
    sql.attach(subtree, parent).unwrap();
    mem.attach(subtree, parent).unwrap();

    let leaf = NodeId(64 + 2 + 255);
    c.bench_function("memory_ancestors_of", |b| b.iter(|| mem.ancestors_of(leaf).unwrap()));
    c.bench_function("sqlite_ancestors_of", |b| b.iter(|| sql.ancestors_of(leaf).unwrap()));
    c.bench_function("sqlite_descendants_of_root", |b| {
        b.iter(|| sql.descendants_of(NodeId(1)).unwrap())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3))
        .sample_size(30);
    targets = bench_memory_attach_detach, bench_sqlite_attach_detach, bench_queries
}
criterion_main!(benches);
