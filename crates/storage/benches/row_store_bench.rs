//! Benchmarks for the mutation protocol.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::schema::{Table, TableBuilder};
use strata_core::{DataType, Row, Value};
use strata_storage::{IndexSelection, StorageConfig, TableId, TableRegistry};

fn create_test_schema_with_indices() -> Table {
    TableBuilder::new("test")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("price", DataType::Float64)
        .unwrap()
        .add_column("symbol", DataType::String)
        .unwrap()
        .add_column("sector", DataType::String)
        .unwrap()
        .add_index("idx_price", &["price"], false)
        .unwrap()
        .add_unique("idx_symbol", &["symbol"])
        .unwrap()
        .add_index("idx_sector", &["sector"], false)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap()
}

fn row(i: u64) -> Row {
    let sectors = ["Tech", "Finance", "Health", "Energy", "Consumer"];
    Row::new(vec![
        Value::Int64(i as i64),
        Value::Float64(100.0 + (i as f64) * 0.1),
        Value::from(format!("SYM{}", i)),
        Value::from(sectors[(i as usize) % sectors.len()]),
    ])
}

fn populated(count: u64) -> (TableRegistry, TableId) {
    let mut registry = TableRegistry::new(StorageConfig::default().with_change_logging(false));
    let table = registry.create_table(create_test_schema_with_indices()).unwrap();
    let token = registry.begin();
    for i in 1..=count {
        registry.insert(table, row(i)).unwrap();
    }
    registry.release(token).unwrap();
    (registry, table)
}

/// Insert then release, the common path.
fn insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_insert");

    for size in [1000u64, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(populated(size)));
        });
    }

    group.finish();
}

/// Update a non-key column; only idx_price moves.
fn update_benchmark(c: &mut Criterion) {
    c.bench_function("registry_update_price", |b| {
        b.iter_batched(
            || populated(10000),
            |(mut registry, table)| {
                let token = registry.begin();
                let tuples: Vec<_> = registry
                    .table(table)
                    .unwrap()
                    .iter()
                    .map(|(t, _)| t)
                    .take(1000)
                    .collect();
                for tuple in tuples {
                    let mut new = registry.get(table, tuple).unwrap().unwrap().clone();
                    new.set(1, Value::Float64(1.0));
                    registry.update(table, tuple, new, IndexSelection::All).unwrap();
                }
                registry.release(token).unwrap();
                black_box(registry)
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Delete everything, then either release or undo.
fn truncate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_truncate");

    for undo in [false, true] {
        let label = if undo { "undo" } else { "release" };
        group.bench_function(label, |b| {
            b.iter_batched(
                || populated(10000),
                |(mut registry, table)| {
                    let token = registry.begin();
                    registry.delete_all_tuples(table).unwrap();
                    if undo {
                        registry.undo(token).unwrap();
                    } else {
                        registry.release(token).unwrap();
                    }
                    black_box(registry)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, insert_benchmark, update_benchmark, truncate_benchmark);

criterion_main!(benches);
