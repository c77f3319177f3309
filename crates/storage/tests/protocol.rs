//! Integration tests for the mutation protocol.

use proptest::prelude::*;
use strata_core::schema::{IndexDef, Table, TableBuilder};
use strata_core::{ConstraintKind, DataType, Error, Expr, Row, TupleId, Value};
use strata_storage::{
    ChangeKind, ChangeLog, IndexSelection, MemoryChangeLog, StorageConfig, TableId, TableRegistry,
};

fn two_unique() -> Table {
    TableBuilder::new("pairs")
        .unwrap()
        .add_column("a", DataType::Int64)
        .unwrap()
        .add_column("b", DataType::Int64)
        .unwrap()
        .add_unique("idx1", &["a"])
        .unwrap()
        .add_unique("idx2", &["b"])
        .unwrap()
        .build()
        .unwrap()
}

fn pair(a: i64, b: i64) -> Row {
    Row::new(vec![Value::Int64(a), Value::Int64(b)])
}

fn registry_with(schema: Table) -> (TableRegistry, TableId) {
    let mut registry = TableRegistry::new(StorageConfig::default().with_tuples_per_block(8));
    let id = registry.create_table(schema).unwrap();
    (registry, id)
}

#[test]
fn failed_insert_leaves_no_partial_index_entry() {
    let (mut registry, id) = registry_with(two_unique());
    let token = registry.begin();
    registry.insert(id, pair(1, 1)).unwrap();
    let log_position = registry.change_log_position();

    let err = registry.insert(id, pair(2, 1)).unwrap_err();
    match &err {
        Error::ConstraintViolation {
            kind,
            constraint,
            conflicting,
            ..
        } => {
            assert_eq!(*kind, ConstraintKind::Unique);
            assert_eq!(constraint, "idx2");
            assert_eq!(conflicting.as_ref(), Some(&pair(1, 1)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.is_recoverable());

    let store = registry.table(id).unwrap();
    let idx1 = store.index("idx1").unwrap();
    assert!(!idx1.exists(&idx1.key_of(pair(2, 0).values()).unwrap()));
    assert_eq!(idx1.len(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(registry.change_log_position(), log_position);

    // The slot went back to the free list, so a valid insert reuses it.
    let t = registry.insert(id, pair(2, 2)).unwrap();
    assert_eq!(t, TupleId::new(0, 1));
    registry.release(token).unwrap();
}

#[test]
fn rollback_round_trip_restores_table() {
    let (mut registry, id) = registry_with(two_unique());
    let token = registry.begin();
    let tuples: Vec<TupleId> = (0..10)
        .map(|i| registry.insert(id, pair(i, i * 10)).unwrap())
        .collect();
    registry.release(token).unwrap();

    let hash = registry.content_hash(id).unwrap();
    let before = registry.stats(id).unwrap();
    let snapshots: Vec<_> = registry
        .table(id)
        .unwrap()
        .indexes()
        .iter()
        .map(|ix| ix.snapshot())
        .collect();

    let token = registry.begin();
    registry.delete(id, tuples[3]).unwrap();
    registry.update(id, tuples[4], pair(40, 41), IndexSelection::All).unwrap();
    registry.insert(id, pair(3, 30)).unwrap();
    registry.insert(id, pair(100, 1000)).unwrap();
    registry.update(id, tuples[4], pair(42, 43), IndexSelection::All).unwrap();
    registry.delete_all_tuples(id).unwrap();
    assert!(registry.table(id).unwrap().is_empty());
    registry.undo(token).unwrap();

    assert_eq!(registry.content_hash(id).unwrap(), hash);
    let after = registry.stats(id).unwrap();
    assert_eq!(after.live_tuples, before.live_tuples);
    assert_eq!(after.allocated_tuples, before.allocated_tuples);
    let restored: Vec<_> = registry
        .table(id)
        .unwrap()
        .indexes()
        .iter()
        .map(|ix| ix.snapshot())
        .collect();
    assert_eq!(restored, snapshots);
    assert_eq!(registry.pending_undo(), 0);
}

#[test]
fn nested_tokens_undo_only_the_inner_scope() {
    let (mut registry, id) = registry_with(two_unique());
    registry.begin();
    registry.insert(id, pair(1, 1)).unwrap();
    let inner = registry.begin();
    registry.insert(id, pair(2, 2)).unwrap();
    registry.undo(inner).unwrap();
    assert_eq!(registry.table(id).unwrap().len(), 1);
    assert!(registry.pending_undo() > 0);
}

#[test]
fn expression_index_conflict() {
    let schema = TableBuilder::new("sums")
        .unwrap()
        .add_column("a", DataType::Int64)
        .unwrap()
        .add_column("b", DataType::Int64)
        .unwrap()
        .add_index_def(
            IndexDef::new(
                "ix_sum",
                "sums",
                strata_core::schema::IndexKeyDef::Expressions(vec![Expr::add(
                    Expr::column(0),
                    Expr::column(1),
                )]),
            )
            .unique(true),
        )
        .unwrap()
        .build()
        .unwrap();
    let (mut registry, id) = registry_with(schema);
    registry.begin();
    registry.insert(id, pair(1, 2)).unwrap();
    let err = registry.insert(id, pair(2, 1)).unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
}

#[test]
fn partitioned_table_rejects_foreign_rows() {
    let schema = TableBuilder::new("orders")
        .unwrap()
        .add_column("customer", DataType::Int64)
        .unwrap()
        .partition_by("customer")
        .unwrap()
        .build()
        .unwrap();
    let mut registry = TableRegistry::new(StorageConfig::default().with_partition(0, 2));
    let id = registry.create_table(schema).unwrap();
    registry.begin();

    let (mut accepted, mut rejected) = (0, 0);
    for customer in 0..32i64 {
        match registry.insert(id, Row::new(vec![Value::Int64(customer)])) {
            Ok(_) => accepted += 1,
            Err(e) => {
                assert_eq!(e.constraint_kind(), Some(ConstraintKind::Partitioning));
                rejected += 1;
            }
        }
    }
    assert_eq!(accepted + rejected, 32);
    assert_eq!(registry.table(id).unwrap().len(), accepted);
    assert_eq!(registry.stats(id).unwrap().allocated_tuples, accepted);
}

#[test]
fn custom_change_log_receives_records() {
    let mut registry =
        TableRegistry::with_change_log(StorageConfig::default(), Box::new(MemoryChangeLog::new()));
    let id = registry.create_table(two_unique()).unwrap();
    registry.begin();
    let t = registry.insert(id, pair(1, 1)).unwrap();
    registry.update(id, t, pair(1, 2), IndexSelection::All).unwrap();
    registry.delete(id, t).unwrap();
    assert_eq!(registry.change_log().position(), 3);

    let mut log = MemoryChangeLog::new();
    log.append_insert(1, &Value::Null, &pair(0, 0)).unwrap();
    assert_eq!(log.records()[0].kind, ChangeKind::Insert);
}

#[derive(Clone, Debug)]
enum Op {
    Insert(i64, i64),
    Update(usize, i64, i64),
    Delete(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0i64..12, -6i64..6).prop_map(|(a, b)| Op::Insert(a, b)),
            2 => (0usize..32, 0i64..12, -6i64..6).prop_map(|(n, a, b)| Op::Update(n, a, b)),
            1 => (0usize..32).prop_map(Op::Delete),
        ],
        1..120,
    )
}

fn partial_schema() -> Table {
    TableBuilder::new("t")
        .unwrap()
        .add_column("a", DataType::Int64)
        .unwrap()
        .add_column("b", DataType::Int64)
        .unwrap()
        .add_index_def(
            IndexDef::on_columns("ix_pos", "t", vec![0])
                .unique(true)
                .predicate(Expr::ge(Expr::column(1), Expr::literal(0i64))),
        )
        .unwrap()
        .add_index("ix_b", &["b"], false)
        .unwrap()
        .build()
        .unwrap()
}

proptest! {
    /// Every live tuple is in every index whose predicate admits it, and
    /// every index entry points at a live tuple, whether or not the
    /// operations commit.
    #[test]
    fn index_coverage_through_protocol(ops in ops(), commit in any::<bool>()) {
        let (mut registry, id) = registry_with(partial_schema());
        let token = registry.begin();
        let hash = registry.content_hash(id).unwrap();

        for op in ops {
            let live: Vec<TupleId> = registry.table(id).unwrap().iter().map(|(t, _)| t).collect();
            let result = match op {
                Op::Insert(a, b) => registry.insert(id, pair(a, b)).map(|_| ()),
                Op::Update(n, a, b) if !live.is_empty() => {
                    registry.update(id, live[n % live.len()], pair(a, b), IndexSelection::All)
                }
                Op::Delete(n) if !live.is_empty() => registry.delete(id, live[n % live.len()]),
                _ => Ok(()),
            };
            if let Err(e) = result {
                prop_assert_eq!(e.constraint_kind(), Some(ConstraintKind::Unique));
            }
        }
        if commit {
            registry.release(token).unwrap();
        } else {
            registry.undo(token).unwrap();
            prop_assert_eq!(registry.content_hash(id).unwrap(), hash);
        }

        let store = registry.table(id).unwrap();
        let mut covered = 0usize;
        for (tuple, row) in store.iter() {
            for ix in store.indexes() {
                if ix.covers(row.values()).unwrap() {
                    let key = ix.key_of(row.values()).unwrap();
                    prop_assert!(ix.lookup(&key).contains(&tuple));
                    covered += 1;
                }
            }
        }
        let entries: usize = store.indexes().iter().map(|ix| ix.len()).sum();
        prop_assert_eq!(entries, covered);
        prop_assert_eq!(store.stats().allocated_tuples, store.len());
    }
}
