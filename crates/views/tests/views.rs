//! End-to-end view maintenance through the table registry.

use proptest::prelude::*;
use std::sync::Arc;
use strata_core::schema::{Table, TableBuilder};
use strata_core::{DataType, Error, Expr, Row, TupleId, Value};
use strata_storage::{IndexSelection, StorageConfig, TableId, TableRegistry, ViewMaintainer};
use strata_views::{
    AggregateColumn, JoinAggregatePlan, MinMaxFallback, MinMaxFallbackPlan, MultiTableView,
    QueryPlan, SingleTableView, ViewDefinition,
};

fn int(v: i64) -> Value {
    Value::Int64(v)
}

fn row(values: &[i64]) -> Row {
    Row::new(values.iter().copied().map(Value::Int64).collect())
}

fn source_table() -> Table {
    TableBuilder::new("t")
        .unwrap()
        .add_column("a", DataType::Int64)
        .unwrap()
        .add_column("b", DataType::Int64)
        .unwrap()
        .add_column("c", DataType::Int64)
        .unwrap()
        .add_nullable(&["c"])
        .add_index("ix_b", &["b"], false)
        .unwrap()
        .add_index("ix_ab", &["a", "b"], false)
        .unwrap()
        .build()
        .unwrap()
}

fn contents(registry: &TableRegistry, table: TableId) -> Vec<Row> {
    let mut rows: Vec<Row> = registry.scan(table).unwrap().map(|(_, r)| r.clone()).collect();
    rows.sort_by(|x, y| x.values().cmp(y.values()));
    rows
}

fn find(registry: &TableRegistry, table: TableId, values: &[i64]) -> TupleId {
    let pattern = Row::new(values.iter().copied().map(Value::Int64).collect());
    registry
        .scan(table)
        .unwrap()
        .find(|(_, r)| r.values()[..values.len()] == pattern.values()[..])
        .map(|(t, _)| t)
        .unwrap()
}

/// V = SELECT a, COUNT(*), SUM(b) FROM t GROUP BY a
fn count_sum_view(registry: &mut TableRegistry, t: TableId) -> TableId {
    let definition = ViewDefinition::builder("v")
        .group_by_column(0)
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema(
            "v",
            &[("a", DataType::Int64)],
            &[("c", DataType::Int64), ("s", DataType::Int64)],
        )
        .unwrap();
    let v = registry.create_table(schema).unwrap();
    SingleTableView::new(registry, definition, t, v)
        .unwrap()
        .install(registry)
        .unwrap();
    v
}

/// V2 = SELECT MIN(b) FROM t
fn min_view(
    registry: &mut TableRegistry,
    t: TableId,
    fallback: impl FnOnce(&ViewDefinition, TableId) -> MinMaxFallback,
) -> TableId {
    let definition = ViewDefinition::builder("v2")
        .aggregate(AggregateColumn::min(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema("v2", &[], &[("m", DataType::Int64)])
        .unwrap();
    let v2 = registry.create_table(schema).unwrap();
    let fallback = fallback(&definition, t);
    SingleTableView::new(registry, definition, t, v2)
        .unwrap()
        .with_fallback(registry, 0, fallback)
        .unwrap()
        .install(registry)
        .unwrap();
    v2
}

fn plan_fallback(definition: &ViewDefinition, t: TableId) -> MinMaxFallback {
    MinMaxFallback::Plan(Arc::new(MinMaxFallbackPlan::new(vec![t], None, definition, 0).unwrap()))
}

fn indexed_fallback(_: &ViewDefinition, _: TableId) -> MinMaxFallback {
    MinMaxFallback::Indexed("ix_b".into())
}

fn setup() -> (TableRegistry, TableId) {
    let mut registry = TableRegistry::new(StorageConfig::default().with_tuples_per_block(16));
    let t = registry.create_table(source_table()).unwrap();
    (registry, t)
}

#[test]
fn group_by_count_and_sum() {
    let (mut registry, t) = setup();
    let v = count_sum_view(&mut registry, t);
    registry.begin();

    let first = registry.insert(t, row(&[1, 10, 0])).unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[1, 1, 10])]);

    let second = registry.insert(t, row(&[1, 20, 0])).unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[1, 2, 30])]);

    registry.delete(t, first).unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[1, 1, 20])]);

    registry.delete(t, second).unwrap();
    assert!(contents(&registry, v).is_empty());
}

#[test]
fn update_moves_row_between_groups() {
    let (mut registry, t) = setup();
    let v = count_sum_view(&mut registry, t);
    registry.begin();

    let moving = registry.insert(t, row(&[1, 10, 0])).unwrap();
    registry.insert(t, row(&[1, 5, 0])).unwrap();
    registry.update(t, moving, row(&[2, 10, 0]), IndexSelection::All).unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[1, 1, 5]), row(&[2, 1, 10])]);
}

fn min_scenario(fallback: impl FnOnce(&ViewDefinition, TableId) -> MinMaxFallback) {
    let (mut registry, t) = setup();
    let v2 = min_view(&mut registry, t, fallback);
    assert_eq!(contents(&registry, v2), vec![Row::new(vec![Value::Null, int(0)])]);
    registry.begin();

    let five = registry.insert(t, row(&[0, 5, 0])).unwrap();
    let three = registry.insert(t, row(&[0, 3, 0])).unwrap();
    let eight = registry.insert(t, row(&[0, 8, 0])).unwrap();
    assert_eq!(contents(&registry, v2), vec![row(&[3, 3])]);

    registry.delete(t, three).unwrap();
    assert_eq!(contents(&registry, v2), vec![row(&[5, 2])]);

    registry.delete(t, five).unwrap();
    registry.delete(t, eight).unwrap();
    assert_eq!(contents(&registry, v2), vec![Row::new(vec![Value::Null, int(0)])]);
}

#[test]
fn min_without_group_by_sequential_fallback() {
    min_scenario(|_, _| MinMaxFallback::Sequential);
}

#[test]
fn min_without_group_by_indexed_fallback() {
    min_scenario(indexed_fallback);
}

#[test]
fn min_without_group_by_plan_fallback() {
    min_scenario(plan_fallback);
}

#[test]
fn fallback_plan_restores_params() {
    let (mut registry, t) = setup();
    let v2 = min_view(&mut registry, t, plan_fallback);
    registry.set_params(vec![Value::from("caller")]);
    registry.begin();
    let low = registry.insert(t, row(&[0, 1, 0])).unwrap();
    registry.insert(t, row(&[0, 2, 0])).unwrap();
    registry.delete(t, low).unwrap();
    assert_eq!(contents(&registry, v2), vec![row(&[2, 1])]);
    assert_eq!(registry.params(), &[Value::from("caller")]);
}

#[test]
fn indexed_fallback_rejects_unusable_index() {
    let (mut registry, t) = setup();
    let definition = ViewDefinition::builder("v3")
        .group_by_column(0)
        .aggregate(AggregateColumn::max(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema("v3", &[("a", DataType::Int64)], &[("mx", DataType::Int64)])
        .unwrap();
    let v3 = registry.create_table(schema).unwrap();
    let view = SingleTableView::new(&registry, definition, t, v3).unwrap();

    // ix_b is not keyed on the group column first.
    let rejected = SingleTableView::new(&registry, view.definition().clone(), t, v3)
        .unwrap()
        .with_fallback(&registry, 1, MinMaxFallback::Indexed("ix_b".into()));
    assert!(rejected.is_err());
    // Column 0 is the group key, not a MIN/MAX.
    let rejected = SingleTableView::new(&registry, view.definition().clone(), t, v3)
        .unwrap()
        .with_fallback(&registry, 0, MinMaxFallback::Sequential);
    assert!(rejected.is_err());

    let view = view
        .with_fallback(&registry, 1, MinMaxFallback::Indexed("ix_ab".into()))
        .unwrap()
        .install(&mut registry)
        .unwrap();
    assert!(matches!(view.fallback(1), MinMaxFallback::Indexed(_)));

    registry.begin();
    let top = registry.insert(t, row(&[1, 9, 0])).unwrap();
    registry.insert(t, row(&[1, 4, 0])).unwrap();
    registry.insert(t, row(&[2, 7, 0])).unwrap();
    registry.delete(t, top).unwrap();
    assert_eq!(contents(&registry, v3), vec![row(&[1, 4, 1]), row(&[2, 7, 1])]);
}

#[test]
fn filter_excludes_rows() {
    let (mut registry, t) = setup();
    let definition = ViewDefinition::builder("pos")
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .filter(Expr::gt(Expr::column(1), Expr::literal(0i64)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema("pos", &[], &[("s", DataType::Int64)])
        .unwrap();
    let v = registry.create_table(schema).unwrap();
    SingleTableView::new(&registry, definition, t, v)
        .unwrap()
        .install(&mut registry)
        .unwrap();

    registry.begin();
    registry.insert(t, row(&[0, 4, 0])).unwrap();
    let negative = registry.insert(t, row(&[0, -3, 0])).unwrap();
    registry.delete(t, negative).unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[4, 1])]);
}

#[test]
fn undo_restores_views() {
    let (mut registry, t) = setup();
    let v = count_sum_view(&mut registry, t);
    let v2 = min_view(&mut registry, t, indexed_fallback);

    let outer = registry.begin();
    let mut tuples = Vec::new();
    for i in 0..12 {
        tuples.push(registry.insert(t, row(&[i % 3, i, 0])).unwrap());
    }
    registry.release(outer).unwrap();
    let before = (
        registry.content_hash(t).unwrap(),
        registry.content_hash(v).unwrap(),
        registry.content_hash(v2).unwrap(),
    );

    let token = registry.begin();
    registry.delete(t, tuples[0]).unwrap();
    registry.update(t, tuples[4], row(&[7, -1, 0]), IndexSelection::All).unwrap();
    registry.insert(t, row(&[9, 100, 0])).unwrap();
    registry.delete_all_tuples(t).unwrap();
    assert!(contents(&registry, v).is_empty());
    registry.undo(token).unwrap();

    let after = (
        registry.content_hash(t).unwrap(),
        registry.content_hash(v).unwrap(),
        registry.content_hash(v2).unwrap(),
    );
    assert_eq!(after, before);
    assert_eq!(contents(&registry, v2), vec![row(&[0, 12])]);
}

#[test]
fn catch_up_folds_existing_rows() {
    let (mut registry, t) = setup();
    registry.begin();
    for i in 0..6 {
        registry.insert(t, row(&[i % 2, i, 0])).unwrap();
    }
    let v = count_sum_view(&mut registry, t);
    assert!(contents(&registry, v).is_empty());

    registry.catch_up_with_existing_data("v").unwrap();
    assert_eq!(contents(&registry, v), vec![row(&[0, 3, 6]), row(&[1, 3, 9])]);
    assert!(registry.catch_up_with_existing_data("v").is_err());
}

#[test]
fn destination_cannot_feed_or_share() {
    let (mut registry, t) = setup();
    let v = count_sum_view(&mut registry, t);

    // A view over the destination of another view.
    let definition = ViewDefinition::builder("chained")
        .aggregate(AggregateColumn::count_star())
        .build()
        .unwrap();
    let schema = definition.destination_schema("chained", &[], &[("n", DataType::Int64)]).unwrap();
    let chained = registry.create_table(schema).unwrap();
    let view = SingleTableView::new(&registry, definition.clone(), v, chained).unwrap();
    assert!(view.install(&mut registry).is_err());

    // Two views sharing one destination.
    let twin = SingleTableView::new(
        &registry,
        ViewDefinition::builder("twin")
            .group_by_column(0)
            .aggregate(AggregateColumn::count_star())
            .aggregate(AggregateColumn::sum(Expr::column(1)))
            .build()
            .unwrap(),
        t,
        v,
    )
    .unwrap();
    assert!(twin.install(&mut registry).is_err());
    assert_eq!(registry.view_names(), vec!["v"]);

    assert!(registry.drop_table(t).is_err());
    registry.detach_view("v").unwrap();
    assert!(registry.drop_table(t).is_ok());
}

// ---- multi-table -----------------------------------------------------------

struct Shop {
    registry: TableRegistry,
    customers: TableId,
    orders: TableId,
    view: TableId,
    recompute: JoinAggregatePlan,
}

/// SELECT region, COUNT(*), SUM(amount), MAX(amount)
/// FROM orders JOIN customers ON orders.customer = customers.id GROUP BY region
fn shop() -> Shop {
    let mut registry = TableRegistry::new(StorageConfig::default());
    let customers = registry
        .create_table(
            TableBuilder::new("customers")
                .unwrap()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("region", DataType::String)
                .unwrap()
                .add_primary_key(&["id"])
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    let orders = registry
        .create_table(
            TableBuilder::new("orders")
                .unwrap()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("customer", DataType::Int64)
                .unwrap()
                .add_column("amount", DataType::Int64)
                .unwrap()
                .add_primary_key(&["id"])
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();

    // Joined row: orders (0..3) followed by customers (3..5).
    let join = Expr::eq(Expr::column(1), Expr::column(3));
    let definition = ViewDefinition::builder("sales")
        .group_by_column(4)
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::sum(Expr::column(2)))
        .aggregate(AggregateColumn::max(Expr::column(2)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema(
            "sales",
            &[("region", DataType::String)],
            &[("n", DataType::Int64), ("total", DataType::Int64), ("top", DataType::Int64)],
        )
        .unwrap();
    let view = registry.create_table(schema).unwrap();

    let tables = vec![orders, customers];
    let delta = JoinAggregatePlan::new(tables.clone(), Some(join.clone()), definition.clone());
    let fallback =
        MinMaxFallbackPlan::new(tables.clone(), Some(join.clone()), &definition, 3).unwrap();
    let fallback = Arc::new(fallback);
    let delta = Arc::new(delta);
    let installed = MultiTableView::new(&registry, &definition, tables.clone(), view, delta)
        .unwrap()
        .with_fallback(3, fallback)
        .unwrap()
        .install(&mut registry)
        .unwrap();
    assert_eq!(installed.sources(), &[orders, customers]);

    Shop {
        registry,
        customers,
        orders,
        view,
        recompute: JoinAggregatePlan::new(tables, Some(join), definition),
    }
}

fn sale(region: &str, n: i64, total: i64, top: i64) -> Row {
    Row::new(vec![Value::from(region), int(n), int(total), int(top)])
}

impl Shop {
    fn customer(&mut self, id: i64, region: &str) -> TupleId {
        self.registry
            .insert(self.customers, Row::new(vec![int(id), Value::from(region)]))
            .unwrap()
    }

    fn order(&mut self, id: i64, customer: i64, amount: i64) -> TupleId {
        self.registry.insert(self.orders, row(&[id, customer, amount])).unwrap()
    }

    fn assert_matches_recompute(&self) {
        let mut expected = self.recompute.execute(&self.registry).unwrap();
        expected.sort_by(|x, y| x.values().cmp(y.values()));
        assert_eq!(contents(&self.registry, self.view), expected);
    }
}

#[test]
fn multi_table_view_follows_join() {
    let mut shop = shop();
    let token = shop.registry.begin();

    shop.customer(1, "east");
    let west = shop.customer(2, "west");
    let big = shop.order(10, 1, 100);
    shop.order(11, 1, 50);
    shop.order(12, 2, 70);
    assert_eq!(
        contents(&shop.registry, shop.view),
        vec![sale("east", 2, 150, 100), sale("west", 1, 70, 70)]
    );
    shop.assert_matches_recompute();

    shop.registry.delete(shop.orders, big).unwrap();
    assert_eq!(
        contents(&shop.registry, shop.view),
        vec![sale("east", 1, 50, 50), sale("west", 1, 70, 70)]
    );

    // A customer with no orders joins nothing.
    shop.customer(3, "north");
    shop.assert_matches_recompute();

    shop.registry.delete(shop.customers, west).unwrap();
    assert_eq!(contents(&shop.registry, shop.view), vec![sale("east", 1, 50, 50)]);
    shop.assert_matches_recompute();

    shop.registry.undo(token).unwrap();
    assert!(contents(&shop.registry, shop.view).is_empty());
    assert!(shop.registry.table(shop.orders).unwrap().delta().is_some());
}

#[test]
fn multi_table_view_requires_fallbacks() {
    let mut shop = shop();
    shop.registry.detach_view("sales").unwrap();
    assert!(shop.registry.table(shop.orders).unwrap().delta().is_none());

    let definition = shop.recompute.definition().clone();
    let plan: Arc<dyn QueryPlan> = Arc::new(JoinAggregatePlan::new(
        shop.recompute.tables().to_vec(),
        None,
        definition.clone(),
    ));
    let missing = MultiTableView::new(
        &shop.registry,
        &definition,
        vec![shop.orders, shop.customers],
        shop.view,
        plan,
    )
    .unwrap()
    .install(&mut shop.registry);
    assert!(missing.is_err());
    assert!(shop.registry.view_names().is_empty());
}

#[test]
fn multi_table_catch_up() {
    let mut shop = shop();
    shop.registry.detach_view("sales").unwrap();
    shop.registry.begin();
    shop.customer(1, "east");
    shop.order(10, 1, 5);
    shop.order(11, 1, 7);

    let definition = shop.recompute.definition().clone();
    let tables = shop.recompute.tables().to_vec();
    let join = Expr::eq(Expr::column(1), Expr::column(3));
    let fallback =
        MinMaxFallbackPlan::new(tables.clone(), Some(join.clone()), &definition, 3).unwrap();
    let fallback = Arc::new(fallback);
    MultiTableView::new(
        &shop.registry,
        &definition,
        vec![shop.orders, shop.customers],
        shop.view,
        Arc::new(JoinAggregatePlan::new(tables, Some(join), definition.clone())),
    )
    .unwrap()
    .with_fallback(3, fallback)
    .unwrap()
    .install(&mut shop.registry)
    .unwrap();

    shop.registry.catch_up_with_existing_data("sales").unwrap();
    assert_eq!(contents(&shop.registry, shop.view), vec![sale("east", 2, 12, 7)]);
    let seven = find(&shop.registry, shop.orders, &[11]);
    shop.registry.delete(shop.orders, seven).unwrap();
    assert_eq!(contents(&shop.registry, shop.view), vec![sale("east", 1, 5, 5)]);
}

#[test]
fn multi_table_sum_widens_int32_input() {
    let mut registry = TableRegistry::new(StorageConfig::default());
    let a = registry
        .create_table(
            TableBuilder::new("a")
                .unwrap()
                .add_column("k", DataType::Int64)
                .unwrap()
                .add_column("v", DataType::Int32)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    let b = registry
        .create_table(
            TableBuilder::new("b")
                .unwrap()
                .add_column("k", DataType::Int64)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();

    // Joined row: a (0..2) followed by b (2).
    let join = Expr::eq(Expr::column(0), Expr::column(2));
    let definition = ViewDefinition::builder("w")
        .group_by_column(0)
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema(
            "w",
            &[("k", DataType::Int64)],
            &[("n", DataType::Int64), ("total", DataType::Int64)],
        )
        .unwrap();
    let view = registry.create_table(schema).unwrap();
    let plan = JoinAggregatePlan::new(vec![a, b], Some(join), definition.clone())
        .with_column_names(["k", "n", "total"]);
    MultiTableView::new(&registry, &definition, vec![a, b], view, Arc::new(plan))
        .unwrap()
        .install(&mut registry)
        .unwrap();

    registry.begin();
    registry.insert(b, row(&[1])).unwrap();
    registry.insert(b, row(&[1])).unwrap();
    let big = registry
        .insert(a, Row::new(vec![int(1), Value::Int32(2_000_000_000)]))
        .unwrap();
    assert_eq!(contents(&registry, view), vec![row(&[1, 2, 4_000_000_000])]);

    registry.delete(a, big).unwrap();
    assert!(contents(&registry, view).is_empty());
}

#[test]
fn sum_overflow_names_view_column() {
    let (mut registry, t) = setup();
    let definition = ViewDefinition::builder("v")
        .group_by_column(0)
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema(
            "v",
            &[("a", DataType::Int64)],
            &[("n", DataType::Int64), ("total", DataType::Int64)],
        )
        .unwrap();
    let v = registry.create_table(schema).unwrap();
    SingleTableView::new(&registry, definition, t, v)
        .unwrap()
        .install(&mut registry)
        .unwrap();

    let token = registry.begin();
    registry.insert(t, row(&[1, i64::MAX, 0])).unwrap();
    match registry.insert(t, row(&[1, 1, 0])) {
        Err(Error::Evaluation { column: Some(column), .. }) => assert_eq!(column, "total"),
        other => panic!("unexpected result {:?}", other),
    }
    registry.undo(token).unwrap();
    assert!(contents(&registry, v).is_empty());
}

// ---- property tests ----------------------------------------------------------

#[derive(Clone, Debug)]
enum Op {
    Insert(i64, i64, Option<i64>),
    Update(usize, i64, i64, Option<i64>),
    Delete(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let c = prop::option::of(-4i64..4);
    prop::collection::vec(
        prop_oneof![
            3 => (0i64..5, -8i64..8, c.clone()).prop_map(|(a, b, c)| Op::Insert(a, b, c)),
            2 => (0usize..64, 0i64..5, -8i64..8, c).prop_map(|(n, a, b, c)| Op::Update(n, a, b, c)),
            2 => (0usize..64).prop_map(Op::Delete),
        ],
        1..80,
    )
}

/// SELECT a, COUNT(*), COUNT(c), SUM(b), MIN(b), MAX(c) FROM t WHERE a < 4 GROUP BY a
fn full_definition() -> ViewDefinition {
    ViewDefinition::builder("full")
        .group_by_column(0)
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::count(Expr::column(2)))
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .aggregate(AggregateColumn::min(Expr::column(1)))
        .aggregate(AggregateColumn::max(Expr::column(2)))
        .filter(Expr::lt(Expr::column(0), Expr::literal(4i64)))
        .build()
        .unwrap()
}

proptest! {
    /// After any mix of operations the view equals a from-scratch
    /// aggregation, holds one row per group, and an undo restores it.
    #[test]
    fn view_matches_recompute(ops in ops(), commit in any::<bool>()) {
        let (mut registry, t) = setup();
        let definition = full_definition();
        let schema = definition
            .destination_schema(
                "full",
                &[("a", DataType::Int64)],
                &[
                    ("n", DataType::Int64),
                    ("nc", DataType::Int64),
                    ("sb", DataType::Int64),
                    ("mb", DataType::Int64),
                    ("xc", DataType::Int64),
                ],
            )
            .unwrap();
        let v = registry.create_table(schema).unwrap();
        SingleTableView::new(&registry, definition.clone(), t, v)
            .unwrap()
            .with_fallback(&registry, 4, MinMaxFallback::Indexed("ix_ab".into()))
            .unwrap()
            .install(&mut registry)
            .unwrap();
        let recompute = JoinAggregatePlan::new(vec![t], None, definition);

        let token = registry.begin();
        for op in ops {
            let live: Vec<TupleId> = registry.table(t).unwrap().iter().map(|(id, _)| id).collect();
            let source = |a: i64, b: i64, c: Option<i64>| Row::new(vec![int(a), int(b), c.into()]);
            let result = match op {
                Op::Insert(a, b, c) => registry.insert(t, source(a, b, c)).map(|_| ()),
                Op::Update(n, a, b, c) if !live.is_empty() => {
                    registry.update(t, live[n % live.len()], source(a, b, c), IndexSelection::All)
                }
                Op::Delete(n) if !live.is_empty() => registry.delete(t, live[n % live.len()]),
                _ => Ok(()),
            };
            prop_assert!(result.is_ok(), "{:?}", result);
        }

        if commit {
            registry.release(token).unwrap();
        } else {
            registry.undo(token).unwrap();
            prop_assert!(contents(&registry, v).is_empty());
        }

        let actual = contents(&registry, v);
        let mut expected = recompute.execute(&registry).unwrap();
        expected.sort_by(|x, y| x.values().cmp(y.values()));
        prop_assert_eq!(&actual, &expected);

        let mut keys: Vec<&Value> = actual.iter().map(|r| &r.values()[0]).collect();
        keys.dedup();
        prop_assert_eq!(keys.len(), actual.len());
    }
}
