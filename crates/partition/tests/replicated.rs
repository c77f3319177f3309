//! Replicated-table mutations issued redundantly by every partition.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use strata_core::schema::{Table, TableBuilder};
use strata_core::{ConstraintKind, DataType, Error, Expr, Row, Value};
use strata_partition::PartitionSite;
use strata_storage::{StorageConfig, TableId, TableRegistry};
use strata_views::{AggregateColumn, SingleTableView, ViewDefinition};
use tracing_subscriber::EnvFilter;

const PARTITIONS: u32 = 3;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rates() -> Table {
    TableBuilder::new("rates")
        .unwrap()
        .add_column("code", DataType::Int64)
        .unwrap()
        .add_column("rate", DataType::Int64)
        .unwrap()
        .add_primary_key(&["code"])
        .unwrap()
        .replicated(true)
        .build()
        .unwrap()
}

/// Replicated registry holding `rates` and
/// `totals = SELECT COUNT(*), SUM(rate) FROM rates`.
fn replicated_registry() -> (TableRegistry, TableId, TableId) {
    let mut registry = TableRegistry::new(StorageConfig::default());
    let rates = registry.create_table(rates()).unwrap();
    let definition = ViewDefinition::builder("totals")
        .aggregate(AggregateColumn::count_star())
        .aggregate(AggregateColumn::sum(Expr::column(1)))
        .build()
        .unwrap();
    let schema = definition
        .destination_schema("totals", &[], &[("n", DataType::Int64), ("total", DataType::Int64)])
        .unwrap();
    let totals = registry.create_table(schema).unwrap();
    SingleTableView::new(&registry, definition, rates, totals)
        .unwrap()
        .install(&mut registry)
        .unwrap();
    (registry, rates, totals)
}

/// Rows and view row as each site observes them after its mutations.
type Observation = (usize, Vec<Row>);

fn observe(site: &PartitionSite, rates: TableId, totals: TableId) -> Observation {
    let registry = site.replicated();
    let count = registry.table(rates).unwrap().len();
    let view = registry.scan(totals).unwrap().map(|(_, r)| r.clone()).collect();
    (count, view)
}

#[test]
fn replicated_insert_executes_once() {
    init_tracing();
    let (registry, rates, totals) = replicated_registry();
    let before = registry.change_log_position();
    let sites = PartitionSite::cluster(PARTITIONS, StorageConfig::default(), registry);
    let executions = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Barrier::new(PARTITIONS as usize));

    let handles: Vec<_> = sites
        .into_iter()
        .map(|mut site| {
            let executions = executions.clone();
            let observed = observed.clone();
            thread::spawn(move || {
                let outcome = site.execute_replicated(|registry| {
                    executions.fetch_add(1, Ordering::SeqCst);
                    registry.insert(rates, Row::new(vec![Value::Int64(978), Value::Int64(110)]))?;
                    Ok(1)
                });
                // Every site reads only after all of them have resolved.
                observed.wait();
                (outcome, observe(&site, rates, totals), site)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    for (outcome, observation, _) in &results {
        assert_eq!(outcome.as_ref().unwrap(), &1);
        assert_eq!(
            observation,
            &(1, vec![Row::new(vec![Value::Int64(1), Value::Int64(110)])])
        );
    }

    // One record for the row and one for the view's single row.
    let (_, _, site) = &results[0];
    assert_eq!(site.replicated().change_log_position(), before + 2);
    assert_eq!(site.coordinator().generation(), 1);
}

#[test]
fn replicated_error_reaches_every_partition() {
    init_tracing();
    let (registry, rates, totals) = replicated_registry();
    let sites = PartitionSite::cluster(PARTITIONS, StorageConfig::default(), registry);
    let observed = Arc::new(Barrier::new(PARTITIONS as usize));

    let handles: Vec<_> = sites
        .into_iter()
        .map(|mut site| {
            let observed = observed.clone();
            thread::spawn(move || {
                site.execute_replicated(|registry| {
                    registry.insert(rates, Row::new(vec![Value::Int64(1), Value::Int64(5)]))?;
                    Ok(1)
                })
                .unwrap();
                // The second row collides on the primary key; the whole batch is undone.
                site.execute_replicated(|registry| {
                    registry.insert(rates, Row::new(vec![Value::Int64(2), Value::Int64(7)]))?;
                    registry.insert(rates, Row::new(vec![Value::Int64(1), Value::Int64(9)]))?;
                    Ok(2)
                })
                .ok();
                observed.wait();
                (site.take_results(), observe(&site, rates, totals))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (outcomes, observation) in &results {
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], Ok(1));
        assert!(matches!(
            &outcomes[1],
            Err(Error::ConstraintViolation { kind: ConstraintKind::Unique, .. })
        ));
        assert_eq!(
            observation,
            &(1, vec![Row::new(vec![Value::Int64(1), Value::Int64(5)])])
        );
    }
    assert!(results.windows(2).all(|w| w[0].0 == w[1].0));
}
