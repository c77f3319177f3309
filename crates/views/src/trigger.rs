//! Views fed by a single source table.
//!
//! A [`SingleTableView`] is attached as a trigger on its source. Each changed
//! row is evaluated directly against the view definition and merged into the
//! destination group; no plan runs unless a MIN or MAX has to be recomputed.

use crate::definition::{AggregateKind, ViewDefinition};
use crate::merge::{contribution, more_extreme, GroupTable};
use crate::plan::{run_fallback_plan, QueryPlan};
use crate::fatal;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use strata_core::{Error, Expr, Result, Row, TupleId, Value};
use strata_storage::{TableId, TableRegistry, ViewKind, ViewMaintainer};
use tracing::debug;

/// How a MIN or MAX column finds its new value after the stored one is deleted.
#[derive(Clone, Default)]
pub enum MinMaxFallback {
    /// Scan every live row of the source.
    #[default]
    Sequential,
    /// Walk the named ordered source index, keyed on the group-by columns
    /// followed by the aggregate input column, from the group's low end for
    /// MIN and its high end for MAX.
    Indexed(String),
    /// Run a plan with the group key and the removed value as parameters.
    Plan(Arc<dyn QueryPlan>),
}

impl fmt::Debug for MinMaxFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinMaxFallback::Sequential => f.write_str("Sequential"),
            MinMaxFallback::Indexed(index) => f.debug_tuple("Indexed").field(index).finish(),
            MinMaxFallback::Plan(_) => f.write_str("Plan"),
        }
    }
}

/// An aggregate view over one source table.
pub struct SingleTableView {
    definition: ViewDefinition,
    sources: Vec<TableId>,
    target: GroupTable,
    fallbacks: BTreeMap<usize, MinMaxFallback>,
}

impl SingleTableView {
    /// Binds `definition` to its source and destination tables.
    pub fn new(
        registry: &TableRegistry,
        definition: ViewDefinition,
        source: TableId,
        destination: TableId,
    ) -> Result<Self> {
        let width = registry.table(source)?.schema().width();
        let mut exprs: Vec<&Expr> = definition.group_by().iter().collect();
        exprs.extend(definition.aggregates().iter().filter_map(|a| a.input()));
        exprs.extend(definition.filter());
        if let Some(column) = exprs
            .iter()
            .flat_map(|e| e.referenced_columns())
            .find(|c| *c >= width)
        {
            return Err(Error::invalid_schema(format!(
                "view {} reads column {} of a {}-column source",
                definition.name(),
                column,
                width
            )));
        }

        let target = GroupTable::bind(&definition, registry, destination)?;
        Ok(Self {
            definition,
            sources: vec![source],
            target,
            fallbacks: BTreeMap::new(),
        })
    }

    /// Chooses how destination column `column` recomputes its MIN/MAX.
    pub fn with_fallback(
        mut self,
        registry: &TableRegistry,
        column: usize,
        fallback: MinMaxFallback,
    ) -> Result<Self> {
        let kind = self.extremum_at(column)?;
        if let MinMaxFallback::Indexed(name) = &fallback {
            self.check_fallback_index(registry, column, kind, name)?;
        }
        self.fallbacks.insert(column, fallback);
        Ok(self)
    }

    /// Attaches the view to its source. A view without GROUP BY gets its
    /// single destination row here; existing source rows are not folded in
    /// until catch-up runs.
    pub fn install(self, registry: &mut TableRegistry) -> Result<Arc<Self>> {
        let view = Arc::new(self);
        registry.attach_single_table_view(view.clone())?;
        if let Err(e) = view.target.ensure_single_row(registry) {
            registry.detach_view(view.name())?;
            return Err(e);
        }
        Ok(view)
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    #[inline]
    pub fn source(&self) -> TableId {
        self.sources[0]
    }

    /// Fallback used by destination column `column`.
    pub fn fallback(&self, column: usize) -> &MinMaxFallback {
        static SEQUENTIAL: MinMaxFallback = MinMaxFallback::Sequential;
        self.fallbacks.get(&column).unwrap_or(&SEQUENTIAL)
    }

    fn extremum_at(&self, column: usize) -> Result<AggregateKind> {
        self.target
            .kind_at(column)
            .filter(AggregateKind::is_extremum)
            .ok_or_else(|| {
                Error::invalid_schema(format!(
                    "column {} of view {} is not a MIN or MAX",
                    column,
                    self.name()
                ))
            })
    }

    fn input_at(&self, column: usize) -> Result<&Expr> {
        self.definition
            .aggregate_at(column)
            .and_then(|a| a.input())
            .ok_or_else(|| fatal(format!("view {} column {} has no input", self.name(), column)))
    }

    fn check_fallback_index(
        &self,
        registry: &TableRegistry,
        column: usize,
        kind: AggregateKind,
        name: &str,
    ) -> Result<()> {
        let store = registry.table(self.source())?;
        let unusable = |reason: &str| {
            Error::invalid_schema(format!(
                "index {} cannot serve {:?} of view {}: {}",
                name,
                kind,
                self.name(),
                reason
            ))
        };
        let index = store.index(name).ok_or_else(|| unusable("no such index"))?;
        if !index.is_ordered() {
            return Err(unusable("not ordered"));
        }
        if index.def().is_partial() {
            return Err(unusable("partial"));
        }

        let mut expected = self
            .definition
            .group_by()
            .iter()
            .map(Expr::as_column)
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| unusable("group key is not a column list"))?;
        expected.push(
            self.input_at(column)?
                .as_column()
                .ok_or_else(|| unusable("aggregate input is not a column"))?,
        );
        match index.def().key_columns() {
            Some(columns) if columns.starts_with(&expected) => Ok(()),
            _ => Err(unusable("key does not start with the group and input columns")),
        }
    }

    fn admits(&self, row: &[Value]) -> Result<bool> {
        match self.definition.filter() {
            Some(filter) => filter.is_satisfied(row, &[]),
            None => Ok(true),
        }
    }

    fn in_group(&self, row: &[Value], key: &[Value]) -> Result<bool> {
        for (expr, expected) in self.definition.group_by().iter().zip(key) {
            if expr.eval(row, &[])?.cmp(expected) != Ordering::Equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn recompute(
        &self,
        registry: &mut TableRegistry,
        key: &[Value],
        column: usize,
        removed: &Value,
    ) -> Result<Value> {
        let kind = self.extremum_at(column)?;
        let input = self.input_at(column)?;
        match self.fallback(column) {
            MinMaxFallback::Sequential => {
                let mut best: Option<Value> = None;
                for (_, row) in registry.scan(self.source())? {
                    if !self.admits(row.values())? || !self.in_group(row.values(), key)? {
                        continue;
                    }
                    let value = input.eval(row.values(), &[])?;
                    if value.is_null() {
                        continue;
                    }
                    match &best {
                        Some(current) if !more_extreme(kind, &value, current) => {}
                        _ => best = Some(value),
                    }
                }
                Ok(best.unwrap_or(Value::Null))
            }
            MinMaxFallback::Indexed(name) => {
                let store = registry.table(self.source())?;
                let index = store
                    .index(name)
                    .ok_or_else(|| fatal(format!("fallback index {} disappeared", name)))?;
                for (_, tuple) in index.prefix_cursor(key, kind == AggregateKind::Max) {
                    let Some(row) = store.get(tuple) else {
                        continue;
                    };
                    if !self.admits(row.values())? {
                        continue;
                    }
                    let value = input.eval(row.values(), &[])?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            MinMaxFallback::Plan(plan) => run_fallback_plan(registry, plan.as_ref(), key, removed),
        }
    }
}

impl fmt::Debug for SingleTableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleTableView")
            .field("name", &self.definition.name())
            .field("source", &self.source())
            .field("destination", &self.target.table())
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

impl ViewMaintainer for SingleTableView {
    fn name(&self) -> &str {
        self.definition.name()
    }

    fn kind(&self) -> ViewKind {
        ViewKind::SingleTable
    }

    fn sources(&self) -> &[TableId] {
        &self.sources
    }

    fn destination(&self) -> TableId {
        self.target.table()
    }

    fn on_insert(
        &self,
        registry: &mut TableRegistry,
        _source: TableId,
        _tuple: TupleId,
        row: &Row,
    ) -> Result<()> {
        let names = self.target.names();
        match contribution(&self.definition, row.values(), &[], names)? {
            Some((key, partial)) => self.target.insert_partial(registry, key, &partial),
            None => Ok(()),
        }
    }

    fn on_delete(
        &self,
        registry: &mut TableRegistry,
        _source: TableId,
        _tuple: TupleId,
        row: &Row,
    ) -> Result<()> {
        let names = self.target.names();
        let Some((key, partial)) = contribution(&self.definition, row.values(), &[], names)? else {
            return Ok(());
        };
        self.target.delete_partial(
            registry,
            key,
            &partial,
            &mut |registry: &mut TableRegistry, key: &[Value], column: usize, removed: &Value| {
                self.recompute(registry, key, column, removed)
            },
        )
    }

    fn catch_up(&self, registry: &mut TableRegistry) -> Result<()> {
        self.target.check_unpopulated(registry)?;
        let rows: Vec<Row> = registry
            .scan(self.source())?
            .map(|(_, row)| row.clone())
            .collect();
        let names = self.target.names();
        for row in &rows {
            let contributed = contribution(&self.definition, row.values(), &[], names)?;
            if let Some((key, partial)) = contributed {
                self.target.insert_partial(registry, key, &partial)?;
            }
        }
        debug!(view = self.name(), rows = rows.len(), "caught up with source");
        Ok(())
    }
}
