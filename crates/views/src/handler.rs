//! Views fed by several source tables.
//!
//! A [`MultiTableView`] is attached as a handler on each of its sources.
//! When a source changes, its delta plan runs with that source in delta mode
//! and every resulting row is merged into the destination.

use crate::definition::ViewDefinition;
use crate::fatal;
use crate::merge::GroupTable;
use crate::plan::{run_fallback_plan, QueryPlan};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use strata_core::{Error, Result, Row, TupleId, Value};
use strata_storage::{TableId, TableRegistry, ViewKind, ViewMaintainer};
use tracing::{debug, trace};

/// An aggregate view over a join of several source tables.
pub struct MultiTableView {
    name: String,
    sources: Vec<TableId>,
    target: GroupTable,
    delta_plan: Arc<dyn QueryPlan>,
    fallbacks: BTreeMap<usize, Arc<dyn QueryPlan>>,
}

impl MultiTableView {
    /// Binds a view to its sources and destination.
    ///
    /// `delta_plan` must produce rows in destination layout: the group key
    /// followed by one partial value per aggregate of `definition`.
    pub fn new(
        registry: &TableRegistry,
        definition: &ViewDefinition,
        sources: Vec<TableId>,
        destination: TableId,
        delta_plan: Arc<dyn QueryPlan>,
    ) -> Result<Self> {
        for source in &sources {
            registry.table(*source)?;
        }
        Ok(Self {
            name: definition.name().into(),
            sources,
            target: GroupTable::bind(definition, registry, destination)?,
            delta_plan,
            fallbacks: BTreeMap::new(),
        })
    }

    /// Registers the plan that recomputes MIN/MAX column `column`.
    pub fn with_fallback(mut self, column: usize, plan: Arc<dyn QueryPlan>) -> Result<Self> {
        match self.target.kind_at(column) {
            Some(kind) if kind.is_extremum() => {
                self.fallbacks.insert(column, plan);
                Ok(self)
            }
            _ => Err(Error::invalid_schema(format!(
                "column {} of view {} is not a MIN or MAX",
                column, self.name
            ))),
        }
    }

    /// Attaches the view to every source. Each MIN/MAX column needs a
    /// fallback plan.
    pub fn install(self, registry: &mut TableRegistry) -> Result<Arc<Self>> {
        if let Some(column) = self
            .target
            .extremum_columns()
            .find(|c| !self.fallbacks.contains_key(c))
        {
            return Err(Error::invalid_schema(format!(
                "view {} has no fallback plan for column {}",
                self.name, column
            )));
        }
        let view = Arc::new(self);
        registry.attach_multi_table_view(view.clone())?;
        if let Err(e) = view.target.ensure_single_row(registry) {
            registry.detach_view(&view.name)?;
            return Err(e);
        }
        Ok(view)
    }

    pub fn delta_plan(&self) -> &Arc<dyn QueryPlan> {
        &self.delta_plan
    }

    fn delta_rows(&self, registry: &mut TableRegistry, source: TableId) -> Result<Vec<Row>> {
        let rows = registry.with_delta_mode(source, |registry| self.delta_plan.execute(registry))?;
        trace!(view = %self.name, source = %source, rows = rows.len(), "delta plan ran");
        Ok(rows)
    }

    fn split(&self, row: Row) -> (Vec<Value>, Vec<Value>) {
        let mut key = row.into_values();
        let partial = key.split_off(self.target.group_width().min(key.len()));
        (key, partial)
    }

    fn recompute(
        &self,
        registry: &mut TableRegistry,
        key: &[Value],
        column: usize,
        removed: &Value,
    ) -> Result<Value> {
        let plan = self
            .fallbacks
            .get(&column)
            .cloned()
            .ok_or_else(|| {
                fatal(format!("view {} lost fallback for column {}", self.name, column))
            })?;
        run_fallback_plan(registry, plan.as_ref(), key, removed)
    }
}

impl fmt::Debug for MultiTableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiTableView")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("destination", &self.target.table())
            .finish()
    }
}

impl ViewMaintainer for MultiTableView {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ViewKind {
        ViewKind::MultiTable
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
        source: TableId,
        _tuple: TupleId,
        _row: &Row,
    ) -> Result<()> {
        for row in self.delta_rows(registry, source)? {
            let (key, partial) = self.split(row);
            self.target.insert_partial(registry, key, &partial)?;
        }
        Ok(())
    }

    fn on_delete(
        &self,
        registry: &mut TableRegistry,
        source: TableId,
        _tuple: TupleId,
        _row: &Row,
    ) -> Result<()> {
        for row in self.delta_rows(registry, source)? {
            let (key, partial) = self.split(row);
            self.target.delete_partial(
                registry,
                key,
                &partial,
                &mut |registry: &mut TableRegistry, key: &[Value], column: usize, removed: &Value| {
                    self.recompute(registry, key, column, removed)
                },
            )?;
        }
        Ok(())
    }

    fn catch_up(&self, registry: &mut TableRegistry) -> Result<()> {
        self.target.check_unpopulated(registry)?;
        let rows = self.delta_plan.execute(registry)?;
        let groups = rows.len();
        for row in rows {
            let (key, partial) = self.split(row);
            self.target.insert_partial(registry, key, &partial)?;
        }
        debug!(view = %self.name, groups, "caught up with sources");
        Ok(())
    }
}
