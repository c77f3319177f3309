//! Merging partial aggregates into destination rows.
//!
//! Both view kinds reduce a source change to a group key plus one partial
//! value per aggregate column: a raw source row contributes COUNT(*) = 1,
//! COUNT = 0 or 1 and its input value for SUM, MIN and MAX; a plan result
//! row carries the same shape already aggregated. [`GroupTable`] folds such
//! partials into (insert) or out of (delete) the destination table.

use crate::definition::{AggregateKind, ViewDefinition};
use crate::fatal;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::{DataType, Error, Result, Row, TupleId, Value};
use strata_index::IndexKey;
use strata_storage::{IndexSelection, TableId, TableRegistry};
use tracing::trace;

/// Group key and per-aggregate partial values of one source row.
pub(crate) type Contribution = (Vec<Value>, Vec<Value>);

/// Names an evaluation error after output column `column`, when `names`
/// covers it.
pub(crate) fn label(error: Error, names: &[String], column: usize) -> Error {
    match names.get(column) {
        Some(name) => error.with_column(name),
        None => error,
    }
}

/// Evaluates a source row against a view definition. Rows rejected by the
/// filter contribute nothing. `names` are the output column names, group
/// columns first, used to label evaluation errors.
pub(crate) fn contribution(
    definition: &ViewDefinition,
    row: &[Value],
    params: &[Value],
    names: &[String],
) -> Result<Option<Contribution>> {
    if let Some(filter) = definition.filter() {
        if !filter.is_satisfied(row, params)? {
            return Ok(None);
        }
    }
    let key = definition
        .group_by()
        .iter()
        .enumerate()
        .map(|(column, expr)| expr.eval(row, params).map_err(|e| label(e, names, column)))
        .collect::<Result<Vec<_>>>()?;

    let group_width = key.len();
    let mut partial = Vec::with_capacity(definition.aggregates().len());
    for (i, aggregate) in definition.aggregates().iter().enumerate() {
        let input = |expr: &strata_core::Expr| {
            expr.eval(row, params)
                .map_err(|e| label(e, names, group_width + i))
        };
        let value = match (aggregate.kind(), aggregate.input()) {
            (AggregateKind::CountStar, _) | (_, None) => Value::Int64(1),
            (AggregateKind::Count, Some(expr)) => Value::Int64(i64::from(!input(expr)?.is_null())),
            (_, Some(expr)) => input(expr)?,
        };
        partial.push(value);
    }
    Ok(Some((key, partial)))
}

/// Converts a value to the destination column type, widening integers.
pub(crate) fn coerce(value: Value, data_type: DataType) -> Result<Value> {
    if value.conforms_to(data_type) {
        return Ok(value);
    }
    match (value, data_type) {
        (Value::Int32(i), DataType::Int64) => Ok(Value::Int64(i64::from(i))),
        (Value::Int32(i), DataType::Float64) => Ok(Value::Float64(f64::from(i))),
        (Value::Int64(i), DataType::Float64) => Ok(Value::Float64(i as f64)),
        (Value::Int64(i), DataType::Int32) => i32::try_from(i)
            .map(Value::Int32)
            .map_err(|_| Error::evaluation(format!("{} does not fit in an Int32 column", i))),
        (other, expected) => Err(Error::type_mismatch(
            expected,
            other.data_type().unwrap_or(expected),
        )),
    }
}

/// True if `candidate` should replace `current` as the stored extremum.
pub(crate) fn more_extreme(kind: AggregateKind, candidate: &Value, current: &Value) -> bool {
    match kind {
        AggregateKind::Min => candidate.cmp(current) == Ordering::Less,
        AggregateKind::Max => candidate.cmp(current) == Ordering::Greater,
        _ => false,
    }
}

/// Sums and counts accumulate Int32 inputs as Int64.
fn widen(value: &Value) -> Value {
    match value {
        Value::Int32(i) => Value::Int64(i64::from(*i)),
        other => other.clone(),
    }
}

/// Folds a partial value into a stored aggregate.
pub(crate) fn combine(kind: AggregateKind, stored: &Value, partial: &Value) -> Result<Value> {
    if partial.is_null() {
        return Ok(stored.clone());
    }
    match kind {
        AggregateKind::Sum | AggregateKind::Count | AggregateKind::CountStar => {
            let partial = widen(partial);
            if stored.is_null() {
                Ok(partial)
            } else {
                widen(stored).checked_add(&partial)
            }
        }
        AggregateKind::Min | AggregateKind::Max => {
            Ok(if stored.is_null() || more_extreme(kind, partial, stored) {
                partial.clone()
            } else {
                stored.clone()
            })
        }
    }
}

/// Result of taking a partial value back out of a stored aggregate.
#[derive(Debug, PartialEq)]
pub(crate) enum Retracted {
    Value(Value),
    /// The removed value was the stored MIN/MAX; the new one must be looked up.
    Recompute,
}

pub(crate) fn retract(kind: AggregateKind, stored: &Value, partial: &Value) -> Result<Retracted> {
    if partial.is_null() || stored.is_null() {
        return Ok(Retracted::Value(stored.clone()));
    }
    match kind {
        AggregateKind::Sum | AggregateKind::Count | AggregateKind::CountStar => {
            stored.checked_sub(partial).map(Retracted::Value)
        }
        AggregateKind::Min | AggregateKind::Max => {
            if stored.cmp(partial) == Ordering::Equal {
                Ok(Retracted::Recompute)
            } else {
                Ok(Retracted::Value(stored.clone()))
            }
        }
    }
}

/// Looks up the new MIN/MAX of a group after its stored extremum was removed.
/// Arguments are the registry, the group key, the destination column and the
/// removed value.
pub(crate) type Recompute<'a> =
    dyn FnMut(&mut TableRegistry, &[Value], usize, &Value) -> Result<Value> + 'a;

/// A view's destination table, bound to the view's aggregate layout.
#[derive(Debug)]
pub(crate) struct GroupTable {
    view: String,
    table: TableId,
    group_width: usize,
    kinds: Vec<AggregateKind>,
    names: Vec<String>,
    types: Vec<DataType>,
    count_star: usize,
    primary_key: Option<usize>,
}

impl GroupTable {
    /// Checks that `table` can hold the rows of `definition`.
    pub(crate) fn bind(
        definition: &ViewDefinition,
        registry: &TableRegistry,
        table: TableId,
    ) -> Result<Self> {
        let store = registry.table(table)?;
        let schema = store.schema();
        if schema.width() != definition.width() {
            return Err(Error::invalid_schema(format!(
                "destination {} has {} columns, view {} produces {}",
                schema.name(),
                schema.width(),
                definition.name(),
                definition.width()
            )));
        }

        let group_width = definition.group_width();
        let types: Vec<DataType> = schema.columns().iter().map(|c| c.data_type()).collect();
        let names: Vec<String> = schema.columns().iter().map(|c| c.name().into()).collect();
        let kinds: Vec<AggregateKind> = definition.aggregates().iter().map(|a| a.kind()).collect();
        for (i, kind) in kinds.iter().enumerate() {
            let column = &schema.columns()[group_width + i];
            if kind.is_count() && column.data_type() != DataType::Int64 {
                return Err(Error::invalid_schema(format!(
                    "count column {}.{} must be Int64",
                    schema.name(),
                    column.name()
                )));
            }
        }

        let primary_key = if group_width == 0 {
            None
        } else {
            let expected: Vec<usize> = (0..group_width).collect();
            match schema.primary_key().and_then(|pk| pk.key_columns()) {
                Some(columns) if columns == expected.as_slice() => schema.primary_key_position(),
                _ => {
                    return Err(Error::invalid_schema(format!(
                        "destination {} needs a primary key on its {} group columns",
                        schema.name(),
                        group_width
                    )))
                }
            }
        };

        Ok(Self {
            view: definition.name().into(),
            table,
            group_width,
            kinds,
            names,
            types,
            count_star: definition.count_star_column(),
            primary_key,
        })
    }

    #[inline]
    pub(crate) fn table(&self) -> TableId {
        self.table
    }

    #[inline]
    pub(crate) fn group_width(&self) -> usize {
        self.group_width
    }

    /// Destination column names, group columns first.
    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    /// Converts `value` for destination column `column`.
    fn store_as(&self, value: Value, column: usize) -> Result<Value> {
        coerce(value, self.types[column]).map_err(|e| label(e, &self.names, column))
    }

    /// Aggregate kind of destination column `column`.
    pub(crate) fn kind_at(&self, column: usize) -> Option<AggregateKind> {
        column
            .checked_sub(self.group_width)
            .and_then(|i| self.kinds.get(i))
            .copied()
    }

    /// Destination columns holding MIN or MAX.
    pub(crate) fn extremum_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_extremum())
            .map(move |(i, _)| self.group_width + i)
    }

    /// Primary-key entries never move when an aggregate row is rewritten.
    fn selection(&self) -> IndexSelection {
        match self.primary_key {
            Some(position) => IndexSelection::AllExcept(vec![position]),
            None => IndexSelection::All,
        }
    }

    /// A group with no rows: counts are zero, everything else NULL.
    fn empty_row(&self, mut key: Vec<Value>) -> Row {
        key.extend(self.kinds.iter().map(|k| {
            if k.is_count() {
                Value::Int64(0)
            } else {
                Value::Null
            }
        }));
        Row::new(key)
    }

    fn coerce_key(&self, key: Vec<Value>) -> Result<Vec<Value>> {
        key.into_iter()
            .enumerate()
            .map(|(column, value)| self.store_as(value, column))
            .collect()
    }

    fn count_of(&self, row: &Row) -> i64 {
        row.get(self.count_star).and_then(Value::as_i64).unwrap_or(0)
    }

    fn find_group(
        &self,
        registry: &TableRegistry,
        key: &[Value],
    ) -> Result<Option<(TupleId, Row)>> {
        if self.group_width == 0 {
            return Ok(registry
                .scan(self.table)?
                .next()
                .map(|(tuple, row)| (tuple, row.clone())));
        }
        let store = registry.table(self.table)?;
        let pk = store
            .primary_key_index()
            .ok_or_else(|| fatal(format!("view {} lost its group index", self.view)))?;
        Ok(pk
            .lookup(&IndexKey::new(key.to_vec()))
            .into_iter()
            .find_map(|tuple| store.get(tuple).map(|row| (tuple, row.clone()))))
    }

    fn check_partial(&self, partial: &[Value]) -> Result<()> {
        if partial.len() != self.kinds.len() {
            return Err(fatal(format!(
                "view {} received {} aggregate values, expected {}",
                self.view,
                partial.len(),
                self.kinds.len()
            )));
        }
        Ok(())
    }

    /// Creates the single row of a view without GROUP BY if it is missing.
    pub(crate) fn ensure_single_row(&self, registry: &mut TableRegistry) -> Result<()> {
        if self.group_width == 0 && registry.scan(self.table)?.next().is_none() {
            registry.insert(self.table, self.empty_row(Vec::new()))?;
        }
        Ok(())
    }

    /// Fails unless every destination row is an empty group.
    pub(crate) fn check_unpopulated(&self, registry: &TableRegistry) -> Result<()> {
        let populated = registry
            .scan(self.table)?
            .any(|(_, row)| self.count_of(row) != 0);
        if populated {
            return Err(Error::invalid_operation(format!(
                "view {} already holds aggregated rows",
                self.view
            )));
        }
        Ok(())
    }

    /// Merges `partial` into the group `key`, creating the group if needed.
    pub(crate) fn insert_partial(
        &self,
        registry: &mut TableRegistry,
        key: Vec<Value>,
        partial: &[Value],
    ) -> Result<()> {
        self.check_partial(partial)?;
        let key = self.coerce_key(key)?;
        let (tuple, mut row) = match self.find_group(registry, &key)? {
            Some(found) => (Some(found.0), found.1),
            None => (None, self.empty_row(key)),
        };

        for (i, kind) in self.kinds.iter().enumerate() {
            let column = self.group_width + i;
            let stored = row.get(column).cloned().unwrap_or(Value::Null);
            let merged = combine(*kind, &stored, &partial[i])
                .map_err(|e| label(e, &self.names, column))?;
            row.set(column, self.store_as(merged, column)?);
        }

        match tuple {
            Some(tuple) => {
                trace!(view = %self.view, %tuple, "group updated");
                registry.update(self.table, tuple, row, self.selection())
            }
            None => {
                trace!(view = %self.view, "group created");
                registry.insert(self.table, row).map(|_| ())
            }
        }
    }

    /// Takes `partial` back out of the group `key`. A group whose COUNT(*)
    /// drops to zero is deleted, or reset when the view has no GROUP BY.
    pub(crate) fn delete_partial(
        &self,
        registry: &mut TableRegistry,
        key: Vec<Value>,
        partial: &[Value],
        recompute: &mut Recompute<'_>,
    ) -> Result<()> {
        self.check_partial(partial)?;
        let key = self.coerce_key(key)?;
        let (tuple, mut row) = self.find_group(registry, &key)?.ok_or_else(|| {
            fatal(format!(
                "view {} has no group {:?} to delete from",
                self.view, key
            ))
        })?;

        let mut stale = Vec::new();
        for (i, kind) in self.kinds.iter().enumerate() {
            let column = self.group_width + i;
            let stored = row.get(column).cloned().unwrap_or(Value::Null);
            let retracted = retract(*kind, &stored, &partial[i])
                .map_err(|e| label(e, &self.names, column))?;
            match retracted {
                Retracted::Value(value) => {
                    row.set(column, self.store_as(value, column)?);
                }
                Retracted::Recompute => stale.push((column, partial[i].clone())),
            }
        }

        let remaining = self.count_of(&row);
        if remaining < 0 {
            return Err(fatal(format!(
                "view {} group {:?} has negative count {}",
                self.view, key, remaining
            )));
        }
        if remaining == 0 {
            if self.group_width > 0 {
                trace!(view = %self.view, %tuple, "group removed");
                return registry.delete(self.table, tuple);
            }
            return registry.update(self.table, tuple, self.empty_row(Vec::new()), self.selection());
        }

        for (column, removed) in stale {
            let value = recompute(registry, &key, column, &removed)?;
            trace!(view = %self.view, column, ?removed, ?value, "extremum recomputed");
            row.set(column, self.store_as(value, column)?);
        }
        registry.update(self.table, tuple, row, self.selection())
    }
}
