//! Query plans run by view maintenance.
//!
//! A multi-table view does not merge the changed row directly. It runs its
//! delta plan with the changed source in delta mode, so that the source
//! contributes only the changed row to the join, and merges the resulting
//! partial-aggregate rows. MIN/MAX fallback plans read the group key and the
//! removed extremum from the run-time parameters.

use crate::definition::{AggregateKind, ViewDefinition};
use crate::merge::{combine, contribution, label, more_extreme};
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashMap;
use strata_core::{Error, Expr, Result, Row, Value};
use strata_storage::{TableId, TableRegistry};

/// An executable query over a registry.
pub trait QueryPlan: Send + Sync {
    /// Runs the plan against the registry's current tables and parameters.
    fn execute(&self, registry: &TableRegistry) -> Result<Vec<Row>>;
}

/// Calls `f` with every row of the cross product of `tables`, each row being
/// the concatenation of one row per table.
fn for_each_joined(
    registry: &TableRegistry,
    tables: &[TableId],
    f: &mut dyn FnMut(&[Value]) -> Result<()>,
) -> Result<()> {
    fn walk(
        registry: &TableRegistry,
        tables: &[TableId],
        joined: &mut Vec<Value>,
        f: &mut dyn FnMut(&[Value]) -> Result<()>,
    ) -> Result<()> {
        let Some((first, rest)) = tables.split_first() else {
            return f(joined);
        };
        for (_, row) in registry.scan(*first)? {
            let width = joined.len();
            joined.extend_from_slice(row.values());
            let result = walk(registry, rest, joined, f);
            joined.truncate(width);
            result?;
        }
        Ok(())
    }

    walk(registry, tables, &mut Vec::new(), f)
}

/// Nested-loop join of `tables`, filtered by `join`, then grouped and
/// aggregated like the view `definition`. Group-by and aggregate
/// expressions address columns of the concatenated row.
///
/// Produces one row per group in destination layout. Used as the delta plan
/// of a multi-table view, and without delta mode it computes the view from
/// scratch.
pub struct JoinAggregatePlan {
    tables: Vec<TableId>,
    join: Option<Expr>,
    definition: ViewDefinition,
    column_names: Vec<String>,
}

impl JoinAggregatePlan {
    pub fn new(tables: Vec<TableId>, join: Option<Expr>, definition: ViewDefinition) -> Self {
        Self {
            tables,
            join,
            definition,
            column_names: Vec::new(),
        }
    }

    /// Names the output columns, group columns first. Evaluation errors
    /// carry the name of the column they occurred in.
    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tables(&self) -> &[TableId] {
        &self.tables
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }
}

impl fmt::Debug for JoinAggregatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinAggregatePlan")
            .field("tables", &self.tables)
            .field("view", &self.definition.name())
            .finish()
    }
}

impl QueryPlan for JoinAggregatePlan {
    fn execute(&self, registry: &TableRegistry) -> Result<Vec<Row>> {
        let params = registry.params();
        let kinds: Vec<AggregateKind> = self
            .definition
            .aggregates()
            .iter()
            .map(|a| a.kind())
            .collect();
        let names = self.column_names.as_slice();
        let group_width = self.definition.group_width();
        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();

        for_each_joined(registry, &self.tables, &mut |joined: &[Value]| {
            if let Some(join) = &self.join {
                if !join.is_satisfied(joined, params)? {
                    return Ok(());
                }
            }
            let Some((key, partial)) = contribution(&self.definition, joined, params, names)? else {
                return Ok(());
            };
            match positions.get(&key) {
                Some(&slot) => {
                    let merged = &mut groups[slot].1;
                    for (i, kind) in kinds.iter().enumerate() {
                        merged[i] = combine(*kind, &merged[i], &partial[i])
                            .map_err(|e| label(e, names, group_width + i))?;
                    }
                }
                None => {
                    positions.insert(key.clone(), groups.len());
                    groups.push((key, partial));
                }
            }
            Ok(())
        })?;

        Ok(groups
            .into_iter()
            .map(|(mut key, partial)| {
                key.extend(partial);
                Row::new(key)
            })
            .collect())
    }
}

/// Recomputes one MIN or MAX of one group.
///
/// Expects the group key as parameters `0..g` and the removed extremum as
/// parameter `g`. Rows beyond the removed value are skipped: once the old
/// minimum is gone no remaining row can be smaller. Returns a single row
/// holding the new extremum, NULL if the group has no non-null input left.
pub struct MinMaxFallbackPlan {
    tables: Vec<TableId>,
    join: Option<Expr>,
    filter: Option<Expr>,
    group_by: Vec<Expr>,
    kind: AggregateKind,
    input: Expr,
}

impl MinMaxFallbackPlan {
    /// Builds the fallback for destination column `column` of `definition`.
    pub fn new(
        tables: Vec<TableId>,
        join: Option<Expr>,
        definition: &ViewDefinition,
        column: usize,
    ) -> Result<Self> {
        let aggregate = definition
            .aggregate_at(column)
            .filter(|a| a.kind().is_extremum())
            .ok_or_else(|| {
                Error::invalid_schema(format!(
                    "column {} of view {} is not a MIN or MAX",
                    column,
                    definition.name()
                ))
            })?;
        let input = aggregate
            .input()
            .cloned()
            .ok_or_else(|| {
                Error::invalid_schema(format!("view {} MIN/MAX without input", definition.name()))
            })?;
        Ok(Self {
            tables,
            join,
            filter: definition.filter().cloned(),
            group_by: definition.group_by().to_vec(),
            kind: aggregate.kind(),
            input,
        })
    }

    fn in_group(&self, joined: &[Value], params: &[Value], key: &[Value]) -> Result<bool> {
        for predicate in self.join.iter().chain(self.filter.iter()) {
            if !predicate.is_satisfied(joined, params)? {
                return Ok(false);
            }
        }
        for (expr, expected) in self.group_by.iter().zip(key) {
            if expr.eval(joined, params)?.cmp(expected) != Ordering::Equal {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for MinMaxFallbackPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinMaxFallbackPlan")
            .field("tables", &self.tables)
            .field("kind", &self.kind)
            .finish()
    }
}

impl QueryPlan for MinMaxFallbackPlan {
    fn execute(&self, registry: &TableRegistry) -> Result<Vec<Row>> {
        let params = registry.params();
        let width = self.group_by.len();
        if params.len() <= width {
            return Err(Error::evaluation(format!(
                "fallback plan expects {} parameters, got {}",
                width + 1,
                params.len()
            )));
        }
        let (key, bound) = (&params[..width], &params[width]);

        let mut best: Option<Value> = None;
        for_each_joined(registry, &self.tables, &mut |joined: &[Value]| {
            if !self.in_group(joined, params, key)? {
                return Ok(());
            }
            let value = self.input.eval(joined, params)?;
            if value.is_null() || (!bound.is_null() && more_extreme(self.kind, &value, bound)) {
                return Ok(());
            }
            match &best {
                Some(current) if !more_extreme(self.kind, &value, current) => {}
                _ => best = Some(value),
            }
            Ok(())
        })?;
        Ok(vec![Row::new(vec![best.unwrap_or(Value::Null)])])
    }
}

/// Runs a fallback plan with the group key and removed value installed as
/// the run-time parameters. The previous parameters are always restored.
pub(crate) fn run_fallback_plan(
    registry: &mut TableRegistry,
    plan: &dyn QueryPlan,
    key: &[Value],
    removed: &Value,
) -> Result<Value> {
    let mut params = key.to_vec();
    params.push(removed.clone());
    let saved = registry.replace_params(params);
    let result = plan.execute(registry);
    registry.replace_params(saved);
    Ok(result?
        .into_iter()
        .next()
        .and_then(|row| row.into_values().into_iter().next())
        .unwrap_or(Value::Null))
}
