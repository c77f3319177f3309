//! Static metadata of an aggregate view.
//!
//! A view's destination row is laid out as the group-by values (columns
//! `0..g`) followed by one column per aggregate, in declaration order. Every
//! view carries a COUNT(*) column; when the user did not ask for one, the
//! builder appends a hidden one so that empty groups can be detected.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::{Table, TableBuilder};
use strata_core::{DataType, Error, Expr, Result};

/// Name of the COUNT(*) column added when the user did not declare one.
pub const HIDDEN_COUNT_COLUMN: &str = "_count_star";

/// Aggregate operator of one destination column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Sum,
    Count,
    CountStar,
    Min,
    Max,
}

impl AggregateKind {
    /// COUNT and COUNT(*) hold a non-null Int64.
    #[inline]
    pub fn is_count(&self) -> bool {
        matches!(self, AggregateKind::Count | AggregateKind::CountStar)
    }

    /// MIN and MAX may need a fallback recompute on delete.
    #[inline]
    pub fn is_extremum(&self) -> bool {
        matches!(self, AggregateKind::Min | AggregateKind::Max)
    }
}

/// One aggregate column: an operator and, except for COUNT(*), its input.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateColumn {
    kind: AggregateKind,
    input: Option<Expr>,
}

impl AggregateColumn {
    pub fn sum(input: Expr) -> Self {
        Self {
            kind: AggregateKind::Sum,
            input: Some(input),
        }
    }

    pub fn count(input: Expr) -> Self {
        Self {
            kind: AggregateKind::Count,
            input: Some(input),
        }
    }

    pub fn count_star() -> Self {
        Self {
            kind: AggregateKind::CountStar,
            input: None,
        }
    }

    pub fn min(input: Expr) -> Self {
        Self {
            kind: AggregateKind::Min,
            input: Some(input),
        }
    }

    pub fn max(input: Expr) -> Self {
        Self {
            kind: AggregateKind::Max,
            input: Some(input),
        }
    }

    #[inline]
    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    #[inline]
    pub fn input(&self) -> Option<&Expr> {
        self.input.as_ref()
    }
}

/// Group key, aggregates and filter of a view.
#[derive(Clone, Debug)]
pub struct ViewDefinition {
    name: String,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateColumn>,
    filter: Option<Expr>,
    count_star: usize,
    hidden_count_star: bool,
}

impl ViewDefinition {
    /// Starts a definition for the view `name`.
    pub fn builder(name: impl Into<String>) -> ViewDefinitionBuilder {
        ViewDefinitionBuilder {
            name: name.into(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            filter: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group-by expressions, evaluated against a source row.
    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    /// Number of group-by columns.
    #[inline]
    pub fn group_width(&self) -> usize {
        self.group_by.len()
    }

    /// Aggregates in destination order, including a hidden COUNT(*).
    pub fn aggregates(&self) -> &[AggregateColumn] {
        &self.aggregates
    }

    /// Row-level filter applied before a source row contributes.
    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    /// Destination column holding COUNT(*).
    #[inline]
    pub fn count_star_column(&self) -> usize {
        self.count_star
    }

    /// True if the COUNT(*) column was added by the builder.
    #[inline]
    pub fn has_hidden_count_star(&self) -> bool {
        self.hidden_count_star
    }

    /// Destination width: group-by columns plus aggregate columns.
    pub fn width(&self) -> usize {
        self.group_by.len() + self.aggregates.len()
    }

    /// Returns the aggregate stored in destination column `column`.
    pub fn aggregate_at(&self, column: usize) -> Option<&AggregateColumn> {
        column
            .checked_sub(self.group_by.len())
            .and_then(|i| self.aggregates.get(i))
    }

    /// Builds a destination table for this view.
    ///
    /// `group_columns` and `aggregate_columns` name and type the user-visible
    /// columns; a hidden COUNT(*) column is appended when needed. The group
    /// columns form the primary key.
    pub fn destination_schema(
        &self,
        table: &str,
        group_columns: &[(&str, DataType)],
        aggregate_columns: &[(&str, DataType)],
    ) -> Result<Table> {
        let visible = self.aggregates.len() - usize::from(self.hidden_count_star);
        if group_columns.len() != self.group_by.len() || aggregate_columns.len() != visible {
            return Err(Error::invalid_schema(format!(
                "view {} needs {} group and {} aggregate columns",
                self.name,
                self.group_by.len(),
                visible
            )));
        }

        let mut builder = TableBuilder::new(table)?;
        let mut nullable: Vec<&str> = Vec::new();
        for (name, data_type) in group_columns {
            builder = builder.add_column(*name, *data_type)?;
            nullable.push(name);
        }
        for ((name, data_type), aggregate) in aggregate_columns.iter().zip(&self.aggregates) {
            builder = builder.add_column(*name, *data_type)?;
            if !aggregate.kind().is_count() {
                nullable.push(name);
            }
        }
        if self.hidden_count_star {
            builder = builder.add_hidden_column(HIDDEN_COUNT_COLUMN, DataType::Int64)?;
        }
        builder = builder.add_nullable(&nullable);
        if !group_columns.is_empty() {
            let keys: Vec<&str> = group_columns.iter().map(|(n, _)| *n).collect();
            builder = builder.add_primary_key(&keys)?;
        }
        builder.build()
    }
}

/// Builder for [`ViewDefinition`].
pub struct ViewDefinitionBuilder {
    name: String,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateColumn>,
    filter: Option<Expr>,
}

impl ViewDefinitionBuilder {
    /// Appends a group-by expression.
    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    /// Appends a group-by source column.
    pub fn group_by_column(self, column: usize) -> Self {
        self.group_by(Expr::column(column))
    }

    /// Appends an aggregate column.
    pub fn aggregate(mut self, aggregate: AggregateColumn) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    /// Sets the row-level filter.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Validates the definition, adding a hidden COUNT(*) if none was declared.
    pub fn build(mut self) -> Result<ViewDefinition> {
        let stars = self
            .aggregates
            .iter()
            .filter(|a| a.kind() == AggregateKind::CountStar)
            .count();
        if stars > 1 {
            return Err(Error::invalid_schema(format!(
                "view {} declares COUNT(*) {} times",
                self.name, stars
            )));
        }
        if let Some(bad) = self
            .aggregates
            .iter()
            .find(|a| a.kind() != AggregateKind::CountStar && a.input().is_none())
        {
            return Err(Error::invalid_schema(format!(
                "{:?} in view {} has no input",
                bad.kind(),
                self.name
            )));
        }
        let hidden_count_star = stars == 0;
        if hidden_count_star {
            self.aggregates.push(AggregateColumn::count_star());
        }
        let count_star = self.group_by.len()
            + self
                .aggregates
                .iter()
                .position(|a| a.kind() == AggregateKind::CountStar)
                .unwrap_or(0);
        Ok(ViewDefinition {
            name: self.name,
            group_by: self.group_by,
            aggregates: self.aggregates,
            filter: self.filter,
            count_star,
            hidden_count_star,
        })
    }
}
