//! The seam between row stores and view maintenance.
//!
//! Storage knows nothing about aggregates. A view is a [`ViewMaintainer`]
//! attached to its source tables; after each mutation of a source the
//! registry hands it the changed image and a mutable borrow of itself so the
//! view can rewrite its destination table through the normal protocol.

use crate::registry::{TableId, TableRegistry};
use strata_core::{Result, Row, TupleId};

/// How a view is attached to its sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    /// Fed by exactly one source, merged directly from the changed row.
    SingleTable,
    /// Fed by several sources, merged by running a plan against the delta table.
    MultiTable,
}

/// A materialized view kept in step with its source tables.
pub trait ViewMaintainer: Send + Sync {
    /// Unique view name.
    fn name(&self) -> &str;

    fn kind(&self) -> ViewKind;

    /// Tables whose mutations feed the view.
    fn sources(&self) -> &[TableId];

    /// Table holding the aggregate rows.
    fn destination(&self) -> TableId;

    /// Merges a row that was just inserted into `source`.
    fn on_insert(
        &self,
        registry: &mut TableRegistry,
        source: TableId,
        tuple: TupleId,
        row: &Row,
    ) -> Result<()>;

    /// Merges a row that was just deleted from `source`.
    fn on_delete(
        &self,
        registry: &mut TableRegistry,
        source: TableId,
        tuple: TupleId,
        row: &Row,
    ) -> Result<()>;

    /// Folds every row already present in the sources into the destination.
    fn catch_up(&self, registry: &mut TableRegistry) -> Result<()>;
}
