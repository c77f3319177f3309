//! Row storage for a single table.
//!
//! `RowStore` owns a table's tuple blocks, its indexes in declaration order,
//! the optional delta table and the views attached to it. It exposes the
//! individual steps of the mutation protocol; sequencing them together with
//! the change log, undo log and view propagation is done by
//! [`TableRegistry`](crate::TableRegistry).

use crate::delta::DeltaTable;
use crate::stats::TableStats;
use crate::tuple::{TupleFlags, TupleStorage};
use crate::fatal;
use crate::view::ViewMaintainer;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::schema::{IndexType, Table};
use strata_core::{Error, Result, Row, TupleId, Value};
use strata_index::{IndexError, TableIndex};
use tracing::debug;

/// Which indexes an update maintains.
///
/// Positions refer to the table's index declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexSelection {
    #[default]
    All,
    /// Every index except the listed positions.
    AllExcept(Vec<usize>),
}

impl IndexSelection {
    /// Returns true if the index at `position` is maintained.
    pub fn includes(&self, position: usize) -> bool {
        match self {
            IndexSelection::All => true,
            IndexSelection::AllExcept(skip) => !skip.contains(&position),
        }
    }
}

/// Rows handed out by one step of a background scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanBatch {
    pub rows: Vec<(TupleId, Row)>,
    /// The scan passed the last slot and was closed.
    pub finished: bool,
}

#[derive(Clone, Copy, Debug)]
struct BackgroundScan {
    /// Next slot to visit; `None` once past the end.
    next: Option<TupleId>,
}

impl BackgroundScan {
    fn has_passed(&self, tuple: TupleId) -> bool {
        self.next.map_or(true, |next| tuple < next)
    }
}

/// Row storage for a single table.
pub struct RowStore {
    schema: Table,
    pub(crate) tuples: TupleStorage,
    indexes: Vec<TableIndex>,
    pub(crate) delta: Option<DeltaTable>,
    pub(crate) delta_mode: bool,
    pub(crate) triggers: Vec<Arc<dyn ViewMaintainer>>,
    pub(crate) handlers: Vec<Arc<dyn ViewMaintainer>>,
    scan: Option<BackgroundScan>,
    /// Pre-update images of tuples the open scan has not reached yet.
    scan_images: HashMap<TupleId, Row>,
    pub(crate) inserts: u64,
    pub(crate) updates: u64,
    pub(crate) deletes: u64,
}

impl RowStore {
    /// Creates an empty row store for `schema`.
    pub fn new(schema: Table, tuples_per_block: u32) -> Self {
        let indexes = schema
            .indices()
            .iter()
            .enumerate()
            .map(|(position, def)| {
                let hashed = cfg!(feature = "hash-primary-key")
                    && schema.primary_key_position() == Some(position);
                if hashed {
                    TableIndex::new(def.clone().index_type(IndexType::Hash))
                } else {
                    TableIndex::new(def.clone())
                }
            })
            .collect();
        Self {
            schema,
            tuples: TupleStorage::new(tuples_per_block),
            indexes,
            delta: None,
            delta_mode: false,
            triggers: Vec::new(),
            handlers: Vec::new(),
            scan: None,
            scan_images: HashMap::new(),
            inserts: 0,
            updates: 0,
            deletes: 0,
        }
    }

    /// Returns the table schema.
    #[inline]
    pub fn schema(&self) -> &Table {
        &self.schema
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the indexes in declaration order.
    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.iter().find(|ix| ix.name() == name)
    }

    /// Returns the primary-key index, if the table has one.
    pub fn primary_key_index(&self) -> Option<&TableIndex> {
        self.schema
            .primary_key_position()
            .and_then(|p| self.indexes.get(p))
    }

    /// Returns the row of a live tuple.
    pub fn get(&self, tuple: TupleId) -> Option<&Row> {
        self.tuples.live_row(tuple)
    }

    /// Returns the header flags of an allocated tuple.
    pub fn flags(&self, tuple: TupleId) -> Option<TupleFlags> {
        self.tuples.flags(tuple)
    }

    /// Iterates live tuples in storage order, ignoring delta mode.
    pub fn iter(&self) -> impl Iterator<Item = (TupleId, &Row)> + '_ {
        self.tuples.iter()
    }

    /// Number of live tuples.
    pub fn len(&self) -> usize {
        self.tuples.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the delta table, present while a multi-table view is attached.
    pub fn delta(&self) -> Option<&DeltaTable> {
        self.delta.as_ref()
    }

    /// Returns true if any view is attached to this table.
    pub fn has_views(&self) -> bool {
        !self.triggers.is_empty() || !self.handlers.is_empty()
    }

    /// Returns the attached single-table view triggers.
    pub fn triggers(&self) -> &[Arc<dyn ViewMaintainer>] {
        &self.triggers
    }

    /// Returns the attached multi-table view handlers.
    pub fn handlers(&self) -> &[Arc<dyn ViewMaintainer>] {
        &self.handlers
    }

    /// Returns the storage counters.
    pub fn stats(&self) -> TableStats {
        TableStats {
            inserts: self.inserts,
            updates: self.updates,
            deletes: self.deletes,
            live_tuples: self.tuples.live_count(),
            allocated_tuples: self.tuples.allocated_count(),
            blocks: self.tuples.block_count(),
            indexes: self.indexes.len(),
        }
    }

    /// Order-independent digest of every live row.
    pub fn content_hash(&self) -> u64 {
        self.tuples
            .iter()
            .fold(0u64, |acc, (_, row)| acc.wrapping_add(row.digest()))
    }

    /// Value of the partitioning column, or `Null` for unpartitioned tables.
    pub fn partition_key(&self, row: &Row) -> Value {
        self.schema
            .partition_column()
            .and_then(|c| row.get(c).cloned())
            .unwrap_or(Value::Null)
    }

    /// Rejects rows of the wrong width or with values of the wrong type.
    pub fn check_shape(&self, row: &Row) -> Result<()> {
        if row.len() != self.schema.width() {
            return Err(Error::invalid_operation(format!(
                "{} expects {} columns, got {}",
                self.name(),
                self.schema.width(),
                row.len()
            )));
        }
        for (column, value) in self.schema.columns().iter().zip(row.values()) {
            if !value.conforms_to(column.data_type()) {
                let got = value.data_type().unwrap_or(column.data_type());
                return Err(Error::type_mismatch(column.data_type(), got));
            }
        }
        Ok(())
    }

    /// NOT NULL and, when `partitioning` is set, PARTITIONING checks.
    pub fn check_constraints(&self, row: &Row, partitioning: Option<(u32, u32)>) -> Result<()> {
        for column in self.schema.not_null_columns() {
            if row.get(column.index()).map_or(true, Value::is_null) {
                return Err(Error::not_null(self.name(), column.name(), row.clone()));
            }
        }
        if let (Some(pc), Some((id, count))) = (self.schema.partition_column(), partitioning) {
            let key = row.get(pc).unwrap_or(&Value::Null);
            if (key.partition_hash() % u64::from(count)) as u32 != id {
                let column = self.schema.columns()[pc].name();
                return Err(Error::partitioning(self.name(), column, row.clone()));
            }
        }
        Ok(())
    }

    fn index_error(&self, position: usize, err: IndexError, row: &Row) -> Error {
        let index = &self.indexes[position];
        match err {
            IndexError::DuplicateKey { existing } => {
                debug!(table = self.name(), index = index.name(), %existing, "unique conflict");
                Error::unique(
                    self.name(),
                    index.name(),
                    row.clone(),
                    self.tuples.row(existing).cloned(),
                )
            }
            IndexError::KeyNotFound => fatal(format!(
                "index {} of {} has no entry for {:?}",
                index.name(),
                self.name(),
                row
            )),
            IndexError::Evaluation(e) => e,
        }
    }

    /// Adds `tuple` to every index in declaration order. On the first failure
    /// the indexes already updated are rolled back and the error returned.
    pub fn add_to_indexes(&mut self, tuple: TupleId, row: &Row) -> Result<()> {
        for position in 0..self.indexes.len() {
            if let Err(err) = self.indexes[position].add(row.values(), tuple) {
                let error = self.index_error(position, err, row);
                for earlier in self.indexes[..position].iter_mut().rev() {
                    earlier
                        .delete(row.values(), tuple)
                        .map_err(|_| {
                            fatal(format!("rollback of {} lost entry {}", earlier.name(), tuple))
                        })?;
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Removes `tuple` from every index. A missing entry is fatal.
    pub fn remove_from_indexes(&mut self, tuple: TupleId, row: &Row) -> Result<()> {
        for position in 0..self.indexes.len() {
            if let Err(err) = self.indexes[position].delete(row.values(), tuple) {
                return Err(self.index_error(position, err, row));
            }
        }
        Ok(())
    }

    /// Checks every selected unique index whose key changes from `old` to
    /// `new` for a holder other than `tuple`.
    pub fn check_unique_for_update(
        &self,
        tuple: TupleId,
        old: &Row,
        new: &Row,
        selection: &IndexSelection,
    ) -> Result<()> {
        for (position, index) in self.indexes.iter().enumerate() {
            if !index.is_unique() || !selection.includes(position) {
                continue;
            }
            if !index.key_changed(old.values(), new.values())? {
                continue;
            }
            let conflict = index
                .find_conflict(new.values(), Some(tuple))
                .map_err(|e| self.index_error(position, e, new))?;
            if let Some(existing) = conflict {
                return Err(self.index_error(position, IndexError::DuplicateKey { existing }, new));
            }
        }
        Ok(())
    }

    /// Moves `tuple`'s entries from the `old` key to the `new` key in every
    /// selected index whose key changes. On failure the moved entries are put
    /// back before the error is returned.
    pub fn move_index_entries(
        &mut self,
        tuple: TupleId,
        old: &Row,
        new: &Row,
        selection: &IndexSelection,
    ) -> Result<()> {
        let mut moved = Vec::new();
        let mut failure = None;
        for position in 0..self.indexes.len() {
            if !selection.includes(position) {
                continue;
            }
            let index = &mut self.indexes[position];
            match index.key_changed(old.values(), new.values()) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            if let Err(err) = index.delete(old.values(), tuple) {
                failure = Some(self.index_error(position, err, old));
                break;
            }
            if let Err(err) = self.indexes[position].add(new.values(), tuple) {
                failure = Some(self.index_error(position, err, new));
                self.indexes[position]
                    .add(old.values(), tuple)
                    .map_err(|_| fatal(format!("cannot restore {} entry {}", self.name(), tuple)))?;
                break;
            }
            moved.push(position);
        }
        let Some(error) = failure else {
            return Ok(());
        };
        for position in moved.into_iter().rev() {
            let index = &mut self.indexes[position];
            let restored = index
                .delete(new.values(), tuple)
                .and_then(|_| index.add(old.values(), tuple));
            if restored.is_err() {
                return Err(fatal(format!(
                    "cannot restore index {} of {} after failed update",
                    index.name(),
                    self.schema.name()
                )));
            }
        }
        Err(error)
    }

    /// Returns true while a background scan is open.
    pub fn scan_active(&self) -> bool {
        self.scan.is_some()
    }

    /// Returns true if an open background scan has not reached `tuple` yet.
    pub(crate) fn scan_pending(&self, tuple: TupleId) -> bool {
        self.scan.map_or(false, |s| !s.has_passed(tuple))
    }

    /// Keeps the image an open scan must still return for `tuple` before it
    /// is rewritten. Only the first rewrite ahead of the cursor is kept.
    pub(crate) fn preserve_for_scan(&mut self, tuple: TupleId, image: &Row) {
        let dirty = self.tuples.flags(tuple).map_or(true, |f| f.is_dirty());
        if !dirty && self.scan_pending(tuple) {
            self.scan_images.entry(tuple).or_insert_with(|| image.clone());
        }
    }

    pub(crate) fn begin_scan(&mut self) -> Result<()> {
        if self.scan.is_some() {
            return Err(Error::invalid_operation(format!(
                "background scan already running on {}",
                self.name()
            )));
        }
        let first = TupleId::new(0, 0);
        self.scan = Some(BackgroundScan {
            next: self.tuples.contains_slot(first).then_some(first),
        });
        Ok(())
    }

    /// Visits up to `max_rows` slots worth of rows. Skips dirty tuples,
    /// returns tuples updated ahead of the cursor as they were when the scan
    /// began, reclaims tuples whose delete was released ahead of the cursor,
    /// and closes the scan at the end of storage.
    pub(crate) fn advance_scan(&mut self, max_rows: usize) -> Result<ScanBatch> {
        let mut scan = self.scan.ok_or_else(|| {
            Error::invalid_operation(format!("no background scan running on {}", self.name()))
        })?;
        let mut batch = ScanBatch::default();
        while batch.rows.len() < max_rows {
            let Some(id) = scan.next else { break };
            if let Some(flags) = self.tuples.flags(id) {
                let saved = self.scan_images.remove(&id);
                if !flags.is_dirty() {
                    if let Some(row) = saved.or_else(|| self.tuples.row(id).cloned()) {
                        batch.rows.push((id, row));
                    }
                }
                if flags.is_pending_delete_on_undo_release() {
                    self.tuples.release(id);
                }
            }
            scan.next = self.tuples.next_slot(id);
        }
        if scan.next.is_none() {
            let dirty: Vec<TupleId> = self
                .tuples
                .iter_allocated()
                .filter(|(_, flags, _)| flags.is_dirty())
                .map(|(id, _, _)| id)
                .collect();
            for id in dirty {
                self.tuples.set_flag(id, TupleFlags::DIRTY, false);
            }
            self.scan = None;
            self.scan_images.clear();
            batch.finished = true;
        } else {
            self.scan = Some(scan);
        }
        Ok(batch)
    }
}
