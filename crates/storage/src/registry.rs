//! Table registry and the mutation protocol.
//!
//! `TableRegistry` owns every [`RowStore`] of one partition in an arena keyed
//! by [`TableId`], together with the undo log, the change log, the run-time
//! parameters and the attached views. Every insert, update and delete goes
//! through it so that constraint checks, the change-log append, index
//! maintenance, undo registration and view propagation always happen in the
//! same order.
//!
//! Views receive `&mut TableRegistry` and rewrite their destination table by
//! calling back into the same protocol. A view may not feed another view, so
//! propagation never nests more than one level.

use crate::changelog::{ChangeLog, LogPosition, MemoryChangeLog};
use crate::config::StorageConfig;
use crate::delta::DeltaTable;
use crate::fatal;
use crate::row_store::{IndexSelection, RowStore, ScanBatch};
use crate::stats::TableStats;
use crate::tuple::TupleFlags;
use crate::undo::{UndoAction, UndoLog, UndoOutcome, UndoToken, UpdateImage};
use crate::view::{ViewKind, ViewMaintainer};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use strata_core::schema::Table;
use strata_core::{Error, Result, Row, TupleId, Value};
use tracing::{debug, trace, warn};

/// Handle of a table inside one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(u32);

impl TableId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Change {
    Insert,
    Delete,
}

type Scan<'a> = Box<dyn Iterator<Item = (TupleId, &'a Row)> + 'a>;

/// Owns the tables of one partition and drives every mutation.
pub struct TableRegistry {
    config: StorageConfig,
    tables: Vec<Option<RowStore>>,
    names: BTreeMap<String, TableId>,
    views: Vec<Arc<dyn ViewMaintainer>>,
    undo: UndoLog,
    change_log: Box<dyn ChangeLog>,
    params: Vec<Value>,
    view_depth: u32,
}

fn store<'a>(tables: &'a [Option<RowStore>], id: TableId) -> Result<&'a RowStore> {
    tables
        .get(id.0 as usize)
        .and_then(Option::as_ref)
        .ok_or_else(|| Error::table_not_found(id.to_string()))
}

fn store_mut<'a>(tables: &'a mut [Option<RowStore>], id: TableId) -> Result<&'a mut RowStore> {
    tables
        .get_mut(id.0 as usize)
        .and_then(Option::as_mut)
        .ok_or_else(|| Error::table_not_found(id.to_string()))
}

/// Drops a change-log mark the failing step registered, truncating the log.
fn unwind_mark(
    undo: &mut UndoLog,
    log: &mut dyn ChangeLog,
    mark: Option<LogPosition>,
) -> Result<()> {
    if let Some(position) = mark {
        undo.retract_last();
        log.rollback_to(position)?;
    }
    Ok(())
}

impl TableRegistry {
    /// Creates a registry that buffers its change log in memory.
    pub fn new(config: StorageConfig) -> Self {
        Self::with_change_log(config, Box::new(MemoryChangeLog::new()))
    }

    /// Creates a registry appending to `change_log`.
    pub fn with_change_log(config: StorageConfig, change_log: Box<dyn ChangeLog>) -> Self {
        Self {
            config,
            tables: Vec::new(),
            names: BTreeMap::new(),
            views: Vec::new(),
            undo: UndoLog::new(),
            change_log,
            params: Vec::new(),
            view_depth: 0,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // ---- catalog ---------------------------------------------------------

    /// Creates a table and returns its handle.
    pub fn create_table(&mut self, schema: Table) -> Result<TableId> {
        let name = schema.name().to_string();
        if self.names.contains_key(&name) {
            return Err(Error::invalid_schema(format!("Table already exists: {}", name)));
        }
        let id = TableId(self.tables.len() as u32);
        self.tables
            .push(Some(RowStore::new(schema, self.config.tuples_per_block())));
        self.names.insert(name, id);
        debug!(table = %id, "created table");
        Ok(id)
    }

    /// Drops a table no view reads from or writes to.
    pub fn drop_table(&mut self, id: TableId) -> Result<()> {
        let name = store(&self.tables, id)?.name().to_string();
        if self
            .views
            .iter()
            .any(|v| v.destination() == id || v.sources().contains(&id))
        {
            return Err(Error::invalid_operation(format!(
                "table {} is referenced by a view",
                name
            )));
        }
        self.tables[id.0 as usize] = None;
        self.names.remove(&name);
        Ok(())
    }

    /// Resolves a table name.
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    /// Returns all table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.names.keys().map(|s| s.as_str()).collect()
    }

    /// Borrows a table.
    pub fn table(&self, id: TableId) -> Result<&RowStore> {
        store(&self.tables, id)
    }

    // ---- reads -----------------------------------------------------------

    /// Returns the row of a live tuple.
    pub fn get(&self, table: TableId, tuple: TupleId) -> Result<Option<&Row>> {
        Ok(store(&self.tables, table)?.get(tuple))
    }

    /// Scans a table. In delta mode only the delta row is visible.
    pub fn scan(&self, table: TableId) -> Result<Scan<'_>> {
        let store = store(&self.tables, table)?;
        if store.delta_mode {
            let entry = store.delta.as_ref().and_then(DeltaTable::entry);
            return Ok(Box::new(entry.into_iter()));
        }
        Ok(Box::new(store.iter()))
    }

    /// Finds the live tuple matching `pattern`: by primary key when the table
    /// has one, otherwise by comparing every column.
    pub fn lookup_by_primary_key_or_scan(
        &self,
        table: TableId,
        pattern: &Row,
    ) -> Result<Option<TupleId>> {
        let store = store(&self.tables, table)?;
        if let Some(pk) = store.primary_key_index() {
            let key = pk.key_of(pattern.values())?;
            return Ok(pk
                .lookup(&key)
                .into_iter()
                .find(|t| store.get(*t).is_some()));
        }
        Ok(store.iter().find(|(_, row)| *row == pattern).map(|(t, _)| t))
    }

    /// Order-independent digest of a table's live rows.
    pub fn content_hash(&self, table: TableId) -> Result<u64> {
        Ok(store(&self.tables, table)?.content_hash())
    }

    pub fn stats(&self, table: TableId) -> Result<TableStats> {
        Ok(store(&self.tables, table)?.stats())
    }

    // ---- run-time parameters ----------------------------------------------

    /// Parameters visible to plans.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn set_params(&mut self, params: Vec<Value>) {
        self.params = params;
    }

    /// Installs `params` and returns the ones they replace.
    pub fn replace_params(&mut self, params: Vec<Value>) -> Vec<Value> {
        core::mem::replace(&mut self.params, params)
    }

    // ---- change log ----------------------------------------------------------

    pub fn change_log(&self) -> &dyn ChangeLog {
        self.change_log.as_ref()
    }

    /// Position the next change-log record will start at.
    pub fn change_log_position(&self) -> LogPosition {
        self.change_log.position()
    }

    // ---- undo --------------------------------------------------------------

    /// Opens a new undo scope.
    pub fn begin(&mut self) -> UndoToken {
        self.undo.begin()
    }

    pub fn current_token(&self) -> UndoToken {
        self.undo.current_token()
    }

    /// Registers an externally built undo action under the current token.
    pub fn register(&mut self, action: UndoAction) {
        self.undo.register(action);
    }

    /// Number of undo actions not yet released or undone.
    pub fn pending_undo(&self) -> usize {
        self.undo.len()
    }

    /// Commits every action at or below `token`.
    pub fn release(&mut self, token: UndoToken) -> Result<()> {
        for action in self.undo.take_released(token) {
            self.finalize(action, UndoOutcome::Released)?;
        }
        Ok(())
    }

    /// Reverses every action at or above `token`, newest first.
    pub fn undo(&mut self, token: UndoToken) -> Result<()> {
        let actions = self.undo.take_undone(token);
        trace!(token, actions = actions.len(), "undo");
        for action in actions {
            self.finalize(action, UndoOutcome::Undone)?;
        }
        Ok(())
    }

    fn finalize(&mut self, action: UndoAction, outcome: UndoOutcome) -> Result<()> {
        match action {
            UndoAction::ChangeLogMark { position } => {
                if outcome == UndoOutcome::Undone {
                    self.change_log.rollback_to(position)?;
                }
                Ok(())
            }
            UndoAction::Insert { table, tuple } => {
                if outcome == UndoOutcome::Released {
                    return Ok(());
                }
                let store = store_mut(&mut self.tables, table)?;
                let row = store
                    .tuples
                    .live_row(tuple)
                    .cloned()
                    .ok_or_else(|| {
                        fatal(format!(
                            "undo of insert {} into {}: tuple gone",
                            tuple,
                            store.name()
                        ))
                    })?;
                store.remove_from_indexes(tuple, &row)?;
                store.tuples.release(tuple);
                Ok(())
            }
            UndoAction::Update {
                table,
                tuple,
                image,
                indexes,
            } => {
                if outcome == UndoOutcome::Released {
                    drop(image.resolve(outcome));
                    return Ok(());
                }
                let store = store_mut(&mut self.tables, table)?;
                store.move_index_entries(tuple, image.new_image(), image.old(), &indexes)?;
                let restored = image.resolve(outcome);
                store
                    .tuples
                    .replace(tuple, restored)
                    .ok_or_else(|| {
                        fatal(format!(
                            "undo of update {} in {}: tuple gone",
                            tuple,
                            store.name()
                        ))
                    })?;
                Ok(())
            }
            UndoAction::Delete { table, tuple, image } => {
                let store = store_mut(&mut self.tables, table)?;
                let flags = store
                    .tuples
                    .flags(tuple)
                    .ok_or_else(|| {
                        fatal(format!(
                            "delete of {} in {}: slot reclaimed early",
                            tuple,
                            store.name()
                        ))
                    })?;
                match outcome {
                    UndoOutcome::Released => {
                        if store.scan_pending(tuple) && !flags.is_dirty() {
                            store
                                .tuples
                                .set_flag(tuple, TupleFlags::PENDING_DELETE_ON_UNDO_RELEASE, true);
                        } else {
                            store.tuples.release(tuple);
                        }
                    }
                    UndoOutcome::Undone => {
                        store.add_to_indexes(tuple, &image).map_err(|e| {
                            fatal(format!("undo of delete {} in {}: {}", tuple, store.name(), e))
                        })?;
                        store.tuples.set_flag(tuple, TupleFlags::PENDING_DELETE, false);
                    }
                }
                Ok(())
            }
            UndoAction::External(action) => action.finalize(outcome),
        }
    }

    // ---- mutation protocol --------------------------------------------------

    /// Inserts `row` into `table`.
    ///
    /// On a constraint violation nothing is left behind: the slot, the
    /// change-log record and any index entries already added are rolled back.
    /// Errors raised by view maintenance leave the table changed; the caller
    /// undoes the enclosing token.
    pub fn insert(&mut self, table: TableId, row: Row) -> Result<TupleId> {
        let partitioning = self.config.partitioning();
        let logging = self.config.change_logging();
        let store = store_mut(&mut self.tables, table)?;
        store.check_shape(&row)?;

        let tuple = store.tuples.allocate(row.clone());
        if let Err(e) = store.check_constraints(&row, partitioning) {
            store.tuples.release(tuple);
            return Err(e);
        }

        let mark = if logging {
            let key = store.partition_key(&row);
            match self.change_log.append_insert(store.schema().signature(), &key, &row) {
                Ok(position) => {
                    self.undo.register(UndoAction::ChangeLogMark { position });
                    Some(position)
                }
                Err(e) => {
                    store.tuples.release(tuple);
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Err(e) = store.add_to_indexes(tuple, &row) {
            store.tuples.release(tuple);
            unwind_mark(&mut self.undo, self.change_log.as_mut(), mark)?;
            return Err(e);
        }

        if store.scan_active() {
            store.tuples.set_flag(tuple, TupleFlags::DIRTY, true);
        }
        store.inserts += 1;
        trace!(table = store.name(), %tuple, "insert");
        self.undo.register(UndoAction::Insert { table, tuple });

        self.propagate(table, tuple, &row, Change::Insert)?;
        Ok(tuple)
    }

    /// Rewrites `tuple` in place with `row`, maintaining the indexes chosen by
    /// `indexes`. Indexes left out must not have a key change.
    pub fn update(
        &mut self,
        table: TableId,
        tuple: TupleId,
        row: Row,
        indexes: IndexSelection,
    ) -> Result<()> {
        let partitioning = self.config.partitioning();
        let logging = self.config.change_logging();
        let store = store_mut(&mut self.tables, table)?;
        let old = store
            .get(tuple)
            .cloned()
            .ok_or_else(|| {
                fatal(format!(
                    "update of {} in {}: tuple is not live",
                    tuple,
                    store.name()
                ))
            })?;
        store.check_shape(&row)?;
        store.check_constraints(&row, partitioning)?;
        store.check_unique_for_update(tuple, &old, &row, &indexes)?;

        let mark = if logging {
            let key = store.partition_key(&row);
            let position = self
                .change_log
                .append_update(store.schema().signature(), &key, &old, &row)?;
            self.undo.register(UndoAction::ChangeLogMark { position });
            Some(position)
        } else {
            None
        };

        if let Err(e) = store.move_index_entries(tuple, &old, &row, &indexes) {
            unwind_mark(&mut self.undo, self.change_log.as_mut(), mark)?;
            return Err(e);
        }
        store.preserve_for_scan(tuple, &old);
        store.tuples.replace(tuple, row.clone());
        store.updates += 1;
        trace!(table = store.name(), %tuple, "update");
        self.undo.register(UndoAction::Update {
            table,
            tuple,
            image: UpdateImage::new(old.clone(), row.clone()),
            indexes,
        });

        self.propagate(table, tuple, &old, Change::Delete)?;
        self.propagate(table, tuple, &row, Change::Insert)
    }

    /// Deletes `tuple`. The slot stays allocated as pending-delete until the
    /// undo action is released.
    pub fn delete(&mut self, table: TableId, tuple: TupleId) -> Result<()> {
        let logging = self.config.change_logging();
        let store = store_mut(&mut self.tables, table)?;
        let row = store
            .get(tuple)
            .cloned()
            .ok_or_else(|| {
                fatal(format!(
                    "delete of {} in {}: tuple is not live",
                    tuple,
                    store.name()
                ))
            })?;

        let mark = if logging {
            let key = store.partition_key(&row);
            let position = self
                .change_log
                .append_delete(store.schema().signature(), &key, &row)?;
            self.undo.register(UndoAction::ChangeLogMark { position });
            Some(position)
        } else {
            None
        };

        if let Err(e) = store.remove_from_indexes(tuple, &row) {
            unwind_mark(&mut self.undo, self.change_log.as_mut(), mark)?;
            return Err(e);
        }
        store.tuples.set_flag(tuple, TupleFlags::PENDING_DELETE, true);
        store.deletes += 1;
        trace!(table = store.name(), %tuple, "delete");
        self.undo.register(UndoAction::Delete {
            table,
            tuple,
            image: row.clone(),
        });

        self.propagate(table, tuple, &row, Change::Delete)
    }

    /// Deletes every live tuple of `table` through the full protocol.
    /// Returns the number of tuples deleted.
    pub fn delete_all_tuples(&mut self, table: TableId) -> Result<usize> {
        let tuples: Vec<TupleId> = store(&self.tables, table)?.iter().map(|(t, _)| t).collect();
        for tuple in &tuples {
            self.delete(table, *tuple)?;
        }
        debug!(table = %table, deleted = tuples.len(), "truncated");
        Ok(tuples.len())
    }

    fn propagate(
        &mut self,
        table: TableId,
        tuple: TupleId,
        row: &Row,
        change: Change,
    ) -> Result<()> {
        let store = store_mut(&mut self.tables, table)?;
        if let Some(delta) = store.delta.as_mut() {
            delta.set(tuple, row.clone());
        }
        if !store.has_views() {
            return Ok(());
        }
        let views: Vec<Arc<dyn ViewMaintainer>> = store
            .triggers
            .iter()
            .chain(store.handlers.iter())
            .cloned()
            .collect();
        if self.view_depth > 0 {
            return Err(fatal(format!(
                "view maintenance re-entered through table {}",
                store.name()
            )));
        }

        self.view_depth += 1;
        let result = views.iter().try_for_each(|view| match change {
            Change::Insert => view.on_insert(self, table, tuple, row),
            Change::Delete => view.on_delete(self, table, tuple, row),
        });
        self.view_depth -= 1;
        result
    }

    // ---- delta mode ---------------------------------------------------------

    /// Runs `f` with `table` in delta mode: scans of it see only the delta row.
    /// Delta mode is switched off again whether or not `f` succeeds.
    pub fn with_delta_mode<T>(
        &mut self,
        table: TableId,
        f: impl FnOnce(&mut TableRegistry) -> Result<T>,
    ) -> Result<T> {
        let store = store_mut(&mut self.tables, table)?;
        if store.delta.is_none() {
            return Err(Error::invalid_operation(format!(
                "table {} has no delta table",
                store.name()
            )));
        }
        store.delta_mode = true;
        let result = f(self);
        if let Ok(store) = store_mut(&mut self.tables, table) {
            store.delta_mode = false;
        }
        result
    }

    // ---- background scan ------------------------------------------------------

    /// Opens a background scan over `table`. Tuples inserted while it runs
    /// are not returned; tuples deleted ahead of the cursor still are, and
    /// tuples updated ahead of it come back with their pre-update image.
    pub fn begin_background_scan(&mut self, table: TableId) -> Result<()> {
        store_mut(&mut self.tables, table)?.begin_scan()
    }

    /// Returns up to `max_rows` further rows of the open background scan.
    pub fn advance_background_scan(
        &mut self,
        table: TableId,
        max_rows: usize,
    ) -> Result<ScanBatch> {
        store_mut(&mut self.tables, table)?.advance_scan(max_rows)
    }

    // ---- views ------------------------------------------------------------------

    /// Looks up an attached view by name.
    pub fn view(&self, name: &str) -> Option<&Arc<dyn ViewMaintainer>> {
        self.views.iter().find(|v| v.name() == name)
    }

    /// Returns the names of attached views.
    pub fn view_names(&self) -> Vec<&str> {
        self.views.iter().map(|v| v.name()).collect()
    }

    fn reject(&self, view: &dyn ViewMaintainer, reason: String) -> Error {
        warn!(view = view.name(), %reason, "view attachment rejected");
        Error::invalid_operation(format!("cannot attach view {}: {}", view.name(), reason))
    }

    fn check_view_graph(&self, view: &dyn ViewMaintainer, kind: ViewKind) -> Result<()> {
        if view.kind() != kind {
            return Err(self.reject(view, format!("expected a {:?} view", kind)));
        }
        if self.view(view.name()).is_some() {
            return Err(self.reject(view, "name already in use".into()));
        }
        let sources = view.sources().len();
        if sources == 0 || (kind == ViewKind::SingleTable && sources != 1) {
            return Err(self.reject(view, format!("{} source tables", sources)));
        }
        let destination = view.destination();
        let dest = store(&self.tables, destination)?;
        if dest.has_views() {
            let reason = format!("destination {} feeds another view", dest.name());
            return Err(self.reject(view, reason));
        }
        if self.views.iter().any(|v| v.destination() == destination) {
            let reason = format!("destination {} already maintained", dest.name());
            return Err(self.reject(view, reason));
        }
        for source in view.sources() {
            let src = store(&self.tables, *source)?;
            if *source == destination || self.views.iter().any(|v| v.destination() == *source) {
                let reason = format!("source {} is a view destination", src.name());
                return Err(self.reject(view, reason));
            }
        }
        Ok(())
    }

    /// Attaches a view fed by exactly one source table.
    pub fn attach_single_table_view(&mut self, view: Arc<dyn ViewMaintainer>) -> Result<()> {
        self.check_view_graph(view.as_ref(), ViewKind::SingleTable)?;
        let source = view.sources()[0];
        store_mut(&mut self.tables, source)?.triggers.push(view.clone());
        debug!(view = view.name(), source = %source, "attached single-table view");
        self.views.push(view);
        Ok(())
    }

    /// Attaches a view fed by several source tables. Each source gets a delta
    /// table if it has none yet.
    pub fn attach_multi_table_view(&mut self, view: Arc<dyn ViewMaintainer>) -> Result<()> {
        self.check_view_graph(view.as_ref(), ViewKind::MultiTable)?;
        let mut sources: Vec<TableId> = view.sources().to_vec();
        sources.sort();
        sources.dedup();
        for source in sources {
            let store = store_mut(&mut self.tables, source)?;
            store.handlers.push(view.clone());
            if store.delta.is_none() {
                store.delta = Some(DeltaTable::new());
            }
        }
        debug!(view = view.name(), "attached multi-table view");
        self.views.push(view);
        Ok(())
    }

    /// Detaches a view. A source's delta table is dropped with its last handler.
    pub fn detach_view(&mut self, name: &str) -> Result<Arc<dyn ViewMaintainer>> {
        let position = self
            .views
            .iter()
            .position(|v| v.name() == name)
            .ok_or_else(|| Error::view_not_found(name))?;
        let view = self.views.remove(position);
        for source in view.sources() {
            if let Ok(store) = store_mut(&mut self.tables, *source) {
                store.triggers.retain(|v| v.name() != name);
                store.handlers.retain(|v| v.name() != name);
                if store.handlers.is_empty() {
                    store.delta = None;
                    store.delta_mode = false;
                }
            }
        }
        debug!(view = name, "detached view");
        Ok(view)
    }

    /// Folds the rows already present in a view's sources into its destination.
    pub fn catch_up_with_existing_data(&mut self, name: &str) -> Result<()> {
        let view = self.view(name).cloned().ok_or_else(|| Error::view_not_found(name))?;
        self.view_depth += 1;
        let result = view.catch_up(self);
        self.view_depth -= 1;
        result
    }
}
