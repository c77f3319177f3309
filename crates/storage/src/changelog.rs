//! Change-log hand-off for replication.
//!
//! The registry appends one record per mutation of a logged table before it
//! touches any index, and registers the returned position as an undo mark so
//! that rolling back the mutation also truncates the log. Framing, buffering
//! and shipping the records belong to the [`ChangeLog`] implementation.

use alloc::vec::Vec;
use strata_core::{Result, Row, Value};

/// Offset of a record in the change log.
pub type LogPosition = u64;

/// The kind of mutation a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Sink for replicated row changes.
pub trait ChangeLog: Send {
    /// Appends an insert. Returns the position the record starts at.
    fn append_insert(
        &mut self,
        signature: u64,
        partition_key: &Value,
        row: &Row,
    ) -> Result<LogPosition>;

    /// Appends an update carrying both images.
    fn append_update(
        &mut self,
        signature: u64,
        partition_key: &Value,
        old: &Row,
        new: &Row,
    ) -> Result<LogPosition>;

    /// Appends a delete carrying the deleted image.
    fn append_delete(
        &mut self,
        signature: u64,
        partition_key: &Value,
        row: &Row,
    ) -> Result<LogPosition>;

    /// Discards every record at or after `position`.
    fn rollback_to(&mut self, position: LogPosition) -> Result<()>;

    /// Position the next record will start at.
    fn position(&self) -> LogPosition;
}

/// One buffered change.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub signature: u64,
    pub partition_key: Value,
    pub row: Row,
    /// Pre-update image; `None` for inserts and deletes.
    pub old: Option<Row>,
}

/// Change log that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    records: Vec<ChangeRecord>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns buffered records, oldest first.
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Takes every buffered record.
    pub fn drain(&mut self) -> Vec<ChangeRecord> {
        core::mem::take(&mut self.records)
    }

    fn push(&mut self, record: ChangeRecord) -> LogPosition {
        let position = self.records.len() as LogPosition;
        self.records.push(record);
        position
    }
}

impl ChangeLog for MemoryChangeLog {
    fn append_insert(
        &mut self,
        signature: u64,
        partition_key: &Value,
        row: &Row,
    ) -> Result<LogPosition> {
        Ok(self.push(ChangeRecord {
            kind: ChangeKind::Insert,
            signature,
            partition_key: partition_key.clone(),
            row: row.clone(),
            old: None,
        }))
    }

    fn append_update(
        &mut self,
        signature: u64,
        partition_key: &Value,
        old: &Row,
        new: &Row,
    ) -> Result<LogPosition> {
        Ok(self.push(ChangeRecord {
            kind: ChangeKind::Update,
            signature,
            partition_key: partition_key.clone(),
            row: new.clone(),
            old: Some(old.clone()),
        }))
    }

    fn append_delete(
        &mut self,
        signature: u64,
        partition_key: &Value,
        row: &Row,
    ) -> Result<LogPosition> {
        Ok(self.push(ChangeRecord {
            kind: ChangeKind::Delete,
            signature,
            partition_key: partition_key.clone(),
            row: row.clone(),
            old: None,
        }))
    }

    fn rollback_to(&mut self, position: LogPosition) -> Result<()> {
        self.records.truncate(position as usize);
        Ok(())
    }

    fn position(&self) -> LogPosition {
        self.records.len() as LogPosition
    }
}
