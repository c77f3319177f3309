//! Undo log for the mutation protocol.
//!
//! Every mutation registers the exact before-state it needs to reverse itself
//! under the current [`UndoToken`]. Tokens increase monotonically, so the log
//! stays sorted by token. Releasing a token commits every action at or below
//! it, oldest first; undoing a token reverses every action at or above it,
//! newest first. Either way each action is consumed exactly once.
//!
//! The log itself only does bookkeeping. Applying an action to a table is the
//! job of [`TableRegistry`](crate::TableRegistry), which owns the tables.

use crate::changelog::LogPosition;
use crate::registry::TableId;
use crate::row_store::IndexSelection;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use strata_core::{Result, Row, TupleId};

/// Scope tag for undo actions.
pub type UndoToken = u64;

/// How an action is being finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The enclosing work committed.
    Released,
    /// The enclosing work rolled back.
    Undone,
}

/// The pair of row images an update swapped.
///
/// Exactly one side survives finalization, the other is dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateImage {
    old: Row,
    new: Row,
}

impl UpdateImage {
    pub fn new(old: Row, new: Row) -> Self {
        Self { old, new }
    }

    pub fn old(&self) -> &Row {
        &self.old
    }

    pub fn new_image(&self) -> &Row {
        &self.new
    }

    /// Consumes the pair and returns the image storage must hold afterwards.
    pub fn resolve(self, outcome: UndoOutcome) -> Row {
        match outcome {
            UndoOutcome::Released => self.new,
            UndoOutcome::Undone => self.old,
        }
    }
}

/// Reversible work owned by a collaborator outside the storage layer.
///
/// Implemented for every `FnOnce(UndoOutcome) -> Result<()>` closure.
pub trait ExternalUndo: Send {
    /// Commits (`Released`) or reverses (`Undone`) the work.
    fn finalize(self: Box<Self>, outcome: UndoOutcome) -> Result<()>;
}

impl<F> ExternalUndo for F
where
    F: FnOnce(UndoOutcome) -> Result<()> + Send,
{
    fn finalize(self: Box<Self>, outcome: UndoOutcome) -> Result<()> {
        (*self)(outcome)
    }
}

/// A registered [`ExternalUndo`]. Two handles are equal only if they are
/// the same registration.
pub struct ExternalAction(Box<dyn ExternalUndo>);

impl ExternalAction {
    pub fn new(action: impl ExternalUndo + 'static) -> Self {
        Self(Box::new(action))
    }

    pub fn finalize(self, outcome: UndoOutcome) -> Result<()> {
        self.0.finalize(outcome)
    }
}

impl fmt::Debug for ExternalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalAction(..)")
    }
}

impl PartialEq for ExternalAction {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(&*self.0, &*other.0)
    }
}

/// A reversible step of the mutation protocol.
#[derive(Debug, PartialEq)]
pub enum UndoAction {
    /// A change-log append; undoing rolls the log back to `position`.
    ChangeLogMark { position: LogPosition },
    /// A tuple was inserted.
    Insert { table: TableId, tuple: TupleId },
    /// A tuple was rewritten in place and the listed indexes were moved.
    Update {
        table: TableId,
        tuple: TupleId,
        image: UpdateImage,
        indexes: IndexSelection,
    },
    /// A tuple was deleted; `image` is the full pre-delete row.
    Delete {
        table: TableId,
        tuple: TupleId,
        image: Row,
    },
    /// Work registered by an outside collaborator.
    External(ExternalAction),
}

#[derive(Debug)]
struct UndoEntry {
    token: UndoToken,
    action: UndoAction,
}

/// Token-scoped list of undo actions.
#[derive(Debug, Default)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
    current: UndoToken,
}

impl UndoLog {
    /// Creates an empty log. The first token handed out by [`begin`](Self::begin) is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new token scope and returns its token.
    pub fn begin(&mut self) -> UndoToken {
        self.current += 1;
        self.current
    }

    /// Returns the token new actions are registered under.
    #[inline]
    pub fn current_token(&self) -> UndoToken {
        self.current
    }

    /// Registers an action under the current token.
    pub fn register(&mut self, action: UndoAction) {
        self.entries.push(UndoEntry {
            token: self.current,
            action,
        });
    }

    /// Removes the most recently registered action, when the step that
    /// registered it has already reversed itself.
    pub fn retract_last(&mut self) -> Option<UndoAction> {
        self.entries.pop().map(|e| e.action)
    }

    /// Takes every action registered at or below `token`, oldest first.
    pub fn take_released(&mut self, token: UndoToken) -> Vec<UndoAction> {
        let split = self.entries.partition_point(|e| e.token <= token);
        let rest = self.entries.split_off(split);
        let released = core::mem::replace(&mut self.entries, rest);
        released.into_iter().map(|e| e.action).collect()
    }

    /// Takes every action registered at or above `token`, newest first.
    pub fn take_undone(&mut self, token: UndoToken) -> Vec<UndoAction> {
        let split = self.entries.partition_point(|e| e.token < token);
        let mut undone: Vec<UndoAction> = self
            .entries
            .split_off(split)
            .into_iter()
            .map(|e| e.action)
            .collect();
        undone.reverse();
        undone
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
