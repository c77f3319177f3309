//! Per-table counters.

/// Snapshot of a table's storage counters.
///
/// `inserts`, `updates` and `deletes` count completed protocol calls and are
/// not rewound by undo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    /// Tuples visible to scans.
    pub live_tuples: usize,
    /// Slots in use, including tuples still pending delete.
    pub allocated_tuples: usize,
    pub blocks: usize,
    pub indexes: usize,
}
