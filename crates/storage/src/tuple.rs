//! Block-organised tuple storage.
//!
//! Tuples live in fixed-size blocks and are addressed by [`TupleId`]. Freed
//! slots go on a LIFO free list and are handed out again before a new block is
//! opened. Each slot carries a header of [`TupleFlags`].

use alloc::vec::Vec;
use strata_core::{Row, TupleId};

/// Per-slot header flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TupleFlags(u8);

impl TupleFlags {
    /// The slot holds an allocated tuple.
    pub const ACTIVE: u8 = 0b0001;
    /// Inserted while a background scan was running; the scan skips it.
    pub const DIRTY: u8 = 0b0010;
    /// Deleted but not yet released.
    pub const PENDING_DELETE: u8 = 0b0100;
    /// Delete released while a background scan still has to pass the slot.
    pub const PENDING_DELETE_ON_UNDO_RELEASE: u8 = 0b1000;

    #[inline]
    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.contains(Self::ACTIVE)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.contains(Self::DIRTY)
    }

    #[inline]
    pub fn is_pending_delete(&self) -> bool {
        self.contains(Self::PENDING_DELETE)
    }

    #[inline]
    pub fn is_pending_delete_on_undo_release(&self) -> bool {
        self.contains(Self::PENDING_DELETE_ON_UNDO_RELEASE)
    }

    /// Active and not pending delete: visible to scans and lookups.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.is_active() && !self.is_pending_delete()
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    flags: TupleFlags,
    row: Row,
}

/// Fixed-size blocks of tuple slots.
#[derive(Debug)]
pub struct TupleStorage {
    blocks: Vec<Vec<Slot>>,
    tuples_per_block: u32,
    free: Vec<TupleId>,
    allocated: usize,
    live: usize,
}

impl TupleStorage {
    /// Creates empty storage. `tuples_per_block` is clamped to at least 1.
    pub fn new(tuples_per_block: u32) -> Self {
        Self {
            blocks: Vec::new(),
            tuples_per_block: tuples_per_block.max(1),
            free: Vec::new(),
            allocated: 0,
            live: 0,
        }
    }

    /// Places `row` in a free slot and marks it active.
    pub fn allocate(&mut self, row: Row) -> TupleId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => self.next_fresh_slot(),
        };
        let slot = &mut self.blocks[id.block() as usize][id.slot() as usize];
        slot.row = row;
        slot.flags = TupleFlags::default();
        slot.flags.set(TupleFlags::ACTIVE, true);
        self.allocated += 1;
        self.live += 1;
        id
    }

    fn next_fresh_slot(&mut self) -> TupleId {
        let per_block = self.tuples_per_block as usize;
        if self.blocks.last().map_or(true, |b| b.len() == per_block) {
            self.blocks.push(Vec::with_capacity(per_block));
        }
        let block = self.blocks.len() - 1;
        let last = &mut self.blocks[block];
        last.push(Slot::default());
        TupleId::new(block as u32, (last.len() - 1) as u32)
    }

    /// Returns the slot to the free list. Returns the row it held.
    pub fn release(&mut self, id: TupleId) -> Option<Row> {
        let slot = self.slot_mut(id)?;
        if !slot.flags.is_active() {
            return None;
        }
        let was_live = slot.flags.is_live();
        slot.flags = TupleFlags::default();
        let row = core::mem::take(&mut slot.row);
        self.allocated -= 1;
        if was_live {
            self.live -= 1;
        }
        self.free.push(id);
        Some(row)
    }

    fn slot(&self, id: TupleId) -> Option<&Slot> {
        self.blocks
            .get(id.block() as usize)
            .and_then(|b| b.get(id.slot() as usize))
    }

    fn slot_mut(&mut self, id: TupleId) -> Option<&mut Slot> {
        self.blocks
            .get_mut(id.block() as usize)
            .and_then(|b| b.get_mut(id.slot() as usize))
    }

    /// Returns the row of an allocated tuple, pending delete or not.
    pub fn row(&self, id: TupleId) -> Option<&Row> {
        self.slot(id)
            .filter(|s| s.flags.is_active())
            .map(|s| &s.row)
    }

    /// Returns the row of a live tuple.
    pub fn live_row(&self, id: TupleId) -> Option<&Row> {
        self.slot(id).filter(|s| s.flags.is_live()).map(|s| &s.row)
    }

    /// Replaces the row of an allocated tuple, returning the previous image.
    pub fn replace(&mut self, id: TupleId, row: Row) -> Option<Row> {
        let slot = self.slot_mut(id).filter(|s| s.flags.is_active())?;
        Some(core::mem::replace(&mut slot.row, row))
    }

    /// Returns the header flags of an allocated tuple.
    pub fn flags(&self, id: TupleId) -> Option<TupleFlags> {
        self.slot(id).filter(|s| s.flags.is_active()).map(|s| s.flags)
    }

    /// Sets or clears a header flag. Keeps the live count in step with
    /// `PENDING_DELETE`.
    pub fn set_flag(&mut self, id: TupleId, flag: u8, on: bool) -> bool {
        let Some(slot) = self.slot_mut(id).filter(|s| s.flags.is_active()) else {
            return false;
        };
        let was_live = slot.flags.is_live();
        slot.flags.set(flag, on);
        let is_live = slot.flags.is_live();
        match (was_live, is_live) {
            (true, false) => self.live -= 1,
            (false, true) => self.live += 1,
            _ => {}
        }
        true
    }

    /// Iterates live tuples in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (TupleId, &Row)> + '_ {
        self.iter_allocated()
            .filter(|(_, flags, _)| flags.is_live())
            .map(|(id, _, row)| (id, row))
    }

    /// Iterates every allocated slot in storage order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = (TupleId, TupleFlags, &Row)> + '_ {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block.iter().enumerate().filter_map(move |(s, slot)| {
                slot.flags
                    .is_active()
                    .then(|| (TupleId::new(b as u32, s as u32), slot.flags, &slot.row))
            })
        })
    }

    /// Returns the first slot id after `id` in storage order, or `None` past the end.
    pub fn next_slot(&self, id: TupleId) -> Option<TupleId> {
        let block = self.blocks.get(id.block() as usize)?;
        if (id.slot() as usize) + 1 < block.len() {
            return Some(TupleId::new(id.block(), id.slot() + 1));
        }
        let next_block = id.block() as usize + 1;
        self.blocks
            .get(next_block)
            .filter(|b| !b.is_empty())
            .map(|_| TupleId::new(next_block as u32, 0))
    }

    /// Returns true if `id` addresses a slot that has been handed out at least once.
    pub fn contains_slot(&self, id: TupleId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live tuples.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of allocated slots, live or pending delete.
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated
    }

    /// Number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Drops every tuple and block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.free.clear();
        self.allocated = 0;
        self.live = 0;
    }
}
