//! Single-execution coordination of replicated-table mutations.
//!
//! Every partition thread issues the same logical mutation against a
//! replicated table. The coordinator lets exactly one of them, the lowest
//! partition id, run it; the others block until its outcome is published and
//! then copy that outcome.
//!
//! ```text
//! Partition 0 ──► arrive ──► execute ──► publish ──┐
//! Partition 1 ──► arrive ──► wait ─────────────────┼──► collect ──► next round
//! Partition 2 ──► arrive ──► wait ─────────────────┘
//! ```
//!
//! A round's outcome slot is read exactly once per partition; the last
//! reader clears it and opens the next round.

use parking_lot::{Condvar, Mutex};
use strata_core::{Error, Result};
use tracing::{debug, trace};

/// Outcome of one coordinated mutation: affected rows or the error.
pub type Outcome = Result<usize>;

struct Round {
    generation: u64,
    arrived: u32,
    outcome: Option<Outcome>,
    unread: u32,
}

/// Barrier plus one-shot result slot shared by the partitions of one site.
pub struct ReplicatedCoordinator {
    partitions: u32,
    round: Mutex<Round>,
    changed: Condvar,
}

impl ReplicatedCoordinator {
    /// Creates a coordinator for `partitions` participating partitions.
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            round: Mutex::new(Round {
                generation: 0,
                arrived: 0,
                outcome: None,
                unread: 0,
            }),
            changed: Condvar::new(),
        }
    }

    #[inline]
    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Partition that executes every coordinated mutation.
    #[inline]
    pub fn executor(&self) -> u32 {
        0
    }

    /// Number of rounds completed so far.
    pub fn generation(&self) -> u64 {
        self.round.lock().generation
    }

    /// Runs one coordinated mutation from `partition`.
    ///
    /// Blocks until every partition has arrived. The executing partition then
    /// calls `mutation`; every other partition drops it unrun and waits for
    /// the published outcome. All partitions return the same outcome.
    pub fn run<F>(&self, partition: u32, mutation: F) -> Outcome
    where
        F: FnOnce() -> Outcome,
    {
        if partition >= self.partitions {
            return Err(Error::invalid_operation(format!(
                "partition {} outside 0..{}",
                partition, self.partitions
            )));
        }

        let mut round = self.round.lock();
        // A partition that already collected the previous outcome waits for
        // the slowest reader to close that round.
        while round.outcome.is_some() {
            self.changed.wait(&mut round);
        }
        let generation = round.generation;
        round.arrived += 1;
        trace!(partition, generation, arrived = round.arrived, "arrived at barrier");
        if round.arrived == self.partitions {
            self.changed.notify_all();
        }
        while round.arrived < self.partitions {
            self.changed.wait(&mut round);
        }

        if partition == self.executor() {
            drop(round);
            let outcome = mutation();
            round = self.round.lock();
            debug!(generation, ok = outcome.is_ok(), "replicated mutation executed");
            round.outcome = Some(outcome);
            round.unread = self.partitions;
            self.changed.notify_all();
        } else {
            drop(mutation);
            while round.outcome.is_none() {
                self.changed.wait(&mut round);
            }
        }

        let outcome = match round.outcome.as_ref() {
            Some(outcome) => outcome.clone(),
            None => Err(Error::fatal("replicated outcome vanished before it was read")),
        };
        round.unread -= 1;
        if round.unread == 0 {
            round.outcome = None;
            round.arrived = 0;
            round.generation += 1;
            self.changed.notify_all();
        }
        outcome
    }
}
