//! Per-partition execution sites.

use crate::coordinator::{Outcome, ReplicatedCoordinator};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use strata_core::Result;
use strata_storage::{StorageConfig, TableRegistry};
use tracing::debug;

/// One partition's view of the tables: its own partitioned registry, the
/// shared replicated registry, and a buffer of replicated outcomes.
pub struct PartitionSite {
    id: u32,
    local: TableRegistry,
    replicated: Arc<Mutex<TableRegistry>>,
    coordinator: Arc<ReplicatedCoordinator>,
    results: Vec<Outcome>,
}

impl PartitionSite {
    /// Creates `count` sites sharing one replicated registry. Each site's
    /// local registry is configured as partition `id` of `count`.
    pub fn cluster(
        count: u32,
        config: StorageConfig,
        replicated: TableRegistry,
    ) -> Vec<PartitionSite> {
        let count = count.max(1);
        let replicated = Arc::new(Mutex::new(replicated));
        let coordinator = Arc::new(ReplicatedCoordinator::new(count));
        (0..count)
            .map(|id| PartitionSite {
                id,
                local: TableRegistry::new(config.clone().with_partition(id, count)),
                replicated: replicated.clone(),
                coordinator: coordinator.clone(),
                results: Vec::new(),
            })
            .collect()
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Registry holding this partition's shard of every partitioned table.
    pub fn local(&self) -> &TableRegistry {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut TableRegistry {
        &mut self.local
    }

    /// Locks the shared replicated registry.
    pub fn replicated(&self) -> MutexGuard<'_, TableRegistry> {
        self.replicated.lock()
    }

    pub fn coordinator(&self) -> &ReplicatedCoordinator {
        &self.coordinator
    }

    /// Outcomes of the replicated mutations this site took part in, oldest first.
    pub fn results(&self) -> &[Outcome] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<Outcome> {
        core::mem::take(&mut self.results)
    }

    /// Runs a mutation on this partition's own tables inside its own undo
    /// scope: released on success, undone on failure.
    pub fn execute_local<F>(&mut self, mutation: F) -> Result<usize>
    where
        F: FnOnce(&mut TableRegistry) -> Result<usize>,
    {
        run_scoped(&mut self.local, mutation)
    }

    /// Runs a replicated-table mutation. Every site must call this for the
    /// same logical mutation; only the executing site runs `mutation`, the
    /// others wait and record its outcome.
    pub fn execute_replicated<F>(&mut self, mutation: F) -> Outcome
    where
        F: FnOnce(&mut TableRegistry) -> Result<usize>,
    {
        let replicated = self.replicated.clone();
        let outcome = self.coordinator.run(self.id, move || {
            let mut registry = replicated.lock();
            run_scoped(&mut registry, mutation)
        });
        debug!(partition = self.id, ok = outcome.is_ok(), "replicated outcome recorded");
        self.results.push(outcome.clone());
        outcome
    }
}

fn run_scoped<F>(registry: &mut TableRegistry, mutation: F) -> Result<usize>
where
    F: FnOnce(&mut TableRegistry) -> Result<usize>,
{
    let token = registry.begin();
    match mutation(registry) {
        Ok(count) => {
            registry.release(token)?;
            Ok(count)
        }
        Err(e) => {
            registry.undo(token)?;
            Err(e)
        }
    }
}
