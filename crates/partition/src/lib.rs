//! Strata Partition - Partition sites and replicated-table coordination.
//!
//! Each `PartitionSite` owns the registry holding its shard of every
//! partitioned table. Replicated tables live in one registry shared by all
//! sites; a mutation of a replicated table is issued by every site, executed
//! once by the `ReplicatedCoordinator`'s executing partition, and its outcome
//! is handed back to every site.

pub mod coordinator;
pub mod site;

pub use coordinator::{Outcome, ReplicatedCoordinator};
pub use site::PartitionSite;
