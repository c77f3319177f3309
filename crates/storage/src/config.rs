//! Storage configuration.

/// Settings shared by every table of one [`TableRegistry`](crate::TableRegistry).
///
/// ```
/// use strata_storage::StorageConfig;
///
/// let config = StorageConfig::default()
///     .with_tuples_per_block(256)
///     .with_partition(1, 4);
/// assert_eq!(config.partition_id(), 1);
/// assert!(config.is_multi_partition());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    tuples_per_block: u32,
    partition_id: u32,
    partition_count: u32,
    change_logging: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tuples_per_block: 1024,
            partition_id: 0,
            partition_count: 1,
            change_logging: true,
        }
    }
}

impl StorageConfig {
    /// Sets the number of tuple slots per storage block.
    pub fn with_tuples_per_block(mut self, tuples_per_block: u32) -> Self {
        self.tuples_per_block = tuples_per_block.max(1);
        self
    }

    /// Sets the partition this registry serves and the partition count.
    pub fn with_partition(mut self, partition_id: u32, partition_count: u32) -> Self {
        self.partition_count = partition_count.max(1);
        self.partition_id = partition_id;
        self
    }

    /// Enables or disables change-log appends.
    pub fn with_change_logging(mut self, enabled: bool) -> Self {
        self.change_logging = enabled;
        self
    }

    #[inline]
    pub fn tuples_per_block(&self) -> u32 {
        self.tuples_per_block
    }

    #[inline]
    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    #[inline]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    #[inline]
    pub fn change_logging(&self) -> bool {
        self.change_logging
    }

    /// Returns true when rows must pass the partitioning check.
    #[inline]
    pub fn is_multi_partition(&self) -> bool {
        self.partition_count > 1
    }

    /// Returns `(partition_id, partition_count)` when partitioning applies.
    pub(crate) fn partitioning(&self) -> Option<(u32, u32)> {
        self.is_multi_partition()
            .then_some((self.partition_id, self.partition_count))
    }
}
