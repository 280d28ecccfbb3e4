use crate::traits::ShardCoordinator;
use spos_types::ShardId;

/// Shard coordinator with a fixed assignment.
#[derive(Debug, Clone, Copy)]
pub struct StaticShardCoordinator {
    self_id: ShardId,
    number_of_shards: u32,
}

impl StaticShardCoordinator {
    /// Create a coordinator for `self_id` among `number_of_shards` shards.
    ///
    /// A shard count of zero is treated as one.
    pub fn new(self_id: ShardId, number_of_shards: u32) -> Self {
        Self {
            self_id,
            number_of_shards: number_of_shards.max(1),
        }
    }
}

impl ShardCoordinator for StaticShardCoordinator {
    fn self_id(&self) -> ShardId {
        self.self_id
    }

    fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }
}
