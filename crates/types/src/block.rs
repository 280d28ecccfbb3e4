//! Block header and body produced and agreed upon in a consensus round.

use crate::{BlockHeight, Hash, RoundIndex, ShardId};
use sbor::prelude::*;

/// Block header proposed by the round leader.
///
/// The consensus group signs the hash of the header as it was proposed, that
/// is with an empty `pub_keys_bitmap` and no `signature`. The end-round
/// subround fills both fields in after aggregation, right before commit.
#[derive(Debug, Clone, PartialEq, Eq, Default, BasicSbor)]
pub struct BlockHeader {
    /// Block height in the chain (first block after genesis = 1).
    pub height: BlockHeight,

    /// Round in which the block was proposed.
    pub round: RoundIndex,

    /// Unix timestamp (milliseconds) taken from the synchronised clock.
    pub timestamp: u64,

    /// Shard the block belongs to.
    pub shard_id: ShardId,

    /// Hash of the previous header (genesis hash for the first block).
    pub prev_hash: Hash,

    /// Hash of the encoded body proposed with this header.
    pub body_hash: Hash,

    /// Bitmap of the consensus group members whose shares were aggregated.
    pub pub_keys_bitmap: Vec<u8>,

    /// Aggregated multi-signature over the proposed header hash.
    pub signature: Vec<u8>,
}

impl BlockHeader {
    /// Copy of this header as it looked when proposed (no signature data).
    pub fn unsigned(&self) -> Self {
        Self {
            pub_keys_bitmap: Vec::new(),
            signature: Vec::new(),
            ..self.clone()
        }
    }

    /// Whether the aggregated signature has been attached.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

/// Block body: the ordered transaction hashes included in the block.
#[derive(Debug, Clone, PartialEq, Eq, Default, BasicSbor)]
pub struct BlockBody {
    /// Shard the body was built for.
    pub shard_id: ShardId,

    /// Hashes of the transactions included, in execution order.
    pub tx_hashes: Vec<Hash>,
}

impl BlockBody {
    /// Number of transactions in the body.
    pub fn transaction_count(&self) -> usize {
        self.tx_hashes.len()
    }

    /// Check if the body carries no transactions.
    pub fn is_empty(&self) -> bool {
        self.tx_hashes.is_empty()
    }
}
