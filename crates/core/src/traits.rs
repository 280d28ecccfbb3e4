//! Capability traits consumed by the consensus engine.
//!
//! Every capability is shared by all phases of a round, so all methods take
//! `&self` and implementations must be `Send + Sync`. Implementations that
//! keep per-round data (the multi-signer, the chain handle) use interior
//! mutability.

use crate::{BlockProcessError, BroadcastError, MultiSigError, SelectionError};
use spos_types::{
    BlockBody, BlockHeader, Hash, PublicKey, RoundIndex, ShardId, SignerBitmap, ValidatorId,
};
use std::time::Duration;

/// The round clock.
pub trait Rounder: Send + Sync {
    /// Index of the current round.
    fn index(&self) -> RoundIndex;

    /// Unix time at which the current round started.
    fn time_stamp(&self) -> Duration;

    /// Length of one round.
    ///
    /// Phase time windows are fractions of this duration.
    fn time_duration(&self) -> Duration;
}

/// Network-synchronised wall clock.
pub trait SyncTimer: Send + Sync {
    /// Current synchronised unix time.
    fn current_time(&self) -> Duration;
}

/// Handle to the local chain.
pub trait BlockChain: Send + Sync {
    /// Header at the chain head, `None` before the first block.
    fn current_block_header(&self) -> Option<BlockHeader>;

    /// Hash of the header at the chain head, `None` before the first block.
    fn current_block_header_hash(&self) -> Option<Hash>;

    /// Hash the first block builds on.
    fn genesis_header_hash(&self) -> Hash;

    /// Move the chain head to `header`.
    fn set_current_block_header(&self, header: BlockHeader);
}

/// Block construction, validation and commit.
pub trait BlockProcessor: Send + Sync {
    /// Build a body for a new block proposed in `round`.
    ///
    /// `have_time` reports whether the proposer is still inside its time
    /// window; implementations should stop adding transactions once it
    /// returns `false`.
    fn create_block_body(
        &self,
        shard_id: ShardId,
        round: RoundIndex,
        have_time: &dyn Fn() -> bool,
    ) -> Result<BlockBody, BlockProcessError>;

    /// Validate and execute a proposed block without committing it.
    fn process_block(
        &self,
        chain: &dyn BlockChain,
        header: &BlockHeader,
        body: &BlockBody,
        have_time: &dyn Fn() -> bool,
    ) -> Result<(), BlockProcessError>;

    /// Persist a signed block and move the chain head to it.
    fn commit_block(
        &self,
        chain: &dyn BlockChain,
        header: &BlockHeader,
        body: &BlockBody,
    ) -> Result<(), BlockProcessError>;

    /// Undo the effects of a processed but uncommitted block.
    fn revert_account_state(&self);
}

/// Chain synchronisation status.
pub trait Bootstrapper: Send + Sync {
    /// Whether the node is behind and must sync before taking part in consensus.
    fn should_sync(&self) -> bool;
}

/// Hashing capability.
pub trait Hasher: Send + Sync {
    /// Hash `data`.
    fn compute(&self, data: &[u8]) -> Hash;

    /// Digest size in bytes.
    fn size(&self) -> usize;
}

/// Shard topology of the local node.
pub trait ShardCoordinator: Send + Sync {
    /// Shard the node belongs to.
    fn self_id(&self) -> ShardId;

    /// Total number of shards.
    fn number_of_shards(&self) -> u32;
}

/// Picks the consensus group of a round.
pub trait ValidatorGroupSelector: Send + Sync {
    /// Compute the ordered consensus group for `randomness`.
    ///
    /// The same randomness must give the same group on every node. The first
    /// member is the round leader.
    fn compute_validators_group(&self, randomness: &[u8]) -> Result<Vec<ValidatorId>, SelectionError>;
}

/// Publishes bytes on a gossip topic.
pub trait BroadcastMessenger: Send + Sync {
    /// Publish `payload` on `topic`.
    fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), BroadcastError>;
}

/// Multi-signature scheme run by the consensus group.
///
/// Signers are addressed by their index in the consensus group. A round goes
/// through these steps:
///
/// 1. [`reset`](Self::reset) with the group public keys and own index
/// 2. [`set_message`](Self::set_message) once the block header is known
/// 3. commitment: create own, store the peers' commitment hashes and commitments
/// 4. [`aggregate_commitments`](Self::aggregate_commitments) over the bitmap
/// 5. signature shares: create own, store and verify the peers' shares
/// 6. [`aggregate_sigs`](Self::aggregate_sigs) into the block signature
///
/// Own commitment and own share are stored at the own index when created.
pub trait MultiSigner: Send + Sync {
    /// Drop all round data and start over for a new group.
    fn reset(&self, public_keys: &[PublicKey], self_index: usize) -> Result<(), MultiSigError>;

    /// Set the message the group signs.
    fn set_message(&self, message: &[u8]);

    /// Create and store own commitment, returning it.
    fn create_commitment(&self) -> Result<Vec<u8>, MultiSigError>;

    /// Store the commitment hash announced by signer `index`.
    fn store_commitment_hash(&self, index: usize, hash: Hash) -> Result<(), MultiSigError>;

    /// Commitment hash announced by signer `index`.
    fn commitment_hash(&self, index: usize) -> Result<Hash, MultiSigError>;

    /// Store the commitment revealed by signer `index`.
    fn store_commitment(&self, index: usize, commitment: Vec<u8>) -> Result<(), MultiSigError>;

    /// Commitment revealed by signer `index`.
    fn commitment(&self, index: usize) -> Result<Vec<u8>, MultiSigError>;

    /// Aggregate the commitments of every signer set in `bitmap`.
    fn aggregate_commitments(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError>;

    /// Create and store own signature share for the signers in `bitmap`.
    fn create_signature_share(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError>;

    /// Store the signature share sent by signer `index`.
    fn store_signature_share(&self, index: usize, share: Vec<u8>) -> Result<(), MultiSigError>;

    /// Signature share stored for signer `index`.
    fn signature_share(&self, index: usize) -> Result<Vec<u8>, MultiSigError>;

    /// Verify the share of signer `index` against the signers in `bitmap`.
    fn verify_signature_share(
        &self,
        index: usize,
        share: &[u8],
        bitmap: &SignerBitmap,
    ) -> Result<(), MultiSigError>;

    /// Aggregate the shares of every signer set in `bitmap`.
    fn aggregate_sigs(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError>;

    /// Verify an aggregated signature for the signers in `bitmap`.
    fn verify_aggregated(&self, signature: &[u8], bitmap: &SignerBitmap) -> Result<(), MultiSigError>;
}
