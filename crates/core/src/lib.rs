//! Capabilities the SPoS consensus engine consumes.
//!
//! The engine never builds blocks, stores the chain, gossips bytes or runs the
//! multi-signature scheme itself. It talks to those collaborators through the
//! traits in [`traits`]. This crate also ships small reference implementations
//! that are good enough to run real rounds in tests:
//!
//! - [`Blake3Hasher`]: the hashing capability
//! - [`BlsMultiSigner`]: a BLS12-381 multi-signer following the commitment flow
//! - [`IndexHashedGroupSelector`]: deterministic consensus group selection
//! - [`StaticShardCoordinator`]: fixed shard assignment

mod error;
mod group_selector;
mod hasher;
mod multisig;
mod shard;
pub mod traits;

pub use error::{BlockProcessError, BroadcastError, MultiSigError, SelectionError};
pub use group_selector::IndexHashedGroupSelector;
pub use hasher::Blake3Hasher;
pub use multisig::BlsMultiSigner;
pub use shard::StaticShardCoordinator;
pub use traits::{
    BlockChain, BlockProcessor, Bootstrapper, BroadcastMessenger, Hasher, MultiSigner, Rounder,
    ShardCoordinator, SyncTimer, ValidatorGroupSelector,
};
