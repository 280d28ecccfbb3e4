//! Core types for SPoS consensus.
//!
//! Plain data shared by every other crate: hashes, identifiers, keys and
//! signatures, signer bitmaps, block headers and bodies, and the eligible
//! validator set.

mod bitmap;
mod block;
mod crypto;
mod hash;
mod identifiers;
mod signing;
mod validator;

pub use bitmap::SignerBitmap;
pub use block::{BlockBody, BlockHeader};
pub use crypto::{AggregateError, KeyError, KeyPair, KeyType, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use identifiers::{BlockHeight, RoundIndex, ShardId, ValidatorId};
pub use signing::{
    block_signature_message, consensus_message_signing_bytes, DOMAIN_BLOCK_SIGNATURE,
    DOMAIN_CONSENSUS_MESSAGE,
};
pub use validator::{ValidatorInfo, ValidatorSet};

/// Deterministic fixtures for tests in this and downstream crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use crate::{KeyPair, KeyType, ValidatorId, ValidatorInfo, ValidatorSet};

    /// Seeded BLS key for validator `index`.
    pub fn test_bls_key(index: usize) -> KeyPair {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&(index as u64).to_le_bytes());
        seed[31] = 0xb1;
        match KeyPair::from_seed(KeyType::Bls12381, &seed) {
            Ok(key) => key,
            Err(e) => panic!("seeded BLS key derivation failed: {e}"),
        }
    }

    /// `n` seeded BLS keys, one per validator index.
    pub fn test_bls_keys(n: usize) -> Vec<KeyPair> {
        (0..n).map(test_bls_key).collect()
    }

    /// Validator set with ids `0..keys.len()` bound to `keys` in order.
    pub fn test_validator_set(keys: &[KeyPair]) -> ValidatorSet {
        ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| ValidatorInfo {
                    validator_id: ValidatorId(i as u64),
                    public_key: k.public_key(),
                })
                .collect(),
        )
    }
}
