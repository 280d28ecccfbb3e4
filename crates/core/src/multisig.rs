//! BLS12-381 multi-signer.
//!
//! Follows the Bellare–Neven message flow (commitment hash, commitment,
//! aggregated commitment, signature share) but the cryptography is plain BLS
//! aggregation: a share is a BLS signature over the round message and the
//! block signature is the aggregate of the selected shares. Commitments are
//! random per-round nonces; they bind members to taking part in the round but
//! do not enter the signature.

use crate::{traits::MultiSigner, MultiSigError};
use parking_lot::Mutex;
use rand::RngCore;
use spos_types::{Hash, KeyPair, PublicKey, Signature, SignerBitmap};
use tracing::debug;

#[derive(Default)]
struct RoundData {
    public_keys: Vec<PublicKey>,
    self_index: usize,
    message: Option<Vec<u8>>,
    commitment_hashes: Vec<Option<Hash>>,
    commitments: Vec<Option<Vec<u8>>>,
    shares: Vec<Option<Vec<u8>>>,
}

impl RoundData {
    fn check_index(&self, index: usize) -> Result<(), MultiSigError> {
        if index >= self.public_keys.len() {
            return Err(MultiSigError::IndexOutOfBounds {
                index,
                size: self.public_keys.len(),
            });
        }
        Ok(())
    }

    fn signers(&self, bitmap: &SignerBitmap) -> Result<Vec<usize>, MultiSigError> {
        let signers: Vec<usize> = bitmap
            .set_indices()
            .filter(|&i| i < self.public_keys.len())
            .collect();
        if signers.is_empty() {
            return Err(MultiSigError::EmptyBitmap);
        }
        Ok(signers)
    }
}

/// Multi-signer holding the local BLS key.
pub struct BlsMultiSigner {
    key: KeyPair,
    round: Mutex<RoundData>,
}

impl BlsMultiSigner {
    /// Create a multi-signer for a BLS key pair.
    pub fn new(key: KeyPair) -> Result<Self, MultiSigError> {
        if !matches!(key, KeyPair::Bls12381(_)) {
            return Err(MultiSigError::NotBlsKey);
        }
        Ok(Self {
            key,
            round: Mutex::new(RoundData::default()),
        })
    }
}

impl std::fmt::Debug for BlsMultiSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsMultiSigner")
            .field("public_key", &self.key.public_key())
            .finish()
    }
}

impl MultiSigner for BlsMultiSigner {
    fn reset(&self, public_keys: &[PublicKey], self_index: usize) -> Result<(), MultiSigError> {
        if self_index >= public_keys.len() {
            return Err(MultiSigError::IndexOutOfBounds {
                index: self_index,
                size: public_keys.len(),
            });
        }
        if public_keys[self_index] != self.key.public_key() {
            return Err(MultiSigError::KeyMismatch { index: self_index });
        }

        let size = public_keys.len();
        *self.round.lock() = RoundData {
            public_keys: public_keys.to_vec(),
            self_index,
            message: None,
            commitment_hashes: vec![None; size],
            commitments: vec![None; size],
            shares: vec![None; size],
        };
        Ok(())
    }

    fn set_message(&self, message: &[u8]) {
        self.round.lock().message = Some(message.to_vec());
    }

    fn create_commitment(&self) -> Result<Vec<u8>, MultiSigError> {
        let mut round = self.round.lock();
        let index = round.self_index;
        round.check_index(index)?;

        let mut nonce = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        round.commitments[index] = Some(nonce.clone());
        Ok(nonce)
    }

    fn store_commitment_hash(&self, index: usize, hash: Hash) -> Result<(), MultiSigError> {
        let mut round = self.round.lock();
        round.check_index(index)?;
        round.commitment_hashes[index] = Some(hash);
        Ok(())
    }

    fn commitment_hash(&self, index: usize) -> Result<Hash, MultiSigError> {
        let round = self.round.lock();
        round.check_index(index)?;
        round.commitment_hashes[index].ok_or(MultiSigError::MissingCommitmentHash { index })
    }

    fn store_commitment(&self, index: usize, commitment: Vec<u8>) -> Result<(), MultiSigError> {
        let mut round = self.round.lock();
        round.check_index(index)?;
        round.commitments[index] = Some(commitment);
        Ok(())
    }

    fn commitment(&self, index: usize) -> Result<Vec<u8>, MultiSigError> {
        let round = self.round.lock();
        round.check_index(index)?;
        round.commitments[index]
            .clone()
            .ok_or(MultiSigError::MissingCommitment { index })
    }

    fn aggregate_commitments(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        let round = self.round.lock();
        let signers = round.signers(bitmap)?;

        let mut parts: Vec<&[u8]> = Vec::with_capacity(signers.len());
        for &index in &signers {
            let commitment = round.commitments[index]
                .as_deref()
                .ok_or(MultiSigError::MissingCommitment { index })?;
            parts.push(commitment);
        }
        Ok(Hash::from_parts(&parts).to_bytes().to_vec())
    }

    fn create_signature_share(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        let mut round = self.round.lock();
        let index = round.self_index;
        round.check_index(index)?;
        if !bitmap.is_set(index) {
            return Err(MultiSigError::NotInBitmap { index });
        }
        let message = round.message.as_deref().ok_or(MultiSigError::MissingMessage)?;

        let share = self.key.sign(message).as_bytes().to_vec();
        round.shares[index] = Some(share.clone());
        Ok(share)
    }

    fn store_signature_share(&self, index: usize, share: Vec<u8>) -> Result<(), MultiSigError> {
        let mut round = self.round.lock();
        round.check_index(index)?;
        round.shares[index] = Some(share);
        Ok(())
    }

    fn signature_share(&self, index: usize) -> Result<Vec<u8>, MultiSigError> {
        let round = self.round.lock();
        round.check_index(index)?;
        round.shares[index]
            .clone()
            .ok_or(MultiSigError::MissingSignatureShare { index })
    }

    fn verify_signature_share(
        &self,
        index: usize,
        share: &[u8],
        bitmap: &SignerBitmap,
    ) -> Result<(), MultiSigError> {
        let round = self.round.lock();
        round.check_index(index)?;
        if !bitmap.is_set(index) {
            return Err(MultiSigError::NotInBitmap { index });
        }
        let message = round.message.as_deref().ok_or(MultiSigError::MissingMessage)?;

        let signature = Signature::Bls12381(share.to_vec());
        if !round.public_keys[index].verify(message, &signature) {
            debug!(index, "Signature share does not verify");
            return Err(MultiSigError::InvalidSignatureShare { index });
        }
        Ok(())
    }

    fn aggregate_sigs(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, MultiSigError> {
        let round = self.round.lock();
        let signers = round.signers(bitmap)?;

        let mut shares = Vec::with_capacity(signers.len());
        for &index in &signers {
            let share = round.shares[index]
                .clone()
                .ok_or(MultiSigError::MissingSignatureShare { index })?;
            shares.push(Signature::Bls12381(share));
        }

        let aggregated = Signature::aggregate_bls(&shares)?;
        Ok(aggregated.as_bytes().to_vec())
    }

    fn verify_aggregated(&self, signature: &[u8], bitmap: &SignerBitmap) -> Result<(), MultiSigError> {
        let round = self.round.lock();
        let signers = round.signers(bitmap)?;
        let message = round.message.as_deref().ok_or(MultiSigError::MissingMessage)?;

        let keys: Vec<PublicKey> = signers
            .iter()
            .map(|&i| round.public_keys[i].clone())
            .collect();
        let aggregated_key = PublicKey::aggregate_bls(&keys)?;

        if !aggregated_key.verify(message, &Signature::Bls12381(signature.to_vec())) {
            return Err(MultiSigError::InvalidAggregatedSignature);
        }
        Ok(())
    }
}
