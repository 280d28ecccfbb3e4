//! Validator keys and signatures.
//!
//! Consensus messages may be signed with either scheme. Block
//! multi-signatures are BLS12-381 (min-pk): every selected member signs the
//! same block message and the shares aggregate into one signature checked
//! against the aggregated public key of the signers.

use sbor::prelude::*;
use std::fmt;

use blst::min_pk as bls;

/// Ciphersuite tag for every BLS signature in the system.
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Signature scheme of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum KeyType {
    Ed25519,
    /// Aggregatable; required for block multi-signatures.
    Bls12381,
}

/// Secret key of a validator.
#[derive(Clone)]
pub enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    Bls12381(bls::SecretKey),
}

impl KeyPair {
    pub fn generate_ed25519() -> Self {
        Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn generate_bls() -> Result<Self, KeyError> {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(KeyType::Bls12381, &seed)
    }

    /// Deterministic key from `seed`.
    pub fn from_seed(key_type: KeyType, seed: &[u8; 32]) -> Result<Self, KeyError> {
        Ok(match key_type {
            KeyType::Ed25519 => Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(seed)),
            KeyType::Bls12381 => {
                Self::Bls12381(bls::SecretKey::key_gen(seed, &[]).map_err(|_| KeyError::InvalidSeed)?)
            }
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Bls12381(_) => KeyType::Bls12381,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            Self::Ed25519(key) => {
                use ed25519_dalek::Signer;
                Signature::Ed25519(key.sign(message).to_bytes().to_vec())
            }
            Self::Bls12381(key) => {
                Signature::Bls12381(key.sign(message, BLS_DST, &[]).to_bytes().to_vec())
            }
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key().to_bytes()),
            Self::Bls12381(key) => PublicKey::Bls12381(key.sk_to_pk().to_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPair").field(&self.public_key()).finish()
    }
}

/// Public key of a validator.
///
/// BLS keys are kept compressed (48 bytes) and parsed on use, so an
/// invalid key only shows up as a failed verification.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub enum PublicKey {
    Ed25519([u8; 32]),
    Bls12381(Vec<u8>),
}

impl PublicKey {
    /// Check `signature` over `message`. A scheme mismatch never verifies.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match (self, signature) {
            (Self::Ed25519(key), Signature::Ed25519(sig)) => verify_ed25519(key, message, sig),
            (Self::Bls12381(key), Signature::Bls12381(sig)) => verify_bls(key, message, sig),
            _ => false,
        }
    }

    /// Combine BLS keys into the key that checks their aggregated signature.
    pub fn aggregate_bls(keys: &[PublicKey]) -> Result<Self, AggregateError> {
        let parsed = parse_bls(keys, |key| match key {
            Self::Bls12381(bytes) => bls::PublicKey::key_validate(bytes).ok(),
            Self::Ed25519(_) => None,
        })?;
        let refs: Vec<&bls::PublicKey> = parsed.iter().collect();
        let aggregate = bls::AggregatePublicKey::aggregate(&refs, false)
            .map_err(|_| AggregateError::AggregationFailed)?;
        Ok(Self::Bls12381(aggregate.to_public_key().to_bytes().to_vec()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(bytes) => write!(f, "Ed25519({})", short_hex(bytes)),
            Self::Bls12381(bytes) => write!(f, "Bls12381({})", short_hex(bytes)),
        }
    }
}

/// Signature bytes tagged with their scheme.
#[derive(Clone, PartialEq, Eq, BasicSbor)]
pub enum Signature {
    Ed25519(Vec<u8>),
    Bls12381(Vec<u8>),
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ed25519(bytes) | Self::Bls12381(bytes) => bytes,
        }
    }

    /// Aggregate BLS signature shares into one signature.
    pub fn aggregate_bls(shares: &[Signature]) -> Result<Self, AggregateError> {
        let parsed = parse_bls(shares, |share| match share {
            Self::Bls12381(bytes) => bls::Signature::from_bytes(bytes).ok(),
            Self::Ed25519(_) => None,
        })?;
        let refs: Vec<&bls::Signature> = parsed.iter().collect();
        let aggregate = bls::AggregateSignature::aggregate(&refs, true)
            .map_err(|_| AggregateError::AggregationFailed)?;
        Ok(Self::Bls12381(aggregate.to_signature().to_bytes().to_vec()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(bytes) => write!(f, "Ed25519Sig({})", short_hex(bytes)),
            Self::Bls12381(bytes) => write!(f, "Bls12381Sig({})", short_hex(bytes)),
        }
    }
}

fn verify_ed25519(key: &[u8; 32], message: &[u8], sig: &[u8]) -> bool {
    use ed25519_dalek::Verifier;
    let (Ok(key), Ok(sig)) = (
        ed25519_dalek::VerifyingKey::from_bytes(key),
        ed25519_dalek::Signature::from_slice(sig),
    ) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

fn verify_bls(key: &[u8], message: &[u8], sig: &[u8]) -> bool {
    let (Ok(key), Ok(sig)) = (bls::PublicKey::from_bytes(key), bls::Signature::from_bytes(sig))
    else {
        return false;
    };
    sig.verify(true, message, BLS_DST, &[], &key, true) == blst::BLST_ERROR::BLST_SUCCESS
}

/// Parse every item as BLS, failing on an empty input or any non-BLS item.
fn parse_bls<T, P>(items: &[T], parse: impl Fn(&T) -> Option<P>) -> Result<Vec<P>, AggregateError> {
    if items.is_empty() {
        return Err(AggregateError::Empty);
    }
    items
        .iter()
        .map(|item| parse(item).ok_or(AggregateError::MixedTypes))
        .collect()
}

/// First and last four bytes in hex.
fn short_hex(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        return hex::encode(bytes);
    }
    format!(
        "{}..{}",
        hex::encode(&bytes[..4]),
        hex::encode(&bytes[bytes.len() - 4..])
    )
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key seed")]
    InvalidSeed,
}

/// Why a set of keys or shares could not be aggregated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("Nothing to aggregate")]
    Empty,

    /// An item is not a valid BLS key or signature.
    #[error("Only valid BLS items can be aggregated")]
    MixedTypes,

    #[error("Aggregation failed")]
    AggregationFailed,
}
