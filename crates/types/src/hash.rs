//! Blake3 digests.

use sbor::prelude::*;
use std::fmt;
use std::str::FromStr;

/// A 32-byte Blake3 digest.
///
/// Consensus data of a round is the hash of the proposed header; commitment
/// hashes and chain links use the same type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BasicSbor)]
#[sbor(transparent)]
pub struct Hash([u8; Hash::BYTES]);

impl Hash {
    pub const BYTES: usize = 32;
    pub const ZERO: Self = Self([0; Self::BYTES]);

    /// Digest of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// Digest of the concatenation of `parts`.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        parts.iter().for_each(|part| {
            hasher.update(part);
        });
        Self(hasher.finalize().into())
    }

    /// Wrap a digest taken off the wire. `None` unless exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0
    }

    /// Leading eight bytes, little-endian. Used for index derivation.
    pub fn as_u64(&self) -> u64 {
        let (head, _) = self.0.split_at(8);
        head.iter().rev().fold(0, |acc, b| (acc << 8) | u64::from(*b))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hash({}..{})",
            hex::encode(&self.0[..4]),
            hex::encode(&self.0[28..])
        )
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::BYTES * 2 {
            return Err(HexError::InvalidLength {
                expected: Self::BYTES * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0; Self::BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HexError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("Invalid hex length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid hex string")]
    InvalidHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(Hash::from_bytes(b"block header"), Hash::from_bytes(b"block header"));
        assert_ne!(Hash::from_bytes(b"hello"), Hash::from_bytes(b"world"));
    }

    #[test]
    fn test_from_parts_matches_concatenation() {
        assert_eq!(
            Hash::from_bytes(b"commitmenthash"),
            Hash::from_parts(&[b"commitment", b"hash"])
        );
    }

    #[test]
    fn test_try_from_slice_rejects_wrong_length() {
        let hash = Hash::from_bytes(b"data");
        assert_eq!(Hash::try_from_slice(hash.as_bytes()), Some(hash));
        assert_eq!(Hash::try_from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_as_u64_reads_little_endian_prefix() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[1] = 0x02;
        let hash = Hash::try_from_slice(&bytes).unwrap();
        assert_eq!(hash.as_u64(), 0x0201);
    }

    #[test]
    fn test_display_parses_back() {
        let hash = Hash::from_bytes(b"test data");
        assert_eq!(hash.to_string().parse::<Hash>(), Ok(hash));
        assert!(matches!(
            "abcd".parse::<Hash>(),
            Err(HexError::InvalidLength { expected: 64, .. })
        ));
        assert_eq!("zz".repeat(32).parse::<Hash>(), Err(HexError::InvalidHex));
    }
}
