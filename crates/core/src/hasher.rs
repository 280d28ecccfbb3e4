use crate::traits::Hasher;
use spos_types::Hash;

/// Hashing capability backed by Blake3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn compute(&self, data: &[u8]) -> Hash {
        Hash::from_bytes(data)
    }

    fn size(&self) -> usize {
        Hash::BYTES
    }
}
