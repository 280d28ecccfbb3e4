//! Bitmap marking which consensus group members take part in a signature.

/// A compact bitmap indexed by consensus group position.
///
/// Bit `i` lives in byte `i / 8` under mask `1 << (i % 8)`. This is the wire
/// layout carried in bitmap messages and in the block header, so the raw
/// bytes are exposed as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignerBitmap {
    bits: Vec<u8>,
}

impl SignerBitmap {
    /// Create an all-clear bitmap able to address `group_size` members.
    ///
    /// Always allocates `group_size / 8 + 1` bytes.
    pub fn new(group_size: usize) -> Self {
        Self {
            bits: vec![0u8; group_size / 8 + 1],
        }
    }

    /// Wrap bytes received from the network.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bits: bytes }
    }

    /// Raw bitmap bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bits
    }

    /// Number of addressable bits.
    pub fn bit_capacity(&self) -> usize {
        self.bits.len() * 8
    }

    /// Mark a member as present. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if let Some(byte) = self.bits.get_mut(index / 8) {
            *byte |= 1 << (index % 8);
        }
    }

    /// Check whether a member is present.
    pub fn is_set(&self, index: usize) -> bool {
        self.bits
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    /// Count the number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Iterate the indices of set bits in ascending order.
    pub fn set_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bit_capacity()).filter(|&i| self.is_set(i))
    }

    /// Check if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }
}
