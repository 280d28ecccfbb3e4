//! Domain-separated signing messages.
//!
//! Every signed payload is prefixed with a domain tag so a signature produced
//! for one purpose cannot be replayed as another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `spos_consensus_msg:` | Per-message signatures on consensus messages |
//! | `spos_block_sig:` | Multi-signature shares over the proposed header hash |

use crate::{Hash, RoundIndex, ValidatorId};

/// Domain tag for consensus message signatures.
///
/// Format: `spos_consensus_msg:` || msg_type || round || timestamp || sender
/// || header_hash || len(data) || data
pub const DOMAIN_CONSENSUS_MESSAGE: &[u8] = b"spos_consensus_msg:";

/// Domain tag for block multi-signature shares.
///
/// Format: `spos_block_sig:` || header_hash
pub const DOMAIN_BLOCK_SIGNATURE: &[u8] = b"spos_block_sig:";

/// Build the bytes a sender signs for a consensus message.
///
/// The message signature field itself is never part of the input.
pub fn consensus_message_signing_bytes(
    msg_type: u8,
    round_index: RoundIndex,
    timestamp: u64,
    sender: ValidatorId,
    header_hash: &Hash,
    data: &[u8],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_CONSENSUS_MESSAGE.len() + 65 + data.len());
    message.extend_from_slice(DOMAIN_CONSENSUS_MESSAGE);
    message.push(msg_type);
    message.extend_from_slice(&round_index.0.to_le_bytes());
    message.extend_from_slice(&timestamp.to_le_bytes());
    message.extend_from_slice(&sender.0.to_le_bytes());
    message.extend_from_slice(header_hash.as_bytes());
    message.extend_from_slice(&(data.len() as u64).to_le_bytes());
    message.extend_from_slice(data);
    message
}

/// Build the message the consensus group multi-signs for a block.
pub fn block_signature_message(header_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_BLOCK_SIGNATURE.len() + Hash::BYTES);
    message.extend_from_slice(DOMAIN_BLOCK_SIGNATURE);
    message.extend_from_slice(header_hash.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_differ() {
        let hash = Hash::from_bytes(b"header");
        let block = block_signature_message(&hash);
        let msg = consensus_message_signing_bytes(0, RoundIndex(1), 0, ValidatorId(0), &hash, &[]);

        assert!(block.starts_with(DOMAIN_BLOCK_SIGNATURE));
        assert!(msg.starts_with(DOMAIN_CONSENSUS_MESSAGE));
        assert_ne!(block, msg);
    }

    #[test]
    fn test_signing_bytes_bind_every_field() {
        let hash = Hash::from_bytes(b"header");
        let base = consensus_message_signing_bytes(2, RoundIndex(4), 9, ValidatorId(1), &hash, b"x");

        assert_ne!(
            base,
            consensus_message_signing_bytes(3, RoundIndex(4), 9, ValidatorId(1), &hash, b"x")
        );
        assert_ne!(
            base,
            consensus_message_signing_bytes(2, RoundIndex(5), 9, ValidatorId(1), &hash, b"x")
        );
        assert_ne!(
            base,
            consensus_message_signing_bytes(2, RoundIndex(4), 9, ValidatorId(2), &hash, b"x")
        );
        assert_ne!(
            base,
            consensus_message_signing_bytes(2, RoundIndex(4), 9, ValidatorId(1), &hash, b"y")
        );
    }
}
