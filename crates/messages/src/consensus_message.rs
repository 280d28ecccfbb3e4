//! The message exchanged between consensus group members during a round.

use sbor::prelude::BasicSbor;
use spos_types::{consensus_message_signing_bytes, Hash, RoundIndex, Signature, ValidatorId};
use std::fmt;

/// Kind of payload carried by a [`ConsensusMessage`].
///
/// Declaration order is the order in which stored messages are replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
pub enum MessageType {
    /// Encoded block body proposed by the leader.
    BlockBody,
    /// Encoded block header proposed by the leader.
    BlockHeader,
    /// Hash of a member's commitment.
    CommitmentHash,
    /// Leader's bitmap of members taking part in the signature.
    Bitmap,
    /// A member's commitment.
    Commitment,
    /// A member's signature share.
    Signature,
}

impl MessageType {
    /// Every message type in replay order.
    pub const ALL: [MessageType; 6] = [
        MessageType::BlockBody,
        MessageType::BlockHeader,
        MessageType::CommitmentHash,
        MessageType::Bitmap,
        MessageType::Commitment,
        MessageType::Signature,
    ];

    /// Stable tag used in signing bytes.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::BlockBody => 0,
            MessageType::BlockHeader => 1,
            MessageType::CommitmentHash => 2,
            MessageType::Bitmap => 3,
            MessageType::Commitment => 4,
            MessageType::Signature => 5,
        }
    }

    /// Human readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::BlockBody => "block body",
            MessageType::BlockHeader => "block header",
            MessageType::CommitmentHash => "commitment hash",
            MessageType::Bitmap => "bitmap",
            MessageType::Commitment => "commitment",
            MessageType::Signature => "signature",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A signed message from one consensus group member.
///
/// `block_header_hash` is the consensus data of the round (the proposed header
/// hash). It is the zero hash on the block body message, which is sent before
/// the header exists on receivers.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ConsensusMessage {
    /// Hash of the proposed header this message refers to.
    pub block_header_hash: Hash,

    /// Phase payload (encoded body/header, commitment hash, bitmap, commitment or share).
    pub sub_round_data: Vec<u8>,

    /// Sending validator.
    pub sender: ValidatorId,

    /// Sender's signature over [`ConsensusMessage::signing_bytes`].
    pub signature: Option<Signature>,

    /// Payload kind.
    pub msg_type: MessageType,

    /// Synchronised unix time (milliseconds) at which the message was built.
    pub timestamp: u64,

    /// Round the message belongs to.
    pub round_index: RoundIndex,
}

impl ConsensusMessage {
    /// Create an unsigned message.
    pub fn new(
        block_header_hash: Hash,
        sub_round_data: Vec<u8>,
        sender: ValidatorId,
        msg_type: MessageType,
        timestamp: u64,
        round_index: RoundIndex,
    ) -> Self {
        Self {
            block_header_hash,
            sub_round_data,
            sender,
            signature: None,
            msg_type,
            timestamp,
            round_index,
        }
    }

    /// Bytes covered by the sender's signature (everything except the signature).
    pub fn signing_bytes(&self) -> Vec<u8> {
        consensus_message_signing_bytes(
            self.msg_type.as_u8(),
            self.round_index,
            self.timestamp,
            self.sender,
            &self.block_header_hash,
            &self.sub_round_data,
        )
    }

    /// Attach a signature, replacing any previous one.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spos_types::test_utils::test_bls_key;

    #[test]
    fn test_signing_bytes_ignore_signature() {
        let key = test_bls_key(0);
        let msg = ConsensusMessage::new(
            Hash::from_bytes(b"header"),
            vec![1, 2, 3],
            ValidatorId(0),
            MessageType::Commitment,
            1_000,
            RoundIndex(7),
        );

        let unsigned = msg.signing_bytes();
        let signed = msg.with_signature(key.sign(&unsigned));

        assert_eq!(signed.signing_bytes(), unsigned);
        let sig = signed.signature.as_ref().unwrap();
        assert!(key.public_key().verify(&unsigned, sig));
    }

    #[test]
    fn test_message_type_tags_are_distinct() {
        let mut tags: Vec<u8> = MessageType::ALL.iter().map(|t| t.as_u8()).collect();
        tags.dedup();
        assert_eq!(tags.len(), MessageType::ALL.len());
        assert_eq!(MessageType::ALL[0], MessageType::BlockBody);
        assert_eq!(MessageType::ALL[5], MessageType::Signature);
    }
}
