//! SBOR wire codec for consensus messages and block parts.
//!
//! The payload type is determined by the topic a message arrives on, so the
//! encoded bytes carry no type tag of their own.

use crate::ConsensusMessage;
use spos_types::{BlockBody, BlockHeader};
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Message is empty")]
    Empty,

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),
}

fn encode<T: sbor::BasicEncode + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    sbor::basic_encode(value).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))
}

fn decode<T: sbor::BasicDecode>(data: &[u8]) -> Result<T, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }
    sbor::basic_decode(data).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}

/// Encode a consensus message for the consensus topic.
pub fn encode_consensus_message(message: &ConsensusMessage) -> Result<Vec<u8>, CodecError> {
    encode(message)
}

/// Decode a consensus message received on the consensus topic.
pub fn decode_consensus_message(data: &[u8]) -> Result<ConsensusMessage, CodecError> {
    decode(data)
}

/// Encode a block header.
pub fn encode_header(header: &BlockHeader) -> Result<Vec<u8>, CodecError> {
    encode(header)
}

/// Decode a block header.
pub fn decode_header(data: &[u8]) -> Result<BlockHeader, CodecError> {
    decode(data)
}

/// Encode a block body.
pub fn encode_body(body: &BlockBody) -> Result<Vec<u8>, CodecError> {
    encode(body)
}

/// Decode a block body.
pub fn decode_body(data: &[u8]) -> Result<BlockBody, CodecError> {
    decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;
    use spos_types::{BlockHeight, Hash, RoundIndex, ShardId, ValidatorId};

    #[test]
    fn test_consensus_message_survives_wire() {
        let key = spos_types::test_utils::test_bls_key(1);
        let msg = ConsensusMessage::new(
            Hash::from_bytes(b"header"),
            vec![0b0000_0111],
            ValidatorId(1),
            MessageType::Bitmap,
            42,
            RoundIndex(3),
        );
        let msg = msg.clone().with_signature(key.sign(&msg.signing_bytes()));

        let bytes = encode_consensus_message(&msg).unwrap();
        assert_eq!(decode_consensus_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_header_hash_is_stable_across_encoding() {
        let header = BlockHeader {
            height: BlockHeight(1),
            round: RoundIndex(1),
            shard_id: ShardId(0),
            body_hash: Hash::from_bytes(b"body"),
            ..Default::default()
        };

        let first = encode_header(&header).unwrap();
        let decoded = decode_header(&first).unwrap();
        assert_eq!(encode_header(&decoded).unwrap(), first);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_body(&[]), Err(CodecError::Empty));
        assert!(matches!(
            decode_consensus_message(&[0xff, 0x00, 0x01]),
            Err(CodecError::SborDecode(_))
        ));
    }
}
