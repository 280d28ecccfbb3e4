//! Gossip topic binding for wire types.

use crate::ConsensusMessage;
use spos_types::{BlockBody, BlockHeader};

/// Topic carrying every per-phase consensus message.
pub const TOPIC_CONSENSUS: &str = "consensus.message";

/// Topic carrying committed block headers.
pub const TOPIC_BLOCK_HEADER: &str = "block.header";

/// Topic carrying committed block bodies.
pub const TOPIC_BLOCK_BODY: &str = "block.body";

/// A type that travels on its own gossip topic.
pub trait NetworkMessage {
    /// Topic the type is published on.
    fn message_type_id() -> &'static str;
}

impl NetworkMessage for ConsensusMessage {
    fn message_type_id() -> &'static str {
        TOPIC_CONSENSUS
    }
}

impl NetworkMessage for BlockHeader {
    fn message_type_id() -> &'static str {
        TOPIC_BLOCK_HEADER
    }
}

impl NetworkMessage for BlockBody {
    fn message_type_id() -> &'static str {
        TOPIC_BLOCK_BODY
    }
}
