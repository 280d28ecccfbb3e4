//! Network messages for the SPoS consensus round.
//!
//! Every phase of a round exchanges [`ConsensusMessage`]s tagged with a
//! [`MessageType`]. Finished blocks travel separately as an encoded header and
//! body on their own topics. The [`codec`] module turns all of them into bytes
//! and back.

pub mod codec;
mod consensus_message;
mod network;

pub use codec::CodecError;
pub use consensus_message::{ConsensusMessage, MessageType};
pub use network::{NetworkMessage, TOPIC_BLOCK_BODY, TOPIC_BLOCK_HEADER, TOPIC_CONSENSUS};
