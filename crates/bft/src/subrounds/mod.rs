//! The seven phase handlers of a round.
//!
//! Each handler wraps a [`Subround`](crate::Subround) and implements
//! [`SubroundHandler`](crate::SubroundHandler). Handlers that consume peer
//! messages also expose `received_*` callbacks; the factory registers those
//! with the worker under their [`MessageType`](spos_messages::MessageType).

mod bitmap;
mod block;
mod commitment;
mod commitment_hash;
mod end_round;
mod signature;
mod start_round;

pub use bitmap::SubroundBitmap;
pub use block::SubroundBlock;
pub use commitment::SubroundCommitment;
pub use commitment_hash::SubroundCommitmentHash;
pub use end_round::SubroundEndRound;
pub use signature::SubroundSignature;
pub use start_round::SubroundStartRound;

use crate::{ConsensusState, SubroundId};
use spos_core::BroadcastError;
use spos_messages::ConsensusMessage;
use spos_types::{BlockBody, BlockHeader};
use std::sync::Arc;

/// Signs and broadcasts a consensus message. Returns whether it went out.
pub type SendMessageFn = Arc<dyn Fn(ConsensusMessage) -> bool + Send + Sync>;

/// Broadcasts a committed block.
pub type BroadcastBlockFn =
    Arc<dyn Fn(&BlockBody, &BlockHeader) -> Result<(), BroadcastError> + Send + Sync>;

/// Whether every bitmap member finished `subround` and there are at least
/// `threshold` of them.
///
/// A member counts as a bitmap member once its bitmap job is done.
pub(crate) fn bitmap_members_done(
    state: &ConsensusState,
    subround: SubroundId,
    threshold: usize,
) -> bool {
    let mut n = 0;
    for node in state.consensus_group() {
        if !state.is_job_done(node, SubroundId::Bitmap) {
            continue;
        }
        if !state.is_job_done(node, subround) {
            return false;
        }
        n += 1;
    }
    n >= threshold
}
