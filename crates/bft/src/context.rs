//! Capabilities shared by every subround handler of a round.

use crate::ConsensusState;
use spos_core::{
    BlockChain, BlockProcessor, Bootstrapper, Hasher, MultiSigner, Rounder, ShardCoordinator,
    SyncTimer, ValidatorGroupSelector,
};
use spos_messages::{ConsensusMessage, MessageType};
use spos_types::{Hash, ValidatorSet};
use std::sync::Arc;
use std::time::Duration;

/// Everything a subround handler reads or drives.
///
/// Cloning is cheap; all handlers of a round hold clones of the same bundle.
#[derive(Clone)]
pub struct ConsensusContext {
    pub state: Arc<ConsensusState>,
    pub validators: Arc<ValidatorSet>,
    pub block_chain: Arc<dyn BlockChain>,
    pub block_processor: Arc<dyn BlockProcessor>,
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub hasher: Arc<dyn Hasher>,
    pub multi_signer: Arc<dyn MultiSigner>,
    pub rounder: Arc<dyn Rounder>,
    pub shard_coordinator: Arc<dyn ShardCoordinator>,
    pub sync_timer: Arc<dyn SyncTimer>,
    pub group_selector: Arc<dyn ValidatorGroupSelector>,
}

impl ConsensusContext {
    /// Time elapsed since the current round started.
    pub fn round_elapsed(&self) -> Duration {
        self.sync_timer
            .current_time()
            .saturating_sub(self.rounder.time_stamp())
    }

    /// Whether the round clock is still before `end` (an offset from round start).
    pub fn have_time(&self, end: Duration) -> bool {
        self.round_elapsed() < end
    }

    /// Synchronised unix time in milliseconds.
    pub fn now_millis(&self) -> u64 {
        self.sync_timer.current_time().as_millis() as u64
    }

    /// Unsigned message from the local node for the current round.
    pub(crate) fn new_message(
        &self,
        block_header_hash: Hash,
        sub_round_data: Vec<u8>,
        msg_type: MessageType,
    ) -> ConsensusMessage {
        ConsensusMessage::new(
            block_header_hash,
            sub_round_data,
            self.state.self_id(),
            msg_type,
            self.now_millis(),
            self.state.round_index(),
        )
    }
}

impl std::fmt::Debug for ConsensusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusContext")
            .field("self_id", &self.state.self_id())
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}
