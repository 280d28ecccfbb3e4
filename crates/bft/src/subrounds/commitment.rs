//! Commitment reveal by the members selected in the bitmap.

use super::{bitmap_members_done, SendMessageFn};
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_messages::{ConsensusMessage, MessageType};
use tracing::{debug, info, warn};

/// Handler of the [`SubroundId::Commitment`] phase.
pub struct SubroundCommitment {
    subround: Subround,
    context: ConsensusContext,
    send_message: SendMessageFn,
}

impl SubroundCommitment {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        send_message: SendMessageFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::Commitment)?;
        Ok(Self {
            subround,
            context,
            send_message,
        })
    }

    /// Store a bitmap member's commitment if it matches the announced hash.
    pub fn received_commitment(&self, msg: &ConsensusMessage) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;

        if !state.is_data_equal(&msg.block_header_hash) {
            return false;
        }
        if !state.is_validator_in_bitmap(msg.sender) {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::Commitment) {
            return false;
        }
        let Some(index) = state.consensus_group_index(msg.sender) else {
            return false;
        };

        let announced = match ctx.multi_signer.commitment_hash(index) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(sender = %msg.sender, error = %e, "No commitment hash for sender");
                return false;
            }
        };
        if ctx.hasher.compute(&msg.sub_round_data) != announced {
            debug!(sender = %msg.sender, "Commitment does not match its hash");
            return false;
        }

        if let Err(e) = ctx
            .multi_signer
            .store_commitment(index, msg.sub_round_data.clone())
        {
            debug!(sender = %msg.sender, error = %e, "Failed to store commitment");
            return false;
        }
        if let Err(e) =
            state.set_job_done_for_round(msg.sender, msg.round_index, SubroundId::Commitment)
        {
            debug!(error = %e, "Failed to record commitment job");
            return false;
        }
        true
    }
}

impl SubroundHandler for SubroundCommitment {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    fn do_job(&self) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        if !state.is_self_in_bitmap() {
            return false;
        }
        if !state.can_do_subround_job(SubroundId::Commitment) {
            return false;
        }
        let (Some(data), Some(self_index)) = (state.data(), state.self_consensus_group_index())
        else {
            return false;
        };

        let commitment = match ctx.multi_signer.commitment(self_index) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Own commitment missing");
                return false;
            }
        };

        let msg = ctx.new_message(data, commitment, MessageType::Commitment);
        if !(self.send_message)(msg) {
            return false;
        }
        info!(round = %state.round_index(), "Step 4: commitment has been sent");

        if let Err(e) = state.set_self_job_done(SubroundId::Commitment) {
            warn!(error = %e, "Failed to record own commitment job");
            return false;
        }
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::Commitment) {
            return true;
        }

        let threshold = state.threshold(SubroundId::Commitment);
        if !bitmap_members_done(state, SubroundId::Commitment, threshold) {
            return false;
        }
        info!(
            round = %state.round_index(),
            "Step 4: subround {} has been finished",
            self.subround.name()
        );
        state.set_status(SubroundId::Commitment, SubroundStatus::Finished);
        true
    }
}
