//! Bitmap: the leader fixes which members take part in the signature.

use super::SendMessageFn;
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_messages::{ConsensusMessage, MessageType};
use spos_types::SignerBitmap;
use tracing::{debug, info, warn};

/// Handler of the [`SubroundId::Bitmap`] phase.
pub struct SubroundBitmap {
    subround: Subround,
    context: ConsensusContext,
    send_message: SendMessageFn,
}

impl SubroundBitmap {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        send_message: SendMessageFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::Bitmap)?;
        Ok(Self {
            subround,
            context,
            send_message,
        })
    }

    /// Adopt the leader's bitmap.
    ///
    /// A bitmap that is too short or selects fewer members than the
    /// threshold cancels the round, as does one that leaves the local node
    /// out.
    pub fn received_bitmap(&self, msg: &ConsensusMessage) -> bool {
        let state = &self.context.state;

        if !state.is_data_equal(&msg.block_header_hash) {
            return false;
        }
        if !state.is_node_leader(msg.sender) {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::Bitmap) {
            return false;
        }

        let bitmap = SignerBitmap::from_bytes(msg.sub_round_data.clone());
        let group = state.consensus_group();
        if bitmap.bit_capacity() < group.len() {
            warn!(
                round = %msg.round_index,
                bits = bitmap.bit_capacity(),
                group = group.len(),
                "Canceled round: bitmap too short"
            );
            state.cancel_round();
            return false;
        }

        let threshold = state.threshold(SubroundId::Bitmap);
        if bitmap.count_ones() < threshold {
            warn!(
                round = %msg.round_index,
                selected = bitmap.count_ones(),
                threshold,
                "Canceled round: bitmap selects too few members"
            );
            state.cancel_round();
            return false;
        }

        for (i, member) in group.iter().enumerate() {
            if !bitmap.is_set(i) {
                continue;
            }
            if let Err(e) =
                state.set_job_done_for_round(*member, msg.round_index, SubroundId::Bitmap)
            {
                debug!(error = %e, "Failed to record bitmap member");
                return false;
            }
        }

        if !state.is_self_in_bitmap() {
            info!(round = %msg.round_index, "Canceled round: not selected in bitmap");
            state.cancel_round();
            return false;
        }
        true
    }
}

impl SubroundHandler for SubroundBitmap {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    /// Leader only: select every member whose commitment hash arrived.
    fn do_job(&self) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        if !state.is_self_leader() {
            return false;
        }
        if !state.can_do_subround_job(SubroundId::Bitmap) {
            return false;
        }
        let Some(data) = state.data() else {
            return false;
        };

        let bitmap = state.generate_bitmap(SubroundId::CommitmentHash);
        let msg = ctx.new_message(data, bitmap.as_bytes().to_vec(), MessageType::Bitmap);
        if !(self.send_message)(msg) {
            return false;
        }
        info!(
            round = %state.round_index(),
            selected = bitmap.count_ones(),
            "Step 3: bitmap has been sent"
        );

        for member in state.consensus_group() {
            if !state.is_job_done(member, SubroundId::CommitmentHash) {
                continue;
            }
            if let Err(e) = state.set_job_done(member, SubroundId::Bitmap) {
                warn!(error = %e, "Failed to record bitmap member");
                return false;
            }
        }
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::Bitmap) {
            return true;
        }
        if !state.has_reached_threshold(SubroundId::Bitmap) {
            return false;
        }

        if state.is_self_in_bitmap() {
            info!(round = %state.round_index(), "Step 3: selected in bitmap");
        } else {
            info!(round = %state.round_index(), "Step 3: not selected in bitmap");
        }
        info!(
            round = %state.round_index(),
            "Step 3: subround {} has been finished",
            self.subround.name()
        );
        state.set_status(SubroundId::Bitmap, SubroundStatus::Finished);
        true
    }
}
