//! Signature shares over the proposed header.

use super::{bitmap_members_done, SendMessageFn};
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_messages::{ConsensusMessage, MessageType};
use spos_types::SignerBitmap;
use tracing::{debug, info, warn};

/// Handler of the [`SubroundId::Signature`] phase.
pub struct SubroundSignature {
    subround: Subround,
    context: ConsensusContext,
    send_message: SendMessageFn,
}

impl SubroundSignature {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        send_message: SendMessageFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::Signature)?;
        Ok(Self {
            subround,
            context,
            send_message,
        })
    }

    /// Store a bitmap member's signature share.
    ///
    /// Shares are verified in the end round, against the final bitmap.
    pub fn received_signature(&self, msg: &ConsensusMessage) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;

        if !state.is_data_equal(&msg.block_header_hash) {
            return false;
        }
        if !state.is_validator_in_bitmap(msg.sender) {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::Signature) {
            return false;
        }
        let Some(index) = state.consensus_group_index(msg.sender) else {
            return false;
        };

        if let Err(e) = ctx
            .multi_signer
            .store_signature_share(index, msg.sub_round_data.clone())
        {
            debug!(sender = %msg.sender, error = %e, "Failed to store signature share");
            return false;
        }
        if let Err(e) =
            state.set_job_done_for_round(msg.sender, msg.round_index, SubroundId::Signature)
        {
            debug!(error = %e, "Failed to record signature job");
            return false;
        }
        true
    }

    /// Every member set in `bitmap` revealed a commitment matching its hash.
    pub fn check_commitments_validity(&self, bitmap: &SignerBitmap) -> Result<(), ConsensusError> {
        let ctx = &self.context;
        let group = ctx.state.consensus_group();
        let size = group.len().min(bitmap.bit_capacity());

        for (i, member) in group.iter().enumerate().take(size) {
            if !bitmap.is_set(i) {
                continue;
            }
            if !ctx.state.is_job_done(*member, SubroundId::Commitment) {
                return Err(ConsensusError::MissingCommitment { index: i });
            }
            let commitment = ctx.multi_signer.commitment(i)?;
            let announced = ctx.multi_signer.commitment_hash(i)?;
            if ctx.hasher.compute(&commitment) != announced {
                return Err(ConsensusError::CommitmentHashMismatch { index: i });
            }
        }
        Ok(())
    }

    fn create_share(&self, bitmap: &SignerBitmap) -> Result<Vec<u8>, ConsensusError> {
        self.check_commitments_validity(bitmap)?;
        let ctx = &self.context;
        ctx.multi_signer.aggregate_commitments(bitmap)?;
        Ok(ctx.multi_signer.create_signature_share(bitmap)?)
    }
}

impl SubroundHandler for SubroundSignature {
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
        if !state.can_do_subround_job(SubroundId::Signature) {
            return false;
        }
        let Some(data) = state.data() else {
            return false;
        };

        let bitmap = state.generate_bitmap(SubroundId::Bitmap);
        let share = match self.create_share(&bitmap) {
            Ok(share) => share,
            Err(e) => {
                warn!(round = %state.round_index(), error = %e, "Failed to create signature share");
                return false;
            }
        };

        let msg = ctx.new_message(data, share, MessageType::Signature);
        if !(self.send_message)(msg) {
            return false;
        }
        info!(round = %state.round_index(), "Step 5: signature has been sent");

        if let Err(e) = state.set_self_job_done(SubroundId::Signature) {
            warn!(error = %e, "Failed to record own signature job");
            return false;
        }
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::Signature) {
            return true;
        }

        let threshold = state.threshold(SubroundId::Signature);
        if !bitmap_members_done(state, SubroundId::Signature, threshold) {
            return false;
        }
        info!(
            round = %state.round_index(),
            "Step 5: subround {} has been finished",
            self.subround.name()
        );
        state.set_status(SubroundId::Signature, SubroundStatus::Finished);
        true
    }
}
