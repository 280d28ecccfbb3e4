//! Round setup: reset state, pick the consensus group, reset the multi-signer.

use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_types::PublicKey;
use tracing::{info, warn};

/// Handler of the [`SubroundId::StartRound`] phase.
pub struct SubroundStartRound {
    subround: Subround,
    context: ConsensusContext,
}

impl SubroundStartRound {
    pub fn new(subround: Subround, context: ConsensusContext) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::StartRound)?;
        Ok(Self { subround, context })
    }

    /// Select the group and prepare the multi-signer. Cancels the round on failure.
    fn init_current_round(&self) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        let round = state.round_index();

        if ctx.bootstrapper.should_sync() {
            warn!(round = %round, "Canceled round: node is syncing");
            state.cancel_round();
            return false;
        }

        if let Err(e) = self.generate_next_consensus_group() {
            warn!(round = %round, error = %e, "Canceled round: consensus group selection failed");
            state.cancel_round();
            return false;
        }

        let leader = state.leader();
        info!(
            round = %round,
            leader = ?leader,
            my_turn = state.is_self_leader(),
            "Step 0: preparing for this round"
        );

        let Some(self_index) = state.self_consensus_group_index() else {
            info!(round = %round, "Canceled round: not in the consensus group");
            state.cancel_round();
            return false;
        };

        let public_keys = match self.group_public_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(round = %round, error = %e, "Canceled round");
                state.cancel_round();
                return false;
            }
        };

        if let Err(e) = ctx.multi_signer.reset(&public_keys, self_index) {
            warn!(round = %round, error = %e, "Canceled round: multi-signer reset failed");
            state.cancel_round();
            return false;
        }

        if !ctx.have_time(self.subround.end_time()) {
            warn!(round = %round, subround = %self.subround.id(), "Canceled round: time is out");
            state.cancel_round();
            return false;
        }

        if let Err(e) = state.set_self_job_done(SubroundId::StartRound) {
            warn!(error = %e, "Failed to record own start round job");
            state.cancel_round();
            return false;
        }

        info!(round = %round, "Step 0: subround {} has been finished", self.subround.name());
        state.set_status(SubroundId::StartRound, SubroundStatus::Finished);
        true
    }

    fn generate_next_consensus_group(&self) -> Result<(), spos_core::SelectionError> {
        let randomness = self.context.state.round_index().0.to_le_bytes();
        let group = self
            .context
            .group_selector
            .compute_validators_group(&randomness)?;
        self.context.state.set_consensus_group(group);
        Ok(())
    }

    fn group_public_keys(&self) -> Result<Vec<PublicKey>, ConsensusError> {
        self.context
            .state
            .consensus_group()
            .into_iter()
            .map(|id| {
                self.context
                    .validators
                    .public_key(id)
                    .cloned()
                    .ok_or(ConsensusError::UnknownValidator(id))
            })
            .collect()
    }
}

impl SubroundHandler for SubroundStartRound {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    /// Reset the round state and record the round index and start time.
    fn do_job(&self) -> bool {
        let ctx = &self.context;
        ctx.state.reset_round_state();
        ctx.state
            .set_round(ctx.rounder.index(), ctx.rounder.time_stamp());
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::StartRound) {
            return true;
        }
        self.init_current_round()
    }
}
