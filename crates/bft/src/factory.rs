//! Wires a fresh set of phase handlers for every round.

use crate::subrounds::{
    SubroundBitmap, SubroundBlock, SubroundCommitment, SubroundCommitmentHash, SubroundEndRound,
    SubroundSignature, SubroundStartRound,
};
use crate::worker::{ReceivedMessageFn, Worker};
use crate::{
    BftConfig, ChronologyHandler, ConsensusContext, ConsensusError, ConsensusState, Subround,
    SubroundHandler, SubroundId,
};
use spos_messages::{ConsensusMessage, MessageType};
use std::sync::Arc;
use tracing::debug;

/// Supermajority threshold for a group of `n`: `2n/3 + 1` (integer division).
pub fn pbft_threshold(n: usize) -> usize {
    n * 2 / 3 + 1
}

/// Set every phase threshold from the configured group size.
///
/// StartRound and Block need one done job; every other phase needs the
/// supermajority.
pub fn init_consensus_threshold(state: &ConsensusState) {
    let pbft = pbft_threshold(state.consensus_group_size());
    for subround in SubroundId::ALL {
        let n = match subround {
            SubroundId::StartRound | SubroundId::Block => 1,
            _ => pbft,
        };
        state.set_threshold(subround, n);
    }
}

/// Builds the seven phases of a round and registers them with the worker
/// and the chronology.
pub struct SubroundFactory {
    config: BftConfig,
    context: ConsensusContext,
    worker: Arc<Worker>,
    chronology: Arc<dyn ChronologyHandler>,
}

/// Everything one round registers, built before anything is registered.
struct Wiring {
    calls: Vec<(MessageType, ReceivedMessageFn)>,
    handlers: Vec<Arc<dyn SubroundHandler>>,
}

impl SubroundFactory {
    /// Create a factory.
    ///
    /// The worker must feed the same consensus state as `context`, sized for
    /// the configured group.
    pub fn new(
        config: BftConfig,
        context: ConsensusContext,
        worker: Arc<Worker>,
        chronology: Arc<dyn ChronologyHandler>,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;
        if !Arc::ptr_eq(&context.state, worker.consensus_state()) {
            return Err(ConsensusError::StateMismatch);
        }
        if context.state.consensus_group_size() != config.consensus_group_size {
            return Err(ConsensusError::StateMismatch);
        }
        Ok(Self {
            config,
            context,
            worker,
            chronology,
        })
    }

    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    /// Replace the previous round's wiring with fresh phases.
    ///
    /// On error nothing new is registered.
    pub fn generate_subrounds(&self) -> Result<(), ConsensusError> {
        self.chronology.remove_all_subrounds();
        self.worker.remove_all_received_messages_calls();

        init_consensus_threshold(&self.context.state);

        let wiring = self.build()?;
        for (msg_type, call) in wiring.calls {
            self.worker.add_received_message_call(msg_type, call);
        }
        for handler in wiring.handlers {
            self.chronology.add_subround(handler);
        }
        debug!(round = %self.context.rounder.index(), "Generated subrounds");
        Ok(())
    }

    fn subround(&self, id: SubroundId) -> Result<Subround, ConsensusError> {
        let (start, end) = self
            .config
            .window(id)
            .scale(self.context.rounder.time_duration());
        Subround::new(
            id.previous(),
            id,
            id.next(),
            start,
            end,
            self.worker.subround_hooks(),
        )
    }

    fn build(&self) -> Result<Wiring, ConsensusError> {
        let ctx = &self.context;
        let send = self.worker.send_message_fn();
        let mut calls: Vec<(MessageType, ReceivedMessageFn)> = Vec::new();

        let start_round = Arc::new(SubroundStartRound::new(
            self.subround(SubroundId::StartRound)?,
            ctx.clone(),
        )?);

        let block = Arc::new(SubroundBlock::new(
            self.subround(SubroundId::Block)?,
            ctx.clone(),
            send.clone(),
        )?);
        let h = block.clone();
        calls.push((
            MessageType::BlockBody,
            Arc::new(move |msg: &ConsensusMessage| h.received_block_body(msg)),
        ));
        let h = block.clone();
        calls.push((
            MessageType::BlockHeader,
            Arc::new(move |msg: &ConsensusMessage| h.received_block_header(msg)),
        ));

        let commitment_hash = Arc::new(SubroundCommitmentHash::new(
            self.subround(SubroundId::CommitmentHash)?,
            ctx.clone(),
            send.clone(),
        )?);
        let h = commitment_hash.clone();
        calls.push((
            MessageType::CommitmentHash,
            Arc::new(move |msg: &ConsensusMessage| h.received_commitment_hash(msg)),
        ));

        let bitmap = Arc::new(SubroundBitmap::new(
            self.subround(SubroundId::Bitmap)?,
            ctx.clone(),
            send.clone(),
        )?);
        let h = bitmap.clone();
        calls.push((
            MessageType::Bitmap,
            Arc::new(move |msg: &ConsensusMessage| h.received_bitmap(msg)),
        ));

        let commitment = Arc::new(SubroundCommitment::new(
            self.subround(SubroundId::Commitment)?,
            ctx.clone(),
            send.clone(),
        )?);
        let h = commitment.clone();
        calls.push((
            MessageType::Commitment,
            Arc::new(move |msg: &ConsensusMessage| h.received_commitment(msg)),
        ));

        let signature = Arc::new(SubroundSignature::new(
            self.subround(SubroundId::Signature)?,
            ctx.clone(),
            send,
        )?);
        let h = signature.clone();
        calls.push((
            MessageType::Signature,
            Arc::new(move |msg: &ConsensusMessage| h.received_signature(msg)),
        ));

        let end_round = Arc::new(SubroundEndRound::new(
            self.subround(SubroundId::EndRound)?,
            ctx.clone(),
            self.worker.broadcast_block_fn(),
        )?);

        Ok(Wiring {
            calls,
            handlers: vec![
                start_round as Arc<dyn SubroundHandler>,
                block,
                commitment_hash,
                bitmap,
                commitment,
                signature,
                end_round,
            ],
        })
    }
}

impl std::fmt::Debug for SubroundFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubroundFactory")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chronology, ConfigError, TimeWindow};
    use std::time::Duration;

    #[test]
    fn test_pbft_threshold() {
        assert_eq!(pbft_threshold(1), 1);
        assert_eq!(pbft_threshold(3), 3);
        assert_eq!(pbft_threshold(4), 3);
        assert_eq!(pbft_threshold(21), 15);
        for n in 1..64 {
            assert!(pbft_threshold(n) <= n);
        }
    }

    #[test]
    fn test_init_thresholds() {
        let state = ConsensusState::new(spos_types::ValidatorId(0), 4).unwrap();
        init_consensus_threshold(&state);
        assert_eq!(state.threshold(SubroundId::StartRound), 1);
        assert_eq!(state.threshold(SubroundId::Block), 1);
        for id in &SubroundId::ALL[2..] {
            assert_eq!(state.threshold(*id), 3);
        }
    }

    fn config(n: usize) -> BftConfig {
        BftConfig {
            consensus_group_size: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_registers_chain() {
        let tc = crate::test_support::TestContext::new(4);
        let worker = tc.worker();
        let chronology = Arc::new(Chronology::new());
        let factory =
            SubroundFactory::new(config(4), tc.context.clone(), worker, chronology.clone()).unwrap();

        factory.generate_subrounds().unwrap();
        assert_eq!(chronology.subround_ids(), SubroundId::ALL.to_vec());

        // A second round replaces the first round's wiring.
        factory.generate_subrounds().unwrap();
        assert_eq!(chronology.subround_ids().len(), SubroundId::COUNT);
    }

    #[test]
    fn test_windows_scale_with_round_duration() {
        let tc = crate::test_support::TestContext::new(4);
        let factory = SubroundFactory::new(
            config(4),
            tc.context.clone(),
            tc.worker(),
            Arc::new(Chronology::new()),
        )
        .unwrap();

        let end_round = factory.subround(SubroundId::EndRound).unwrap();
        assert_eq!(end_round.start_time(), Duration::from_millis(3400));
        assert_eq!(end_round.end_time(), Duration::from_millis(3800));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let tc = crate::test_support::TestContext::new(4);
        let bad = BftConfig {
            signature: TimeWindow::new(70, 60),
            ..config(4)
        };
        let err = SubroundFactory::new(bad, tc.context.clone(), tc.worker(), Arc::new(Chronology::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Config(ConfigError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_new_rejects_foreign_state() {
        let tc = crate::test_support::TestContext::new(4);
        let other = crate::test_support::TestContext::new(4);
        let err = SubroundFactory::new(
            config(4),
            tc.context.clone(),
            other.worker(),
            Arc::new(Chronology::new()),
        )
        .unwrap_err();
        assert_eq!(err, ConsensusError::StateMismatch);

        let err = SubroundFactory::new(
            config(7),
            tc.context.clone(),
            tc.worker(),
            Arc::new(Chronology::new()),
        )
        .unwrap_err();
        assert_eq!(err, ConsensusError::StateMismatch);
    }

    #[test]
    fn test_failed_generation_registers_nothing() {
        let tc = crate::test_support::TestContext::new(4);
        let chronology = Arc::new(Chronology::new());
        let factory =
            SubroundFactory::new(config(4), tc.context.clone(), tc.worker(), chronology.clone())
                .unwrap();
        factory.generate_subrounds().unwrap();

        // A zero round duration collapses every window.
        tc.rounder.set_duration(Duration::ZERO);
        let err = factory.generate_subrounds().unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTimeWindow { .. }));
        assert!(chronology.subround_ids().is_empty());
    }
}
