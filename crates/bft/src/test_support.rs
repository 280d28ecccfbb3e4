//! Fixtures shared by the unit tests of this crate.

use crate::factory::init_consensus_threshold;
use crate::subrounds::SendMessageFn;
use crate::worker::Worker;
use crate::{
    BftConfig, ConsensusContext, ConsensusState, ConsensusStateChanged, Subround, SubroundHooks,
    SubroundId, SubroundStatus,
};
use parking_lot::Mutex;
use spos_core::{Blake3Hasher, StaticShardCoordinator};
use spos_messages::ConsensusMessage;
use spos_test_helpers::{
    BlockChainMock, BlockProcessorMock, BootstrapperMock, BroadcastMessengerMock,
    MultiSignerMock, RounderMock, SyncTimerMock, ValidatorGroupSelectorMock,
};
use spos_types::test_utils::{test_bls_keys, test_validator_set};
use spos_types::{BlockBody, BlockHeader, BlockHeight, Hash, KeyPair, RoundIndex, ShardId, ValidatorId, ValidatorSet};
use std::sync::Arc;
use std::time::Duration;

/// Round duration used by every fixture.
pub const ROUND_DURATION: Duration = Duration::from_millis(4000);

/// Messages captured by [`recording_sender`].
pub type SentMessages = Arc<Mutex<Vec<ConsensusMessage>>>;

/// Send hook that records every message and always succeeds.
pub fn recording_sender() -> (SendMessageFn, SentMessages) {
    let sent: SentMessages = Arc::default();
    let recorded = sent.clone();
    let send: SendMessageFn = Arc::new(move |msg| {
        recorded.lock().push(msg);
        true
    });
    (send, sent)
}

/// Subround with the default window for `id`, not backed by a worker.
pub fn make_subround(id: SubroundId) -> Subround {
    let (start, end) = BftConfig::default().window(id).scale(ROUND_DURATION);
    Subround::new(
        id.previous(),
        id,
        id.next(),
        start,
        end,
        SubroundHooks::detached(ConsensusStateChanged::new()),
    )
    .unwrap()
}

/// Consensus context over mocks for a group of `n` validators `0..n`.
///
/// The group is already selected (validator 0 leads) and thresholds are set.
pub struct TestContext {
    pub context: ConsensusContext,
    pub keys: Vec<KeyPair>,
    pub validators: Arc<ValidatorSet>,
    pub rounder: Arc<RounderMock>,
    pub sync_timer: Arc<SyncTimerMock>,
    pub selector: Arc<ValidatorGroupSelectorMock>,
    pub bootstrapper: Arc<BootstrapperMock>,
    pub multi_signer: Arc<MultiSignerMock>,
    pub block_processor: Arc<BlockProcessorMock>,
    pub chain: Arc<BlockChainMock>,
    pub messenger: Arc<BroadcastMessengerMock>,
}

impl TestContext {
    pub fn new(n: usize) -> Self {
        Self::with_self(n, ValidatorId(0))
    }

    pub fn with_self(n: usize, self_id: ValidatorId) -> Self {
        let keys = test_bls_keys(n);
        let validators = Arc::new(test_validator_set(&keys));
        let group: Vec<ValidatorId> = (0..n as u64).map(ValidatorId).collect();

        let state = Arc::new(ConsensusState::new(self_id, n).unwrap());
        state.set_consensus_group(group.clone());
        init_consensus_threshold(&state);

        let rounder = Arc::new(RounderMock::new(RoundIndex(0), Duration::ZERO, ROUND_DURATION));
        let sync_timer = Arc::new(SyncTimerMock::new(Duration::ZERO));
        let selector = Arc::new(ValidatorGroupSelectorMock::new(group));
        let bootstrapper = Arc::new(BootstrapperMock::new());
        let multi_signer = Arc::new(MultiSignerMock::new(self_id.0 as usize));
        let block_processor = Arc::new(BlockProcessorMock::new());
        let chain = Arc::new(BlockChainMock::default());

        let context = ConsensusContext {
            state,
            validators: validators.clone(),
            block_chain: chain.clone(),
            block_processor: block_processor.clone(),
            bootstrapper: bootstrapper.clone(),
            hasher: Arc::new(Blake3Hasher),
            multi_signer: multi_signer.clone(),
            rounder: rounder.clone(),
            shard_coordinator: Arc::new(StaticShardCoordinator::new(ShardId(0), 1)),
            sync_timer: sync_timer.clone(),
            group_selector: selector.clone(),
        };

        Self {
            context,
            keys,
            validators,
            rounder,
            sync_timer,
            selector,
            bootstrapper,
            multi_signer,
            block_processor,
            chain,
            messenger: Arc::new(BroadcastMessengerMock::new()),
        }
    }

    pub fn state(&self) -> &Arc<ConsensusState> {
        &self.context.state
    }

    /// Worker over this context's state, signing with the local key.
    pub fn worker(&self) -> Arc<Worker> {
        let self_index = self.state().self_id().0 as usize;
        Worker::new(
            self.state().clone(),
            self.keys[self_index].clone(),
            self.validators.clone(),
            self.rounder.clone(),
            self.messenger.clone(),
            self.bootstrapper.clone(),
            self.block_processor.clone(),
        )
        .unwrap()
    }

    /// Consensus data used by [`finish_block`](Self::finish_block).
    pub fn block_hash(&self) -> Hash {
        Hash::from_bytes(b"test block header")
    }

    /// Put the state where the Block phase left it: block agreed, leader done.
    pub fn finish_block(&self) {
        let state = self.state();
        state.set_data(Some(self.block_hash()));
        state.set_header(Some(BlockHeader {
            height: BlockHeight(1),
            round: state.round_index(),
            ..Default::default()
        }));
        state.set_body(Some(BlockBody::default()));
        if let Some(leader) = state.leader() {
            state.set_job_done(leader, SubroundId::Block).unwrap();
        }
        state.set_status(SubroundId::Block, SubroundStatus::Finished);
    }

    /// Mark `subround` done for the given group members.
    pub fn set_jobs_done(&self, subround: SubroundId, members: &[u64]) {
        for id in members {
            self.state()
                .set_job_done(ValidatorId(*id), subround)
                .unwrap();
        }
    }
}
