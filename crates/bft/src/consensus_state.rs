//! Shared, round-scoped consensus state.
//!
//! One [`ConsensusState`] lives for the whole life of the node and is reset at
//! the start of every round. Every read and write goes through a single lock:
//! the driver's job and check calls and any number of message callbacks touch
//! it concurrently.
//!
//! Job-done flags and subround status only move forward within a round. The
//! round-cancel flag is sticky until the next reset.

use crate::{ConsensusError, SubroundId, SubroundStatus};
use indexmap::IndexMap;
use parking_lot::Mutex;
use spos_types::{BlockBody, BlockHeader, Hash, RoundIndex, SignerBitmap, ValidatorId};
use std::time::Duration;
use tracing::{debug, warn};

type JobFlags = [bool; SubroundId::COUNT];

#[derive(Debug)]
struct RoundState {
    /// Job-done flags keyed by group member, in group order.
    job_done: IndexMap<ValidatorId, JobFlags>,
    thresholds: [usize; SubroundId::COUNT],
    status: [SubroundStatus; SubroundId::COUNT],
    round_index: RoundIndex,
    round_timestamp: Duration,
    round_canceled: bool,
    data: Option<Hash>,
    header: Option<BlockHeader>,
    body: Option<BlockBody>,
    processing_block: bool,
}

impl RoundState {
    fn new() -> Self {
        Self {
            job_done: IndexMap::new(),
            thresholds: [0; SubroundId::COUNT],
            status: [SubroundStatus::NotFinished; SubroundId::COUNT],
            round_index: RoundIndex::default(),
            round_timestamp: Duration::ZERO,
            round_canceled: false,
            data: None,
            header: None,
            body: None,
            processing_block: false,
        }
    }

    fn compute_size(&self, subround: SubroundId) -> usize {
        self.job_done
            .values()
            .filter(|flags| flags[subround.index()])
            .count()
    }
}

/// Round-scoped record of group membership, job bookkeeping and block data.
#[derive(Debug)]
pub struct ConsensusState {
    self_id: ValidatorId,
    consensus_group_size: usize,
    inner: Mutex<RoundState>,
}

impl ConsensusState {
    /// Create the state for the local validator `self_id`.
    pub fn new(self_id: ValidatorId, consensus_group_size: usize) -> Result<Self, ConsensusError> {
        if consensus_group_size == 0 {
            return Err(ConsensusError::EmptyConsensusGroup);
        }
        Ok(Self {
            self_id,
            consensus_group_size,
            inner: Mutex::new(RoundState::new()),
        })
    }

    /// The local validator.
    pub fn self_id(&self) -> ValidatorId {
        self.self_id
    }

    /// Configured consensus group size, used for thresholds.
    pub fn consensus_group_size(&self) -> usize {
        self.consensus_group_size
    }

    /// Clear everything that belongs to a single round.
    ///
    /// Thresholds survive: they are set when the round's subrounds are
    /// generated, before this reset runs.
    pub fn reset_round_state(&self) {
        let mut inner = self.inner.lock();
        for flags in inner.job_done.values_mut() {
            *flags = [false; SubroundId::COUNT];
        }
        inner.status = [SubroundStatus::NotFinished; SubroundId::COUNT];
        inner.round_canceled = false;
        inner.data = None;
        inner.header = None;
        inner.body = None;
        inner.processing_block = false;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Consensus group
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the consensus group. All job-done flags start cleared.
    pub fn set_consensus_group(&self, group: Vec<ValidatorId>) {
        let mut inner = self.inner.lock();
        inner.job_done = group
            .into_iter()
            .map(|id| (id, [false; SubroundId::COUNT]))
            .collect();
    }

    /// Current consensus group in order.
    pub fn consensus_group(&self) -> Vec<ValidatorId> {
        self.inner.lock().job_done.keys().copied().collect()
    }

    /// Round leader: the first group member.
    pub fn leader(&self) -> Option<ValidatorId> {
        self.inner.lock().job_done.keys().next().copied()
    }

    pub fn is_node_leader(&self, node: ValidatorId) -> bool {
        self.leader() == Some(node)
    }

    pub fn is_self_leader(&self) -> bool {
        self.is_node_leader(self.self_id)
    }

    pub fn is_node_self(&self, node: ValidatorId) -> bool {
        node == self.self_id
    }

    /// Position of `node` in the consensus group.
    pub fn consensus_group_index(&self, node: ValidatorId) -> Option<usize> {
        self.inner.lock().job_done.get_index_of(&node)
    }

    pub fn self_consensus_group_index(&self) -> Option<usize> {
        self.consensus_group_index(self.self_id)
    }

    pub fn is_node_in_consensus_group(&self, node: ValidatorId) -> bool {
        self.inner.lock().job_done.contains_key(&node)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Job bookkeeping
    // ═══════════════════════════════════════════════════════════════════════

    /// Mark `node`'s job for `subround` as done. Idempotent.
    pub fn set_job_done(&self, node: ValidatorId, subround: SubroundId) -> Result<(), ConsensusError> {
        let mut inner = self.inner.lock();
        let flags = inner
            .job_done
            .get_mut(&node)
            .ok_or(ConsensusError::NotInConsensusGroup(node))?;
        flags[subround.index()] = true;
        Ok(())
    }

    /// Mark `node`'s job for `subround` as done, provided the state is still
    /// on `round`.
    ///
    /// Round check and write happen under one lock, so a callback racing a
    /// round reset cannot leak a flag into the next round.
    pub fn set_job_done_for_round(
        &self,
        node: ValidatorId,
        round: RoundIndex,
        subround: SubroundId,
    ) -> Result<(), ConsensusError> {
        let mut inner = self.inner.lock();
        if inner.round_index != round {
            return Err(ConsensusError::StaleRound {
                message: round,
                current: inner.round_index,
            });
        }
        let flags = inner
            .job_done
            .get_mut(&node)
            .ok_or(ConsensusError::NotInConsensusGroup(node))?;
        flags[subround.index()] = true;
        Ok(())
    }

    pub fn set_self_job_done(&self, subround: SubroundId) -> Result<(), ConsensusError> {
        self.set_job_done(self.self_id, subround)
    }

    /// Whether `node` finished its job for `subround`.
    pub fn job_done(&self, node: ValidatorId, subround: SubroundId) -> Result<bool, ConsensusError> {
        self.inner
            .lock()
            .job_done
            .get(&node)
            .map(|flags| flags[subround.index()])
            .ok_or(ConsensusError::NotInConsensusGroup(node))
    }

    /// Like [`job_done`](Self::job_done), treating non-members as not done.
    pub fn is_job_done(&self, node: ValidatorId, subround: SubroundId) -> bool {
        self.job_done(node, subround).unwrap_or(false)
    }

    pub fn is_self_job_done(&self, subround: SubroundId) -> bool {
        self.is_job_done(self.self_id, subround)
    }

    /// Number of group members whose job for `subround` is done.
    pub fn compute_size(&self, subround: SubroundId) -> usize {
        self.inner.lock().compute_size(subround)
    }

    /// Set the number of done jobs `subround` needs. `n < 1` is ignored.
    pub fn set_threshold(&self, subround: SubroundId, n: usize) {
        if n < 1 {
            warn!(subround = %subround, "Ignoring threshold below 1");
            return;
        }
        self.inner.lock().thresholds[subround.index()] = n;
    }

    pub fn threshold(&self, subround: SubroundId) -> usize {
        self.inner.lock().thresholds[subround.index()]
    }

    /// Whether at least `threshold(subround)` members finished `subround`.
    pub fn has_reached_threshold(&self, subround: SubroundId) -> bool {
        let inner = self.inner.lock();
        inner.compute_size(subround) >= inner.thresholds[subround.index()]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Status and cancellation
    // ═══════════════════════════════════════════════════════════════════════

    /// Set the status of `subround`. A finished subround stays finished.
    pub fn set_status(&self, subround: SubroundId, status: SubroundStatus) {
        let mut inner = self.inner.lock();
        let slot = &mut inner.status[subround.index()];
        if *slot == SubroundStatus::Finished {
            if status != SubroundStatus::Finished {
                debug!(subround = %subround, "Ignoring status rollback of finished subround");
            }
            return;
        }
        *slot = status;
    }

    pub fn status(&self, subround: SubroundId) -> SubroundStatus {
        self.inner.lock().status[subround.index()]
    }

    pub fn is_finished(&self, subround: SubroundId) -> bool {
        self.status(subround) == SubroundStatus::Finished
    }

    /// Abort the rest of the round.
    pub fn cancel_round(&self) {
        self.inner.lock().round_canceled = true;
    }

    pub fn round_canceled(&self) -> bool {
        self.inner.lock().round_canceled
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round data
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_round(&self, index: RoundIndex, timestamp: Duration) {
        let mut inner = self.inner.lock();
        inner.round_index = index;
        inner.round_timestamp = timestamp;
    }

    pub fn round_index(&self) -> RoundIndex {
        self.inner.lock().round_index
    }

    pub fn round_timestamp(&self) -> Duration {
        self.inner.lock().round_timestamp
    }

    /// Consensus data of the round: the hash of the proposed header.
    pub fn data(&self) -> Option<Hash> {
        self.inner.lock().data
    }

    pub fn set_data(&self, data: Option<Hash>) {
        self.inner.lock().data = data;
    }

    /// Whether `data` equals the consensus data (false while unset).
    pub fn is_data_equal(&self, data: &Hash) -> bool {
        self.inner.lock().data.as_ref() == Some(data)
    }

    pub fn header(&self) -> Option<BlockHeader> {
        self.inner.lock().header.clone()
    }

    pub fn set_header(&self, header: Option<BlockHeader>) {
        self.inner.lock().header = header;
    }

    pub fn body(&self) -> Option<BlockBody> {
        self.inner.lock().body.clone()
    }

    pub fn set_body(&self, body: Option<BlockBody>) {
        self.inner.lock().body = body;
    }

    pub fn is_header_already_received(&self) -> bool {
        self.inner.lock().header.is_some()
    }

    pub fn is_body_already_received(&self) -> bool {
        self.inner.lock().body.is_some()
    }

    /// Take the processing-block flag. Returns false if it was already taken.
    pub fn try_begin_processing_block(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.processing_block {
            return false;
        }
        inner.processing_block = true;
        true
    }

    pub fn end_processing_block(&self) {
        self.inner.lock().processing_block = false;
    }

    pub fn processing_block(&self) -> bool {
        self.inner.lock().processing_block
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subround gating
    // ═══════════════════════════════════════════════════════════════════════

    /// Whether the local node should still do its job for `subround`.
    pub fn can_do_subround_job(&self, subround: SubroundId) -> bool {
        let inner = self.inner.lock();
        if inner.data.is_none() {
            return false;
        }
        let self_done = inner
            .job_done
            .get(&self.self_id)
            .map(|flags| flags[subround.index()]);
        if self_done != Some(false) {
            return false;
        }
        inner.status[subround.index()] != SubroundStatus::Finished
    }

    /// Whether a message from `sender` for `round` should update `subround`.
    ///
    /// Own messages, messages of another round, duplicates from a sender
    /// already done and messages for a finished subround are skipped.
    pub fn can_process_received_message(
        &self,
        sender: ValidatorId,
        round: RoundIndex,
        subround: SubroundId,
    ) -> bool {
        if self.is_node_self(sender) {
            return false;
        }
        let inner = self.inner.lock();
        if round != inner.round_index {
            return false;
        }
        if inner
            .job_done
            .get(&sender)
            .is_some_and(|flags| flags[subround.index()])
        {
            return false;
        }
        inner.status[subround.index()] != SubroundStatus::Finished
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Bitmap
    // ═══════════════════════════════════════════════════════════════════════

    /// Bitmap of the group members whose job for `subround` is done.
    pub fn generate_bitmap(&self, subround: SubroundId) -> SignerBitmap {
        let inner = self.inner.lock();
        let mut bitmap = SignerBitmap::new(inner.job_done.len());
        for (i, flags) in inner.job_done.values().enumerate() {
            if flags[subround.index()] {
                bitmap.set(i);
            }
        }
        bitmap
    }

    /// Whether `node` was selected in the leader's bitmap.
    pub fn is_validator_in_bitmap(&self, node: ValidatorId) -> bool {
        self.is_job_done(node, SubroundId::Bitmap)
    }

    pub fn is_self_in_bitmap(&self) -> bool {
        self.is_validator_in_bitmap(self.self_id)
    }
}
