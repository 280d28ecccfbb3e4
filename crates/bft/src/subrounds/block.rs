//! Block proposal: the leader builds and sends body and header, the rest of
//! the group validates and processes them.

use super::SendMessageFn;
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_messages::{codec, ConsensusMessage, MessageType};
use spos_types::{
    block_signature_message, BlockBody, BlockHeader, BlockHeight, Hash,
};
use tracing::{debug, info, warn};

/// Handler of the [`SubroundId::Block`] phase.
pub struct SubroundBlock {
    subround: Subround,
    context: ConsensusContext,
    send_message: SendMessageFn,
}

impl SubroundBlock {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        send_message: SendMessageFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::Block)?;
        Ok(Self {
            subround,
            context,
            send_message,
        })
    }

    fn have_time(&self) -> bool {
        self.context.have_time(self.subround.end_time())
    }

    fn send_block_body(&self) -> bool {
        let ctx = &self.context;
        let have_time = || self.have_time();
        let body = match ctx.block_processor.create_block_body(
            ctx.shard_coordinator.self_id(),
            ctx.state.round_index(),
            &have_time,
        ) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to create block body");
                return false;
            }
        };

        let encoded = match codec::encode_body(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode block body");
                return false;
            }
        };

        let msg = ctx.new_message(Hash::ZERO, encoded, MessageType::BlockBody);
        if !(self.send_message)(msg) {
            return false;
        }

        info!(
            round = %ctx.state.round_index(),
            transactions = body.transaction_count(),
            "Step 1: block body has been sent"
        );
        ctx.state.set_body(Some(body));
        true
    }

    fn send_block_header(&self) -> bool {
        let ctx = &self.context;
        let Some(body) = ctx.state.body() else {
            return false;
        };

        let (height, prev_hash) = match ctx.block_chain.current_block_header() {
            Some(current) => (
                current.height.next(),
                ctx.block_chain
                    .current_block_header_hash()
                    .unwrap_or_else(|| ctx.block_chain.genesis_header_hash()),
            ),
            None => (
                BlockHeight::GENESIS.next(),
                ctx.block_chain.genesis_header_hash(),
            ),
        };

        let body_hash = match codec::encode_body(&body) {
            Ok(bytes) => ctx.hasher.compute(&bytes),
            Err(e) => {
                warn!(error = %e, "Failed to encode block body");
                return false;
            }
        };

        let header = BlockHeader {
            height,
            round: ctx.state.round_index(),
            timestamp: ctx.state.round_timestamp().as_millis() as u64,
            shard_id: ctx.shard_coordinator.self_id(),
            prev_hash,
            body_hash,
            pub_keys_bitmap: Vec::new(),
            signature: Vec::new(),
        };

        let encoded = match codec::encode_header(&header) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode block header");
                return false;
            }
        };
        let header_hash = ctx.hasher.compute(&encoded);

        let msg = ctx.new_message(header_hash, encoded, MessageType::BlockHeader);
        if !(self.send_message)(msg) {
            return false;
        }

        info!(
            round = %ctx.state.round_index(),
            height = %header.height,
            hash = ?header_hash,
            "Step 1: block header has been sent"
        );
        ctx.state.set_data(Some(header_hash));
        ctx.state.set_header(Some(header));
        true
    }

    /// Accept the leader's block body.
    pub fn received_block_body(&self, msg: &ConsensusMessage) -> bool {
        let state = &self.context.state;
        if !state.is_node_leader(msg.sender) {
            debug!(sender = %msg.sender, "Ignoring block body from non-leader");
            return false;
        }
        if state.is_body_already_received() {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::Block) {
            return false;
        }

        let body = match codec::decode_body(&msg.sub_round_data) {
            Ok(body) => body,
            Err(e) => {
                debug!(sender = %msg.sender, error = %e, "Malformed block body");
                return false;
            }
        };
        state.set_body(Some(body));
        info!(round = %msg.round_index, "Step 1: block body has been received");

        self.process_received_block(msg)
    }

    /// Accept the leader's block header.
    ///
    /// A header whose hash differs from the consensus data in the message, or
    /// that belongs to another shard or round, cancels the round.
    pub fn received_block_header(&self, msg: &ConsensusMessage) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        if !state.is_node_leader(msg.sender) {
            debug!(sender = %msg.sender, "Ignoring block header from non-leader");
            return false;
        }
        if state.is_header_already_received() {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::Block) {
            return false;
        }

        let computed = ctx.hasher.compute(&msg.sub_round_data);
        if computed != msg.block_header_hash {
            warn!(
                round = %msg.round_index,
                expected = ?msg.block_header_hash,
                computed = ?computed,
                "Canceled round: block header hash mismatch"
            );
            state.cancel_round();
            return false;
        }

        let header = match codec::decode_header(&msg.sub_round_data) {
            Ok(header) => header,
            Err(e) => {
                debug!(sender = %msg.sender, error = %e, "Malformed block header");
                return false;
            }
        };
        let self_shard = ctx.shard_coordinator.self_id();
        if header.shard_id != self_shard || header.round != msg.round_index {
            warn!(
                round = %msg.round_index,
                header_round = %header.round,
                shard = %self_shard,
                header_shard = %header.shard_id,
                "Canceled round: block header is for another shard or round"
            );
            state.cancel_round();
            return false;
        }
        state.set_data(Some(msg.block_header_hash));
        info!(
            round = %msg.round_index,
            height = %header.height,
            hash = ?msg.block_header_hash,
            "Step 1: block header has been received"
        );
        state.set_header(Some(header));

        self.process_received_block(msg)
    }

    /// Process the block once both parts are present. Failure cancels the round.
    fn process_received_block(&self, msg: &ConsensusMessage) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        let (Some(header), Some(body)) = (state.header(), state.body()) else {
            return false;
        };
        let Some(data) = state.data() else {
            return false;
        };

        let body_matches = codec::encode_body(&body)
            .is_ok_and(|bytes| ctx.hasher.compute(&bytes) == header.body_hash);
        if !body_matches {
            warn!(round = %msg.round_index, "Canceled round: block body does not match header");
            state.cancel_round();
            return false;
        }

        if !state.try_begin_processing_block() {
            return false;
        }
        if state.is_job_done(msg.sender, SubroundId::Block) {
            state.end_processing_block();
            return false;
        }
        let have_time = || self.have_time();
        let result = ctx.block_processor.process_block(
            ctx.block_chain.as_ref(),
            &header,
            &body,
            &have_time,
        );
        state.end_processing_block();

        if let Err(e) = result {
            warn!(round = %msg.round_index, error = %e, "Canceled round: block processing failed");
            state.cancel_round();
            return false;
        }

        if let Err(e) =
            state.set_job_done_for_round(msg.sender, msg.round_index, SubroundId::Block)
        {
            debug!(error = %e, "Failed to record block job");
            return false;
        }
        ctx.multi_signer.set_message(&block_signature_message(&data));
        true
    }

    fn is_block_received(&self, threshold: usize) -> bool {
        self.context.state.compute_size(SubroundId::Block) >= threshold
    }
}

impl SubroundHandler for SubroundBlock {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    /// Leader only: build, send and adopt the block proposal.
    fn do_job(&self) -> bool {
        let state = &self.context.state;
        if !state.is_self_leader() {
            return false;
        }
        if state.is_self_job_done(SubroundId::Block) {
            return false;
        }
        if state.is_finished(SubroundId::Block) {
            return false;
        }

        if !state.is_body_already_received() && !self.send_block_body() {
            return false;
        }
        if !state.is_header_already_received() && !self.send_block_header() {
            return false;
        }

        if let Err(e) = state.set_self_job_done(SubroundId::Block) {
            warn!(error = %e, "Failed to record own block job");
            return false;
        }
        if let Some(data) = state.data() {
            self.context
                .multi_signer
                .set_message(&block_signature_message(&data));
        }
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::Block) {
            return true;
        }

        let threshold = state.threshold(SubroundId::Block);
        if self.is_block_received(threshold) {
            info!(
                round = %state.round_index(),
                "Step 1: subround {} has been finished",
                self.subround.name()
            );
            state.set_status(SubroundId::Block, SubroundStatus::Finished);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_subround, recording_sender, TestContext};
    use spos_core::BlockProcessError;
    use spos_types::{RoundIndex, ShardId, ValidatorId};
    use std::sync::Arc;

    fn make_block(tc: &TestContext) -> (SubroundBlock, crate::test_support::SentMessages) {
        let (send, sent) = recording_sender();
        let sr = SubroundBlock::new(make_subround(SubroundId::Block), tc.context.clone(), send).unwrap();
        (sr, sent)
    }

    /// Body and header messages as the leader (validator 0) would send them.
    fn leader_proposal(tc: &TestContext) -> (ConsensusMessage, ConsensusMessage) {
        leader_proposal_with(tc, |_| {})
    }

    /// Like [`leader_proposal`], with the header adjusted before hashing.
    fn leader_proposal_with(
        tc: &TestContext,
        adjust: impl FnOnce(&mut BlockHeader),
    ) -> (ConsensusMessage, ConsensusMessage) {
        let body = BlockBody {
            tx_hashes: vec![Hash::from_bytes(b"tx")],
            ..Default::default()
        };
        let body_bytes = codec::encode_body(&body).unwrap();
        let mut header = BlockHeader {
            height: BlockHeight(1),
            round: tc.state().round_index(),
            body_hash: Hash::from_bytes(&body_bytes),
            ..Default::default()
        };
        adjust(&mut header);
        let header_bytes = codec::encode_header(&header).unwrap();
        let header_hash = Hash::from_bytes(&header_bytes);
        let round = tc.state().round_index();

        let body_msg = ConsensusMessage::new(
            Hash::ZERO,
            body_bytes,
            ValidatorId(0),
            MessageType::BlockBody,
            0,
            round,
        );
        let header_msg = ConsensusMessage::new(
            header_hash,
            header_bytes,
            ValidatorId(0),
            MessageType::BlockHeader,
            0,
            round,
        );
        (body_msg, header_msg)
    }

    #[test]
    fn test_leader_job_sends_body_then_header() {
        let tc = TestContext::new(4);
        let (sr, sent) = make_block(&tc);

        assert!(sr.do_job());

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].msg_type, MessageType::BlockBody);
        assert_eq!(sent[1].msg_type, MessageType::BlockHeader);
        assert_eq!(tc.state().data(), Some(sent[1].block_header_hash));
        let header = tc.state().header().unwrap();
        assert_eq!(header.height, BlockHeight(1));
        assert_eq!(header.prev_hash, tc.chain.genesis_hash());
        assert!(tc.state().is_self_job_done(SubroundId::Block));
        assert_eq!(tc.multi_signer.messages_set(), 1);

        // Job is not repeated once done.
        assert!(!sr.do_job());
        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_header_builds_on_chain_head() {
        let tc = TestContext::new(4);
        tc.chain.set_head(BlockHeader {
            height: BlockHeight(6),
            round: RoundIndex(9),
            ..Default::default()
        });
        let (sr, _) = make_block(&tc);

        assert!(sr.do_job());
        let header = tc.state().header().unwrap();
        assert_eq!(header.height, BlockHeight(7));
        assert_eq!(Some(header.prev_hash), tc.chain.head_hash());
    }

    #[test]
    fn test_non_leader_has_no_job() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, sent) = make_block(&tc);

        assert!(!sr.do_job());
        assert!(sent.lock().is_empty());
    }

    #[test]
    fn test_job_fails_when_body_creation_fails() {
        let tc = TestContext::new(4);
        tc.block_processor
            .set_create_block_body(|_, _| Err(BlockProcessError::Timeout));
        let (sr, sent) = make_block(&tc);

        assert!(!sr.do_job());
        assert!(sent.lock().is_empty());
        assert!(!tc.state().is_self_job_done(SubroundId::Block));
    }

    #[test]
    fn test_received_proposal_is_processed() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, _) = make_block(&tc);
        let (body_msg, header_msg) = leader_proposal(&tc);

        assert!(!sr.received_block_body(&body_msg));
        assert!(sr.received_block_header(&header_msg));

        assert_eq!(tc.block_processor.process_calls(), 1);
        assert!(tc.state().is_job_done(ValidatorId(0), SubroundId::Block));
        assert_eq!(tc.state().data(), Some(header_msg.block_header_hash));
        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_proposal_from_non_leader_ignored() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, _) = make_block(&tc);
        let (mut body_msg, _) = leader_proposal(&tc);
        body_msg.sender = ValidatorId(2);

        assert!(!sr.received_block_body(&body_msg));
        assert!(!tc.state().is_body_already_received());
    }

    #[test]
    fn test_header_hash_mismatch_cancels_round() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, _) = make_block(&tc);
        let (_, mut header_msg) = leader_proposal(&tc);
        header_msg.block_header_hash = Hash::from_bytes(b"forged");

        assert!(!sr.received_block_header(&header_msg));
        assert!(tc.state().round_canceled());
        assert!(!sr.do_consensus_check());
    }

    #[test]
    fn test_header_for_other_shard_cancels_round() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, _) = make_block(&tc);
        let (body_msg, header_msg) = leader_proposal_with(&tc, |h| h.shard_id = ShardId(7));

        sr.received_block_body(&body_msg);
        assert!(!sr.received_block_header(&header_msg));
        assert!(tc.state().round_canceled());
        assert!(tc.state().header().is_none());
        assert_eq!(tc.block_processor.process_calls(), 0);
        assert!(!tc.state().is_job_done(ValidatorId(0), SubroundId::Block));
    }

    #[test]
    fn test_header_for_other_round_cancels_round() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let (sr, _) = make_block(&tc);
        let (body_msg, header_msg) = leader_proposal_with(&tc, |h| h.round = RoundIndex(99));

        sr.received_block_body(&body_msg);
        assert!(!sr.received_block_header(&header_msg));
        assert!(tc.state().round_canceled());
        assert_eq!(tc.block_processor.process_calls(), 0);
        assert!(!sr.do_consensus_check());
    }

    #[test]
    fn test_processing_failure_cancels_round() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        tc.block_processor.set_process_block(|_, _| {
            Err(BlockProcessError::InvalidBody("bad tx".into()))
        });
        let (sr, _) = make_block(&tc);
        let (body_msg, header_msg) = leader_proposal(&tc);

        sr.received_block_body(&body_msg);
        assert!(!sr.received_block_header(&header_msg));
        assert!(tc.state().round_canceled());
        assert!(!tc.state().processing_block());
    }

    #[test]
    fn test_check_waits_for_leader() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        let sr = Arc::new(make_block(&tc).0);
        assert!(!sr.do_consensus_check());
        assert!(!tc.state().is_finished(SubroundId::Block));
    }
}
