//! Commitment hash exchange: every group member announces the hash of its
//! commitment before revealing it.

use super::{bitmap_members_done, SendMessageFn};
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_messages::{ConsensusMessage, MessageType};
use spos_types::Hash;
use tracing::{debug, info, warn};

/// Handler of the [`SubroundId::CommitmentHash`] phase.
pub struct SubroundCommitmentHash {
    subround: Subround,
    context: ConsensusContext,
    send_message: SendMessageFn,
}

impl SubroundCommitmentHash {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        send_message: SendMessageFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::CommitmentHash)?;
        Ok(Self {
            subround,
            context,
            send_message,
        })
    }

    /// Store a peer's commitment hash.
    ///
    /// The leader stops accepting hashes once it has enough to build the
    /// bitmap.
    pub fn received_commitment_hash(&self, msg: &ConsensusMessage) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;

        if !state.is_data_equal(&msg.block_header_hash) {
            return false;
        }
        if !state.is_node_in_consensus_group(msg.sender) {
            return false;
        }
        if !state.can_process_received_message(msg.sender, msg.round_index, SubroundId::CommitmentHash)
        {
            return false;
        }
        if state.is_self_leader() && state.has_reached_threshold(SubroundId::CommitmentHash) {
            return false;
        }

        let Some(index) = state.consensus_group_index(msg.sender) else {
            return false;
        };
        let Some(hash) = Hash::try_from_slice(&msg.sub_round_data) else {
            debug!(sender = %msg.sender, len = msg.sub_round_data.len(), "Malformed commitment hash");
            return false;
        };
        if let Err(e) = ctx.multi_signer.store_commitment_hash(index, hash) {
            debug!(sender = %msg.sender, error = %e, "Failed to store commitment hash");
            return false;
        }
        if let Err(e) =
            state.set_job_done_for_round(msg.sender, msg.round_index, SubroundId::CommitmentHash)
        {
            debug!(error = %e, "Failed to record commitment hash job");
            return false;
        }
        true
    }

    /// Whether `threshold` members announced their commitment hash.
    fn is_commitment_hash_received(&self, threshold: usize) -> bool {
        self.context.state.compute_size(SubroundId::CommitmentHash) >= threshold
    }
}

impl SubroundHandler for SubroundCommitmentHash {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    fn do_job(&self) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        if !state.can_do_subround_job(SubroundId::CommitmentHash) {
            return false;
        }
        let (Some(data), Some(self_index)) = (state.data(), state.self_consensus_group_index())
        else {
            return false;
        };

        let commitment = match ctx.multi_signer.create_commitment() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to create commitment");
                return false;
            }
        };
        let commitment_hash = ctx.hasher.compute(&commitment);

        let msg = ctx.new_message(
            data,
            commitment_hash.as_bytes().to_vec(),
            MessageType::CommitmentHash,
        );
        if !(self.send_message)(msg) {
            return false;
        }
        info!(round = %state.round_index(), "Step 2: commitment hash has been sent");

        if let Err(e) = state.set_self_job_done(SubroundId::CommitmentHash) {
            warn!(error = %e, "Failed to record own commitment hash job");
            return false;
        }
        if let Err(e) = ctx.multi_signer.store_commitment_hash(self_index, commitment_hash) {
            warn!(error = %e, "Failed to store own commitment hash");
            return false;
        }
        true
    }

    /// Finished when enough hashes arrived, or when every member of an
    /// already received bitmap has announced its hash.
    ///
    /// A non-leader waits for the whole group; the leader only needs the
    /// threshold to build its bitmap.
    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::CommitmentHash) {
            return true;
        }

        let threshold = if state.is_self_leader() {
            state.threshold(SubroundId::CommitmentHash)
        } else {
            state.consensus_group().len()
        };

        let done = self.is_commitment_hash_received(threshold)
            || bitmap_members_done(
                state,
                SubroundId::CommitmentHash,
                state.threshold(SubroundId::Bitmap),
            );
        if done {
            info!(
                round = %state.round_index(),
                "Step 2: subround {} has been finished",
                self.subround.name()
            );
            state.set_status(SubroundId::CommitmentHash, SubroundStatus::Finished);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_subround, recording_sender, SentMessages, TestContext};
    use spos_core::MultiSigError;
    use spos_types::ValidatorId;

    fn make_commitment_hash(tc: &TestContext) -> (SubroundCommitmentHash, SentMessages) {
        let (send, sent) = recording_sender();
        let sr = SubroundCommitmentHash::new(
            make_subround(SubroundId::CommitmentHash),
            tc.context.clone(),
            send,
        )
        .unwrap();
        (sr, sent)
    }

    fn hash_message(tc: &TestContext, sender: u64) -> ConsensusMessage {
        ConsensusMessage::new(
            tc.block_hash(),
            Hash::from_bytes(&[sender as u8]).as_bytes().to_vec(),
            ValidatorId(sender),
            MessageType::CommitmentHash,
            0,
            tc.state().round_index(),
        )
    }

    #[test]
    fn test_job_needs_block() {
        let tc = TestContext::new(4);
        let (sr, sent) = make_commitment_hash(&tc);
        assert!(!sr.do_job());
        assert!(sent.lock().is_empty());
    }

    #[test]
    fn test_job_sends_commitment_hash() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, sent) = make_commitment_hash(&tc);

        assert!(sr.do_job());

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].msg_type, MessageType::CommitmentHash);
        assert_eq!(sent[0].block_header_hash, tc.block_hash());
        let expected = Hash::from_bytes(&[0]);
        assert_eq!(sent[0].sub_round_data, expected.as_bytes().to_vec());
        assert!(tc.state().is_self_job_done(SubroundId::CommitmentHash));
        assert_eq!(tc.multi_signer.stored_commitment_hashes(), vec![(0, expected)]);
    }

    #[test]
    fn test_job_fails_without_commitment() {
        let tc = TestContext::new(4);
        tc.finish_block();
        tc.multi_signer
            .set_create_commitment(|| Err(MultiSigError::MissingMessage));
        let (sr, sent) = make_commitment_hash(&tc);

        assert!(!sr.do_job());
        assert!(sent.lock().is_empty());
        assert!(!tc.state().is_self_job_done(SubroundId::CommitmentHash));
    }

    #[test]
    fn test_received_hash_is_stored() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);

        assert!(sr.received_commitment_hash(&hash_message(&tc, 2)));
        assert!(tc.state().is_job_done(ValidatorId(2), SubroundId::CommitmentHash));
        assert_eq!(
            tc.multi_signer.stored_commitment_hashes(),
            vec![(2, Hash::from_bytes(&[2]))]
        );
        // Duplicates are ignored.
        assert!(!sr.received_commitment_hash(&hash_message(&tc, 2)));
    }

    #[test]
    fn test_received_hash_for_other_block_ignored() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);
        let mut msg = hash_message(&tc, 2);
        msg.block_header_hash = Hash::from_bytes(b"other");

        assert!(!sr.received_commitment_hash(&msg));
    }

    #[test]
    fn test_received_hash_from_outsider_ignored() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);

        assert!(!sr.received_commitment_hash(&hash_message(&tc, 7)));
    }

    #[test]
    fn test_malformed_hash_ignored() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);
        let mut msg = hash_message(&tc, 1);
        msg.sub_round_data = vec![1, 2, 3];

        assert!(!sr.received_commitment_hash(&msg));
        assert!(!tc.state().is_job_done(ValidatorId(1), SubroundId::CommitmentHash));
    }

    #[test]
    fn test_leader_stops_accepting_at_threshold() {
        let tc = TestContext::new(4);
        tc.finish_block();
        tc.set_jobs_done(SubroundId::CommitmentHash, &[0, 1, 2]);
        let (sr, _) = make_commitment_hash(&tc);

        assert!(!sr.received_commitment_hash(&hash_message(&tc, 3)));
    }

    #[test]
    fn test_leader_check_needs_threshold() {
        let tc = TestContext::new(4);
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);

        tc.set_jobs_done(SubroundId::CommitmentHash, &[0, 1]);
        assert!(!sr.do_consensus_check());
        tc.set_jobs_done(SubroundId::CommitmentHash, &[2]);
        assert!(sr.do_consensus_check());
        assert!(tc.state().is_finished(SubroundId::CommitmentHash));
    }

    #[test]
    fn test_validator_check_needs_whole_group() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);

        tc.set_jobs_done(SubroundId::CommitmentHash, &[0, 1, 2]);
        assert!(!sr.do_consensus_check());
        tc.set_jobs_done(SubroundId::CommitmentHash, &[3]);
        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_validator_check_accepts_bitmap_members() {
        let tc = TestContext::with_self(4, ValidatorId(1));
        tc.finish_block();
        let (sr, _) = make_commitment_hash(&tc);

        tc.set_jobs_done(SubroundId::CommitmentHash, &[0, 1, 2]);
        tc.set_jobs_done(SubroundId::Bitmap, &[0, 1, 2]);
        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_check_false_when_canceled() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::CommitmentHash, &[0, 1, 2, 3]);
        tc.state().cancel_round();
        let (sr, _) = make_commitment_hash(&tc);

        assert!(!sr.do_consensus_check());
    }
}
