//! End of round: verify shares, aggregate, commit and broadcast the block.

use super::BroadcastBlockFn;
use crate::{
    ConsensusContext, ConsensusError, ConsensusState, Subround, SubroundHandler, SubroundId,
    SubroundStatus,
};
use spos_types::SignerBitmap;
use tracing::{error, info, warn};

/// Handler of the [`SubroundId::EndRound`] phase.
pub struct SubroundEndRound {
    subround: Subround,
    context: ConsensusContext,
    broadcast_block: BroadcastBlockFn,
}

impl SubroundEndRound {
    pub fn new(
        subround: Subround,
        context: ConsensusContext,
        broadcast_block: BroadcastBlockFn,
    ) -> Result<Self, ConsensusError> {
        subround.ensure_id(SubroundId::EndRound)?;
        Ok(Self {
            subround,
            context,
            broadcast_block,
        })
    }

    /// Verify the stored share of every member set in `bitmap`.
    ///
    /// Stops at the first missing or invalid share.
    pub fn check_signatures_validity(&self, bitmap: &SignerBitmap) -> Result<(), ConsensusError> {
        let ctx = &self.context;
        let group = ctx.state.consensus_group();
        let size = group.len().min(bitmap.bit_capacity());

        for (i, member) in group.iter().enumerate().take(size) {
            if !bitmap.is_set(i) {
                continue;
            }
            if !ctx.state.is_job_done(*member, SubroundId::Signature) {
                return Err(ConsensusError::MissingSignature { index: i });
            }
            let share = ctx.multi_signer.signature_share(i)?;
            ctx.multi_signer.verify_signature_share(i, &share, bitmap)?;
        }
        Ok(())
    }
}

impl SubroundHandler for SubroundEndRound {
    fn subround(&self) -> &Subround {
        &self.subround
    }

    fn consensus_state(&self) -> &ConsensusState {
        &self.context.state
    }

    /// Aggregate the shares into the header, commit and broadcast the block.
    ///
    /// A failed broadcast is logged only: the block is already committed.
    fn do_job(&self) -> bool {
        let ctx = &self.context;
        let state = &ctx.state;
        if state.is_finished(SubroundId::EndRound) {
            return true;
        }
        let (Some(mut header), Some(body)) = (state.header(), state.body()) else {
            return false;
        };

        let bitmap = state.generate_bitmap(SubroundId::Bitmap);
        if let Err(e) = self.check_signatures_validity(&bitmap) {
            warn!(round = %state.round_index(), error = %e, "Invalid signature shares");
            return false;
        }

        let signature = match ctx.multi_signer.aggregate_sigs(&bitmap) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(round = %state.round_index(), error = %e, "Failed to aggregate signatures");
                return false;
            }
        };
        header.pub_keys_bitmap = bitmap.into_bytes();
        header.signature = signature;

        if let Err(e) = ctx
            .block_processor
            .commit_block(ctx.block_chain.as_ref(), &header, &body)
        {
            warn!(round = %state.round_index(), error = %e, "Failed to commit block");
            return false;
        }

        let height = header.height;
        let transactions = body.transaction_count();
        state.set_header(Some(header.clone()));
        if let Err(e) = state.set_self_job_done(SubroundId::EndRound) {
            error!(error = %e, "Failed to record own end round job");
        }
        state.set_status(SubroundId::EndRound, SubroundStatus::Finished);

        if let Err(e) = (self.broadcast_block)(&body, &header) {
            error!(round = %state.round_index(), error = %e, "Failed to broadcast block");
        }

        info!(
            round = %state.round_index(),
            height = %height,
            transactions,
            "Step 6: block has been committed and broadcast"
        );
        true
    }

    fn do_consensus_check(&self) -> bool {
        let state = &self.context.state;
        if state.round_canceled() {
            return false;
        }
        if state.is_finished(SubroundId::EndRound) {
            return true;
        }
        if state.is_self_job_done(SubroundId::EndRound) {
            state.set_status(SubroundId::EndRound, SubroundStatus::Finished);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_subround, TestContext};
    use parking_lot::Mutex;
    use spos_core::{BlockProcessError, BroadcastError, MultiSigError};
    use spos_types::{BlockBody, BlockHeader};
    use std::sync::Arc;
    use tracing_test::traced_test;

    type Broadcasts = Arc<Mutex<Vec<BlockHeader>>>;

    fn make_end_round(tc: &TestContext) -> (SubroundEndRound, Broadcasts) {
        let broadcasts: Broadcasts = Arc::default();
        let recorded = broadcasts.clone();
        let broadcast: BroadcastBlockFn = Arc::new(move |_: &BlockBody, header: &BlockHeader| {
            recorded.lock().push(header.clone());
            Ok(())
        });
        let sr = SubroundEndRound::new(
            make_subround(SubroundId::EndRound),
            tc.context.clone(),
            broadcast,
        )
        .unwrap();
        (sr, broadcasts)
    }

    /// Block agreed and every bitmap member's share received.
    fn ready(tc: &TestContext) {
        tc.finish_block();
        tc.set_jobs_done(SubroundId::Bitmap, &[0, 1, 2]);
        tc.set_jobs_done(SubroundId::Signature, &[0, 1, 2]);
    }

    fn bitmap_of(members: &[usize]) -> SignerBitmap {
        let mut bitmap = SignerBitmap::new(4);
        for i in members {
            bitmap.set(*i);
        }
        bitmap
    }

    #[test]
    fn test_job_commits_and_broadcasts() {
        let tc = TestContext::new(4);
        ready(&tc);
        let (sr, broadcasts) = make_end_round(&tc);

        assert!(sr.do_job());

        assert_eq!(tc.block_processor.commit_calls(), 1);
        let header = tc.state().header().unwrap();
        assert_eq!(header.pub_keys_bitmap, bitmap_of(&[0, 1, 2]).into_bytes());
        assert_eq!(header.signature, tc.multi_signer.aggregated_signature());
        assert_eq!(broadcasts.lock().as_slice(), &[header]);
        assert!(tc.state().is_finished(SubroundId::EndRound));
        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_job_without_block_fails() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::Bitmap, &[0, 1, 2]);
        tc.set_jobs_done(SubroundId::Signature, &[0, 1, 2]);
        let (sr, _) = make_end_round(&tc);

        assert!(!sr.do_job());
        assert_eq!(tc.block_processor.commit_calls(), 0);
    }

    #[test]
    fn test_aggregation_error_skips_commit() {
        let tc = TestContext::new(4);
        ready(&tc);
        tc.multi_signer
            .set_aggregate_sigs(|_| Err(MultiSigError::InvalidAggregatedSignature));
        let (sr, broadcasts) = make_end_round(&tc);

        assert!(!sr.do_job());
        assert_eq!(tc.block_processor.commit_calls(), 0);
        assert!(broadcasts.lock().is_empty());
        assert!(!tc.state().is_finished(SubroundId::EndRound));
    }

    #[test]
    fn test_commit_error_fails_job() {
        let tc = TestContext::new(4);
        ready(&tc);
        tc.block_processor
            .set_commit_block(|_, _| Err(BlockProcessError::Commit("disk full".into())));
        let (sr, broadcasts) = make_end_round(&tc);

        assert!(!sr.do_job());
        assert!(broadcasts.lock().is_empty());
        assert!(!tc.state().is_self_job_done(SubroundId::EndRound));
    }

    #[traced_test]
    #[test]
    fn test_broadcast_error_still_succeeds() {
        let tc = TestContext::new(4);
        ready(&tc);
        let broadcast: BroadcastBlockFn = Arc::new(|_: &BlockBody, _: &BlockHeader| {
            Err(BroadcastError::Disconnected)
        });
        let sr = SubroundEndRound::new(
            make_subround(SubroundId::EndRound),
            tc.context.clone(),
            broadcast,
        )
        .unwrap();

        assert!(sr.do_job());
        assert_eq!(tc.block_processor.commit_calls(), 1);
        assert!(tc.state().is_finished(SubroundId::EndRound));
        assert!(logs_contain("Failed to broadcast block"));
    }

    #[test]
    fn test_job_is_idempotent_once_finished() {
        let tc = TestContext::new(4);
        ready(&tc);
        let (sr, _) = make_end_round(&tc);

        assert!(sr.do_job());
        assert!(sr.do_job());
        assert_eq!(tc.block_processor.commit_calls(), 1);
    }

    #[test]
    fn test_check_false_when_canceled() {
        let tc = TestContext::new(4);
        let (sr, _) = make_end_round(&tc);
        tc.state().cancel_round();

        assert!(!sr.do_consensus_check());
    }

    #[test]
    fn test_check_false_when_canceled_after_finishing() {
        let tc = TestContext::new(4);
        let (sr, _) = make_end_round(&tc);
        tc.state().cancel_round();
        tc.state()
            .set_status(SubroundId::EndRound, SubroundStatus::Finished);
        tc.state().set_self_job_done(SubroundId::EndRound).unwrap();

        assert!(!sr.do_consensus_check());
        assert!(tc.state().is_finished(SubroundId::EndRound));
    }

    #[test]
    fn test_check_true_when_finished() {
        let tc = TestContext::new(4);
        let (sr, _) = make_end_round(&tc);
        tc.state()
            .set_status(SubroundId::EndRound, SubroundStatus::Finished);

        assert!(sr.do_consensus_check());
    }

    #[test]
    fn test_check_finishes_after_own_job() {
        let tc = TestContext::new(4);
        let (sr, _) = make_end_round(&tc);
        assert!(!sr.do_consensus_check());

        tc.state().set_self_job_done(SubroundId::EndRound).unwrap();
        assert!(sr.do_consensus_check());
        assert!(tc.state().is_finished(SubroundId::EndRound));
    }

    #[test]
    fn test_signatures_missing_share() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::Signature, &[0, 2]);
        let (sr, _) = make_end_round(&tc);

        assert_eq!(
            sr.check_signatures_validity(&bitmap_of(&[0, 1, 2])),
            Err(ConsensusError::MissingSignature { index: 1 })
        );
    }

    #[test]
    fn test_signatures_share_lookup_error() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::Signature, &[0, 1, 2]);
        tc.multi_signer
            .set_signature_share(|i| Err(MultiSigError::IndexOutOfBounds { index: i, size: 0 }));
        let (sr, _) = make_end_round(&tc);

        assert_eq!(
            sr.check_signatures_validity(&bitmap_of(&[0, 1, 2])),
            Err(ConsensusError::MultiSig(MultiSigError::IndexOutOfBounds {
                index: 0,
                size: 0
            }))
        );
    }

    #[test]
    fn test_signatures_invalid_share() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::Signature, &[0, 1, 2]);
        tc.multi_signer.set_verify_signature_share(|i, _| {
            if i == 1 {
                Err(MultiSigError::InvalidSignatureShare { index: 1 })
            } else {
                Ok(())
            }
        });
        let (sr, _) = make_end_round(&tc);

        assert_eq!(
            sr.check_signatures_validity(&bitmap_of(&[0, 1, 2])),
            Err(ConsensusError::MultiSig(
                MultiSigError::InvalidSignatureShare { index: 1 }
            ))
        );
    }

    #[test]
    fn test_signatures_valid() {
        let tc = TestContext::new(4);
        tc.set_jobs_done(SubroundId::Signature, &[0, 1, 2]);
        let (sr, _) = make_end_round(&tc);

        assert_eq!(sr.check_signatures_validity(&bitmap_of(&[0, 1, 2])), Ok(()));
        assert_eq!(sr.check_signatures_validity(&bitmap_of(&[])), Ok(()));
    }
}
