//! Drives the registered subrounds of one round against their deadlines.

use crate::{SubroundHandler, SubroundId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often a job that has not succeeded yet is retried.
pub const JOB_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Registry of the phase chain driven each round.
pub trait ChronologyHandler: Send + Sync {
    /// Append a phase to the chain.
    fn add_subround(&self, subround: Arc<dyn SubroundHandler>);

    /// Forget every registered phase.
    fn remove_all_subrounds(&self);
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every phase finished.
    Finished,
    /// The round was canceled while this phase was active.
    Canceled(SubroundId),
    /// This phase missed its deadline and was extended.
    Extended(SubroundId),
}

/// Round driver walking the registered phases in order.
///
/// A phase runs its job until it succeeds and its consensus check until it
/// passes. Between attempts the driver sleeps until the state-changed signal
/// fires, the job retry interval elapses or the phase deadline falls,
/// whichever comes first. A phase that passes its check hands over to the
/// next one at once, without waiting for the next phase's start time.
#[derive(Default)]
pub struct Chronology {
    subrounds: Mutex<Vec<Arc<dyn SubroundHandler>>>,
}

impl Chronology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the registered phases, in order.
    pub fn subround_ids(&self) -> Vec<SubroundId> {
        self.subrounds.lock().iter().map(|s| s.id()).collect()
    }

    /// Drive one round that started at `round_start`.
    pub async fn run_round(&self, round_start: Instant) -> RoundOutcome {
        let chain = self.subrounds.lock().clone();
        for handler in chain {
            if let Some(outcome) = do_work(handler.as_ref(), round_start).await {
                return outcome;
            }
        }
        RoundOutcome::Finished
    }
}

impl ChronologyHandler for Chronology {
    fn add_subround(&self, subround: Arc<dyn SubroundHandler>) {
        self.subrounds.lock().push(subround);
    }

    fn remove_all_subrounds(&self) {
        self.subrounds.lock().clear();
    }
}

impl std::fmt::Debug for Chronology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chronology")
            .field("subrounds", &self.subround_ids())
            .finish()
    }
}

/// Run one phase. `None` means it finished and the next phase may start.
async fn do_work(handler: &dyn SubroundHandler, round_start: Instant) -> Option<RoundOutcome> {
    let subround = handler.subround();
    let id = subround.id();
    let state = handler.consensus_state();
    let deadline = round_start + subround.end_time();
    let mut job_done = false;

    loop {
        subround.execute_stored_messages();
        if !job_done {
            job_done = handler.do_job();
        }
        if handler.do_consensus_check() {
            debug!(subround = %id, "Subround finished");
            return None;
        }
        if state.round_canceled() {
            info!(round = %state.round_index(), subround = %id, "Round canceled");
            return Some(RoundOutcome::Canceled(id));
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wake = if job_done {
            deadline
        } else {
            deadline.min(now + JOB_RETRY_INTERVAL)
        };
        // Elapsed timeouts are expected here.
        let _ = tokio::time::timeout_at(wake, subround.state_changed().wait()).await;
    }

    subround.execute_stored_messages();
    if handler.do_consensus_check() {
        return None;
    }
    if state.round_canceled() {
        return Some(RoundOutcome::Canceled(id));
    }

    warn!(round = %state.round_index(), subround = %id, "Subround timed out");
    handler.extend();
    Some(RoundOutcome::Extended(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_subround, TestContext};
    use crate::{ConsensusState, Subround, SubroundStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Phase finishing after a set number of job attempts.
    struct ScriptedHandler {
        subround: Subround,
        state: Arc<ConsensusState>,
        jobs_until_done: usize,
        job_calls: AtomicUsize,
        extended: AtomicUsize,
        finishes: bool,
    }

    impl ScriptedHandler {
        fn new(tc: &TestContext, id: SubroundId, jobs_until_done: usize, finishes: bool) -> Arc<Self> {
            Arc::new(Self {
                subround: make_subround(id),
                state: tc.state().clone(),
                jobs_until_done,
                job_calls: AtomicUsize::new(0),
                extended: AtomicUsize::new(0),
                finishes,
            })
        }
    }

    impl SubroundHandler for ScriptedHandler {
        fn subround(&self) -> &Subround {
            &self.subround
        }

        fn consensus_state(&self) -> &ConsensusState {
            &self.state
        }

        fn do_job(&self) -> bool {
            self.job_calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.jobs_until_done
        }

        fn do_consensus_check(&self) -> bool {
            let done = self.finishes
                && self.job_calls.load(Ordering::SeqCst) >= self.jobs_until_done;
            if done {
                self.state.set_status(self.id(), SubroundStatus::Finished);
            }
            done
        }

        fn extend(&self) {
            self.extended.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_runs_every_phase() {
        let tc = TestContext::new(4);
        let chronology = Chronology::new();
        let handlers: Vec<_> = SubroundId::ALL
            .into_iter()
            .map(|id| ScriptedHandler::new(&tc, id, 1, true))
            .collect();
        for h in &handlers {
            chronology.add_subround(h.clone());
        }

        assert_eq!(chronology.subround_ids(), SubroundId::ALL.to_vec());
        assert_eq!(chronology.run_round(Instant::now()).await, RoundOutcome::Finished);
        for id in SubroundId::ALL {
            assert!(tc.state().is_finished(id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_is_retried_until_done() {
        let tc = TestContext::new(4);
        let chronology = Chronology::new();
        let handler = ScriptedHandler::new(&tc, SubroundId::StartRound, 3, true);
        chronology.add_subround(handler.clone());

        let start = Instant::now();
        assert_eq!(chronology.run_round(start).await, RoundOutcome::Finished);
        assert_eq!(handler.job_calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= JOB_RETRY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_deadline_extends() {
        let tc = TestContext::new(4);
        let chronology = Chronology::new();
        let handler = ScriptedHandler::new(&tc, SubroundId::Block, 1, false);
        chronology.add_subround(handler.clone());

        let start = Instant::now();
        assert_eq!(
            chronology.run_round(start).await,
            RoundOutcome::Extended(SubroundId::Block)
        );
        assert_eq!(handler.extended.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= handler.subround().end_time());
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_round_stops_early() {
        let tc = TestContext::new(4);
        let chronology = Chronology::new();
        let never = ScriptedHandler::new(&tc, SubroundId::Block, 1, false);
        let after = ScriptedHandler::new(&tc, SubroundId::CommitmentHash, 1, true);
        chronology.add_subround(never.clone());
        chronology.add_subround(after.clone());

        tc.state().cancel_round();
        assert_eq!(
            chronology.run_round(Instant::now()).await,
            RoundOutcome::Canceled(SubroundId::Block)
        );
        assert_eq!(never.extended.load(Ordering::SeqCst), 0);
        assert_eq!(after.job_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_all_subrounds() {
        let tc = TestContext::new(4);
        let chronology = Chronology::new();
        chronology.add_subround(ScriptedHandler::new(&tc, SubroundId::Block, 1, false));
        chronology.remove_all_subrounds();

        assert!(chronology.subround_ids().is_empty());
        assert_eq!(chronology.run_round(Instant::now()).await, RoundOutcome::Finished);
    }
}
