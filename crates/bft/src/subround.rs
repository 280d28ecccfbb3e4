//! Subround identity, time window and the state-changed signal.

use crate::{ConsensusError, ConsensusState};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Phases of a consensus round, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubroundId {
    StartRound,
    Block,
    CommitmentHash,
    Bitmap,
    Commitment,
    Signature,
    EndRound,
}

impl SubroundId {
    /// Number of subrounds in a round.
    pub const COUNT: usize = 7;

    /// Every subround in chain order.
    pub const ALL: [SubroundId; Self::COUNT] = [
        SubroundId::StartRound,
        SubroundId::Block,
        SubroundId::CommitmentHash,
        SubroundId::Bitmap,
        SubroundId::Commitment,
        SubroundId::Signature,
        SubroundId::EndRound,
    ];

    /// Position in the chain, usable as an array index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Subround before this one, `None` for the first.
    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Subround after this one, `None` for the last.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Diagnostic label.
    pub fn name(self) -> &'static str {
        match self {
            SubroundId::StartRound => "(START_ROUND)",
            SubroundId::Block => "(BLOCK)",
            SubroundId::CommitmentHash => "(COMMITMENT_HASH)",
            SubroundId::Bitmap => "(BITMAP)",
            SubroundId::Commitment => "(COMMITMENT)",
            SubroundId::Signature => "(SIGNATURE)",
            SubroundId::EndRound => "(END_ROUND)",
        }
    }
}

impl fmt::Display for SubroundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal marker of a subround within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubroundStatus {
    #[default]
    NotFinished,
    Finished,
}

/// Single-slot signal telling the round driver that consensus state changed.
///
/// Signalling never blocks. Signals raised while nobody waits coalesce into
/// one pending wake-up.
#[derive(Debug, Clone, Default)]
pub struct ConsensusStateChanged {
    notify: Arc<Notify>,
}

impl ConsensusStateChanged {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next (or the pending) signal.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Runs the worker's stored messages that may now be processed.
pub type ExecuteStoredMessagesFn = Arc<dyn Fn() + Send + Sync>;

/// Called when a subround runs out of time.
pub type ExtendFn = Arc<dyn Fn(SubroundId) + Send + Sync>;

/// Callbacks every subround of a round shares with the worker.
#[derive(Clone)]
pub struct SubroundHooks {
    pub state_changed: ConsensusStateChanged,
    pub execute_stored_messages: ExecuteStoredMessagesFn,
    pub extend: ExtendFn,
}

impl SubroundHooks {
    /// Hooks not backed by a worker: nothing stored, extend does nothing.
    pub fn detached(state_changed: ConsensusStateChanged) -> Self {
        Self {
            state_changed,
            execute_stored_messages: Arc::new(|| {}),
            extend: Arc::new(|_| {}),
        }
    }
}

impl fmt::Debug for SubroundHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubroundHooks").finish_non_exhaustive()
    }
}

/// One phase descriptor: identity, neighbours and time window.
#[derive(Debug, Clone)]
pub struct Subround {
    previous: Option<SubroundId>,
    current: SubroundId,
    next: Option<SubroundId>,
    start_time: Duration,
    end_time: Duration,
    hooks: SubroundHooks,
}

impl Subround {
    /// Create a subround.
    ///
    /// `previous` and `next` must be exactly the neighbours of `current` in the
    /// fixed chain, and `start_time` must be before `end_time`. Both times are
    /// offsets from the round start.
    pub fn new(
        previous: Option<SubroundId>,
        current: SubroundId,
        next: Option<SubroundId>,
        start_time: Duration,
        end_time: Duration,
        hooks: SubroundHooks,
    ) -> Result<Self, ConsensusError> {
        if previous != current.previous() || next != current.next() {
            return Err(ConsensusError::InvalidSubroundChain {
                previous,
                current,
                next,
            });
        }
        if start_time >= end_time {
            return Err(ConsensusError::InvalidTimeWindow {
                subround: current,
                start: start_time,
                end: end_time,
            });
        }

        Ok(Self {
            previous,
            current,
            next,
            start_time,
            end_time,
            hooks,
        })
    }

    pub fn id(&self) -> SubroundId {
        self.current
    }

    pub fn previous(&self) -> Option<SubroundId> {
        self.previous
    }

    pub fn next(&self) -> Option<SubroundId> {
        self.next
    }

    /// Offset from round start at which the subround opens.
    pub fn start_time(&self) -> Duration {
        self.start_time
    }

    /// Offset from round start at which the subround deadline falls.
    pub fn end_time(&self) -> Duration {
        self.end_time
    }

    pub fn name(&self) -> &'static str {
        self.current.name()
    }

    pub fn state_changed(&self) -> &ConsensusStateChanged {
        &self.hooks.state_changed
    }

    /// Run stored messages that became processable.
    pub fn execute_stored_messages(&self) {
        (self.hooks.execute_stored_messages)();
    }

    /// Invoke the extend hook for this subround.
    pub fn extend(&self) {
        (self.hooks.extend)(self.current);
    }

    pub(crate) fn ensure_id(&self, expected: SubroundId) -> Result<(), ConsensusError> {
        if self.current != expected {
            return Err(ConsensusError::WrongSubround {
                expected,
                actual: self.current,
            });
        }
        Ok(())
    }
}

/// Phase-specific behaviour wrapped around a [`Subround`].
///
/// The round driver calls [`do_job`](Self::do_job) until it succeeds and
/// [`do_consensus_check`](Self::do_consensus_check) until the phase is
/// satisfied or its deadline passes, then [`extend`](Self::extend). Both may
/// be called any number of times.
pub trait SubroundHandler: Send + Sync {
    /// The wrapped subround.
    fn subround(&self) -> &Subround;

    /// Shared state of the round.
    fn consensus_state(&self) -> &ConsensusState;

    /// Do the local node's work for this phase. Returns whether it succeeded.
    fn do_job(&self) -> bool;

    /// Whether the phase is satisfied.
    fn do_consensus_check(&self) -> bool;

    /// React to the phase running out of time.
    fn extend(&self) {
        self.subround().extend();
    }

    fn id(&self) -> SubroundId {
        self.subround().id()
    }
}
