//! Routes inbound consensus messages to the active phase handlers.
//!
//! Every inbound message is decoded, authenticated against the validator set
//! and stored under its [`MessageType`]. Stored messages run through the
//! callback registered for their type once the phase they belong to may
//! proceed, and only in the round they were sent for. Outbound messages are
//! signed with the node key before they are broadcast.

use crate::subrounds::{BroadcastBlockFn, SendMessageFn};
use crate::{
    ConsensusError, ConsensusState, ConsensusStateChanged, SubroundHooks, SubroundId, WorkerError,
};
use parking_lot::Mutex;
use spos_core::{BlockProcessor, Bootstrapper, BroadcastError, BroadcastMessenger, Rounder};
use spos_messages::{
    codec, ConsensusMessage, MessageType, TOPIC_BLOCK_BODY, TOPIC_BLOCK_HEADER, TOPIC_CONSENSUS,
};
use spos_types::{BlockBody, BlockHeader, KeyPair, RoundIndex, ValidatorId, ValidatorSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// Callback consuming one received message. Returns whether it updated state.
pub type ReceivedMessageFn = Arc<dyn Fn(&ConsensusMessage) -> bool + Send + Sync>;

/// How far ahead of the round clock an inbound message may be stamped.
pub const MAX_ROUNDS_AHEAD: i64 = 1;

#[derive(Default)]
struct WorkerInner {
    /// Pending messages per type, in arrival order.
    received_messages: BTreeMap<MessageType, Vec<ConsensusMessage>>,
    received_message_calls: HashMap<MessageType, ReceivedMessageFn>,
    /// Accepted `(sender, type, round)` triples of the current and next rounds.
    seen: HashSet<(ValidatorId, MessageType, RoundIndex)>,
}

/// Message router and network hook of the consensus engine.
pub struct Worker {
    state: Arc<ConsensusState>,
    key_pair: KeyPair,
    validators: Arc<ValidatorSet>,
    rounder: Arc<dyn Rounder>,
    messenger: Arc<dyn BroadcastMessenger>,
    bootstrapper: Arc<dyn Bootstrapper>,
    block_processor: Arc<dyn BlockProcessor>,
    state_changed: ConsensusStateChanged,
    inner: Mutex<WorkerInner>,
}

impl Worker {
    /// Create a worker signing with `key_pair`.
    ///
    /// The local validator of `state` must be in `validators` under the
    /// public key of `key_pair`.
    pub fn new(
        state: Arc<ConsensusState>,
        key_pair: KeyPair,
        validators: Arc<ValidatorSet>,
        rounder: Arc<dyn Rounder>,
        messenger: Arc<dyn BroadcastMessenger>,
        bootstrapper: Arc<dyn Bootstrapper>,
        block_processor: Arc<dyn BlockProcessor>,
    ) -> Result<Arc<Self>, ConsensusError> {
        let self_id = state.self_id();
        let registered = validators
            .public_key(self_id)
            .ok_or(ConsensusError::UnknownValidator(self_id))?;
        if *registered != key_pair.public_key() {
            return Err(ConsensusError::KeyMismatch(self_id));
        }

        Ok(Arc::new(Self {
            state,
            key_pair,
            validators,
            rounder,
            messenger,
            bootstrapper,
            block_processor,
            state_changed: ConsensusStateChanged::new(),
            inner: Mutex::new(WorkerInner::default()),
        }))
    }

    /// The consensus state this worker feeds.
    pub fn consensus_state(&self) -> &Arc<ConsensusState> {
        &self.state
    }

    /// Signal raised whenever a received message updated the state.
    pub fn consensus_state_changed(&self) -> ConsensusStateChanged {
        self.state_changed.clone()
    }

    /// Register the callback for `msg_type`, replacing any previous one.
    pub fn add_received_message_call(&self, msg_type: MessageType, call: ReceivedMessageFn) {
        self.inner
            .lock()
            .received_message_calls
            .insert(msg_type, call);
    }

    /// Drop every registered callback. Stored messages are kept.
    pub fn remove_all_received_messages_calls(&self) {
        self.inner.lock().received_message_calls.clear();
    }

    /// Handle raw bytes received on the consensus topic.
    ///
    /// The message is stored and every stored message that may now run is
    /// executed. Only the first message of each sender per type and round is
    /// kept, and only for the current round or up to [`MAX_ROUNDS_AHEAD`]
    /// rounds ahead.
    pub fn process_received_message(&self, payload: &[u8]) -> Result<(), WorkerError> {
        let msg = codec::decode_consensus_message(payload)?;
        let current = self.check_message(&msg)?;

        {
            let mut inner = self.inner.lock();
            inner.seen.retain(|(_, _, round)| *round >= current);
            if !inner.seen.insert((msg.sender, msg.msg_type, msg.round_index)) {
                return Err(WorkerError::Duplicate {
                    sender: msg.sender,
                    msg_type: msg.msg_type,
                    round: msg.round_index,
                });
            }
            trace!(
                sender = %msg.sender,
                round = %msg.round_index,
                msg_type = %msg.msg_type,
                "Stored consensus message"
            );
            inner
                .received_messages
                .entry(msg.msg_type)
                .or_default()
                .push(msg);
        }

        self.execute_stored_messages();
        Ok(())
    }

    /// Authenticate `msg` and check its round. Returns the current round.
    fn check_message(&self, msg: &ConsensusMessage) -> Result<RoundIndex, WorkerError> {
        let public_key = self
            .validators
            .public_key(msg.sender)
            .ok_or(WorkerError::UnknownSender(msg.sender))?;

        let current = self.rounder.index();
        if msg.round_index < current {
            return Err(WorkerError::PastRound {
                message: msg.round_index,
                current,
            });
        }
        if msg.round_index.0 > current.0.saturating_add(MAX_ROUNDS_AHEAD) {
            return Err(WorkerError::FutureRound {
                message: msg.round_index,
                current,
            });
        }

        let signature = msg
            .signature
            .as_ref()
            .ok_or(WorkerError::MissingSignature(msg.sender))?;
        if !public_key.verify(&msg.signing_bytes(), signature) {
            return Err(WorkerError::InvalidSignature(msg.sender));
        }
        Ok(current)
    }

    /// Whether messages of `msg_type` may be handed to their phase.
    fn can_proceed(&self, msg_type: MessageType) -> bool {
        let gate = match msg_type {
            MessageType::BlockBody | MessageType::BlockHeader => SubroundId::StartRound,
            MessageType::CommitmentHash | MessageType::Bitmap => SubroundId::Block,
            MessageType::Commitment | MessageType::Signature => SubroundId::Bitmap,
        };
        self.state.is_finished(gate)
    }

    /// Run stored messages whose phase may proceed.
    ///
    /// Messages of past rounds are dropped, messages of future rounds wait.
    /// Callbacks run without the worker lock held.
    pub fn execute_stored_messages(&self) {
        let round = self.state.round_index();
        let open: Vec<MessageType> = MessageType::ALL
            .into_iter()
            .filter(|t| self.can_proceed(*t))
            .collect();
        let mut ready = Vec::new();
        {
            let mut inner = self.inner.lock();
            let WorkerInner {
                received_messages,
                received_message_calls,
                ..
            } = &mut *inner;

            for (msg_type, messages) in received_messages.iter_mut() {
                messages.retain(|m| m.round_index >= round);
                if messages.is_empty() || !open.contains(msg_type) {
                    continue;
                }
                let Some(call) = received_message_calls.get(msg_type) else {
                    continue;
                };
                let (current, later): (Vec<_>, Vec<_>) =
                    messages.drain(..).partition(|m| m.round_index == round);
                *messages = later;
                ready.extend(current.into_iter().map(|m| (call.clone(), m)));
            }
        }

        let mut changed = false;
        for (call, msg) in ready {
            changed |= call(&msg);
        }
        if changed {
            self.state_changed.notify();
        }
    }

    /// Number of messages waiting to be executed.
    pub fn stored_messages(&self) -> usize {
        self.inner
            .lock()
            .received_messages
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Sign `msg` with the node key and publish it on the consensus topic.
    pub fn send_consensus_message(&self, msg: ConsensusMessage) -> bool {
        let signature = self.key_pair.sign(&msg.signing_bytes());
        let msg = msg.with_signature(signature);
        let payload = match codec::encode_consensus_message(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode consensus message");
                return false;
            }
        };
        match self.messenger.broadcast(TOPIC_CONSENSUS, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(msg_type = %msg.msg_type, error = %e, "Failed to broadcast consensus message");
                false
            }
        }
    }

    /// Publish a committed block: body first, then header.
    pub fn broadcast_block(&self, body: &BlockBody, header: &BlockHeader) -> Result<(), BroadcastError> {
        let body_bytes =
            codec::encode_body(body).map_err(|e| BroadcastError::Failed(e.to_string()))?;
        let header_bytes =
            codec::encode_header(header).map_err(|e| BroadcastError::Failed(e.to_string()))?;
        self.messenger.broadcast(TOPIC_BLOCK_BODY, body_bytes)?;
        self.messenger.broadcast(TOPIC_BLOCK_HEADER, header_bytes)
    }

    /// React to `subround` running out of time.
    ///
    /// Reverts the state of a processed but uncommitted block, unless the
    /// node is syncing or a block is being processed right now.
    pub fn extend(&self, subround: SubroundId) {
        info!(subround = %subround, "Extend called");
        if self.bootstrapper.should_sync() {
            debug!("Skipping extend while syncing");
            return;
        }
        if self.state.processing_block() {
            debug!("Skipping revert while a block is being processed");
            return;
        }
        self.block_processor.revert_account_state();
    }

    /// Hooks for the subrounds of a round, backed by this worker.
    pub fn subround_hooks(self: &Arc<Self>) -> SubroundHooks {
        let execute = Arc::downgrade(self);
        let extend = Arc::downgrade(self);
        SubroundHooks {
            state_changed: self.state_changed.clone(),
            execute_stored_messages: Arc::new(move || {
                if let Some(worker) = execute.upgrade() {
                    worker.execute_stored_messages();
                }
            }),
            extend: Arc::new(move |subround| {
                if let Some(worker) = extend.upgrade() {
                    worker.extend(subround);
                }
            }),
        }
    }

    /// Send hook for phase handlers.
    pub fn send_message_fn(self: &Arc<Self>) -> SendMessageFn {
        let worker: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |msg| {
            worker
                .upgrade()
                .is_some_and(|w| w.send_consensus_message(msg))
        })
    }

    /// Block broadcast hook for the end-round handler.
    pub fn broadcast_block_fn(self: &Arc<Self>) -> BroadcastBlockFn {
        let worker: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |body: &BlockBody, header: &BlockHeader| match worker.upgrade() {
            Some(w) => w.broadcast_block(body, header),
            None => Err(BroadcastError::Disconnected),
        })
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("self_id", &self.state.self_id())
            .field("stored_messages", &self.stored_messages())
            .finish_non_exhaustive()
    }
}
