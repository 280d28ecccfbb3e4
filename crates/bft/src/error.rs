//! Consensus engine errors.

use crate::{ConfigError, SubroundId};
use spos_core::MultiSigError;
use spos_messages::{CodecError, MessageType};
use spos_types::{RoundIndex, ValidatorId};
use std::time::Duration;
use thiserror::Error;

/// Errors from constructing or validating the subround pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("{current} cannot sit between {previous:?} and {next:?}")]
    InvalidSubroundChain {
        previous: Option<SubroundId>,
        current: SubroundId,
        next: Option<SubroundId>,
    },

    #[error("Invalid time window for {subround}: {start:?}..{end:?}")]
    InvalidTimeWindow {
        subround: SubroundId,
        start: Duration,
        end: Duration,
    },

    #[error("Handler for {expected} was given subround {actual}")]
    WrongSubround {
        expected: SubroundId,
        actual: SubroundId,
    },

    #[error("Consensus group size must be at least 1")]
    EmptyConsensusGroup,

    #[error("{0} is not in the consensus group")]
    NotInConsensusGroup(ValidatorId),

    #[error("{0} is not an eligible validator")]
    UnknownValidator(ValidatorId),

    #[error("Signing key does not match the registered key of {0}")]
    KeyMismatch(ValidatorId),

    #[error("Factory and worker do not share the same consensus state")]
    StateMismatch,

    #[error("Update for {message} arrived after the state moved to {current}")]
    StaleRound {
        message: RoundIndex,
        current: RoundIndex,
    },

    #[error("Missing signature share for group index {index}")]
    MissingSignature { index: usize },

    #[error("Missing commitment for group index {index}")]
    MissingCommitment { index: usize },

    #[error("Commitment of group index {index} does not match its commitment hash")]
    CommitmentHashMismatch { index: usize },

    #[error("Multi-signature error: {0}")]
    MultiSig(#[from] MultiSigError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Reasons an inbound consensus message is rejected by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("Decode error: {0}")]
    Codec(#[from] CodecError),

    #[error("Message from {0} carries no signature")]
    MissingSignature(ValidatorId),

    #[error("Message from unknown sender {0}")]
    UnknownSender(ValidatorId),

    #[error("Message for past {message}, current is {current}")]
    PastRound {
        message: RoundIndex,
        current: RoundIndex,
    },

    #[error("Invalid signature from {0}")]
    InvalidSignature(ValidatorId),

    #[error("Message for {message} is too far ahead of {current}")]
    FutureRound {
        message: RoundIndex,
        current: RoundIndex,
    },

    #[error("Repeated {msg_type} message from {sender} for {round}")]
    Duplicate {
        sender: ValidatorId,
        msg_type: MessageType,
        round: RoundIndex,
    },
}
