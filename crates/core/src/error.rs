//! Errors reported by capabilities.

use spos_types::AggregateError;
use thiserror::Error;

/// Errors from the multi-signature capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultiSigError {
    #[error("Index {index} out of bounds for group of {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Message to sign has not been set")]
    MissingMessage,

    #[error("No commitment hash stored for index {index}")]
    MissingCommitmentHash { index: usize },

    #[error("No commitment stored for index {index}")]
    MissingCommitment { index: usize },

    #[error("No signature share stored for index {index}")]
    MissingSignatureShare { index: usize },

    #[error("Index {index} is not set in the bitmap")]
    NotInBitmap { index: usize },

    #[error("Invalid signature share from index {index}")]
    InvalidSignatureShare { index: usize },

    #[error("Aggregated signature does not verify")]
    InvalidAggregatedSignature,

    #[error("Bitmap selects no signers")]
    EmptyBitmap,

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregateError),

    #[error("Key is not a BLS12-381 key")]
    NotBlsKey,

    #[error("Own key does not match the public key at index {index}")]
    KeyMismatch { index: usize },
}

/// Errors from block construction, validation and commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockProcessError {
    #[error("Ran out of time")]
    Timeout,

    #[error("Invalid block header: {0}")]
    InvalidHeader(String),

    #[error("Invalid block body: {0}")]
    InvalidBody(String),

    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Errors from the broadcast capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Messenger is disconnected")]
    Disconnected,

    #[error("Broadcast failed: {0}")]
    Failed(String),
}

/// Errors from consensus group selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Consensus group size must be at least 1")]
    InvalidGroupSize,

    #[error("Eligible list of {eligible} is smaller than consensus group size {group_size}")]
    SmallEligibleList { eligible: usize, group_size: usize },

    #[error("Randomness source is empty")]
    EmptyRandomness,
}
