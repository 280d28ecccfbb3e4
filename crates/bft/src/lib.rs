//! SPoS consensus subround pipeline.
//!
//! A round is a fixed chain of seven phases, each with its own time window:
//!
//! - `StartRound` → reset state, select the consensus group
//! - `Block` → the leader proposes body and header, the group processes them
//! - `CommitmentHash` → every member announces the hash of its commitment
//! - `Bitmap` → the leader fixes which members sign
//! - `Commitment` → selected members reveal their commitments
//! - `Signature` → selected members send signature shares
//! - `EndRound` → shares are verified and aggregated, the block is committed
//!
//! The [`SubroundFactory`] builds fresh handlers every round and registers
//! them with the [`Worker`] (message routing) and a [`ChronologyHandler`]
//! (deadline driving). All handlers share one [`ConsensusState`].

mod chronology;
mod config;
mod consensus_state;
mod context;
mod error;
mod factory;
mod subround;
pub mod subrounds;
mod worker;

#[cfg(test)]
mod test_support;

pub use chronology::{Chronology, ChronologyHandler, RoundOutcome, JOB_RETRY_INTERVAL};
pub use config::{BftConfig, ConfigError, TimeWindow};
pub use consensus_state::ConsensusState;
pub use context::ConsensusContext;
pub use error::{ConsensusError, WorkerError};
pub use factory::{init_consensus_threshold, pbft_threshold, SubroundFactory};
pub use subround::{
    ConsensusStateChanged, ExecuteStoredMessagesFn, ExtendFn, Subround, SubroundHandler,
    SubroundHooks, SubroundId, SubroundStatus,
};
pub use worker::{ReceivedMessageFn, Worker, MAX_ROUNDS_AHEAD};
