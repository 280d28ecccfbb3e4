//! Test doubles for the capabilities consumed by the SPoS consensus engine.
//!
//! Every mock has sensible defaults so a round can run without configuration.
//! Behaviour is overridden per method with a `set_*` closure, and calls are
//! recorded so tests can assert on them.

mod block;
mod clock;
mod multisig;
mod network;
mod sync;

pub use block::{BlockChainMock, BlockProcessorMock};
pub use clock::{RounderMock, SyncTimerMock};
pub use multisig::MultiSignerMock;
pub use network::BroadcastMessengerMock;
pub use sync::{BootstrapperMock, ValidatorGroupSelectorMock};

pub use spos_types::test_utils::{test_bls_key, test_bls_keys, test_validator_set};
