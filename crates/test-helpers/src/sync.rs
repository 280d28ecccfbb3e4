//! Bootstrapper and group selector doubles.

use parking_lot::Mutex;
use spos_core::{Bootstrapper, SelectionError, ValidatorGroupSelector};
use spos_types::ValidatorId;
use std::sync::atomic::{AtomicBool, Ordering};

/// Bootstrapper reporting a settable sync flag (not syncing by default).
#[derive(Debug, Default)]
pub struct BootstrapperMock {
    should_sync: AtomicBool,
}

impl BootstrapperMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_sync(&self, should_sync: bool) {
        self.should_sync.store(should_sync, Ordering::SeqCst);
    }
}

impl Bootstrapper for BootstrapperMock {
    fn should_sync(&self) -> bool {
        self.should_sync.load(Ordering::SeqCst)
    }
}

/// Selector returning a fixed group regardless of randomness.
#[derive(Debug)]
pub struct ValidatorGroupSelectorMock {
    group: Mutex<Vec<ValidatorId>>,
    error: Mutex<Option<SelectionError>>,
    randomness: Mutex<Vec<Vec<u8>>>,
}

impl ValidatorGroupSelectorMock {
    pub fn new(group: Vec<ValidatorId>) -> Self {
        Self {
            group: Mutex::new(group),
            error: Mutex::new(None),
            randomness: Mutex::new(Vec::new()),
        }
    }

    pub fn set_group(&self, group: Vec<ValidatorId>) {
        *self.group.lock() = group;
    }

    /// Make every selection fail with `error` (or succeed again with `None`).
    pub fn set_error(&self, error: Option<SelectionError>) {
        *self.error.lock() = error;
    }

    /// Randomness passed to each selection, in call order.
    pub fn randomness_seen(&self) -> Vec<Vec<u8>> {
        self.randomness.lock().clone()
    }
}

impl ValidatorGroupSelector for ValidatorGroupSelectorMock {
    fn compute_validators_group(&self, randomness: &[u8]) -> Result<Vec<ValidatorId>, SelectionError> {
        self.randomness.lock().push(randomness.to_vec());
        if let Some(e) = self.error.lock().clone() {
            return Err(e);
        }
        Ok(self.group.lock().clone())
    }
}
