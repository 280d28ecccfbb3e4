//! Eligible validators and their public keys.

use crate::{PublicKey, ValidatorId};
use std::collections::HashMap;

/// Information about a single eligible validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    /// Validator identifier.
    pub validator_id: ValidatorId,

    /// Public key used to verify the validator's signatures.
    pub public_key: PublicKey,
}

/// Ordered list of validators eligible for consensus group selection.
///
/// Order matters: group selectors index into this list.
#[derive(Debug, Clone, Default)]
pub struct ValidatorSet {
    validators: Vec<ValidatorInfo>,
    index: HashMap<ValidatorId, usize>,
}

impl ValidatorSet {
    /// Create a validator set. Later duplicates of an id are ignored.
    pub fn new(validators: Vec<ValidatorInfo>) -> Self {
        let mut index = HashMap::with_capacity(validators.len());
        let mut unique = Vec::with_capacity(validators.len());
        for v in validators {
            if index.contains_key(&v.validator_id) {
                continue;
            }
            index.insert(v.validator_id, unique.len());
            unique.push(v);
        }
        Self {
            validators: unique,
            index,
        }
    }

    /// Number of eligible validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// All validators in eligibility order.
    pub fn validators(&self) -> &[ValidatorInfo] {
        &self.validators
    }

    /// Validator ids in eligibility order.
    pub fn ids(&self) -> Vec<ValidatorId> {
        self.validators.iter().map(|v| v.validator_id).collect()
    }

    /// Whether `id` is eligible.
    pub fn contains(&self, id: ValidatorId) -> bool {
        self.index.contains_key(&id)
    }

    /// Public key for `id`, if eligible.
    pub fn public_key(&self, id: ValidatorId) -> Option<&PublicKey> {
        self.index.get(&id).map(|&i| &self.validators[i].public_key)
    }
}
