use crate::{traits::ValidatorGroupSelector, SelectionError};
use spos_types::{Hash, ValidatorId, ValidatorSet};

/// Picks the consensus group by hashing the randomness with each slot index.
///
/// Slot `i` takes the eligible validator at `blake3(randomness || i) mod n`.
/// Collisions move forward to the next validator not yet chosen, so a group
/// never holds duplicates.
#[derive(Debug, Clone)]
pub struct IndexHashedGroupSelector {
    eligible: Vec<ValidatorId>,
    consensus_group_size: usize,
}

impl IndexHashedGroupSelector {
    /// Create a selector over the eligible validators in `validators`.
    pub fn new(validators: &ValidatorSet, consensus_group_size: usize) -> Result<Self, SelectionError> {
        if consensus_group_size == 0 {
            return Err(SelectionError::InvalidGroupSize);
        }
        if validators.len() < consensus_group_size {
            return Err(SelectionError::SmallEligibleList {
                eligible: validators.len(),
                group_size: consensus_group_size,
            });
        }
        Ok(Self {
            eligible: validators.ids(),
            consensus_group_size,
        })
    }

    /// Size of the groups this selector computes.
    pub fn consensus_group_size(&self) -> usize {
        self.consensus_group_size
    }
}

impl ValidatorGroupSelector for IndexHashedGroupSelector {
    fn compute_validators_group(&self, randomness: &[u8]) -> Result<Vec<ValidatorId>, SelectionError> {
        if randomness.is_empty() {
            return Err(SelectionError::EmptyRandomness);
        }

        let n = self.eligible.len();
        let mut taken = vec![false; n];
        let mut group = Vec::with_capacity(self.consensus_group_size);

        for slot in 0..self.consensus_group_size as u64 {
            let digest = Hash::from_parts(&[randomness, &slot.to_le_bytes()]);
            let mut index = (digest.as_u64() % n as u64) as usize;
            while taken[index] {
                index = (index + 1) % n;
            }
            taken[index] = true;
            group.push(self.eligible[index]);
        }

        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spos_types::test_utils::{test_bls_keys, test_validator_set};
    use std::collections::HashSet;

    #[test]
    fn test_group_is_deterministic_and_unique() {
        let validators = test_validator_set(&test_bls_keys(7));
        let selector = IndexHashedGroupSelector::new(&validators, 7).unwrap();

        let a = selector.compute_validators_group(b"round-12").unwrap();
        let b = selector.compute_validators_group(b"round-12").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.iter().collect::<HashSet<_>>().len(), 7);
    }

    #[test]
    fn test_randomness_changes_group_order() {
        let validators = test_validator_set(&test_bls_keys(10));
        let selector = IndexHashedGroupSelector::new(&validators, 4).unwrap();

        let groups: HashSet<Vec<ValidatorId>> = (0..16u8)
            .map(|r| selector.compute_validators_group(&[r]).unwrap())
            .collect();
        assert!(groups.len() > 1);
    }

    #[test]
    fn test_invalid_configuration() {
        let validators = test_validator_set(&test_bls_keys(2));

        assert_eq!(
            IndexHashedGroupSelector::new(&validators, 0).unwrap_err(),
            SelectionError::InvalidGroupSize
        );
        assert_eq!(
            IndexHashedGroupSelector::new(&validators, 3).unwrap_err(),
            SelectionError::SmallEligibleList {
                eligible: 2,
                group_size: 3
            }
        );

        let selector = IndexHashedGroupSelector::new(&validators, 2).unwrap();
        assert_eq!(
            selector.compute_validators_group(&[]),
            Err(SelectionError::EmptyRandomness)
        );
    }
}
