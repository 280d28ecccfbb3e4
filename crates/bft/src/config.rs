//! Round timing and consensus group configuration.

use crate::SubroundId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution window of one subround, in percent of the round duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Offset from round start at which the subround opens.
    pub start_percent: u32,
    /// Offset from round start at which the subround deadline falls.
    pub end_percent: u32,
}

impl TimeWindow {
    /// Create a window from percent offsets.
    pub const fn new(start_percent: u32, end_percent: u32) -> Self {
        Self {
            start_percent,
            end_percent,
        }
    }

    /// Absolute `(start, end)` offsets for a round of `round_duration`.
    pub fn scale(&self, round_duration: Duration) -> (Duration, Duration) {
        (
            round_duration * self.start_percent / 100,
            round_duration * self.end_percent / 100,
        )
    }
}

/// Configuration for the SPoS consensus engine.
///
/// Windows must tile the round in subround order: the first starts at 0%,
/// each starts where the previous ended, and none ends past 100%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BftConfig {
    /// Number of validators selected into each round's consensus group.
    /// Default: 21.
    pub consensus_group_size: usize,

    /// Default: 0%..5%.
    pub start_round: TimeWindow,

    /// Default: 5%..25%.
    pub block: TimeWindow,

    /// Default: 25%..40%.
    pub commitment_hash: TimeWindow,

    /// Default: 40%..55%.
    pub bitmap: TimeWindow,

    /// Default: 55%..70%.
    pub commitment: TimeWindow,

    /// Default: 70%..85%.
    pub signature: TimeWindow,

    /// Default: 85%..95%.
    pub end_round: TimeWindow,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            consensus_group_size: 21,
            start_round: TimeWindow::new(0, 5),
            block: TimeWindow::new(5, 25),
            commitment_hash: TimeWindow::new(25, 40),
            bitmap: TimeWindow::new(40, 55),
            commitment: TimeWindow::new(55, 70),
            signature: TimeWindow::new(70, 85),
            end_round: TimeWindow::new(85, 95),
        }
    }
}

impl BftConfig {
    /// Window configured for `subround`.
    pub fn window(&self, subround: SubroundId) -> TimeWindow {
        match subround {
            SubroundId::StartRound => self.start_round,
            SubroundId::Block => self.block,
            SubroundId::CommitmentHash => self.commitment_hash,
            SubroundId::Bitmap => self.bitmap,
            SubroundId::Commitment => self.commitment,
            SubroundId::Signature => self.signature,
            SubroundId::EndRound => self.end_round,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus_group_size == 0 {
            return Err(ConfigError::EmptyConsensusGroup);
        }

        let mut previous_end = None;
        for subround in SubroundId::ALL {
            let window = self.window(subround);
            if window.start_percent >= window.end_percent {
                return Err(ConfigError::InvalidWindow {
                    subround,
                    start: window.start_percent,
                    end: window.end_percent,
                });
            }
            if window.end_percent > 100 {
                return Err(ConfigError::PastRoundEnd {
                    subround,
                    end: window.end_percent,
                });
            }
            match previous_end {
                None if window.start_percent != 0 => {
                    return Err(ConfigError::FirstWindowStart {
                        start: window.start_percent,
                    });
                }
                Some(end) if window.start_percent != end => {
                    return Err(ConfigError::NotContiguous {
                        subround,
                        start: window.start_percent,
                        previous_end: end,
                    });
                }
                _ => {}
            }
            previous_end = Some(window.end_percent);
        }
        Ok(())
    }
}

/// Errors in consensus configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("consensus_group_size must be > 0")]
    EmptyConsensusGroup,
    #[error("window of {subround} is empty or inverted: {start}%..{end}%")]
    InvalidWindow {
        subround: SubroundId,
        start: u32,
        end: u32,
    },
    #[error("window of {subround} ends past the round: {end}%")]
    PastRoundEnd { subround: SubroundId, end: u32 },
    #[error("first window must start at 0%, got {start}%")]
    FirstWindowStart { start: u32 },
    #[error("window of {subround} starts at {start}% but the previous one ends at {previous_end}%")]
    NotContiguous {
        subround: SubroundId,
        start: u32,
        previous_end: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BftConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window(SubroundId::EndRound), TimeWindow::new(85, 95));
    }

    #[test]
    fn test_scale_window() {
        let window = TimeWindow::new(85, 95);
        let (start, end) = window.scale(Duration::from_millis(4000));
        assert_eq!(start, Duration::from_millis(3400));
        assert_eq!(end, Duration::from_millis(3800));
    }

    #[test]
    fn test_gap_between_windows() {
        let config = BftConfig {
            bitmap: TimeWindow::new(41, 55),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotContiguous {
                subround: SubroundId::Bitmap,
                start: 41,
                previous_end: 40
            })
        );
    }

    #[test]
    fn test_invalid_windows() {
        let inverted = BftConfig {
            block: TimeWindow::new(5, 5),
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidWindow { .. })
        ));

        let late_start = BftConfig {
            start_round: TimeWindow::new(1, 5),
            ..Default::default()
        };
        assert_eq!(
            late_start.validate(),
            Err(ConfigError::FirstWindowStart { start: 1 })
        );

        let overrun = BftConfig {
            end_round: TimeWindow::new(85, 101),
            ..Default::default()
        };
        assert!(matches!(
            overrun.validate(),
            Err(ConfigError::PastRoundEnd { end: 101, .. })
        ));
    }

    #[test]
    fn test_invalid_group_size() {
        let config = BftConfig {
            consensus_group_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyConsensusGroup));
    }
}
