//! Manually driven round clock and synchronised timer.

use parking_lot::Mutex;
use spos_core::{Rounder, SyncTimer};
use spos_types::RoundIndex;
use std::time::Duration;

/// Round clock whose index and start time are set by the test.
#[derive(Debug)]
pub struct RounderMock {
    round: Mutex<(RoundIndex, Duration)>,
    duration: Mutex<Duration>,
}

impl RounderMock {
    pub fn new(index: RoundIndex, time_stamp: Duration, duration: Duration) -> Self {
        Self {
            round: Mutex::new((index, time_stamp)),
            duration: Mutex::new(duration),
        }
    }

    /// Jump to round `index` starting at `time_stamp`.
    pub fn set_round(&self, index: RoundIndex, time_stamp: Duration) {
        *self.round.lock() = (index, time_stamp);
    }

    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock() = duration;
    }

    /// Advance to the next round, which starts one duration later.
    pub fn advance(&self) {
        let duration = *self.duration.lock();
        let mut round = self.round.lock();
        *round = (round.0.next(), round.1 + duration);
    }
}

impl Rounder for RounderMock {
    fn index(&self) -> RoundIndex {
        self.round.lock().0
    }

    fn time_stamp(&self) -> Duration {
        self.round.lock().1
    }

    fn time_duration(&self) -> Duration {
        *self.duration.lock()
    }
}

/// Timer reporting whatever time the test sets.
#[derive(Debug, Default)]
pub struct SyncTimerMock {
    now: Mutex<Duration>,
}

impl SyncTimerMock {
    pub fn new(now: Duration) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set_current_time(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl SyncTimer for SyncTimerMock {
    fn current_time(&self) -> Duration {
        *self.now.lock()
    }
}
