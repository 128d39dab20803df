//! Duty-cycle scheduler
//!
//! Deep-sleep quanta are fixed by the low-power timer (8 s). The scheduler
//! counts quanta and turns every `intervals_per_wake`-th wake into a
//! transmit cycle, so the reporting interval is quantum x threshold.

use crate::config::sleep::QUANTUM_SECS;
use crate::config::{ConfigError, SleepConfig};
use core::future::Future;

/// What the node should do on this wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAction {
    /// Go straight back to sleep
    ContinueSleeping,
    /// Sample, report and, if `listen` is set, open a command window
    PerformTransmitCycle { listen: bool },
}

/// Counts elapsed sleep quanta between transmit cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepCounter {
    intervals_per_wake: u16,
    count: u16,
}

impl SleepCounter {
    pub fn new(intervals_per_wake: u16) -> Result<Self, ConfigError> {
        if intervals_per_wake == 0 {
            return Err(ConfigError::InvalidSleepThreshold);
        }
        Ok(Self {
            intervals_per_wake,
            count: 0,
        })
    }

    /// Count one quantum. Returns true and resets when the threshold is hit.
    pub fn increment(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.intervals_per_wake {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn intervals_per_wake(&self) -> u16 {
        self.intervals_per_wake
    }
}

/// Decides, once per quantum, whether this wake transmits
pub struct DutyCycleScheduler {
    counter: SleepCounter,
    accept_commands: bool,
}

impl DutyCycleScheduler {
    pub fn new(config: &SleepConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            counter: SleepCounter::new(config.intervals_per_wake)?,
            accept_commands: config.accept_commands,
        })
    }

    /// Advance by one deep-sleep quantum
    pub fn tick(&mut self) -> WakeAction {
        if self.counter.increment() {
            WakeAction::PerformTransmitCycle {
                listen: self.accept_commands,
            }
        } else {
            WakeAction::ContinueSleeping
        }
    }

    pub fn counter(&self) -> &SleepCounter {
        &self.counter
    }

    /// Effective time between reports
    pub fn reporting_interval_secs(&self) -> u32 {
        QUANTUM_SECS * self.counter.intervals_per_wake() as u32
    }
}

/// Hardware deep sleep. The processor is powered down for one quantum;
/// the future completes on wake.
pub trait DeepSleep {
    fn sleep_quantum(&mut self) -> impl Future<Output = ()>;
}

#[cfg(test)]
pub mod mock {
    //! Mock deep sleep for testing

    use super::*;
    use crate::time::mock::SimClock;

    /// Counts quanta and advances a simulated clock
    pub struct MockDeepSleep {
        clock: SimClock,
        pub quanta: usize,
    }

    impl MockDeepSleep {
        pub fn new(clock: SimClock) -> Self {
            Self { clock, quanta: 0 }
        }
    }

    impl DeepSleep for MockDeepSleep {
        async fn sleep_quantum(&mut self) {
            self.quanta += 1;
            self.clock.advance_ms(QUANTUM_SECS as u64 * 1_000);
        }
    }
}
