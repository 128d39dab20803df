//! Switched output for the external device
//!
//! The pin mirrors the logical [`ActuatorState`] except while suspended for
//! a transmit cycle, when it is held low to keep peak current down. The
//! logical state, including an armed deadline, survives the suspension.

use crate::commands::ActuatorState;
use embedded_hal::digital::OutputPin;
use log::{info, warn};

/// Output pin plus the logical state it represents
pub struct Actuator<P: OutputPin> {
    pin: P,
    state: ActuatorState,
    suspended: bool,
    pin_faults: u32,
}

impl<P: OutputPin> Actuator<P> {
    /// Take ownership of the switch pin and drive it low
    pub fn new(pin: P) -> Self {
        let mut actuator = Self {
            pin,
            state: ActuatorState::OFF,
            suspended: false,
            pin_faults: 0,
        };
        actuator.drive();
        actuator
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn set(&mut self, state: ActuatorState) {
        self.state = state;
        self.drive();
    }

    /// Advance the timed-off deadline by one sleep quantum
    pub fn tick(&mut self) {
        let next = self.state.tick();
        if next != self.state && !next.is_on() {
            info!("Actuator: timed ON expired");
        }
        self.set(next);
    }

    /// Force the pin low without touching the logical state
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.drive();
    }

    /// Restore the pin to the logical state
    pub fn resume(&mut self) {
        self.suspended = false;
        self.drive();
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Pin writes that failed since startup
    pub fn pin_faults(&self) -> u32 {
        self.pin_faults
    }

    /// The logical state is kept on failure; the next drive retries the pin
    fn drive(&mut self) {
        let high = self.state.is_on() && !self.suspended;
        let result = if high { self.pin.set_high() } else { self.pin.set_low() };
        if let Err(e) = result {
            self.pin_faults = self.pin_faults.saturating_add(1);
            warn!(
                "Actuator: failed to drive switch {}: {:?}",
                if high { "high" } else { "low" },
                e
            );
        }
    }
}
