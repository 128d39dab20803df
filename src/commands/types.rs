//! Command and actuator state types
//!
//! # Command Vocabulary
//!
//! Commands travel as bare ASCII tokens in the frame payload:
//!
//! | Token    | Command               | Effect                                  |
//! |----------|-----------------------|-----------------------------------------|
//! | `ON_16S` | [`Command::TimedOn`]  | ON for 2 sleep quanta (~16 s), then OFF |
//! | `ON`     | [`Command::TurnOn`]   | ON until told otherwise                 |
//! | `OFF`    | [`Command::TurnOff`]  | OFF                                     |
//!
//! Matching is exact and case-sensitive. Anything else is rejected.

use core::fmt;

/// Wire tokens
pub mod tokens {
    pub const TURN_ON_16S: &str = "ON_16S";
    pub const TURN_ON: &str = "ON";
    pub const TURN_OFF: &str = "OFF";
}

/// Sleep quanta a timed-on command keeps the output ON (2 x 8 s)
pub const TIMED_ON_INTERVALS: u16 = 2;

/// Parsed actuator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Turn ON for [`TIMED_ON_INTERVALS`] sleep quanta
    TimedOn,
    /// Turn ON indefinitely
    TurnOn,
    /// Turn OFF
    TurnOff,
}

impl Command {
    /// Wire token for this command
    pub fn token(&self) -> &'static str {
        match self {
            Command::TimedOn => tokens::TURN_ON_16S,
            Command::TurnOn => tokens::TURN_ON,
            Command::TurnOff => tokens::TURN_OFF,
        }
    }
}

/// Command rejection reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload is not one of the known tokens
    UnrecognizedCommand,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnrecognizedCommand => write!(f, "unrecognized command"),
        }
    }
}

/// Logical state of the controlled external device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorState {
    on: bool,
    /// Remaining sleep quanta before a timed ON turns itself OFF
    off_after: Option<u16>,
}

impl ActuatorState {
    pub const OFF: Self = Self {
        on: false,
        off_after: None,
    };

    pub const ON: Self = Self {
        on: true,
        off_after: None,
    };

    /// ON with a deadline `intervals` quanta away
    pub fn on_for(intervals: u16) -> Self {
        if intervals == 0 {
            return Self::OFF;
        }
        Self {
            on: true,
            off_after: Some(intervals),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Remaining quanta of a timed ON, if armed
    pub fn off_after(&self) -> Option<u16> {
        self.off_after
    }

    /// State after one more sleep quantum has elapsed.
    ///
    /// An armed deadline counts down and turns the state OFF when it runs
    /// out; ON without a deadline and OFF are unaffected.
    pub fn tick(self) -> Self {
        match self.off_after {
            Some(remaining) if self.on => {
                if remaining <= 1 {
                    Self::OFF
                } else {
                    Self {
                        on: true,
                        off_after: Some(remaining - 1),
                    }
                }
            }
            _ => self,
        }
    }
}
