//! Command dispatcher
//!
//! Maps received command payloads to actuator state transitions. Rejected
//! payloads leave the state untouched: the listen window picks up anything
//! on the shared channel, not just commands for this protocol version.

use crate::commands::types::{ActuatorState, Command, CommandError, TIMED_ON_INTERVALS};
use crate::commands::CommandParser;
use log::{debug, info};

/// Command dispatcher
pub struct CommandDispatcher {
    parser: CommandParser,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new() -> Self {
        Self {
            parser: CommandParser::new(),
        }
    }

    /// Parse `payload` and apply it to `current`
    pub fn apply(
        &self,
        payload: &[u8],
        current: ActuatorState,
    ) -> Result<ActuatorState, CommandError> {
        match self.parser.parse(payload) {
            Ok(command) => {
                let next = self.transition(command, current);
                info!("Dispatcher: {} -> {:?}", command.token(), next);
                Ok(next)
            }
            Err(e) => {
                debug!("Dispatcher: rejected {} byte payload: {}", payload.len(), e);
                Err(e)
            }
        }
    }

    /// State reached from `current` by `command`
    pub fn transition(&self, command: Command, _current: ActuatorState) -> ActuatorState {
        match command {
            Command::TimedOn => ActuatorState::on_for(TIMED_ON_INTERVALS),
            Command::TurnOn => ActuatorState::ON,
            Command::TurnOff => ActuatorState::OFF,
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
