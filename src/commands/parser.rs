//! Command parser for received payloads
//!
//! Parses frame payloads into Command values.

use crate::commands::types::{tokens, Command, CommandError};

/// Parser for text command tokens
pub struct CommandParser;

impl CommandParser {
    /// Create a new command parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a payload into a command
    ///
    /// The whole payload must equal one token; there is no trimming, no
    /// prefix matching and no case folding.
    pub fn parse(&self, payload: &[u8]) -> Result<Command, CommandError> {
        match payload {
            p if p == tokens::TURN_ON_16S.as_bytes() => Ok(Command::TimedOn),
            p if p == tokens::TURN_ON.as_bytes() => Ok(Command::TurnOn),
            p if p == tokens::TURN_OFF.as_bytes() => Ok(Command::TurnOff),
            _ => Err(CommandError::UnrecognizedCommand),
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}
