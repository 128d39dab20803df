pub mod parser;
pub mod types;

pub use parser::CommandParser;
pub use types::{ActuatorState, Command, CommandError, TIMED_ON_INTERVALS};
