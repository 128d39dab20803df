//! Node role drivers
//!
//! Each role owns its link and its pins and runs one node's control flow:
//! the trigger node fires a single command, the sensor node loops over
//! deep-sleep quanta.

pub mod sensor;
pub mod trigger;

pub use sensor::{CycleReport, SensorNode, WakeOutcome};
pub use trigger::TriggerNode;
