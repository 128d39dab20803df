#![cfg_attr(not(test), no_std)]

pub mod actuator;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod node;
pub mod protocol;
pub mod radio;
pub mod scheduler;
pub mod sensors;
pub mod time;
pub mod watchdog;
