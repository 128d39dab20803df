//! Sensor driver boundary
//!
//! Physical drivers (BME280, TSL2561, battery ADC) live outside this crate
//! and plug in through [`Sensor`].

pub mod report;

pub use report::{Report, ReportPayload};

use core::fmt;

/// One reading from one sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSample {
    /// Temperature/pressure/humidity sensor
    Climate {
        /// Temperature in 0.1 degC
        temperature_deci_c: i16,
        pressure_hpa: u16,
        /// Relative humidity in 0.1 %
        humidity_deci_pct: u16,
    },
    /// Ambient light sensor
    Light { lux: u32 },
    /// Supply voltage
    Battery { millivolts: u16 },
}

/// Sensor failure. Degrades the report, never aborts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    Unavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Unavailable => write!(f, "sensor unavailable"),
        }
    }
}

/// An attached sensor
pub trait Sensor {
    fn read(&mut self) -> Result<SensorSample, SensorError>;
}
