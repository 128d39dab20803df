//! Transceiver trait for abstraction and testability
//!
//! This trait is the whole contract between the link layer and the radio
//! chip, allowing the register-level driver to be swapped with a mock for
//! testing.

use crate::config::protocol::MAX_FRAME_SIZE;
use crate::config::{FrequencyBand, PowerMode};
use core::fmt;
use core::future::Future;
use heapless::Vec;

/// Errors that can occur during transceiver operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Nothing received before the timeout
    Timeout,
    /// Hardware CRC check failed on a received packet
    CrcError,
    /// Transmission failed
    TransmitFailed,
    /// Reception failed
    ReceiveFailed,
    /// RC oscillator calibration did not complete
    CalibrationFailed,
    /// Radio not initialised
    NotInitialised,
    /// SPI/bus communication error
    BusError,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RadioError::Timeout => "timeout",
            RadioError::CrcError => "crc error",
            RadioError::TransmitFailed => "transmit failed",
            RadioError::ReceiveFailed => "receive failed",
            RadioError::CalibrationFailed => "calibration failed",
            RadioError::NotInitialised => "not initialised",
            RadioError::BusError => "bus error",
        };
        f.write_str(msg)
    }
}

/// Received frame with metadata
#[derive(Debug, Clone)]
pub struct RxPacket {
    /// Raw frame bytes
    pub data: Vec<u8, MAX_FRAME_SIZE>,
    /// Received Signal Strength Indicator in dBm
    pub rssi: i16,
}

/// Abstract sub-GHz transceiver
pub trait Transceiver {
    /// Initialise the radio hardware
    fn init(&mut self) -> impl Future<Output = Result<(), RadioError>>;

    /// Select frequency band and power amplifier mode
    fn configure(
        &mut self,
        band: FrequencyBand,
        power: PowerMode,
    ) -> impl Future<Output = Result<(), RadioError>>;

    /// Recalibrate the RC oscillator against temperature drift.
    ///
    /// Blocks for a bounded time.
    fn recalibrate(&mut self) -> impl Future<Output = Result<(), RadioError>>;

    /// Transmit one frame. Completes when the frame has left the antenna.
    fn transmit(&mut self, data: &[u8]) -> impl Future<Output = Result<(), RadioError>>;

    /// Receive one frame, or `RadioError::Timeout` once `timeout_ms` elapses
    fn receive(&mut self, timeout_ms: u32) -> impl Future<Output = Result<RxPacket, RadioError>>;

    /// Put the radio in its lowest power mode until the next operation
    fn sleep(&mut self) -> impl Future<Output = Result<(), RadioError>>;
}
