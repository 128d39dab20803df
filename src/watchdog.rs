//! Hardware watchdog
//!
//! The sensor node feeds the watchdog on every wake and again once the
//! transmit cycle is over. A cycle that hangs (a transceiver that never
//! signals TX done, a sensor bus that locks up) lets the timeout run out and
//! the hardware resets the node.

/// Reset timer that must be fed before `timeout_ms` elapses
pub trait Watchdog {
    /// Arm the watchdog. Called once, before the first wake.
    fn start(&mut self, timeout_ms: u32);

    /// Restart the countdown
    fn feed(&mut self);
}
