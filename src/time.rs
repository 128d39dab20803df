//! Monotonic time source for the link layer
//!
//! ACK waits and listen windows are bounded by deadlines, so the link layer
//! needs both an async delay and a millisecond clock.

use embedded_hal_async::delay::DelayNs;

/// Async delay plus a monotonic millisecond counter
pub trait Clock: DelayNs {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u64;
}

/// Clock backed by the embassy time driver
#[cfg(feature = "embedded")]
pub struct EmbassyClock;

#[cfg(feature = "embedded")]
impl DelayNs for EmbassyClock {
    async fn delay_ns(&mut self, ns: u32) {
        embassy_time::Timer::after_nanos(ns as u64).await
    }

    async fn delay_us(&mut self, us: u32) {
        embassy_time::Timer::after_micros(us as u64).await
    }

    async fn delay_ms(&mut self, ms: u32) {
        embassy_time::Timer::after_millis(ms as u64).await
    }
}

#[cfg(feature = "embedded")]
impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
