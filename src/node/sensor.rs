//! Sensor/actuator node
//!
//! # Wake Cycle
//!
//! ```text
//! deep sleep (8 s) -> [feed watchdog] -> actuator tick -> scheduler tick
//!     ContinueSleeping      -> deep sleep
//!     PerformTransmitCycle  -> [switch off] -> sample -> send report
//!                           -> [switch restored] -> [listen -> dispatch]
//!                           -> radio sleep -> [feed watchdog] -> deep sleep
//! ```
//!
//! A report that is not delivered is logged and dropped; the next cycle
//! sends a fresh one. With the watchdog armed, a transmit cycle that does
//! not finish within the timeout resets the node.

use crate::actuator::Actuator;
use crate::config::protocol::MAX_NAME_LEN;
use crate::config::{ConfigError, RetryPolicy, SensorNodeConfig, SleepConfig, WatchdogConfig};
use crate::dispatcher::CommandDispatcher;
use crate::radio::{Delivered, Link, LinkError, Transceiver};
use crate::scheduler::{DeepSleep, DutyCycleScheduler, WakeAction};
use crate::sensors::{Report, Sensor};
use crate::time::Clock;
use crate::watchdog::Watchdog;
use core::convert::Infallible;
use embedded_hal::digital::OutputPin;
use heapless::String;
use log::{debug, info, warn};

/// Result of one transmit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Outcome of the report transmission
    pub delivery: Result<Delivered, LinkError>,
    /// True if a command received in the listen window changed the actuator
    pub command_applied: bool,
}

/// What one wake did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    Slept,
    Transmitted(CycleReport),
}

/// Periodic reporter with a switched output
pub struct SensorNode<'s, R, C, P>
where
    R: Transceiver,
    C: Clock,
    P: OutputPin,
{
    link: Link<R, C>,
    scheduler: DutyCycleScheduler,
    actuator: Actuator<P>,
    dispatcher: CommandDispatcher,
    sensors: &'s mut [&'s mut dyn Sensor],
    name: Option<String<MAX_NAME_LEN>>,
    gateway_id: u8,
    retry: RetryPolicy,
    sleep: SleepConfig,
    watchdog_config: WatchdogConfig,
    watchdog: Option<&'s mut dyn Watchdog>,
}

impl<'s, R, C, P> SensorNode<'s, R, C, P>
where
    R: Transceiver,
    C: Clock,
    P: OutputPin,
{
    pub fn new(
        link: Link<R, C>,
        switch: P,
        sensors: &'s mut [&'s mut dyn Sensor],
        config: &SensorNodeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            link,
            scheduler: DutyCycleScheduler::new(&config.sleep)?,
            actuator: Actuator::new(switch),
            dispatcher: CommandDispatcher::new(),
            sensors,
            name: config.identity.name.clone(),
            gateway_id: config.gateway_id,
            retry: config.retry,
            sleep: config.sleep,
            watchdog_config: config.watchdog,
            watchdog: None,
        })
    }

    /// Hand over the hardware watchdog. It is armed only when the config
    /// enables it; otherwise it is left untouched.
    pub fn with_watchdog(mut self, watchdog: &'s mut dyn Watchdog) -> Self {
        if self.watchdog_config.enabled {
            watchdog.start(self.watchdog_config.timeout_ms);
            info!("Sensor: watchdog armed ({} ms)", self.watchdog_config.timeout_ms);
            self.watchdog = Some(watchdog);
        } else {
            debug!("Sensor: watchdog disabled");
        }
        self
    }

    /// Bring up the radio, then alternate deep sleep and wake handling
    /// forever. Only a radio that fails to come up ends the loop.
    pub async fn run<S: DeepSleep>(&mut self, deep_sleep: &mut S) -> Result<Infallible, LinkError> {
        self.link.init().await?;
        self.link.sleep().await?;
        self.feed_watchdog();
        info!(
            "Sensor: reporting to node {} every {} s",
            self.gateway_id,
            self.scheduler.reporting_interval_secs()
        );

        loop {
            deep_sleep.sleep_quantum().await;
            self.on_wake().await;
        }
    }

    /// Handle one wake from deep sleep
    pub async fn on_wake(&mut self) -> WakeOutcome {
        self.feed_watchdog();
        self.actuator.tick();

        match self.scheduler.tick() {
            WakeAction::ContinueSleeping => WakeOutcome::Slept,
            WakeAction::PerformTransmitCycle { listen } => {
                let cycle = self.transmit_cycle(listen).await;
                self.feed_watchdog();
                WakeOutcome::Transmitted(cycle)
            }
        }
    }

    pub fn actuator(&self) -> &Actuator<P> {
        &self.actuator
    }

    pub fn link(&self) -> &Link<R, C> {
        &self.link
    }

    pub fn scheduler(&self) -> &DutyCycleScheduler {
        &self.scheduler
    }

    async fn transmit_cycle(&mut self, listen: bool) -> CycleReport {
        if self.sleep.turn_off_while_sending {
            self.actuator.suspend();
        }

        let mut report = Report::collect(self.name.as_deref(), &mut *self.sensors);
        report.set_rssi(self.link.last_rssi());
        let payload = report.encode();

        let delivery = self
            .link
            .send(self.gateway_id, payload.as_bytes(), &self.retry)
            .await;
        self.actuator.resume();

        let mut command_applied = false;
        match &delivery {
            Ok(delivered) => {
                debug!(
                    "Sensor: report '{}' sent in {} attempt(s)",
                    payload.as_str(),
                    delivered.attempts
                );
                if listen {
                    command_applied = self.listen_for_command().await;
                }
            }
            Err(e) => warn!("Sensor: report not delivered: {}", e),
        }

        if let Err(e) = self.link.sleep().await {
            warn!("Sensor: radio sleep failed: {}", e);
        }

        CycleReport {
            delivery,
            command_applied,
        }
    }

    fn feed_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.feed();
        }
    }

    async fn listen_for_command(&mut self) -> bool {
        let packet = match self.link.listen(self.sleep.listen_window_ms).await {
            Ok(Some(packet)) => packet,
            Ok(None) => return false,
            Err(e) => {
                warn!("Sensor: listen failed: {}", e);
                return false;
            }
        };

        match self.dispatcher.apply(&packet.payload, self.actuator.state()) {
            Ok(next) => {
                self.actuator.set(next);
                true
            }
            Err(e) => {
                warn!("Sensor: ignored payload from node {}: {}", packet.source, e);
                false
            }
        }
    }
}
