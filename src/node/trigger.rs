//! Trigger node
//!
//! Sends one preconfigured command to one target node, lights the status LED
//! while doing so, then puts the radio to sleep and halts.

use crate::commands::Command;
use crate::config::{ConfigError, RetryPolicy, TriggerNodeConfig};
use crate::radio::{Delivered, Link, LinkError, Transceiver};
use crate::time::Clock;
use embedded_hal::digital::OutputPin;
use log::{info, warn};

/// Single-shot command sender
pub struct TriggerNode<R, C, L>
where
    R: Transceiver,
    C: Clock,
    L: OutputPin,
{
    link: Link<R, C>,
    led: L,
    target_id: u8,
    command: Command,
    retry: RetryPolicy,
}

impl<R, C, L> TriggerNode<R, C, L>
where
    R: Transceiver,
    C: Clock,
    L: OutputPin,
{
    /// Rejects an invalid config before the radio or LED are touched
    pub fn new(link: Link<R, C>, mut led: L, config: &TriggerNodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if led.set_low().is_err() {
            warn!("Trigger: LED pin error");
        }
        Ok(Self {
            link,
            led,
            target_id: config.target_id,
            command: config.command,
            retry: config.retry,
        })
    }

    /// Bring up the radio and deliver the command once.
    ///
    /// The radio is put to sleep whatever the outcome.
    pub async fn run(&mut self) -> Result<Delivered, LinkError> {
        self.link.init().await?;

        self.set_led(true);
        let result = self
            .link
            .send(self.target_id, self.command.token().as_bytes(), &self.retry)
            .await;
        self.set_led(false);

        match &result {
            Ok(delivered) if delivered.acked => info!(
                "Trigger: {} delivered to node {} after {} attempt(s)",
                self.command.token(),
                self.target_id,
                delivered.attempts
            ),
            Ok(_) => info!("Trigger: {} sent to node {}", self.command.token(), self.target_id),
            Err(e) => warn!("Trigger: {} to node {}: {}", self.command.token(), self.target_id, e),
        }

        if let Err(e) = self.link.sleep().await {
            warn!("Trigger: radio sleep failed: {}", e);
        }
        result
    }

    pub fn link(&self) -> &Link<R, C> {
        &self.link
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    fn set_led(&mut self, on: bool) {
        let result = if on { self.led.set_high() } else { self.led.set_low() };
        if result.is_err() {
            warn!("Trigger: LED pin error");
        }
    }
}
