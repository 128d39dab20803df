//! Node configuration: per-node defaults and validated config structs
//!
//! The constant modules hold the values a node is built with. They are
//! assembled into [`NodeIdentity`], [`RadioConfig`] and [`RetryPolicy`] at
//! startup and validated before the radio is touched.

use crate::commands::Command;
use core::fmt;
use heapless::String;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Network addressing
pub mod network {
    pub const NETWORK_ID: u8 = 1;
    pub const GATEWAY_ID: u8 = 1;
    /// Sensor node id
    pub const SENSOR_NODE_ID: u8 = 2;
    /// Trigger node id
    pub const TRIGGER_NODE_ID: u8 = 10;
    /// Node the trigger node controls
    pub const TARGET_ID: u8 = 2;
    /// Short name reported by the sensor node (max 8 chars, alphanumeric)
    pub const SENSOR_NODE_NAME: &str = "hall";
}

/// Radio defaults
pub mod radio_defaults {
    use super::{FrequencyBand, PowerMode};

    pub const BAND: FrequencyBand = FrequencyBand::Mhz433;
    pub const POWER: PowerMode = PowerMode::High;
    /// Recalibrate the RC oscillator before every transmission
    /// (large temperature difference between transmitter and receiver)
    pub const RC_RECAL: bool = true;
    pub const ENCRYPT: bool = true;
    /// Must be exactly 16 bytes
    pub const ENCRYPT_KEY: &[u8] = b"yourpasswdhere..";
}

/// ACK and retry defaults
pub mod ack {
    pub const USE_ACK: bool = true;
    pub const RETRIES: u8 = 3;
    pub const WAIT_MS: u32 = 20;
    /// Retry back-to-back instead of in spaced intervals.
    /// Keep false on battery and on a shared band.
    pub const BURST_MODE: bool = false;
    /// Upper bound accepted for `RETRIES`
    pub const MAX_RETRIES_LIMIT: u8 = 15;
}

/// Link layer timing
pub mod timing {
    /// Spacing between attempts when not in burst mode
    pub const RETRY_INTERVAL_MS: u32 = 60;
    /// Transceiver RX/TX turnaround, the only spacing in burst mode
    pub const TURNAROUND_MS: u32 = 1;
    /// Receive window opened after a report when commands are accepted
    pub const COMMAND_LISTEN_WINDOW_MS: u32 = 200;
}

/// Sleep scheduling
pub mod sleep {
    /// Length of one deep-sleep quantum (watchdog timer limit)
    pub const QUANTUM_SECS: u32 = 8;
    /// Transmit every N quanta (112 * 8 s ~ 15 min)
    pub const INTERVALS_PER_WAKE: u16 = 112;
    /// Listen for commands after each report
    pub const ACCEPT_COMMANDS: bool = true;
    /// Force the switch pin low while transmitting to stay within the
    /// supply's current limit
    pub const TURN_OFF_WHILE_SENDING: bool = true;
}

/// Hardware watchdog of the sensor node
pub mod watchdog {
    /// Reset the node when a wake does not complete in time. Off by default:
    /// some boards boot-loop when their bootloader leaves the watchdog armed.
    pub const ENABLED: bool = false;
    /// Must cover one deep-sleep quantum plus the longest transmit cycle
    pub const TIMEOUT_MS: u32 = 16_000;
}

/// Trigger node behaviour
pub mod trigger {
    use crate::commands::Command;

    /// Command sent to the target on every trigger
    pub const COMMAND: Command = Command::TimedOn;
}

/// Protocol constants
pub mod protocol {
    /// Maximum application payload in one frame
    pub const MAX_PAYLOAD: usize = 61;

    /// Length of the encryption key in bytes
    pub const KEY_LEN: usize = 16;

    /// Length of the authentication tag appended to encrypted bodies
    pub const TAG_LEN: usize = 4;

    /// Frame header: len + network + dst + src + ctl + seq
    pub const HEADER_LEN: usize = 6;

    /// Trailing CRC-16
    pub const CRC_LEN: usize = 2;

    /// Per-sender frame counter carried by encrypted frames
    pub const COUNTER_LEN: usize = 4;

    /// Largest frame the codec can produce (encrypted, full payload).
    /// The transceiver must accept frames of this length.
    pub const MAX_FRAME_SIZE: usize = HEADER_LEN + COUNTER_LEN + MAX_PAYLOAD + TAG_LEN + CRC_LEN;

    /// Node ids reserved by the addressing scheme
    pub const RESERVED_IDS: [u8; 2] = [0, 255];

    /// Maximum node name length
    pub const MAX_NAME_LEN: usize = 8;
}

/// Configuration errors. Fatal at startup: nothing may touch the radio
/// when one of these is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Encryption key is not exactly 16 bytes
    InvalidKeyLength { len: usize },
    /// Node id is reserved (0 or 255)
    InvalidNodeId(u8),
    /// Name too long or not alphanumeric ASCII
    InvalidName,
    /// `intervals_per_wake` must be at least 1
    InvalidSleepThreshold,
    /// Retry count or ACK wait out of range
    InvalidRetryPolicy,
    /// Trigger node targets itself
    TargetIsSelf,
    /// Watchdog would fire during a healthy sleep or transmit cycle
    InvalidWatchdogTimeout { min_ms: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidKeyLength { len } => {
                write!(f, "encryption key must be 16 bytes, got {}", len)
            }
            ConfigError::InvalidNodeId(id) => write!(f, "node id {} is reserved", id),
            ConfigError::InvalidName => write!(f, "node name must be 1-8 alphanumeric ASCII chars"),
            ConfigError::InvalidSleepThreshold => write!(f, "intervals per wake must be at least 1"),
            ConfigError::InvalidRetryPolicy => write!(f, "retry policy out of range"),
            ConfigError::TargetIsSelf => write!(f, "target id equals own node id"),
            ConfigError::InvalidWatchdogTimeout { min_ms } => {
                write!(f, "watchdog timeout must exceed {} ms", min_ms)
            }
        }
    }
}

/// Radio frequency band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyBand {
    Mhz315,
    Mhz433,
    Mhz868,
    Mhz915,
}

impl FrequencyBand {
    /// Centre frequency in Hz
    pub fn hz(self) -> u32 {
        match self {
            FrequencyBand::Mhz315 => 315_000_000,
            FrequencyBand::Mhz433 => 433_000_000,
            FrequencyBand::Mhz868 => 868_000_000,
            FrequencyBand::Mhz915 => 915_000_000,
        }
    }
}

/// Transmitter power mode. High-power modules may run in either; low-power
/// modules must use `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    High,
    Low,
}

/// 16-byte symmetric network key, wiped on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; protocol::KEY_LEN]);

impl EncryptionKey {
    /// Build a key from raw bytes. Anything but exactly 16 bytes is rejected.
    pub fn new(bytes: &[u8]) -> Result<Self, ConfigError> {
        let key: [u8; protocol::KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidKeyLength { len: bytes.len() })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; protocol::KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Who this node is on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub network_id: u8,
    pub node_id: u8,
    pub name: Option<String<{ protocol::MAX_NAME_LEN }>>,
}

impl NodeIdentity {
    pub fn new(network_id: u8, node_id: u8) -> Result<Self, ConfigError> {
        validate_node_id(node_id)?;
        Ok(Self {
            network_id,
            node_id,
            name: None,
        })
    }

    /// Attach a short name. The name ends up in comma separated reports, so
    /// only alphanumeric ASCII is accepted.
    pub fn with_name(mut self, name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidName);
        }
        let mut s = String::new();
        s.push_str(name).map_err(|_| ConfigError::InvalidName)?;
        self.name = Some(s);
        Ok(self)
    }
}

/// Radio settings, loaded once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    pub band: FrequencyBand,
    pub power: PowerMode,
    pub rc_recal: bool,
    /// `None` disables encryption
    pub encryption: Option<EncryptionKey>,
}

impl RadioConfig {
    /// Build the radio config from the compile-time defaults
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let encryption = if radio_defaults::ENCRYPT {
            Some(EncryptionKey::new(radio_defaults::ENCRYPT_KEY)?)
        } else {
            None
        };
        Ok(Self {
            band: radio_defaults::BAND,
            power: radio_defaults::POWER,
            rc_recal: radio_defaults::RC_RECAL,
            encryption,
        })
    }
}

/// How one logical send is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub use_ack: bool,
    pub max_retries: u8,
    pub ack_wait_ms: u32,
    pub burst_mode: bool,
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > ack::MAX_RETRIES_LIMIT || (self.use_ack && self.ack_wait_ms == 0) {
            return Err(ConfigError::InvalidRetryPolicy);
        }
        Ok(())
    }

    /// Number of physical transmissions this policy allows
    pub fn max_attempts(&self) -> u8 {
        if self.use_ack {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Gap inserted before every retry
    pub fn retry_spacing_ms(&self) -> u32 {
        if self.burst_mode {
            timing::TURNAROUND_MS
        } else {
            timing::RETRY_INTERVAL_MS
        }
    }

    /// Longest a send can spend waiting, time on air excluded
    pub fn worst_case_wait_ms(&self) -> u32 {
        let attempts = self.max_attempts() as u32;
        let ack_wait = if self.use_ack { self.ack_wait_ms } else { 0 };
        attempts * ack_wait + (attempts - 1) * self.retry_spacing_ms()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            use_ack: ack::USE_ACK,
            max_retries: ack::RETRIES,
            ack_wait_ms: ack::WAIT_MS,
            burst_mode: ack::BURST_MODE,
        }
    }
}

/// Sleep/wake and actuator behaviour of a sensor node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepConfig {
    pub intervals_per_wake: u16,
    pub accept_commands: bool,
    pub turn_off_while_sending: bool,
    pub listen_window_ms: u32,
}

impl SleepConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intervals_per_wake == 0 {
            return Err(ConfigError::InvalidSleepThreshold);
        }
        Ok(())
    }
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            intervals_per_wake: sleep::INTERVALS_PER_WAKE,
            accept_commands: sleep::ACCEPT_COMMANDS,
            turn_off_while_sending: sleep::TURN_OFF_WHILE_SENDING,
            listen_window_ms: timing::COMMAND_LISTEN_WINDOW_MS,
        }
    }
}

/// Watchdog arming and timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub timeout_ms: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: watchdog::ENABLED,
            timeout_ms: watchdog::TIMEOUT_MS,
        }
    }
}

/// Full configuration of a sensor/actuator node
#[derive(Debug, Clone)]
pub struct SensorNodeConfig {
    pub identity: NodeIdentity,
    pub gateway_id: u8,
    pub radio: RadioConfig,
    pub retry: RetryPolicy,
    pub sleep: SleepConfig,
    pub watchdog: WatchdogConfig,
}

impl SensorNodeConfig {
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let config = Self {
            identity: NodeIdentity::new(network::NETWORK_ID, network::SENSOR_NODE_ID)?
                .with_name(network::SENSOR_NODE_NAME)?,
            gateway_id: network::GATEWAY_ID,
            radio: RadioConfig::from_defaults()?,
            retry: RetryPolicy::default(),
            sleep: SleepConfig::default(),
            watchdog: WatchdogConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_id(self.identity.node_id)?;
        validate_node_id(self.gateway_id)?;
        if self.gateway_id == self.identity.node_id {
            return Err(ConfigError::TargetIsSelf);
        }
        self.retry.validate()?;
        self.sleep.validate()?;
        if self.watchdog.enabled {
            let min_ms = self.min_watchdog_timeout_ms();
            if self.watchdog.timeout_ms <= min_ms {
                return Err(ConfigError::InvalidWatchdogTimeout { min_ms });
            }
        }
        Ok(())
    }

    /// Longest healthy gap between two watchdog feeds: a deep-sleep quantum
    /// or a full transmit cycle with its listen window, whichever is longer
    pub fn min_watchdog_timeout_ms(&self) -> u32 {
        let listen = if self.sleep.accept_commands {
            self.sleep.listen_window_ms
        } else {
            0
        };
        let cycle = self.retry.worst_case_wait_ms().saturating_add(listen);
        (sleep::QUANTUM_SECS * 1_000).max(cycle)
    }
}

/// Full configuration of a trigger node
#[derive(Debug, Clone)]
pub struct TriggerNodeConfig {
    pub identity: NodeIdentity,
    pub target_id: u8,
    pub command: Command,
    pub radio: RadioConfig,
    pub retry: RetryPolicy,
}

impl TriggerNodeConfig {
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let config = Self {
            identity: NodeIdentity::new(network::NETWORK_ID, network::TRIGGER_NODE_ID)?,
            target_id: network::TARGET_ID,
            command: trigger::COMMAND,
            radio: RadioConfig::from_defaults()?,
            retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_id(self.identity.node_id)?;
        validate_node_id(self.target_id)?;
        if self.target_id == self.identity.node_id {
            return Err(ConfigError::TargetIsSelf);
        }
        self.retry.validate()
    }
}

fn validate_node_id(id: u8) -> Result<(), ConfigError> {
    if protocol::RESERVED_IDS.contains(&id) {
        return Err(ConfigError::InvalidNodeId(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_must_be_16_bytes() {
        assert!(EncryptionKey::new(b"yourpasswdhere..").is_ok());
        assert_eq!(
            EncryptionKey::new(b"short"),
            Err(ConfigError::InvalidKeyLength { len: 5 })
        );
        assert_eq!(
            EncryptionKey::new(b"yourpasswdhere..!"),
            Err(ConfigError::InvalidKeyLength { len: 17 })
        );
    }

    #[test]
    fn test_defaults_are_valid() {
        let sensor = SensorNodeConfig::from_defaults().expect("Sensor defaults should validate");
        assert_eq!(sensor.identity.name.as_deref(), Some("hall"));
        assert!(sensor.radio.encryption.is_some());

        let trigger = TriggerNodeConfig::from_defaults().expect("Trigger defaults should validate");
        assert_eq!(trigger.target_id, network::TARGET_ID);
        assert_eq!(trigger.command, Command::TimedOn);
    }

    #[test]
    fn test_reserved_node_ids() {
        assert_eq!(NodeIdentity::new(1, 0), Err(ConfigError::InvalidNodeId(0)));
        assert_eq!(NodeIdentity::new(1, 255), Err(ConfigError::InvalidNodeId(255)));
    }

    #[test]
    fn test_name_validation() {
        let id = NodeIdentity::new(1, 2).unwrap();
        assert!(id.clone().with_name("garage01").is_ok());
        assert_eq!(id.clone().with_name("toolongname"), Err(ConfigError::InvalidName));
        assert_eq!(id.clone().with_name("a,b"), Err(ConfigError::InvalidName));
        assert_eq!(id.with_name(""), Err(ConfigError::InvalidName));
    }

    #[test]
    fn test_retry_policy_attempts_and_spacing() {
        let mut policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.retry_spacing_ms(), timing::RETRY_INTERVAL_MS);

        policy.burst_mode = true;
        assert_eq!(policy.retry_spacing_ms(), timing::TURNAROUND_MS);

        policy.use_ack = false;
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_invalid_policies_rejected() {
        let policy = RetryPolicy {
            ack_wait_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.validate(), Err(ConfigError::InvalidRetryPolicy));

        let sleep = SleepConfig {
            intervals_per_wake: 0,
            ..SleepConfig::default()
        };
        assert_eq!(sleep.validate(), Err(ConfigError::InvalidSleepThreshold));
    }

    #[test]
    fn test_worst_case_wait() {
        // 4 x 20 ms ACK wait + 3 x 60 ms spacing
        assert_eq!(RetryPolicy::default().worst_case_wait_ms(), 260);

        let no_ack = RetryPolicy {
            use_ack: false,
            ..RetryPolicy::default()
        };
        assert_eq!(no_ack.worst_case_wait_ms(), 0);
    }

    #[test]
    fn test_watchdog_disabled_by_default() {
        let config = SensorNodeConfig::from_defaults().unwrap();
        assert!(!config.watchdog.enabled);
        assert!(config.watchdog.timeout_ms > config.min_watchdog_timeout_ms());
    }

    #[test]
    fn test_watchdog_timeout_must_cover_a_quantum() {
        let mut config = SensorNodeConfig::from_defaults().unwrap();
        config.watchdog = WatchdogConfig {
            enabled: true,
            timeout_ms: 8_000,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidWatchdogTimeout { min_ms: 8_000 })
        );

        // Too short only matters when armed
        config.watchdog.enabled = false;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_watchdog_timeout_must_cover_a_long_cycle() {
        let mut config = SensorNodeConfig::from_defaults().unwrap();
        config.sleep.listen_window_ms = 20_000;
        config.watchdog = WatchdogConfig {
            enabled: true,
            timeout_ms: 16_000,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidWatchdogTimeout { min_ms: 20_260 })
        );
    }

    #[test]
    fn test_trigger_cannot_target_itself() {
        let mut config = TriggerNodeConfig::from_defaults().unwrap();
        config.target_id = config.identity.node_id;
        assert_eq!(config.validate(), Err(ConfigError::TargetIsSelf));
    }
}
