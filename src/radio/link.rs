//! Reliable-delivery link layer
//!
//! `send` runs the ACK/retry state machine for one logical transmission:
//!
//! ```text
//! IDLE -> [recalibrate] -> TRANSMITTING -> AWAITING_ACK -> ACKED
//!                              ^                |
//!                              +---- RETRY <----+ (ack_wait_ms elapsed)
//!                                                 -> EXHAUSTED
//! ```
//!
//! `listen` opens a bounded receive window and answers ACK requests for
//! frames it accepts.

use crate::config::{FrequencyBand, NodeIdentity, PowerMode, RadioConfig, RetryPolicy};
use crate::protocol::{FrameCodec, FrameError, Packet};
use crate::radio::traits::{RadioError, Transceiver};
use crate::time::Clock;
use core::fmt;
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};

/// Errors surfaced by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No matching ACK within `ack_wait_ms` (one attempt)
    AckTimeout,
    /// Every attempt went unacknowledged
    RetriesExhausted { attempts: u8 },
    /// Outgoing frame could not be built
    Frame(FrameError),
    /// Transceiver failure outside the retry loop
    Radio(RadioError),
}

impl From<FrameError> for LinkError {
    fn from(error: FrameError) -> Self {
        LinkError::Frame(error)
    }
}

impl From<RadioError> for LinkError {
    fn from(error: RadioError) -> Self {
        LinkError::Radio(error)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::AckTimeout => write!(f, "ACK timeout"),
            LinkError::RetriesExhausted { attempts } => {
                write!(f, "undelivered after {} attempts", attempts)
            }
            LinkError::Frame(e) => write!(f, "frame error: {}", e),
            LinkError::Radio(e) => write!(f, "radio error: {}", e),
        }
    }
}

/// Successful outcome of [`Link::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// Physical transmissions used, including the first
    pub attempts: u8,
    /// True if the peer confirmed reception
    pub acked: bool,
}

/// Link layer bound to one transceiver and one node identity
pub struct Link<R, C>
where
    R: Transceiver,
    C: Clock,
{
    radio: R,
    clock: C,
    codec: FrameCodec,
    network_id: u8,
    node_id: u8,
    band: FrequencyBand,
    power: PowerMode,
    rc_recal: bool,
    sequence: u8,
    last_rssi: Option<i16>,
}

impl<R, C> Link<R, C>
where
    R: Transceiver,
    C: Clock,
{
    pub fn new(radio: R, clock: C, identity: &NodeIdentity, config: &RadioConfig) -> Self {
        Self {
            radio,
            clock,
            codec: FrameCodec::new(config.encryption.as_ref()),
            network_id: identity.network_id,
            node_id: identity.node_id,
            band: config.band,
            power: config.power,
            rc_recal: config.rc_recal,
            sequence: 0,
            last_rssi: None,
        }
    }

    /// Initialise and configure the transceiver
    pub async fn init(&mut self) -> Result<(), LinkError> {
        self.radio.init().await?;
        self.radio.configure(self.band, self.power).await?;
        info!(
            "Link: node {} on network {} ready ({} Hz, {:?} power, encryption {})",
            self.node_id,
            self.network_id,
            self.band.hz(),
            self.power,
            if self.codec.is_encrypted() { "on" } else { "off" }
        );
        Ok(())
    }

    /// Send `payload` to `destination` following `policy`.
    ///
    /// Without ACK the frame is transmitted once. With ACK it is transmitted
    /// up to `max_retries + 1` times until a matching ACK arrives.
    pub async fn send(
        &mut self,
        destination: u8,
        payload: &[u8],
        policy: &RetryPolicy,
    ) -> Result<Delivered, LinkError> {
        let sequence = self.next_sequence();
        let packet = Packet::data(
            self.network_id,
            self.node_id,
            destination,
            sequence,
            policy.use_ack,
            payload,
        )?;
        let frame = self.codec.encode(&packet)?;
        let max_attempts = policy.max_attempts();
        let mut radio_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.clock.delay_ms(policy.retry_spacing_ms()).await;
            }

            if let Err(e) = self.transmit_frame(&frame).await {
                warn!(
                    "Link: TX to node {} failed on attempt {}/{}: {}",
                    destination, attempt, max_attempts, e
                );
                radio_error = Some(e);
                continue;
            }

            if !policy.use_ack {
                debug!("Link: TX to node {} seq {} (no ACK)", destination, sequence);
                return Ok(Delivered {
                    attempts: attempt,
                    acked: false,
                });
            }

            match self.await_ack(&packet, policy.ack_wait_ms).await {
                Ok(()) => {
                    debug!(
                        "Link: node {} ACKed seq {} on attempt {}",
                        destination, sequence, attempt
                    );
                    return Ok(Delivered {
                        attempts: attempt,
                        acked: true,
                    });
                }
                Err(e) => {
                    debug!(
                        "Link: attempt {}/{} to node {}: {}",
                        attempt, max_attempts, destination, e
                    );
                }
            }
        }

        match (policy.use_ack, radio_error) {
            (false, Some(e)) => Err(LinkError::Radio(e)),
            _ => {
                warn!(
                    "Link: seq {} to node {} undelivered after {} attempts",
                    sequence, destination, max_attempts
                );
                Err(LinkError::RetriesExhausted {
                    attempts: max_attempts,
                })
            }
        }
    }

    /// Listen for up to `window_ms` for a data frame addressed to this node.
    ///
    /// Frames for other nodes or networks, stray ACKs and frames that fail to
    /// decode are dropped without extending the window. `Ok(None)` means the
    /// window expired.
    pub async fn listen(&mut self, window_ms: u32) -> Result<Option<Packet>, LinkError> {
        let deadline = self.clock.now_ms() + window_ms as u64;

        loop {
            let now = self.clock.now_ms();
            if now >= deadline {
                return Ok(None);
            }

            let rx = match self.radio.receive((deadline - now) as u32).await {
                Ok(rx) => rx,
                Err(RadioError::Timeout) => return Ok(None),
                Err(RadioError::CrcError) => {
                    debug!("Link: RX CRC error, dropped");
                    continue;
                }
                Err(e) => return Err(LinkError::Radio(e)),
            };

            let packet = match self.codec.decode(&rx.data) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("Link: dropped {} byte frame: {}", rx.data.len(), e);
                    continue;
                }
            };

            if packet.network_id != self.network_id || packet.destination != self.node_id {
                debug!(
                    "Link: frame for node {} on network {} ignored",
                    packet.destination, packet.network_id
                );
                continue;
            }
            if packet.is_ack {
                debug!("Link: stray ACK from node {} ignored", packet.source);
                continue;
            }

            self.last_rssi = Some(rx.rssi);
            if packet.ack_requested {
                self.send_ack(&packet).await;
            }
            debug!(
                "Link: RX {} bytes from node {} (RSSI: {})",
                packet.payload.len(),
                packet.source,
                rx.rssi
            );
            return Ok(Some(packet));
        }
    }

    /// Put the transceiver to sleep until the next wake cycle
    pub async fn sleep(&mut self) -> Result<(), LinkError> {
        self.radio.sleep().await?;
        Ok(())
    }

    /// RSSI of the last frame accepted by this node (ACK or data)
    pub fn last_rssi(&self) -> Option<i16> {
        self.last_rssi
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Counter the next encrypted frame will carry. Persist it before deep
    /// sleep on hardware that loses RAM.
    pub fn frame_counter(&self) -> u32 {
        self.codec.frame_counter()
    }

    /// Continue the encrypted frame counter from a persisted value
    pub fn resume_frame_counter(&mut self, next: u32) {
        self.codec.set_frame_counter(next);
    }

    fn next_sequence(&mut self) -> u8 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// One physical transmission, preceded by recalibration when enabled
    async fn transmit_frame(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        if self.rc_recal {
            if let Err(e) = self.radio.recalibrate().await {
                warn!("Link: RC recalibration failed: {}", e);
            }
        }
        self.radio.transmit(frame).await
    }

    async fn await_ack(&mut self, original: &Packet, wait_ms: u32) -> Result<(), LinkError> {
        let deadline = self.clock.now_ms() + wait_ms as u64;

        loop {
            let now = self.clock.now_ms();
            if now >= deadline {
                return Err(LinkError::AckTimeout);
            }

            let rx = match self.radio.receive((deadline - now) as u32).await {
                Ok(rx) => rx,
                Err(RadioError::Timeout) => return Err(LinkError::AckTimeout),
                Err(RadioError::CrcError) => continue,
                Err(e) => return Err(LinkError::Radio(e)),
            };

            match self.codec.decode(&rx.data) {
                Ok(reply) if reply.acknowledges(original) => {
                    self.last_rssi = Some(rx.rssi);
                    return Ok(());
                }
                Ok(other) => debug!(
                    "Link: ignoring frame from node {} seq {} while awaiting ACK",
                    other.source, other.sequence
                ),
                Err(e) => debug!("Link: dropped frame while awaiting ACK: {}", e),
            }
        }
    }

    async fn send_ack(&mut self, packet: &Packet) {
        let ack = packet.ack();
        let result = match self.codec.encode(&ack) {
            Ok(frame) => self.radio.transmit(&frame).await.map_err(LinkError::from),
            Err(e) => Err(LinkError::from(e)),
        };
        if let Err(e) = result {
            warn!("Link: ACK to node {} failed: {}", packet.source, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionKey;
    use crate::radio::traits::mock::{MockTransceiver, TX_AIRTIME_MS};
    use crate::time::mock::SimClock;

    const NETWORK: u8 = 1;
    const GATEWAY: u8 = 1;
    const NODE: u8 = 2;

    fn radio_config(rc_recal: bool) -> RadioConfig {
        RadioConfig {
            band: FrequencyBand::Mhz433,
            power: PowerMode::High,
            rc_recal,
            encryption: Some(EncryptionKey::new(b"yourpasswdhere..").unwrap()),
        }
    }

    fn make_link(rc_recal: bool) -> (Link<MockTransceiver, SimClock>, SimClock) {
        let clock = SimClock::new();
        let radio = MockTransceiver::new(clock.clone());
        let identity = NodeIdentity::new(NETWORK, NODE).unwrap();
        let link = Link::new(radio, clock.clone(), &identity, &radio_config(rc_recal));
        (link, clock)
    }

    /// Codec of the peer on the other side of the link
    fn peer_codec() -> FrameCodec {
        FrameCodec::new(radio_config(false).encryption.as_ref())
    }

    /// ACK the gateway would send for our `sequence`-th frame
    fn gateway_ack(sequence: u8) -> crate::protocol::FrameBuf {
        let original = Packet::data(NETWORK, NODE, GATEWAY, sequence, true, b"").unwrap();
        peer_codec().encode(&original.ack()).unwrap()
    }

    fn policy(max_retries: u8, burst_mode: bool) -> RetryPolicy {
        RetryPolicy {
            use_ack: true,
            max_retries,
            ack_wait_ms: 20,
            burst_mode,
        }
    }

    #[test]
    fn test_init_configures_radio() {
        let (mut link, _) = make_link(false);

        futures::executor::block_on(async {
            link.init().await.unwrap();
        });

        assert!(link.radio().is_initialised());
        assert_eq!(
            link.radio().get_config(),
            Some((FrequencyBand::Mhz433, PowerMode::High))
        );
    }

    #[test]
    fn test_send_without_ack_transmits_once() {
        let (mut link, _) = make_link(false);
        let no_ack = RetryPolicy {
            use_ack: false,
            ..policy(3, false)
        };

        let result = futures::executor::block_on(link.send(GATEWAY, b"t:215", &no_ack));

        assert_eq!(
            result,
            Ok(Delivered {
                attempts: 1,
                acked: false
            })
        );
        assert_eq!(link.radio().tx_count(), 1);

        let sent = peer_codec().decode(&link.radio().get_tx_history()[0]).unwrap();
        assert!(!sent.ack_requested);
        assert_eq!(sent.payload.as_slice(), b"t:215");
    }

    #[test]
    fn test_send_acked_first_attempt() {
        let (mut link, _) = make_link(false);
        link.radio().queue_rx_after_tx(1, &gateway_ack(1), -48);

        let result = futures::executor::block_on(link.send(GATEWAY, b"t:215", &policy(3, false)));

        assert_eq!(
            result,
            Ok(Delivered {
                attempts: 1,
                acked: true
            })
        );
        assert_eq!(link.radio().tx_count(), 1);
        assert_eq!(link.last_rssi(), Some(-48));
    }

    #[test]
    fn test_send_acked_on_third_attempt() {
        let (mut link, _) = make_link(false);
        link.radio().queue_rx_after_tx(3, &gateway_ack(1), -70);

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, false)));

        assert_eq!(result.unwrap().attempts, 3);
        assert_eq!(link.radio().tx_count(), 3);

        // Retransmissions are the identical frame
        let history = link.radio().get_tx_history();
        assert_eq!(history[0], history[2]);
    }

    #[test]
    fn test_no_ack_exhausts_after_four_attempts() {
        let (mut link, _) = make_link(false);

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON_16S", &policy(3, false)));

        assert_eq!(result, Err(LinkError::RetriesExhausted { attempts: 4 }));
        assert_eq!(link.radio().tx_count(), 4);
    }

    #[test]
    fn test_burst_vs_interval_pacing() {
        let elapsed = |burst: bool| {
            let (mut link, clock) = make_link(false);
            let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, burst)));
            assert!(result.is_err());
            (clock.now_ms(), link.radio().get_tx_times())
        };

        let (burst_ms, burst_times) = elapsed(true);
        let (interval_ms, interval_times) = elapsed(false);

        // 4 x (airtime + ACK wait) plus 3 gaps
        let per_attempt = TX_AIRTIME_MS + 20;
        assert_eq!(burst_ms, 4 * per_attempt + 3);
        assert_eq!(interval_ms, 4 * per_attempt + 3 * 60);
        assert_eq!(interval_ms - burst_ms, 3 * 59);

        assert_eq!(burst_times[1] - burst_times[0], per_attempt + 1);
        assert_eq!(interval_times[1] - interval_times[0], per_attempt + 60);
    }

    #[test]
    fn test_recalibrates_before_each_attempt() {
        let (mut link, _) = make_link(true);

        let _ = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, true)));
        assert_eq!(link.radio().recalibrations(), 4);

        let (mut link, _) = make_link(false);
        let _ = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, true)));
        assert_eq!(link.radio().recalibrations(), 0);
    }

    #[test]
    fn test_ack_for_other_sequence_ignored() {
        let (mut link, _) = make_link(false);
        link.radio().queue_rx_after_tx(1, &gateway_ack(7), -50);

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(1, true)));

        assert_eq!(result, Err(LinkError::RetriesExhausted { attempts: 2 }));
    }

    #[test]
    fn test_foreign_frames_do_not_extend_ack_wait() {
        let (mut quiet, quiet_clock) = make_link(false);
        let _ = futures::executor::block_on(quiet.send(GATEWAY, b"ON", &policy(0, true)));

        let (mut busy, busy_clock) = make_link(false);
        let chatter = Packet::data(NETWORK, 5, 6, 1, false, b"nm:attic").unwrap();
        let chatter = peer_codec().encode(&chatter).unwrap();
        busy.radio().queue_rx_after_tx(1, &chatter, -90);
        busy.radio().queue_rx_after_tx(1, &[0xFF, 0x00, 0x13], -90);
        let _ = futures::executor::block_on(busy.send(GATEWAY, b"ON", &policy(0, true)));

        assert_eq!(busy_clock.now_ms(), quiet_clock.now_ms());
    }

    #[test]
    fn test_transmit_error_consumes_attempt() {
        let (mut link, _) = make_link(false);
        link.radio().set_next_tx_error(RadioError::TransmitFailed);
        // First successful transmission is the second attempt
        link.radio().queue_rx_after_tx(1, &gateway_ack(1), -50);

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, true)));

        assert_eq!(result.unwrap().attempts, 2);
    }

    #[test]
    fn test_transmit_error_without_ack() {
        let (mut link, _) = make_link(false);
        link.radio().set_next_tx_error(RadioError::BusError);
        let no_ack = RetryPolicy {
            use_ack: false,
            ..policy(3, true)
        };

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &no_ack));

        assert_eq!(result, Err(LinkError::Radio(RadioError::BusError)));
    }

    #[test]
    fn test_payload_too_large() {
        let (mut link, _) = make_link(false);
        let big = [b'x'; 62];

        let result = futures::executor::block_on(link.send(GATEWAY, &big, &policy(3, true)));

        assert_eq!(result, Err(LinkError::Frame(FrameError::PayloadTooLarge)));
        assert_eq!(link.radio().tx_count(), 0);
    }

    #[test]
    fn test_sequence_advances_per_send() {
        let (mut link, _) = make_link(false);
        let no_ack = RetryPolicy {
            use_ack: false,
            ..policy(0, true)
        };

        futures::executor::block_on(async {
            link.send(GATEWAY, b"a", &no_ack).await.unwrap();
            link.send(GATEWAY, b"b", &no_ack).await.unwrap();
        });

        let codec = peer_codec();
        let history = link.radio().get_tx_history();
        assert_eq!(codec.decode(&history[0]).unwrap().sequence, 1);
        assert_eq!(codec.decode(&history[1]).unwrap().sequence, 2);
    }

    #[test]
    fn test_frame_counter_outlives_sequence_wrap() {
        let (mut link, _) = make_link(false);
        let no_ack = RetryPolicy {
            use_ack: false,
            ..policy(0, true)
        };

        futures::executor::block_on(async {
            for _ in 0..257 {
                link.send(GATEWAY, b"t:215", &no_ack).await.unwrap();
            }
        });

        let history = link.radio().get_tx_history();
        assert_eq!(history.len(), 257);
        assert_eq!(link.frame_counter(), 257);

        // Sequence 1 comes round again at send 257; the nonce must not
        let codec = peer_codec();
        let first = codec.decode(&history[0]).unwrap();
        let wrapped = codec.decode(&history[256]).unwrap();
        assert_eq!(first.sequence, wrapped.sequence);
        assert_eq!(first.payload, wrapped.payload);
        assert_ne!(history[0], history[256]);
        assert_eq!(&history[256][6..10], &256u32.to_le_bytes());
    }

    #[test]
    fn test_resumed_frame_counter() {
        let (mut link, _) = make_link(false);
        link.resume_frame_counter(1000);
        let no_ack = RetryPolicy {
            use_ack: false,
            ..policy(0, true)
        };

        futures::executor::block_on(link.send(GATEWAY, b"a", &no_ack)).unwrap();

        assert_eq!(&link.radio().get_tx_history()[0][6..10], &1000u32.to_le_bytes());
        assert_eq!(link.frame_counter(), 1001);
    }

    #[test]
    fn test_retransmissions_reuse_counter() {
        let (mut link, _) = make_link(false);

        let result = futures::executor::block_on(link.send(GATEWAY, b"ON", &policy(3, true)));

        assert_eq!(result, Err(LinkError::RetriesExhausted { attempts: 4 }));
        assert_eq!(link.frame_counter(), 1);
    }

    #[test]
    fn test_listen_timeout() {
        let (mut link, clock) = make_link(false);

        let result = futures::executor::block_on(link.listen(200));

        assert_eq!(result, Ok(None));
        assert_eq!(clock.now_ms(), 200);
    }

    #[test]
    fn test_listen_accepts_command_and_acks() {
        let (mut link, _) = make_link(false);
        let command = Packet::data(NETWORK, GATEWAY, NODE, 9, true, b"ON").unwrap();
        link.radio().queue_rx(&peer_codec().encode(&command).unwrap(), -55);

        let packet = futures::executor::block_on(link.listen(200)).unwrap().unwrap();

        assert_eq!(packet.payload.as_slice(), b"ON");
        assert_eq!(packet.source, GATEWAY);
        assert_eq!(link.last_rssi(), Some(-55));

        let history = link.radio().get_tx_history();
        assert_eq!(history.len(), 1);
        let ack = peer_codec().decode(&history[0]).unwrap();
        assert!(ack.acknowledges(&command));
    }

    #[test]
    fn test_listen_ignores_other_nodes() {
        let (mut link, clock) = make_link(false);
        let for_other = Packet::data(NETWORK, GATEWAY, 3, 9, true, b"OFF").unwrap();
        let other_network = Packet::data(2, GATEWAY, NODE, 9, true, b"OFF").unwrap();
        link.radio().queue_rx(&peer_codec().encode(&for_other).unwrap(), -55);
        link.radio().queue_rx(&peer_codec().encode(&other_network).unwrap(), -55);

        let result = futures::executor::block_on(link.listen(200));

        assert_eq!(result, Ok(None));
        assert_eq!(link.radio().tx_count(), 0);
        assert_eq!(clock.now_ms(), 200);
        assert_eq!(link.last_rssi(), None);
    }

    #[test]
    fn test_listen_drops_corrupt_frame_and_continues() {
        let (mut link, _) = make_link(false);
        let command = Packet::data(NETWORK, GATEWAY, NODE, 3, false, b"OFF").unwrap();
        let frame = peer_codec().encode(&command).unwrap();
        let mut corrupted = frame.clone();
        corrupted[7] ^= 0x10;
        link.radio().queue_rx(&corrupted, -80);
        link.radio().queue_rx(&frame, -60);

        let packet = futures::executor::block_on(link.listen(200)).unwrap().unwrap();

        assert_eq!(packet.payload.as_slice(), b"OFF");
        // No ACK requested, none sent
        assert_eq!(link.radio().tx_count(), 0);
    }

    #[test]
    fn test_listen_surfaces_radio_failure() {
        let (mut link, _) = make_link(false);
        link.radio().set_next_rx_error(RadioError::BusError);

        let result = futures::executor::block_on(link.listen(200));

        assert_eq!(result, Err(LinkError::Radio(RadioError::BusError)));
    }

    #[test]
    fn test_sleep() {
        let (mut link, _) = make_link(false);

        futures::executor::block_on(link.sleep()).unwrap();

        assert!(link.radio().is_asleep());
    }
}
