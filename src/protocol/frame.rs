//! Radio frame codec
//!
//! # Frame Format
//!
//! ```text
//! [len: u8][network: u8][dst: u8][src: u8][ctl: u8][seq: u8][body...][crc16: u16 LE]
//! ```
//!
//! - `len`: number of bytes following the length byte
//! - `ctl`: bit 7 ACK requested, bit 6 frame is an ACK, bit 5 body encrypted.
//!   Other bits must be zero.
//! - `seq`: sender's sequence number; an ACK echoes the sequence it confirms
//! - `body`: payload, or `counter: u32 LE || ciphertext || tag` when
//!   encrypted. The header and counter are authenticated, the counter
//!   feeds the nonce.
//! - `crc16`: CRC-16-XMODEM over `network..body`
//!
//! A full encrypted frame is 77 bytes, more than the 66-byte FIFO of the
//! smaller sub-GHz modules; the transceiver driver has to stream longer
//! frames or use a part with a larger buffer.
//!
//! ACK frames carry the ACK bit, an empty payload and never request an ACK
//! themselves.

use crate::config::protocol::{
    COUNTER_LEN, CRC_LEN, HEADER_LEN, MAX_FRAME_SIZE, MAX_PAYLOAD, TAG_LEN,
};
use crate::config::EncryptionKey;
use crate::protocol::cipher::FrameCipher;
use core::fmt;
use crc::{Crc, CRC_16_XMODEM};
use heapless::Vec;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Encoded frame buffer
pub type FrameBuf = Vec<u8, MAX_FRAME_SIZE>;

/// Application payload buffer
pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// Control byte flags
mod ctl {
    pub const ACK_REQUESTED: u8 = 0x80;
    pub const IS_ACK: u8 = 0x40;
    pub const ENCRYPTED: u8 = 0x20;
    pub const KNOWN: u8 = ACK_REQUESTED | IS_ACK | ENCRYPTED;
}

/// Errors raised while encoding or decoding frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Payload exceeds the 61 byte ceiling
    PayloadTooLarge,
    /// Truncated, corrupted or structurally invalid frame
    MalformedFrame,
    /// Authentication tag mismatch or encryption mode mismatch
    DecryptionFailure,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::PayloadTooLarge => write!(f, "payload larger than {} bytes", MAX_PAYLOAD),
            FrameError::MalformedFrame => write!(f, "malformed frame"),
            FrameError::DecryptionFailure => write!(f, "decryption failure"),
        }
    }
}

/// A decoded (or to-be-encoded) radio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub network_id: u8,
    pub source: u8,
    pub destination: u8,
    pub sequence: u8,
    pub ack_requested: bool,
    pub is_ack: bool,
    pub payload: Payload,
}

impl Packet {
    /// Build a data packet
    pub fn data(
        network_id: u8,
        source: u8,
        destination: u8,
        sequence: u8,
        ack_requested: bool,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        Ok(Self {
            network_id,
            source,
            destination,
            sequence,
            ack_requested,
            is_ack: false,
            payload: Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?,
        })
    }

    /// Build the ACK answering this packet
    pub fn ack(&self) -> Self {
        Self {
            network_id: self.network_id,
            source: self.destination,
            destination: self.source,
            sequence: self.sequence,
            ack_requested: false,
            is_ack: true,
            payload: Vec::new(),
        }
    }

    /// True if this packet is the ACK for `original`
    pub fn acknowledges(&self, original: &Packet) -> bool {
        self.is_ack
            && self.network_id == original.network_id
            && self.source == original.destination
            && self.destination == original.source
            && self.sequence == original.sequence
    }

    fn ctl(&self, encrypted: bool) -> u8 {
        let mut byte = 0;
        if self.ack_requested {
            byte |= ctl::ACK_REQUESTED;
        }
        if self.is_ack {
            byte |= ctl::IS_ACK;
        }
        if encrypted {
            byte |= ctl::ENCRYPTED;
        }
        byte
    }
}

/// Encodes and decodes frames, encrypting bodies when a key is configured
pub struct FrameCodec {
    cipher: Option<FrameCipher>,
    /// Counter for the next encrypted frame
    frame_counter: u32,
}

impl FrameCodec {
    /// Create a codec. `None` sends and accepts plaintext frames only.
    pub fn new(key: Option<&EncryptionKey>) -> Self {
        Self {
            cipher: key.map(FrameCipher::new),
            frame_counter: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Counter the next encrypted frame will carry
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Continue from a counter saved before a reboot
    pub fn set_frame_counter(&mut self, next: u32) {
        self.frame_counter = next;
    }

    /// Encode a packet into a complete frame.
    ///
    /// Every encrypted frame consumes one counter value, so a retransmission
    /// must reuse the returned bytes rather than encode again.
    pub fn encode(&mut self, packet: &Packet) -> Result<FrameBuf, FrameError> {
        if packet.payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge);
        }

        let ctl = packet.ctl(self.cipher.is_some());
        let overhead = if self.cipher.is_some() { COUNTER_LEN + TAG_LEN } else { 0 };
        let len = HEADER_LEN - 1 + packet.payload.len() + overhead + CRC_LEN;

        let mut frame = FrameBuf::new();
        frame
            .extend_from_slice(&[
                len as u8,
                packet.network_id,
                packet.destination,
                packet.source,
                ctl,
                packet.sequence,
            ])
            .map_err(|_| FrameError::PayloadTooLarge)?;

        let counter = self.frame_counter;
        if self.cipher.is_some() {
            frame
                .extend_from_slice(&counter.to_le_bytes())
                .map_err(|_| FrameError::PayloadTooLarge)?;
        }
        frame
            .extend_from_slice(&packet.payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        if let Some(cipher) = &self.cipher {
            let nonce = FrameCipher::nonce(
                packet.network_id,
                packet.source,
                packet.destination,
                packet.sequence,
                ctl,
                counter,
            );
            let (aad, body) = frame.split_at_mut(HEADER_LEN + COUNTER_LEN);
            let tag = cipher.seal(&nonce, aad, body)?;
            self.frame_counter = counter.wrapping_add(1);
            frame
                .extend_from_slice(&tag)
                .map_err(|_| FrameError::PayloadTooLarge)?;
        }

        let crc = CRC.checksum(&frame[1..]);
        frame
            .extend_from_slice(&crc.to_le_bytes())
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(frame)
    }

    /// Decode a received frame. Never panics, whatever the input.
    pub fn decode(&self, frame: &[u8]) -> Result<Packet, FrameError> {
        if frame.len() < HEADER_LEN + CRC_LEN || frame.len() > MAX_FRAME_SIZE {
            return Err(FrameError::MalformedFrame);
        }
        if frame[0] as usize != frame.len() - 1 {
            return Err(FrameError::MalformedFrame);
        }

        let (content, crc_bytes) = frame.split_at(frame.len() - CRC_LEN);
        let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if CRC.checksum(&content[1..]) != received_crc {
            return Err(FrameError::MalformedFrame);
        }

        let header = &content[..HEADER_LEN];
        let network_id = header[1];
        let destination = header[2];
        let source = header[3];
        let ctl_byte = header[4];
        let sequence = header[5];

        if ctl_byte & !ctl::KNOWN != 0 {
            return Err(FrameError::MalformedFrame);
        }

        let encrypted = ctl_byte & ctl::ENCRYPTED != 0;
        let payload = match (&self.cipher, encrypted) {
            (Some(cipher), true) => {
                if content.len() < HEADER_LEN + COUNTER_LEN + TAG_LEN {
                    return Err(FrameError::MalformedFrame);
                }
                let (aad, sealed) = content.split_at(HEADER_LEN + COUNTER_LEN);
                let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
                let counter = u32::from_le_bytes([aad[6], aad[7], aad[8], aad[9]]);
                let mut payload: Payload =
                    Vec::from_slice(ciphertext).map_err(|_| FrameError::MalformedFrame)?;
                let nonce =
                    FrameCipher::nonce(network_id, source, destination, sequence, ctl_byte, counter);
                cipher.open(&nonce, aad, &mut payload, tag)?;
                payload
            }
            (None, false) => {
                Vec::from_slice(&content[HEADER_LEN..]).map_err(|_| FrameError::MalformedFrame)?
            }
            // Key mismatch between peers: one side encrypts, the other doesn't
            _ => return Err(FrameError::DecryptionFailure),
        };

        let packet = Packet {
            network_id,
            source,
            destination,
            sequence,
            ack_requested: ctl_byte & ctl::ACK_REQUESTED != 0,
            is_ack: ctl_byte & ctl::IS_ACK != 0,
            payload,
        };

        if packet.is_ack && (packet.ack_requested || !packet.payload.is_empty()) {
            return Err(FrameError::MalformedFrame);
        }

        Ok(packet)
    }
}
