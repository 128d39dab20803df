//! AES-128-CCM envelope for frame bodies
//!
//! The body is encrypted in place; the frame header is authenticated as
//! associated data so a flipped address or sequence fails the tag check.

use crate::config::protocol::TAG_LEN;
use crate::config::EncryptionKey;
use crate::protocol::frame::FrameError;
use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U13, U4};
use ccm::Ccm;

/// CCM nonce length in bytes
pub const NONCE_LEN: usize = 13;

type Aes128Ccm = Ccm<Aes128, U4, U13>;

/// Symmetric cipher shared by every node on the network
pub struct FrameCipher {
    inner: Aes128Ccm,
}

impl FrameCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            inner: Aes128Ccm::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// Build the nonce from the addressing fields and frame counter.
    ///
    /// Layout: `[network][src][dst][seq][ctl][counter: u32 LE][0; 4]`.
    /// The counter makes it unique per sender for 2^32 frames.
    pub fn nonce(network: u8, src: u8, dst: u8, seq: u8, ctl: u8, counter: u32) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..5].copy_from_slice(&[network, src, dst, seq, ctl]);
        nonce[5..9].copy_from_slice(&counter.to_le_bytes());
        nonce
    }

    /// Encrypt `body` in place and return the authentication tag
    pub fn seal(
        &self,
        nonce: &[u8; NONCE_LEN],
        header: &[u8],
        body: &mut [u8],
    ) -> Result<[u8; TAG_LEN], FrameError> {
        let tag = self
            .inner
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), header, body)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Verify `tag` and decrypt `body` in place
    pub fn open(
        &self,
        nonce: &[u8; NONCE_LEN],
        header: &[u8],
        body: &mut [u8],
        tag: &[u8],
    ) -> Result<(), FrameError> {
        if tag.len() != TAG_LEN {
            return Err(FrameError::MalformedFrame);
        }
        self.inner
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                header,
                body,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| FrameError::DecryptionFailure)
    }
}
