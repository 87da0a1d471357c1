//! Authenticated payloads.
//!
//! A [`GatedPayload`] is a nonce followed by AES-256-GCM ciphertext and tag:
//!
//! ```text
//! ┌────────────┬──────────────────────────┬──────────┐
//! │ nonce (12) │ ciphertext (n)           │ tag (16) │
//! └────────────┴──────────────────────────┴──────────┘
//! ```
//!
//! Opening binds the payload to a context string (associated data), so a
//! payload sealed for one operation does not authenticate for another.

use std::borrow::Cow;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::credential::Credential;
use crate::error::{GateError, Result};

/// Length of the leading nonce in bytes.
pub const NONCE_LENGTH: usize = 12;

/// Length of the trailing authentication tag in bytes.
pub const TAG_LENGTH: usize = 16;

/// Number of digest bytes shown in a payload fingerprint.
const FINGERPRINT_LENGTH: usize = 8;

/// A sealed payload: nonce || ciphertext || tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedPayload {
    bytes: Cow<'static, [u8]>,
}

impl GatedPayload {
    /// Wraps a payload compiled into the binary.
    pub const fn bundled(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Cow::Borrowed(bytes),
        }
    }

    /// Wraps payload bytes loaded at runtime.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Cow::Owned(bytes),
        }
    }

    /// Decodes a payload from its base64 text form.
    pub fn from_base64(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Encodes the payload as base64 text.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Returns the raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Short hex digest identifying this payload, formatted as
    /// colon-separated groups (`a1b2:c3d4:e5f6:7890`).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest[..FINGERPRINT_LENGTH]
            .chunks(2)
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Seals `plaintext` under `credential`, bound to `context`.
    ///
    /// A fresh random nonce is drawn from the OS for every call.
    pub fn seal(credential: &Credential, context: &[u8], plaintext: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(credential.as_bytes())
            .map_err(|e| GateError::Encryption(format!("failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: context,
                },
            )
            .map_err(|e| GateError::Encryption(e.to_string()))?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(Self::from_bytes(bytes))
    }

    /// Checks the structural invariant: the payload must hold a nonce.
    pub fn check_structure(&self) -> Result<()> {
        if self.bytes.len() < NONCE_LENGTH {
            return Err(GateError::PayloadCorrupt {
                len: self.bytes.len(),
                min: NONCE_LENGTH,
            });
        }
        Ok(())
    }

    /// Verifies and decrypts the payload.
    ///
    /// Returns [`GateError::PayloadCorrupt`] without touching the cipher if
    /// the payload is shorter than its nonce. Every other failure (wrong
    /// key, wrong context, flipped bit, missing tag) is reported as the
    /// single [`GateError::AuthenticationFailed`]. The plaintext is wiped
    /// when the returned buffer is dropped.
    pub fn open(&self, credential: &Credential, context: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.check_structure()?;

        let cipher = Aes256Gcm::new_from_slice(credential.as_bytes())
            .map_err(|_| GateError::AuthenticationFailed)?;

        let (nonce_bytes, ciphertext) = self.bytes.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: context,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| GateError::AuthenticationFailed)
    }
}
