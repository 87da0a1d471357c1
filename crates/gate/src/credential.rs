//! Operator-supplied secrets.
//!
//! A [`Credential`] is a 256-bit symmetric key. It is built from operator
//! input, lives only as long as the operation that needs it, and is wiped
//! from memory when dropped.

use zeroize::Zeroizing;

use crate::error::{GateError, Result};

/// Length of a credential in bytes (AES-256 key).
pub const CREDENTIAL_LENGTH: usize = 32;

/// A validated 32-byte secret key.
///
/// Construction is the only validation point: a `Credential` value always
/// holds exactly [`CREDENTIAL_LENGTH`] bytes.
#[derive(Clone)]
pub struct Credential {
    key: Zeroizing<[u8; CREDENTIAL_LENGTH]>,
}

impl Credential {
    /// Creates a credential from raw bytes.
    ///
    /// Any length other than 32 bytes is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CREDENTIAL_LENGTH {
            return Err(GateError::InvalidCredential(format!(
                "expected {} bytes, got {}",
                CREDENTIAL_LENGTH,
                bytes.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; CREDENTIAL_LENGTH]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Parses a hex-encoded credential (64 hex characters).
    ///
    /// Surrounding whitespace is ignored. The decoded buffer is wiped
    /// whether or not validation succeeds.
    pub fn from_hex(input: &str) -> Result<Self> {
        let decoded = hex::decode(input.trim())
            .map(Zeroizing::new)
            .map_err(|_| GateError::InvalidCredential("key is not valid hex".to_string()))?;
        Self::from_bytes(&decoded)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_from_hex_valid() {
        let cred = Credential::from_hex(KEY_HEX).unwrap();
        assert_eq!(cred.as_bytes()[0], 0x00);
        assert_eq!(cred.as_bytes()[31], 0x1f);
    }

    #[test]
    fn test_from_hex_trims_whitespace() {
        let cred = Credential::from_hex(&format!("  {}\n", KEY_HEX)).unwrap();
        assert_eq!(cred.as_bytes()[1], 0x01);
    }

    #[test]
    fn test_from_hex_uppercase() {
        assert!(Credential::from_hex(&KEY_HEX.to_uppercase()).is_ok());
    }

    #[test]
    fn test_from_hex_short_key_rejected() {
        let err = Credential::from_hex("00112233").unwrap_err();
        assert_eq!(
            err,
            GateError::InvalidCredential("expected 32 bytes, got 4".to_string())
        );
    }

    #[test]
    fn test_from_hex_long_key_rejected() {
        let long = format!("{}00", KEY_HEX);
        assert!(matches!(
            Credential::from_hex(&long),
            Err(GateError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_from_hex_not_hex_rejected() {
        let bad = "zz".repeat(32);
        let err = Credential::from_hex(&bad).unwrap_err();
        assert_eq!(
            err,
            GateError::InvalidCredential("key is not valid hex".to_string())
        );
    }

    #[test]
    fn test_from_hex_empty_rejected() {
        assert!(matches!(
            Credential::from_hex(""),
            Err(GateError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_from_bytes_lengths() {
        for len in [0usize, 1, 16, 31, 33, 64] {
            let bytes = vec![0xaa; len];
            assert!(
                Credential::from_bytes(&bytes).is_err(),
                "length {} should be rejected",
                len
            );
        }
        assert!(Credential::from_bytes(&[0xaa; 32]).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let cred = Credential::from_bytes(&[0x41; 32]).unwrap();
        let debug = format!("{:?}", cred);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("41"));
        assert!(!debug.contains("65"));
    }
}
