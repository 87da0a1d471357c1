//! Error types for the gate crate.

use thiserror::Error;

/// Gate error type covering every way a credential or payload can be refused.
///
/// The variants are coarse: a caller can tell a missing or
/// malformed secret apart from a truncated payload and from a failed
/// integrity check, and nothing finer than that.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    // Credential errors
    /// No secret was supplied for an operation that requires one.
    #[error("missing credential: this operation requires a key")]
    MissingCredential,

    /// The supplied secret is not a 256-bit key.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    // Payload errors
    /// The payload is too short to even hold its nonce.
    #[error("payload corrupt: {len} bytes is shorter than the {min}-byte nonce")]
    PayloadCorrupt {
        /// Actual payload length.
        len: usize,
        /// Minimum length (the nonce length).
        min: usize,
    },

    /// The integrity tag did not verify under the supplied key.
    #[error("authentication failed: payload could not be verified with this key")]
    AuthenticationFailed,

    /// Sealing a payload failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// A payload file could not be decoded from its text form.
    #[error("payload encoding invalid: {0}")]
    PayloadEncoding(String),
}

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

impl From<base64::DecodeError> for GateError {
    fn from(err: base64::DecodeError) -> Self {
        GateError::PayloadEncoding(err.to_string())
    }
}
