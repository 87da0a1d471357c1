//! # devbridge Gate Library
//!
//! This crate provides the cryptographic gate that guards irreversible
//! device operations in devbridge.
//!
//! ## Overview
//!
//! - **Credentials**: 256-bit operator keys, validated on construction and
//!   wiped on drop
//! - **Gated Payloads**: AES-256-GCM sealed blobs (nonce || ciphertext || tag)
//!   bound to an operation context
//!
//! Nothing in this crate performs device I/O. A payload either opens and
//! yields its plaintext, or it is refused with one of a small set of
//! [`GateError`] kinds.
//!
//! ## Example Usage
//!
//! ```rust
//! use gate::{Credential, GatedPayload};
//!
//! let credential = Credential::from_hex(&"11".repeat(32)).unwrap();
//! let payload = GatedPayload::seal(&credential, b"devbridge:example", b"{\"steps\":[]}").unwrap();
//!
//! let plaintext = payload.open(&credential, b"devbridge:example").unwrap();
//! assert_eq!(plaintext.as_slice(), b"{\"steps\":[]}");
//! ```
//!
//! ## Modules
//!
//! - [`credential`]: Operator secret validation
//! - [`payload`]: Sealing and opening gated payloads
//! - [`error`]: Error types

pub mod credential;
pub mod error;
pub mod payload;

pub use credential::{Credential, CREDENTIAL_LENGTH};
pub use error::{GateError, Result};
pub use payload::{GatedPayload, NONCE_LENGTH, TAG_LENGTH};
