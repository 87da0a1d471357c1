//! Payload sources for gated operations.
//!
//! Each operation ships with a placeholder payload that never authenticates.
//! Operators seal their own plan with `devbridge seal` and point the bridge
//! at it with `--payload` or the `[gate] payload_dir` setting.

use std::path::Path;

use gate::GatedPayload;
use tracing::debug;

use super::OperationKind;
use crate::error::{BridgeError, Result};

const BOOTLOADER_UNLOCK: &[u8] = b"devbridge:bl-unl";
const VENDOR_UNLOCK: &[u8] = b"devbridge:vd-unl";

/// File extension of payload files in a payload directory.
pub const PAYLOAD_EXTENSION: &str = "payload";

pub(super) fn bundled(kind: OperationKind) -> GatedPayload {
    match kind {
        OperationKind::BootloaderUnlock => GatedPayload::bundled(BOOTLOADER_UNLOCK),
        OperationKind::VendorUnlock => GatedPayload::bundled(VENDOR_UNLOCK),
    }
}

/// Loads a base64 payload file.
pub fn load_payload_file(path: &Path) -> Result<GatedPayload> {
    let payload_error = |reason: String| BridgeError::PayloadFile {
        path: path.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| payload_error(e.to_string()))?;
    let payload = GatedPayload::from_base64(&text).map_err(|e| payload_error(e.to_string()))?;
    debug!(path = %path.display(), fingerprint = %payload.fingerprint(), "Loaded payload");
    Ok(payload)
}

/// Resolves the payload for `kind`.
///
/// Uses `<payload_dir>/<operation>.payload` when a directory is configured
/// and the file exists, and the bundled payload otherwise.
pub fn payload_for(kind: OperationKind, payload_dir: Option<&Path>) -> Result<GatedPayload> {
    if let Some(dir) = payload_dir {
        let path = dir.join(format!("{}.{}", kind.name(), PAYLOAD_EXTENSION));
        if path.is_file() {
            return load_payload_file(&path);
        }
        debug!(path = %path.display(), "No payload file, using bundled payload");
    }
    Ok(bundled(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate::{Credential, NONCE_LENGTH, TAG_LENGTH};
    use tempfile::TempDir;

    #[test]
    fn test_bundled_payloads_pass_structure_check() {
        for kind in OperationKind::ALL {
            let payload = bundled(kind);
            assert!(payload.check_structure().is_ok());
            assert!(payload.len() < NONCE_LENGTH + TAG_LENGTH + 1);
        }
    }

    #[test]
    fn test_bundled_payloads_differ() {
        assert_ne!(
            bundled(OperationKind::BootloaderUnlock).fingerprint(),
            bundled(OperationKind::VendorUnlock).fingerprint()
        );
    }

    #[test]
    fn test_load_payload_file() {
        let dir = TempDir::new().unwrap();
        let credential = Credential::from_bytes(&[7u8; 32]).unwrap();
        let payload = GatedPayload::seal(&credential, b"devbridge:test", b"{}").unwrap();
        let path = dir.path().join("p.payload");
        std::fs::write(&path, format!("{}\n", payload.to_base64())).unwrap();

        let loaded = load_payload_file(&path).unwrap();
        assert_eq!(loaded.as_bytes(), payload.as_bytes());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_payload_file(&dir.path().join("absent.payload")).unwrap_err();
        assert!(matches!(err, BridgeError::PayloadFile { .. }));
    }

    #[test]
    fn test_load_invalid_base64() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.payload");
        std::fs::write(&path, "not base64 at all!").unwrap();
        let err = load_payload_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.payload"));
    }

    #[test]
    fn test_payload_for_prefers_directory() {
        let dir = TempDir::new().unwrap();
        let payload = GatedPayload::from_bytes(vec![9u8; 40]);
        std::fs::write(
            dir.path().join("vendor-unlock.payload"),
            payload.to_base64(),
        )
        .unwrap();

        let found = payload_for(OperationKind::VendorUnlock, Some(dir.path())).unwrap();
        assert_eq!(found.as_bytes(), payload.as_bytes());

        let fallback = payload_for(OperationKind::BootloaderUnlock, Some(dir.path())).unwrap();
        assert_eq!(fallback.as_bytes(), BOOTLOADER_UNLOCK);
    }

    #[test]
    fn test_payload_for_without_directory() {
        let payload = payload_for(OperationKind::VendorUnlock, None).unwrap();
        assert_eq!(payload.as_bytes(), VENDOR_UNLOCK);
    }
}
