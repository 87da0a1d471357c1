//! Turning channel listings into device records.

use tracing::{debug, warn};

use super::{Device, DeviceState};
use crate::channel::{Channel, ChannelKind, Transport};
use crate::error::{BridgeError, Result};

/// Value used when a bootloader variable cannot be read.
const UNKNOWN: &str = "Unknown";

/// Parses a shell-channel `devices -l` listing.
///
/// The header, daemon notices (`* daemon started ...`) and blank lines are
/// skipped. A data line needs at least a serial and a state token; anything
/// shorter is skipped rather than treated as an error. Trailing `model:`
/// and `product:` tokens fill in those fields; other tokens are ignored.
pub fn parse_device_listing(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<Device> {
    let mut tokens = line.split_whitespace();
    let (Some(serial), Some(state)) = (tokens.next(), tokens.next()) else {
        debug!(line, "Skipping malformed device line");
        return None;
    };

    let mut model = None;
    let mut product = None;
    for token in tokens {
        if let Some(value) = token.strip_prefix("model:") {
            model = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("product:") {
            product = Some(value.to_string());
        }
    }

    let state = DeviceState::from_shell_token(state);
    Some(Device {
        serial: serial.to_string(),
        authorized: state == DeviceState::Online,
        state,
        model,
        product,
        channel: ChannelKind::Shell,
    })
}

/// Lists the devices attached on `kind`.
///
/// On the bootloader channel at most one record is produced: the unit the
/// tool currently addresses, synthesized from three `getvar` queries.
pub fn enumerate<T: Transport>(channel: &Channel<T>, kind: ChannelKind) -> Result<Vec<Device>> {
    match kind {
        ChannelKind::Shell => {
            let output = channel.list_devices_raw(kind)?;
            Ok(parse_device_listing(&output))
        }
        ChannelKind::Bootloader => Ok(bootloader_device(channel)?.into_iter().collect()),
    }
}

fn bootloader_device<T: Transport>(channel: &Channel<T>) -> Result<Option<Device>> {
    // getvar blocks waiting for a unit, so check the listing first
    let listing = channel.list_devices_raw(ChannelKind::Bootloader)?;
    let attached = listing.lines().filter(|l| !l.trim().is_empty()).count();
    if attached == 0 {
        return Ok(None);
    }
    if attached > 1 {
        warn!(attached, "Several bootloader units attached; the tool addresses only one");
    }

    let var = |name: &str| channel.getvar(name).ok().flatten();

    let Some(serial) = var("serialno") else {
        debug!("Bootloader unit did not report a serial");
        return Ok(None);
    };
    let product = var("product").unwrap_or_else(|| UNKNOWN.to_string());
    let unlocked = var("unlocked").unwrap_or_else(|| UNKNOWN.to_string());

    Ok(Some(Device {
        serial,
        state: DeviceState::from_unlock_flag(&unlocked),
        model: None,
        product: Some(product),
        channel: ChannelKind::Bootloader,
        authorized: false,
    }))
}

/// Picks the device an operation should target.
///
/// With an explicit serial the device must be present in the listing.
/// Without one, the single attached device is chosen; zero or several
/// devices are errors.
pub fn select_device<T: Transport>(
    channel: &Channel<T>,
    kind: ChannelKind,
    serial: Option<&str>,
) -> Result<Device> {
    let mut devices = enumerate(channel, kind)?;

    if let Some(serial) = serial {
        return devices
            .into_iter()
            .find(|d| d.serial == serial)
            .ok_or_else(|| BridgeError::DeviceNotFound(serial.to_string()));
    }

    match devices.len() {
        0 => Err(BridgeError::NoDevice(kind)),
        1 => Ok(devices.remove(0)),
        count => Err(BridgeError::AmbiguousDevice { count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{channel, ScriptedTransport};
    use crate::channel::CommandOutput;

    const LISTING: &str = "List of devices attached\n\
        ABC123\tdevice product:foo model:bar\n\
        \n\
        R58M123\tunauthorized usb:1-1 transport_id:2\n\
        emulator-5554 offline\n";

    #[test]
    fn test_parse_reference_line() {
        let devices = parse_device_listing("ABC123\tdevice product:foo model:bar");
        assert_eq!(devices.len(), 1);
        let d = &devices[0];
        assert_eq!(d.serial, "ABC123");
        assert_eq!(d.state.as_str(), "device");
        assert_eq!(d.model.as_deref(), Some("bar"));
        assert_eq!(d.product.as_deref(), Some("foo"));
        assert!(d.authorized);
        assert_eq!(d.channel, ChannelKind::Shell);
    }

    #[test]
    fn test_parse_full_listing() {
        let devices = parse_device_listing(LISTING);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].serial, "ABC123");
        assert_eq!(devices[1].state, DeviceState::Unauthorized);
        assert!(!devices[1].authorized);
        assert_eq!(devices[1].model, None);
        assert_eq!(devices[2].state, DeviceState::Offline);
        assert!(!devices[2].authorized);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let devices = parse_device_listing("List of devices attached\nlonelytoken\nS1 device\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "S1");
    }

    #[test]
    fn test_parse_skips_daemon_notices() {
        let output = "* daemon not running; starting now at tcp:5037\n\
            * daemon started successfully\n\
            List of devices attached\n\
            S1\tdevice\n";
        let devices = parse_device_listing(output);
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_device_listing("List of devices attached\n\n").is_empty());
        assert!(parse_device_listing("").is_empty());
    }

    #[test]
    fn test_only_device_token_authorizes() {
        for token in ["unauthorized", "offline", "recovery", "sideload", "Device", "host"] {
            let devices = parse_device_listing(&format!("S1 {}", token));
            assert!(!devices[0].authorized, "token {} authorized", token);
        }
        assert!(parse_device_listing("S1 device")[0].authorized);
    }

    #[test]
    fn test_count_never_exceeds_data_lines() {
        let inputs = [
            LISTING,
            "List of devices attached\n a \n b c\n\n d e f\n",
            "x\ny\nz\n",
            "List of devices attached\nS1 device model:m\nS2 device\nS3\n",
        ];
        for input in inputs {
            let data_lines = input
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with("List of devices"))
                .count();
            assert!(parse_device_listing(input).len() <= data_lines);
        }
    }

    #[test]
    fn test_enumerate_shell() {
        let ch = channel(
            ScriptedTransport::new().expect("adb devices -l", CommandOutput::ok(LISTING)),
        );
        let devices = enumerate(&ch, ChannelKind::Shell).unwrap();
        assert_eq!(devices.len(), 3);
    }

    #[test]
    fn test_enumerate_shell_failure_propagates() {
        let ch = channel(
            ScriptedTransport::new().expect("adb devices -l", CommandOutput::failed(1, "boom")),
        );
        assert!(matches!(
            enumerate(&ch, ChannelKind::Shell),
            Err(BridgeError::Channel(_))
        ));
    }

    fn bootloader_transport(unlocked: &str) -> ScriptedTransport {
        ScriptedTransport::new()
            .expect("fastboot devices", CommandOutput::ok("ff00aa11\tfastboot\n"))
            .expect("getvar serialno", CommandOutput::ok("serialno: ff00aa11\nFinished.\n"))
            .expect("getvar product", CommandOutput::ok("product: sagit\nFinished.\n"))
            .expect(
                "getvar unlocked",
                CommandOutput::ok(format!("unlocked: {}\nFinished.\n", unlocked)),
            )
    }

    #[test]
    fn test_enumerate_bootloader_locked() {
        let ch = channel(bootloader_transport("no"));
        let devices = enumerate(&ch, ChannelKind::Bootloader).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "ff00aa11");
        assert_eq!(devices[0].product.as_deref(), Some("sagit"));
        assert_eq!(devices[0].state, DeviceState::Locked);
        assert_eq!(devices[0].channel, ChannelKind::Bootloader);
    }

    #[test]
    fn test_enumerate_bootloader_unlocked() {
        let ch = channel(bootloader_transport("yes"));
        let devices = enumerate(&ch, ChannelKind::Bootloader).unwrap();
        assert_eq!(devices[0].state, DeviceState::Unlocked);
    }

    #[test]
    fn test_enumerate_bootloader_failed_unlock_query_is_locked() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("fastboot devices", CommandOutput::ok("ff00aa11\tfastboot\n"))
                .expect("getvar serialno", CommandOutput::ok("serialno: ff00aa11\n"))
                .expect("getvar product", CommandOutput::failed(1, "FAILED"))
                .expect("getvar unlocked", CommandOutput::failed(1, "FAILED")),
        );
        let devices = enumerate(&ch, ChannelKind::Bootloader).unwrap();
        assert_eq!(devices[0].state, DeviceState::Locked);
        assert_eq!(devices[0].product.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_enumerate_bootloader_serial_named_unknown() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("fastboot devices", CommandOutput::ok("Unknown\tfastboot\n"))
                .expect("getvar serialno", CommandOutput::ok("serialno: Unknown\n"))
                .expect("getvar product", CommandOutput::ok("product: sagit\n"))
                .expect("getvar unlocked", CommandOutput::ok("unlocked: no\n")),
        );
        let devices = enumerate(&ch, ChannelKind::Bootloader).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "Unknown");
    }

    #[test]
    fn test_enumerate_bootloader_without_serial() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("fastboot devices", CommandOutput::ok("????????\tfastboot\n"))
                .expect("getvar serialno", CommandOutput::failed(1, "FAILED"))
                .with_fallback(CommandOutput::ok("product: sagit\n")),
        );
        assert!(enumerate(&ch, ChannelKind::Bootloader).unwrap().is_empty());
        assert_eq!(
            ch.transport().calls(),
            vec!["fastboot devices", "fastboot getvar serialno"]
        );
    }

    #[test]
    fn test_enumerate_bootloader_none_attached() {
        let ch = channel(
            ScriptedTransport::new().expect("fastboot devices", CommandOutput::ok("")),
        );
        assert!(enumerate(&ch, ChannelKind::Bootloader).unwrap().is_empty());
        assert_eq!(ch.transport().calls().len(), 1);
    }

    #[test]
    fn test_select_single_device() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("adb devices -l", CommandOutput::ok("List of devices attached\nS1 device\n")),
        );
        assert_eq!(select_device(&ch, ChannelKind::Shell, None).unwrap().serial, "S1");
    }

    #[test]
    fn test_select_ambiguous() {
        let ch = channel(
            ScriptedTransport::new().expect("adb devices -l", CommandOutput::ok(LISTING)),
        );
        assert!(matches!(
            select_device(&ch, ChannelKind::Shell, None),
            Err(BridgeError::AmbiguousDevice { count: 3 })
        ));
    }

    #[test]
    fn test_select_none() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("adb devices -l", CommandOutput::ok("List of devices attached\n")),
        );
        assert!(matches!(
            select_device(&ch, ChannelKind::Shell, None),
            Err(BridgeError::NoDevice(ChannelKind::Shell))
        ));
    }

    #[test]
    fn test_select_explicit_serial() {
        let ch = channel(
            ScriptedTransport::new()
                .with_fallback(CommandOutput::ok(LISTING)),
        );
        let device = select_device(&ch, ChannelKind::Shell, Some("R58M123")).unwrap();
        assert_eq!(device.state, DeviceState::Unauthorized);

        assert!(matches!(
            select_device(&ch, ChannelKind::Shell, Some("nope")),
            Err(BridgeError::DeviceNotFound(s)) if s == "nope"
        ));
    }
}
