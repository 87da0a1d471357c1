//! Security property inspection.
//!
//! A [`PropertyProfile`] is a fixed table of named properties for one
//! vendor family. Inspection issues one query per property and always
//! returns a complete [`SecurityStatus`]: a failed or empty query becomes
//! [`PropertyValue::NotAvailable`] instead of aborting the inspection.

mod profiles;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::channel::{Channel, ChannelKind, Transport};

pub use profiles::PROFILES;

/// Sentinel shown for properties that could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// How a raw property value is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Kept as trimmed text.
    Text,
    /// `"1"` is true, anything else false.
    Flag,
    /// True iff the value equals the given text.
    Equals(&'static str),
}

/// One entry of a profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name as queried on the device.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Normalization rule.
    pub kind: PropertyKind,
}

/// A named table of security properties read through one channel.
#[derive(Debug, PartialEq, Eq)]
pub struct PropertyProfile {
    /// Profile name (`generic`, `samsung`, ...).
    pub name: &'static str,
    /// Channel the properties are read through.
    pub channel: ChannelKind,
    /// Properties, in display order.
    pub properties: &'static [PropertySpec],
}

impl PropertyProfile {
    /// Looks up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<&'static PropertyProfile> {
        PROFILES.iter().find(|p| p.name == name)
    }

    /// Names of all built-in profiles.
    pub fn names() -> Vec<&'static str> {
        PROFILES.iter().map(|p| p.name).collect()
    }
}

/// A normalized property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Text value.
    Text(String),
    /// Boolean value.
    Flag(bool),
    /// The query failed or returned nothing.
    NotAvailable,
}

impl PropertyValue {
    /// Normalizes a raw query result according to `kind`.
    ///
    /// `None`, or a value that is empty after trimming, is
    /// [`PropertyValue::NotAvailable`].
    pub fn normalize(kind: PropertyKind, raw: Option<&str>) -> Self {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return PropertyValue::NotAvailable;
        };

        match kind {
            PropertyKind::Text => PropertyValue::Text(value.to_string()),
            PropertyKind::Flag => PropertyValue::Flag(value == "1"),
            PropertyKind::Equals(expected) => PropertyValue::Flag(value == expected),
        }
    }

    /// Returns true if the value was read.
    pub fn is_available(&self) -> bool {
        !matches!(self, PropertyValue::NotAvailable)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Text(text) => f.write_str(text),
            PropertyValue::Flag(flag) => write!(f, "{}", flag),
            PropertyValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Text(text) => serializer.serialize_str(text),
            PropertyValue::Flag(flag) => serializer.serialize_bool(*flag),
            PropertyValue::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// Result of one inspection: every profile property, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityStatus {
    profile: &'static str,
    entries: Vec<(&'static PropertySpec, PropertyValue)>,
}

impl SecurityStatus {
    /// Name of the profile this status was read with.
    pub fn profile(&self) -> &'static str {
        self.profile
    }

    /// Looks up a property by name.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map(|(_, value)| value)
    }

    /// Iterates over `(spec, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static PropertySpec, &PropertyValue)> + '_ {
        self.entries.iter().map(|(spec, value)| (*spec, value))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the profile has no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of properties that could not be read.
    pub fn unavailable_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| !v.is_available()).count()
    }
}

impl Serialize for SecurityStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (spec, value) in &self.entries {
            map.serialize_entry(spec.name, value)?;
        }
        map.end()
    }
}

/// Reads every property of `profile` from the device.
///
/// Never fails: individual query failures are logged and recorded as
/// [`PropertyValue::NotAvailable`].
pub fn inspect<T: Transport>(
    channel: &Channel<T>,
    profile: &'static PropertyProfile,
    serial: Option<&str>,
) -> SecurityStatus {
    let entries = profile
        .properties
        .iter()
        .map(|spec| {
            let raw = query(channel, profile.channel, serial, spec.name);
            (spec, PropertyValue::normalize(spec.kind, raw.as_deref()))
        })
        .collect();

    SecurityStatus {
        profile: profile.name,
        entries,
    }
}

fn query<T: Transport>(
    channel: &Channel<T>,
    kind: ChannelKind,
    serial: Option<&str>,
    name: &str,
) -> Option<String> {
    let result = match kind {
        ChannelKind::Shell => channel.getprop(serial, name).map(Some),
        ChannelKind::Bootloader => channel.getvar(name),
    };

    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(property = name, error = %e, "Property query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::{channel, ScriptedTransport};
    use crate::channel::CommandOutput;

    fn generic() -> &'static PropertyProfile {
        PropertyProfile::by_name("generic").unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            PropertyValue::normalize(PropertyKind::Text, Some("  green \n")),
            PropertyValue::Text("green".to_string())
        );
    }

    #[test]
    fn test_normalize_flag() {
        assert_eq!(
            PropertyValue::normalize(PropertyKind::Flag, Some("1")),
            PropertyValue::Flag(true)
        );
        assert_eq!(
            PropertyValue::normalize(PropertyKind::Flag, Some("0")),
            PropertyValue::Flag(false)
        );
        assert_eq!(
            PropertyValue::normalize(PropertyKind::Flag, Some("true")),
            PropertyValue::Flag(false)
        );
    }

    #[test]
    fn test_normalize_equals() {
        let kind = PropertyKind::Equals("enforcing");
        assert_eq!(
            PropertyValue::normalize(kind, Some("enforcing")),
            PropertyValue::Flag(true)
        );
        assert_eq!(
            PropertyValue::normalize(kind, Some("logging")),
            PropertyValue::Flag(false)
        );
    }

    #[test]
    fn test_normalize_missing_or_blank() {
        for kind in [PropertyKind::Text, PropertyKind::Flag, PropertyKind::Equals("x")] {
            assert_eq!(PropertyValue::normalize(kind, None), PropertyValue::NotAvailable);
            assert_eq!(
                PropertyValue::normalize(kind, Some("  \r\n")),
                PropertyValue::NotAvailable
            );
        }
    }

    #[test]
    fn test_not_available_renders_sentinel() {
        assert_eq!(PropertyValue::NotAvailable.to_string(), "N/A");
        assert_eq!(
            serde_json::to_value(PropertyValue::NotAvailable).unwrap(),
            serde_json::json!("N/A")
        );
    }

    #[test]
    fn test_read_values_are_available() {
        assert!(PropertyValue::Text("eng".to_string()).is_available());
        assert!(!PropertyValue::NotAvailable.is_available());
    }

    #[test]
    fn test_secure_boot_one_is_true() {
        let profile = PropertyProfile::by_name("samsung").unwrap();
        let ch = channel(
            ScriptedTransport::new()
                .expect("getprop ro.boot.secureboot", CommandOutput::ok("1\n"))
                .with_fallback(CommandOutput::ok("")),
        );
        let status = inspect(&ch, profile, Some("S1"));
        assert_eq!(status.get("ro.boot.secureboot"), Some(&PropertyValue::Flag(true)));
    }

    #[test]
    fn test_all_queries_failing_yields_complete_record() {
        for profile in PROFILES {
            let ch = channel(
                ScriptedTransport::new().with_fallback(CommandOutput::failed(1, "error: no devices")),
            );
            let status = inspect(&ch, profile, Some("S1"));

            assert_eq!(status.len(), profile.properties.len());
            for spec in profile.properties {
                let value = status.get(spec.name).unwrap();
                assert_eq!(value, &PropertyValue::NotAvailable);
                assert_eq!(value.to_string(), "N/A");
            }
            assert_eq!(status.unavailable_count(), profile.properties.len());
        }
    }

    #[test]
    fn test_missing_tool_yields_complete_record() {
        let ch = channel(ScriptedTransport::new());
        let status = inspect(&ch, generic(), None);
        assert_eq!(status.len(), generic().properties.len());
        assert!(status.iter().all(|(_, v)| !v.is_available()));
    }

    #[test]
    fn test_one_query_per_property_in_order() {
        let ch = channel(ScriptedTransport::new().with_fallback(CommandOutput::ok("x")));
        inspect(&ch, generic(), Some("S1"));

        let expected: Vec<String> = generic()
            .properties
            .iter()
            .map(|p| format!("adb -s S1 shell getprop {}", p.name))
            .collect();
        assert_eq!(ch.transport().calls(), expected);
    }

    #[test]
    fn test_partial_failure() {
        let ch = channel(
            ScriptedTransport::new()
                .expect("getprop ro.boot.verifiedbootstate", CommandOutput::ok("green\n"))
                .expect("getprop ro.boot.flash.locked", CommandOutput::ok("1\n"))
                .with_fallback(CommandOutput::failed(1, "")),
        );
        let status = inspect(&ch, generic(), None);
        assert_eq!(
            status.get("ro.boot.verifiedbootstate"),
            Some(&PropertyValue::Text("green".to_string()))
        );
        assert_eq!(status.get("ro.boot.flash.locked"), Some(&PropertyValue::Flag(true)));
        assert_eq!(status.get("ro.secure"), Some(&PropertyValue::NotAvailable));
    }

    #[test]
    fn test_bootloader_profile_uses_getvar() {
        let profile = PropertyProfile::by_name("bootloader").unwrap();
        let ch = channel(
            ScriptedTransport::new()
                .expect("fastboot getvar unlocked", CommandOutput::ok("unlocked: yes\nFinished.\n"))
                .expect("fastboot getvar product", CommandOutput::ok("(bootloader) product: sagit\n"))
                .with_fallback(CommandOutput::failed(1, "FAILED")),
        );
        let status = inspect(&ch, profile, Some("ignored"));
        assert_eq!(status.get("unlocked"), Some(&PropertyValue::Flag(true)));
        assert_eq!(
            status.get("product"),
            Some(&PropertyValue::Text("sagit".to_string()))
        );
        assert_eq!(status.get("secure"), Some(&PropertyValue::NotAvailable));
        assert!(ch.transport().calls().iter().all(|c| !c.contains("ignored")));
    }

    #[test]
    fn test_status_serializes_in_table_order() {
        let ch = channel(ScriptedTransport::new().with_fallback(CommandOutput::ok("1")));
        let status = inspect(&ch, generic(), None);
        let json = serde_json::to_string(&status).unwrap();

        let positions: Vec<usize> = generic()
            .properties
            .iter()
            .map(|p| json.find(&format!("\"{}\"", p.name)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unknown_profile() {
        assert!(PropertyProfile::by_name("nokia").is_none());
        assert!(PropertyProfile::names().contains(&"pixel"));
    }
}
