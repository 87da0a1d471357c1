//! Built-in vendor property tables.

use super::{PropertyKind, PropertyProfile, PropertySpec};
use crate::channel::ChannelKind;

const fn text(name: &'static str, label: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        label,
        kind: PropertyKind::Text,
    }
}

const fn flag(name: &'static str, label: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        label,
        kind: PropertyKind::Flag,
    }
}

const fn equals(name: &'static str, label: &'static str, expected: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        label,
        kind: PropertyKind::Equals(expected),
    }
}

/// All built-in profiles.
pub static PROFILES: &[PropertyProfile] = &[
    PropertyProfile {
        name: "generic",
        channel: ChannelKind::Shell,
        properties: &[
            text("ro.build.fingerprint", "Build"),
            text("ro.boot.verifiedbootstate", "Verified Boot"),
            flag("ro.boot.flash.locked", "Bootloader Locked"),
            flag("ro.boot.warranty_bit", "Warranty Void"),
            text("ro.build.selinux", "SELinux"),
            flag("ro.debuggable", "Debuggable"),
            flag("ro.secure", "Secure"),
        ],
    },
    PropertyProfile {
        name: "samsung",
        channel: ChannelKind::Shell,
        properties: &[
            flag("ro.boot.warranty_bit", "Warranty Void"),
            text("ro.boot.knox.version", "Knox Version"),
            flag("ro.boot.secureboot", "Secure Boot"),
            equals("ro.boot.veritymode", "DM-Verity", "enforcing"),
            flag("ro.boot.flash.locked", "Bootloader Locked"),
        ],
    },
    PropertyProfile {
        name: "pixel",
        channel: ChannelKind::Shell,
        properties: &[
            flag("ro.boot.flash.locked", "Bootloader Locked"),
            text("ro.boot.veritymode", "AVB State"),
            text("ro.boot.verifiedbootstate", "Boot State"),
            text("ro.boot.hardware.revision", "Hardware Revision"),
        ],
    },
    PropertyProfile {
        name: "bootloader",
        channel: ChannelKind::Bootloader,
        properties: &[
            text("product", "Product"),
            text("variant", "Variant"),
            text("serialno", "Serial"),
            equals("secure", "Secure Boot", "yes"),
            equals("unlocked", "Unlocked", "yes"),
            text("slot-count", "Slot Count"),
            text("current-slot", "Current Slot"),
            text("version-bootloader", "Bootloader Version"),
            text("version-baseband", "Baseband Version"),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_profile_names_unique() {
        let names: HashSet<_> = PROFILES.iter().map(|p| p.name).collect();
        assert_eq!(names.len(), PROFILES.len());
    }

    #[test]
    fn test_property_names_unique_within_profile() {
        for profile in PROFILES {
            let names: HashSet<_> = profile.properties.iter().map(|p| p.name).collect();
            assert_eq!(names.len(), profile.properties.len(), "{}", profile.name);
        }
    }

    #[test]
    fn test_profiles_not_empty() {
        assert!(PROFILES.iter().all(|p| !p.properties.is_empty()));
    }
}
