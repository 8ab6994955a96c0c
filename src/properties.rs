// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::adapter::HardwareIdPattern;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;

pub const PROPERTY_DEVICE_ID: &str = "DeviceID";
pub const PROPERTY_DESCRIPTION: &str = "Description";
pub const PROPERTY_MANUFACTURER: &str = "Manufacturer";
pub const PROPERTY_DRIVER: &str = "DEVPKEY_Device_Driver";
pub const PROPERTY_LOCATION_PATHS: &str = "DEVPKEY_Device_LocationPaths";

/// Device property holding the LUID of the DirectX adapter of a display device.
pub const ADAPTER_LUID_KEY: DevPropKey = DevPropKey {
    fmtid: (
        0x60b193cb,
        0x5276,
        0x4d0f,
        [0x96, 0xfc, 0xf1, 0x73, 0xab, 0xad, 0x3e, 0xc6],
    ),
    pid: 2,
};

/// A device property key: a format GUID plus a property identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DevPropKey {
    pub fmtid: (u32, u16, u16, [u8; 8]),
    pub pid: u32,
}

impl DevPropKey {
    /// The name property bags use for this key.
    pub fn property_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DevPropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (d1, d2, d3, d4) = self.fmtid;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}} {}",
            d1, d2, d3, d4[0], d4[1], d4[2], d4[3], d4[4], d4[5], d4[6], d4[7], self.pid
        )
    }
}

/// A device property value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Boolean(bool),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    String(String),
    StringList(Vec<String>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Int64(_) => "int64",
            PropertyValue::UInt32(_) => "uint32",
            PropertyValue::UInt64(_) => "uint64",
            PropertyValue::String(_) => "string",
            PropertyValue::StringList(_) => "string list",
        }
    }

    pub fn into_string(self, name: &str) -> DiscoveryResult<String> {
        match self {
            PropertyValue::String(s) => Ok(s),
            other => Err(other.type_mismatch(name, "string")),
        }
    }

    pub fn into_string_list(self, name: &str) -> DiscoveryResult<Vec<String>> {
        match self {
            PropertyValue::StringList(list) => Ok(list),
            other => Err(other.type_mismatch(name, "string list")),
        }
    }

    /// Reads a 64-bit identifier stored either as an integer or as its decimal string form.
    pub fn to_i64(&self, name: &str) -> DiscoveryResult<i64> {
        match self {
            PropertyValue::Int64(v) => Ok(*v),
            PropertyValue::UInt64(v) => i64::try_from(*v).map_err(|_| {
                DiscoveryError::message(format!(
                    "property {name} holds {v}, which does not fit a signed 64-bit integer"
                ))
            }),
            PropertyValue::UInt32(v) => Ok(i64::from(*v)),
            PropertyValue::String(s) => s.trim().parse::<i64>().map_err(|e| {
                DiscoveryError::message(format!(
                    "property {name} holds \"{s}\", which is not a 64-bit integer: {e}"
                ))
            }),
            other => Err(other.type_mismatch(name, "64-bit integer")),
        }
    }

    fn type_mismatch(&self, name: &str, expected: &str) -> DiscoveryError {
        DiscoveryError::message(format!(
            "property {name} has type {}, expected {expected}",
            self.type_name()
        ))
    }
}

/// Named property retrieval for one PnP device.
pub trait PropertyBag {
    /// Returns `None` when the device has no value for `name`.
    fn get(&self, name: &str) -> DiscoveryResult<Option<PropertyValue>>;
}

/// A property bag held in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMap {
    values: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    pub fn new() -> PropertyMap {
        Default::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn with<S: Into<String>>(mut self, name: S, value: PropertyValue) -> PropertyMap {
        self.insert(name, value);
        self
    }
}

impl PropertyBag for PropertyMap {
    fn get(&self, name: &str) -> DiscoveryResult<Option<PropertyValue>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Selects the PnP devices the correlator needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PnpQuery {
    pub patterns: BTreeSet<HardwareIdPattern>,
    /// Only devices currently present in the system.
    pub present_only: bool,
}

impl PnpQuery {
    pub fn new<I>(patterns: I) -> PnpQuery
    where
        I: IntoIterator<Item = HardwareIdPattern>,
    {
        PnpQuery {
            patterns: patterns.into_iter().collect(),
            present_only: true,
        }
    }

    /// Whether a device with this instance ID is selected. Presence is checked by the backend.
    pub fn matches(&self, device_id: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(device_id))
    }
}

impl fmt::Display for PnpQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.present_only {
            f.write_str("present devices where ")?;
        } else {
            f.write_str("devices where ")?;
        }

        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "DeviceID like {pattern}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HardwareId;

    #[test]
    fn adapter_luid_key_name() {
        assert_eq!(
            ADAPTER_LUID_KEY.property_name(),
            "{60B193CB-5276-4D0F-96FC-F173ABAD3EC6} 2"
        );
    }

    #[test]
    fn luid_accepts_integer_and_string_encodings() {
        assert_eq!(PropertyValue::Int64(-5).to_i64("luid").unwrap(), -5);
        assert_eq!(
            PropertyValue::UInt64(0x1_0000_d2a3).to_i64("luid").unwrap(),
            0x1_0000_d2a3
        );
        assert_eq!(
            PropertyValue::String("4295021219".to_string())
                .to_i64("luid")
                .unwrap(),
            4295021219
        );
        assert!(PropertyValue::String("0xd2a3".to_string())
            .to_i64("luid")
            .is_err());
        assert!(PropertyValue::Boolean(true).to_i64("luid").is_err());
    }

    #[test]
    fn unsigned_luid_out_of_signed_range_is_rejected() {
        let err = PropertyValue::UInt64(u64::MAX).to_i64("luid").unwrap_err();
        assert_eq!(
            err.to_string(),
            "property luid holds 18446744073709551615, which does not fit a signed 64-bit integer"
        );
        assert_eq!(
            PropertyValue::UInt64(i64::MAX as u64).to_i64("luid").unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn wrong_type_is_reported_with_the_property_name() {
        let err = PropertyValue::UInt32(3)
            .into_string(PROPERTY_DRIVER)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "property DEVPKEY_Device_Driver has type uint32, expected string"
        );
    }

    #[test]
    fn query_matches_any_pattern() {
        let a = HardwareId {
            vendor_id: 0x10de,
            device_id: 0x2204,
            subsystem_id: 0x1467_1458,
            revision: 0xa1,
        };
        let b = HardwareId {
            vendor_id: 0x8086,
            device_id: 0x9bc5,
            subsystem_id: 0x7d,
            revision: 5,
        };
        let query = PnpQuery::new([a.pnp_pattern(), b.pnp_pattern(), a.pnp_pattern()]);

        assert_eq!(query.patterns.len(), 2);
        assert!(query.present_only);
        assert!(query.matches("PCI\\VEN_8086&DEV_9BC5&SUBSYS_0000007D&REV_05\\3&11583659&0&10"));
        assert!(query.matches("PCI\\VEN_10DE&DEV_2204&SUBSYS_14671458&REV_A1\\4&2D78AB8F&0&0008"));
        assert!(!query.matches("USB\\VID_046D&PID_C52B\\5&1A2B3C4D&0&1"));
        assert_eq!(
            query.to_string(),
            "present devices where DeviceID like PCI\\VEN_10DE&DEV_2204&SUBSYS_14671458&REV_A1* \
             or DeviceID like PCI\\VEN_8086&DEV_9BC5&SUBSYS_0000007D&REV_05*"
        );
    }

    #[test]
    fn property_map_returns_none_for_missing_values() {
        let map = PropertyMap::new().with(
            PROPERTY_LOCATION_PATHS,
            PropertyValue::StringList(vec!["PCIROOT(0)#PCI(0100)".to_string()]),
        );
        assert_eq!(map.values.len(), 1);
        assert_eq!(map.get(PROPERTY_DESCRIPTION).unwrap(), None);
        assert_eq!(
            map.get(PROPERTY_LOCATION_PATHS)
                .unwrap()
                .unwrap()
                .into_string_list(PROPERTY_LOCATION_PATHS)
                .unwrap(),
            vec!["PCIROOT(0)#PCI(0100)".to_string()]
        );
    }
}
