// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::mem::size_of;
use std::ptr::null;
use std::ptr::null_mut;

use windows_sys::core::GUID;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::*;
use windows_sys::Win32::Devices::Properties::*;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows_sys::Win32::Foundation::ERROR_NOT_FOUND;
use windows_sys::Win32::Foundation::ERROR_NO_MORE_ITEMS;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;

use crate::check_bool;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::ResultExt;
use crate::properties::DevPropKey;
use crate::properties::PnpQuery;
use crate::properties::PropertyBag;
use crate::properties::PropertyMap;
use crate::properties::PropertyValue;
use crate::properties::ADAPTER_LUID_KEY;
use crate::properties::PROPERTY_DESCRIPTION;
use crate::properties::PROPERTY_DEVICE_ID;
use crate::properties::PROPERTY_DRIVER;
use crate::properties::PROPERTY_LOCATION_PATHS;
use crate::properties::PROPERTY_MANUFACTURER;
use crate::registry::decode_multi_string;
use crate::traits::PnpBackend;

use super::to_wide;

const DEVICE_PROPERTY_FMTID: (u32, u16, u16, [u8; 8]) = (
    0xa45c254e,
    0xdf1c,
    0x4efd,
    [0x80, 0x20, 0x67, 0xd1, 0x46, 0xa8, 0x50, 0xe0],
);

/// Device properties read for every selected device, and the names they are stored under.
const DEVICE_PROPERTIES: [(&str, DevPropKey); 4] = [
    (
        PROPERTY_DESCRIPTION,
        DevPropKey {
            fmtid: DEVICE_PROPERTY_FMTID,
            pid: 2,
        },
    ),
    (
        PROPERTY_DRIVER,
        DevPropKey {
            fmtid: DEVICE_PROPERTY_FMTID,
            pid: 11,
        },
    ),
    (
        PROPERTY_MANUFACTURER,
        DevPropKey {
            fmtid: DEVICE_PROPERTY_FMTID,
            pid: 13,
        },
    ),
    (
        PROPERTY_LOCATION_PATHS,
        DevPropKey {
            fmtid: DEVICE_PROPERTY_FMTID,
            pid: 37,
        },
    ),
];

/// PCI display devices all live under the PCI enumerator.
const PCI_ENUMERATOR: &str = "PCI";

fn to_devpropkey(key: &DevPropKey) -> DEVPROPKEY {
    let (data1, data2, data3, data4) = key.fmtid;
    DEVPROPKEY {
        fmtid: GUID {
            data1,
            data2,
            data3,
            data4,
        },
        pid: key.pid,
    }
}

/// A SetupAPI device information set, destroyed on drop.
struct DeviceInfoSet(HDEVINFO);

impl DeviceInfoSet {
    fn pci_devices(present_only: bool) -> DiscoveryResult<DeviceInfoSet> {
        let enumerator = to_wide(PCI_ENUMERATOR);
        let mut flags = DIGCF_ALLCLASSES;
        if present_only {
            flags |= DIGCF_PRESENT;
        }

        // SAFETY: `enumerator` is NUL-terminated and outlives the call.
        let handle =
            unsafe { SetupDiGetClassDevsW(null(), enumerator.as_ptr(), null_mut(), flags) };
        if handle as isize == INVALID_HANDLE_VALUE as isize {
            // SAFETY: GetLastError only reads thread-local state.
            return Err(DiscoveryError::Win32 {
                operation: "SetupDiGetClassDevsW".to_string(),
                code: unsafe { GetLastError() },
            });
        }

        Ok(DeviceInfoSet(handle))
    }

    /// Returns `None` past the last device.
    fn device(&self, index: u32) -> DiscoveryResult<Option<SP_DEVINFO_DATA>> {
        let mut devinfo_data = SP_DEVINFO_DATA {
            cbSize: size_of::<SP_DEVINFO_DATA>() as u32,
            ClassGuid: GUID::from_u128(0),
            DevInst: 0,
            Reserved: 0,
        };

        // SAFETY: `devinfo_data` is stack-allocated with `cbSize` set.
        let result = unsafe { SetupDiEnumDeviceInfo(self.0, index, &mut devinfo_data) };
        if result == 0 {
            // SAFETY: GetLastError only reads thread-local state.
            let code = unsafe { GetLastError() };
            if code == ERROR_NO_MORE_ITEMS {
                return Ok(None);
            }
            return Err(DiscoveryError::Win32 {
                operation: "SetupDiEnumDeviceInfo".to_string(),
                code,
            });
        }

        Ok(Some(devinfo_data))
    }

    fn instance_id(&self, devinfo_data: &SP_DEVINFO_DATA) -> DiscoveryResult<String> {
        let mut required_size = 0u32;

        // The first call only reports the size, including the terminator.
        // SAFETY: a null buffer with zero length is allowed.
        let result = unsafe {
            SetupDiGetDeviceInstanceIdW(self.0, devinfo_data, null_mut(), 0, &mut required_size)
        };
        if result == 0 {
            // SAFETY: GetLastError only reads thread-local state.
            let code = unsafe { GetLastError() };
            if code != ERROR_INSUFFICIENT_BUFFER {
                return Err(DiscoveryError::Win32 {
                    operation: "SetupDiGetDeviceInstanceIdW".to_string(),
                    code,
                });
            }
        }

        let mut buffer = vec![0u16; required_size.max(1) as usize];
        // SAFETY: `buffer` holds `required_size` characters.
        check_bool!("SetupDiGetDeviceInstanceIdW", unsafe {
            SetupDiGetDeviceInstanceIdW(
                self.0,
                devinfo_data,
                buffer.as_mut_ptr(),
                buffer.len() as u32,
                null_mut(),
            )
        })?;

        let len = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
        String::from_utf16(&buffer[..len])
            .map_err(|_| DiscoveryError::message("device instance ID is not valid UTF-16"))
    }

    /// Returns `None` when the device has no value for `key`.
    fn property(
        &self,
        devinfo_data: &SP_DEVINFO_DATA,
        key: &DevPropKey,
    ) -> DiscoveryResult<Option<PropertyValue>> {
        let devpropkey = to_devpropkey(key);
        let mut property_type: DEVPROPTYPE = 0;
        let mut required_size = 0u32;

        // SAFETY: a null buffer with zero length is allowed; the call only reports the type and
        // size.
        let result = unsafe {
            SetupDiGetDevicePropertyW(
                self.0,
                devinfo_data,
                &devpropkey,
                &mut property_type,
                null_mut(),
                0,
                &mut required_size,
                0,
            )
        };
        if result == 0 {
            // SAFETY: GetLastError only reads thread-local state.
            match unsafe { GetLastError() } {
                ERROR_NOT_FOUND => return Ok(None),
                ERROR_INSUFFICIENT_BUFFER => (),
                code => {
                    return Err(DiscoveryError::Win32 {
                        operation: format!("SetupDiGetDevicePropertyW({key})"),
                        code,
                    })
                }
            }
        }

        let mut buffer = vec![0u8; required_size as usize];
        // SAFETY: `buffer` holds `required_size` bytes.
        check_bool!(format!("SetupDiGetDevicePropertyW({key})"), unsafe {
            SetupDiGetDevicePropertyW(
                self.0,
                devinfo_data,
                &devpropkey,
                &mut property_type,
                buffer.as_mut_ptr(),
                required_size,
                null_mut(),
                0,
            )
        })?;

        decode_property(property_type, &buffer).map(Some)
    }
}

impl Drop for DeviceInfoSet {
    fn drop(&mut self) {
        // SAFETY: Safe since we own the device information set
        if unsafe { SetupDiDestroyDeviceInfoList(self.0) } == 0 {
            log::error!("SetupDiDestroyDeviceInfoList failed with Win32 error {}", unsafe {
                GetLastError()
            });
        }
    }
}

fn utf16_units(buffer: &[u8]) -> Vec<u16> {
    buffer
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn fixed<const N: usize>(buffer: &[u8]) -> DiscoveryResult<[u8; N]> {
    buffer
        .get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| DiscoveryError::message(format!("property value shorter than {N} bytes")))
}

fn decode_property(property_type: DEVPROPTYPE, buffer: &[u8]) -> DiscoveryResult<PropertyValue> {
    let value = match property_type {
        DEVPROP_TYPE_STRING => {
            let units = utf16_units(buffer);
            let len = units.iter().position(|c| *c == 0).unwrap_or(units.len());
            PropertyValue::String(String::from_utf16_lossy(&units[..len]))
        }
        t if t == DEVPROP_TYPE_STRING | DEVPROP_TYPEMOD_LIST => {
            PropertyValue::StringList(decode_multi_string(&utf16_units(buffer)))
        }
        DEVPROP_TYPE_BOOLEAN => PropertyValue::Boolean(fixed::<1>(buffer)?[0] != 0),
        DEVPROP_TYPE_UINT32 => PropertyValue::UInt32(u32::from_le_bytes(fixed(buffer)?)),
        DEVPROP_TYPE_INT64 => PropertyValue::Int64(i64::from_le_bytes(fixed(buffer)?)),
        DEVPROP_TYPE_UINT64 => PropertyValue::UInt64(u64::from_le_bytes(fixed(buffer)?)),
        other => {
            return Err(DiscoveryError::message(format!(
                "unsupported device property type {other:#x}"
            )))
        }
    };
    Ok(value)
}

/// Reads PnP device properties through SetupAPI.
pub struct SetupApiBackend;

impl SetupApiBackend {
    fn read_device(
        set: &DeviceInfoSet,
        devinfo_data: &SP_DEVINFO_DATA,
        instance_id: String,
    ) -> DiscoveryResult<PropertyMap> {
        let mut bag = PropertyMap::new();
        bag.insert(PROPERTY_DEVICE_ID, PropertyValue::String(instance_id));

        for (name, key) in DEVICE_PROPERTIES {
            if let Some(value) = set.property(devinfo_data, &key)? {
                bag.insert(name, value);
            }
        }
        if let Some(luid) = set.property(devinfo_data, &ADAPTER_LUID_KEY)? {
            bag.insert(ADAPTER_LUID_KEY.property_name(), luid);
        }

        Ok(bag)
    }
}

impl PnpBackend for SetupApiBackend {
    fn query_devices(&self, query: &PnpQuery) -> DiscoveryResult<Vec<Box<dyn PropertyBag>>> {
        let set = DeviceInfoSet::pci_devices(query.present_only)?;
        let mut devices: Vec<Box<dyn PropertyBag>> = Vec::new();

        let mut index = 0;
        while let Some(devinfo_data) = set.device(index)? {
            index += 1;

            let instance_id = set.instance_id(&devinfo_data)?;
            if !query.matches(&instance_id) {
                continue;
            }

            let bag = SetupApiBackend::read_device(&set, &devinfo_data, instance_id.clone())
                .with_context(|| format!("reading properties of device {instance_id}"))?;
            devices.push(Box::new(bag));
        }

        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_bytes(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn decodes_property_buffers() {
        assert_eq!(
            decode_property(DEVPROP_TYPE_STRING, &wide_bytes("NVIDIA\0")).unwrap(),
            PropertyValue::String("NVIDIA".to_string())
        );
        assert_eq!(
            decode_property(
                DEVPROP_TYPE_STRING | DEVPROP_TYPEMOD_LIST,
                &wide_bytes("PCIROOT(0)#PCI(0100)\0ACPI(_SB_)\0\0")
            )
            .unwrap(),
            PropertyValue::StringList(vec![
                "PCIROOT(0)#PCI(0100)".to_string(),
                "ACPI(_SB_)".to_string()
            ])
        );
        assert_eq!(
            decode_property(DEVPROP_TYPE_INT64, &0x1_0000_d2a3i64.to_le_bytes()).unwrap(),
            PropertyValue::Int64(0x1_0000_d2a3)
        );
        assert!(decode_property(DEVPROP_TYPE_UINT64, &[0u8; 4]).is_err());
    }
}
