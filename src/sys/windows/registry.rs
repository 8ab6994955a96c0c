// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::ptr::null;
use std::ptr::null_mut;

use windows_sys::Win32::Foundation::ERROR_NO_MORE_ITEMS;
use windows_sys::Win32::System::Registry::*;

use crate::check_win32;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::registry::decode_multi_string;
use crate::registry::RegistryPath;
use crate::registry::RegistryRoot;
use crate::traits::RegistryKey;

use super::to_wide;

fn predefined_key(root: RegistryRoot) -> HKEY {
    match root {
        RegistryRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryRoot::CurrentConfig => HKEY_CURRENT_CONFIG,
        RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
        RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryRoot::PerformanceData => HKEY_PERFORMANCE_DATA,
        RegistryRoot::Users => HKEY_USERS,
    }
}

/// An open registry key, closed on drop.
pub struct OpenedKey {
    hkey: HKEY,
}

impl OpenedKey {
    pub fn open(path: &RegistryPath) -> DiscoveryResult<OpenedKey> {
        let subkey = to_wide(&path.subkey);
        let mut hkey: HKEY = null_mut();

        // SAFETY:
        //  - `subkey` is NUL-terminated and outlives the call.
        //  - `hkey` is only written on success.
        check_win32!("RegOpenKeyExW", unsafe {
            RegOpenKeyExW(
                predefined_key(path.root),
                subkey.as_ptr(),
                0,
                KEY_READ,
                &mut hkey,
            )
        })?;

        Ok(OpenedKey { hkey })
    }
}

impl RegistryKey for OpenedKey {
    fn multi_string_values(&self) -> DiscoveryResult<BTreeMap<String, Vec<String>>> {
        let mut value_count = 0u32;
        let mut max_name_len = 0u32;
        let mut max_data_len = 0u32;

        // SAFETY: every out pointer is either null or a stack-allocated u32.
        check_win32!("RegQueryInfoKeyW", unsafe {
            RegQueryInfoKeyW(
                self.hkey,
                null_mut(),
                null_mut(),
                null(),
                null_mut(),
                null_mut(),
                null_mut(),
                &mut value_count,
                &mut max_name_len,
                &mut max_data_len,
                null_mut(),
                null_mut(),
            )
        })?;

        // Name lengths exclude the terminator; data lengths are in bytes.
        let mut name = vec![0u16; max_name_len as usize + 1];
        let mut data = vec![0u16; (max_data_len as usize).div_ceil(2) + 1];
        let mut values = BTreeMap::new();

        for index in 0..value_count {
            let mut name_len = name.len() as u32;
            let mut data_len = (data.len() * 2) as u32;
            let mut value_type = 0u32;

            // SAFETY: `name` and `data` are sized from RegQueryInfoKeyW and their lengths are
            // passed alongside them.
            let status = unsafe {
                RegEnumValueW(
                    self.hkey,
                    index,
                    name.as_mut_ptr(),
                    &mut name_len,
                    null(),
                    &mut value_type,
                    data.as_mut_ptr() as *mut u8,
                    &mut data_len,
                )
            };
            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            check_win32!("RegEnumValueW", status)?;

            let value_name = String::from_utf16_lossy(&name[..name_len as usize]);
            if value_type != REG_MULTI_SZ {
                return Err(DiscoveryError::message(format!(
                    "registry value {value_name} has type {value_type}, expected REG_MULTI_SZ"
                )));
            }

            let strings = decode_multi_string(&data[..(data_len as usize) / 2]);
            values.insert(value_name, strings);
        }

        Ok(values)
    }
}

impl Drop for OpenedKey {
    fn drop(&mut self) {
        // SAFETY: Safe since we own the key handle
        let status = unsafe { RegCloseKey(self.hkey) };
        if status != 0 {
            log::error!("RegCloseKey failed with Win32 error {}", status);
        }
    }
}
