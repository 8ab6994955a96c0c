// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

//! C entry points of the device discovery library.
//!
//! Strings cross the boundary as NUL-terminated UTF-16. Device strings stay valid until the next
//! successful discovery on the same instance; the last error string stays valid until the next
//! call to `DeviceDiscovery_GetLastErrorMessage`.

#![allow(clippy::missing_safety_doc)]

use std::collections::HashMap;
use std::os::raw::c_int;
use std::os::raw::c_longlong;
use std::os::raw::c_uint;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::ptr::null;
use std::ptr::null_mut;
use std::sync::OnceLock;

use dxdevice_discovery::CapabilityFilter;
use dxdevice_discovery::DeviceField;
use dxdevice_discovery::DeviceFieldValue;
use dxdevice_discovery::DiscoveryConfig;
use dxdevice_discovery::DiscoveryLogger;
use dxdevice_discovery::DiscoveryResult;
use dxdevice_discovery::DiscoverySession;
use dxdevice_discovery::RuntimeFileList;
use dxdevice_discovery::DISCOVERY_LIBRARY_VERSION;
use dxdevice_discovery::LOG_TARGET;

const TEXT_FIELDS: [DeviceField; 6] = [
    DeviceField::Id,
    DeviceField::Description,
    DeviceField::DriverRegistryKey,
    DeviceField::DriverStorePath,
    DeviceField::LocationPath,
    DeviceField::Vendor,
];

fn to_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

#[derive(Default)]
struct DeviceStrings {
    text: HashMap<DeviceField, Vec<u16>>,
    runtime_files: Vec<(Vec<u16>, Vec<u16>)>,
    runtime_files_wow64: Vec<(Vec<u16>, Vec<u16>)>,
}

impl DeviceStrings {
    fn files(&self, list: RuntimeFileList) -> &[(Vec<u16>, Vec<u16>)] {
        match list {
            RuntimeFileList::Primary => &self.runtime_files,
            RuntimeFileList::Wow64 => &self.runtime_files_wow64,
        }
    }
}

pub struct DiscoveryInstance {
    session: DiscoverySession,
    strings: Vec<DeviceStrings>,
    error: Vec<u16>,
}

impl DiscoveryInstance {
    fn new() -> DiscoveryInstance {
        DiscoveryInstance::with_session(DiscoverySession::native(DiscoveryConfig::default()))
    }

    fn with_session(session: DiscoverySession) -> DiscoveryInstance {
        DiscoveryInstance {
            session,
            strings: Vec::new(),
            error: vec![0],
        }
    }

    fn rebuild_strings(&mut self) -> DiscoveryResult<()> {
        let mut strings = Vec::new();
        for (index, device) in self.session.devices()?.iter().enumerate() {
            let mut entry = DeviceStrings::default();
            for field in TEXT_FIELDS {
                if let DeviceFieldValue::Text(text) = self.session.device_field(index, field)? {
                    entry.text.insert(field, to_utf16(text));
                }
            }
            for (list, files) in [
                (RuntimeFileList::Primary, &mut entry.runtime_files),
                (RuntimeFileList::Wow64, &mut entry.runtime_files_wow64),
            ] {
                *files = device
                    .runtime_files(list)
                    .iter()
                    .map(|f| (to_utf16(&f.source_path), to_utf16(&f.destination_name)))
                    .collect();
            }
            strings.push(entry);
        }
        self.strings = strings;
        Ok(())
    }

    fn device_text(&mut self, device: c_uint, field: DeviceField) -> *const u16 {
        let result = self
            .session
            .device_field(device as usize, field)
            .map(|_| ());
        match self.session.track(result) {
            Ok(()) => self.strings[device as usize].text[&field].as_ptr(),
            Err(_) => null(),
        }
    }

    fn device_flag(&mut self, device: c_uint, field: DeviceField) -> c_int {
        let result = match self.session.device_field(device as usize, field) {
            Ok(DeviceFieldValue::Flag(flag)) => Ok(flag as c_int),
            Ok(_) => Ok(-1),
            Err(e) => Err(e),
        };
        self.session.track(result).unwrap_or(-1)
    }

    fn runtime_file_count(&mut self, device: c_uint, list: RuntimeFileList) -> c_int {
        let result = self.session.runtime_file_count(device as usize, list);
        match self.session.track(result) {
            Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
            Err(_) => -1,
        }
    }

    fn runtime_file(
        &mut self,
        device: c_uint,
        list: RuntimeFileList,
        file: c_uint,
        destination: bool,
    ) -> *const u16 {
        let result = self
            .session
            .runtime_file(device as usize, list, file as usize)
            .map(|_| ());
        match self.session.track(result) {
            Ok(()) => {
                let (source, dest) = &self.strings[device as usize].files(list)[file as usize];
                if destination {
                    dest.as_ptr()
                } else {
                    source.as_ptr()
                }
            }
            Err(_) => null(),
        }
    }
}

/// Runs `f` on the instance behind `instance`, returning `sentinel` for a null instance or a
/// panic.
unsafe fn with_instance<T: Copy>(
    instance: *mut DiscoveryInstance,
    sentinel: T,
    f: impl FnOnce(&mut DiscoveryInstance) -> T,
) -> T {
    catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the caller passes a pointer from CreateDeviceDiscoveryInstance or null.
        match instance.as_mut() {
            Some(instance) => f(instance),
            None => sentinel,
        }
    }))
    .unwrap_or(sentinel)
}

#[no_mangle]
pub extern "C" fn GetDiscoveryLibraryVersion() -> *const u16 {
    static VERSION: OnceLock<Vec<u16>> = OnceLock::new();
    VERSION.get_or_init(|| to_utf16(DISCOVERY_LIBRARY_VERSION)).as_ptr()
}

#[no_mangle]
pub extern "C" fn EnableDiscoveryLogging() {
    let _ = catch_unwind(|| {
        let _ = env_logger::Builder::from_default_env()
            .filter_module(LOG_TARGET, log::LevelFilter::Info)
            .try_init();
        DiscoveryLogger::process_default().enable();
    });
}

#[no_mangle]
pub extern "C" fn DisableDiscoveryLogging() {
    DiscoveryLogger::process_default().disable();
}

#[no_mangle]
pub extern "C" fn CreateDeviceDiscoveryInstance() -> *mut DiscoveryInstance {
    catch_unwind(|| Box::into_raw(Box::new(DiscoveryInstance::new()))).unwrap_or(null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn DestroyDeviceDiscoveryInstance(instance: *mut DiscoveryInstance) {
    if instance.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: ownership of a pointer from CreateDeviceDiscoveryInstance returns to us.
        drop(Box::from_raw(instance));
    }));
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetLastErrorMessage(
    instance: *mut DiscoveryInstance,
) -> *const u16 {
    with_instance(instance, null(), |instance| {
        instance.error = to_utf16(instance.session.last_error());
        instance.error.as_ptr()
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_IsRefreshRequired(
    instance: *mut DiscoveryInstance,
) -> c_int {
    with_instance(instance, 1, |instance| {
        instance.session.is_refresh_required() as c_int
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_DiscoverDevices(
    instance: *mut DiscoveryInstance,
    filter: c_int,
    include_integrated: c_int,
    include_detachable: c_int,
) -> c_int {
    with_instance(instance, -1, |instance| {
        let filter = match instance.session.track(CapabilityFilter::try_from(filter)) {
            Ok(filter) => filter,
            Err(_) => return -1,
        };
        let discovered = instance.session.discover(
            filter,
            include_integrated != 0,
            include_detachable != 0,
        );
        let result = discovered.and_then(|_| instance.rebuild_strings());
        match instance.session.track(result) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetNumDevices(instance: *mut DiscoveryInstance) -> c_int {
    with_instance(instance, -1, |instance| {
        let result = instance.session.device_count();
        match instance.session.track(result) {
            Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
            Err(_) => -1,
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceAdapterLUID(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_longlong {
    with_instance(instance, -1, |instance| {
        let result = match instance
            .session
            .device_field(device as usize, DeviceField::AdapterLuid)
        {
            Ok(DeviceFieldValue::Integer(luid)) => Ok(luid),
            Ok(_) => Ok(-1),
            Err(e) => Err(e),
        };
        instance.session.track(result).unwrap_or(-1)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceID(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| i.device_text(device, DeviceField::Id))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceDescription(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| i.device_text(device, DeviceField::Description))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceDriverRegistryKey(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.device_text(device, DeviceField::DriverRegistryKey)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceDriverStorePath(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.device_text(device, DeviceField::DriverStorePath)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceLocationPath(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| i.device_text(device, DeviceField::LocationPath))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetDeviceVendor(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| i.device_text(device, DeviceField::Vendor))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetNumRuntimeFiles(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| {
        i.runtime_file_count(device, RuntimeFileList::Primary)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetRuntimeFileSource(
    instance: *mut DiscoveryInstance,
    device: c_uint,
    file: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.runtime_file(device, RuntimeFileList::Primary, file, false)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetRuntimeFileDestination(
    instance: *mut DiscoveryInstance,
    device: c_uint,
    file: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.runtime_file(device, RuntimeFileList::Primary, file, true)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetNumRuntimeFilesWow64(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| {
        i.runtime_file_count(device, RuntimeFileList::Wow64)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetRuntimeFileSourceWow64(
    instance: *mut DiscoveryInstance,
    device: c_uint,
    file: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.runtime_file(device, RuntimeFileList::Wow64, file, false)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_GetRuntimeFileDestinationWow64(
    instance: *mut DiscoveryInstance,
    device: c_uint,
    file: c_uint,
) -> *const u16 {
    with_instance(instance, null(), |i| {
        i.runtime_file(device, RuntimeFileList::Wow64, file, true)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_IsDeviceIntegrated(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| i.device_flag(device, DeviceField::IsIntegrated))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_IsDeviceDetachable(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| i.device_flag(device, DeviceField::IsDetachable))
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_DoesDeviceSupportDisplay(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| {
        i.device_flag(device, DeviceField::SupportsDisplay)
    })
}

#[no_mangle]
pub unsafe extern "C" fn DeviceDiscovery_DoesDeviceSupportCompute(
    instance: *mut DiscoveryInstance,
    device: c_uint,
) -> c_int {
    with_instance(instance, -1, |i| {
        i.device_flag(device, DeviceField::SupportsCompute)
    })
}

#[cfg(test)]
mod tests {
    use dxdevice_discovery::testing::pnp_device;
    use dxdevice_discovery::testing::FakeAdapter;
    use dxdevice_discovery::testing::FakePlatform;
    use dxdevice_discovery::PropertyValue;

    use super::*;

    fn read_utf16(ptr: *const u16) -> String {
        assert!(!ptr.is_null());
        // SAFETY: every string handed out by this library is NUL-terminated.
        unsafe {
            let mut len = 0;
            while *ptr.add(len) != 0 {
                len += 1;
            }
            String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
        }
    }

    const STORE_PATH: &str = "C:\\Windows\\System32\\DriverStore\\FileRepository\\nv.inf_amd64";

    fn fake_platform() -> FakePlatform {
        let platform = FakePlatform::default();
        let adapter = FakeAdapter::new(1).display().compute();
        platform.pnp.set_devices(vec![pnp_device(
            &adapter.hardware_id(),
            "4&2F0F4D2C&0&0008",
            PropertyValue::Int64(1),
        )]);
        platform.adapters.set_adapters(vec![adapter]);
        platform.driver.add_adapter(
            1,
            "\\SystemRoot\\System32\\DriverStore\\FileRepository\\nv.inf_amd64",
        );
        platform.driver.add_subkey(
            "CopyToVmOverwrite",
            vec![("cuda", vec!["nvcuda64.dll", "nvcuda.dll"])],
        );
        platform.driver.add_subkey(
            "CopyToVmOverwriteWow64",
            vec![("cuda", vec!["nvcuda32.dll", "nvcuda.dll"])],
        );
        platform
    }

    fn fake_instance(platform: &FakePlatform) -> *mut DiscoveryInstance {
        let config = DiscoveryConfig::default().with_system_root("C:\\Windows");
        let session = DiscoverySession::with_config(Box::new(platform.clone()), config);
        Box::into_raw(Box::new(DiscoveryInstance::with_session(session)))
    }

    #[test]
    fn version_matches_the_library() {
        assert_eq!(read_utf16(GetDiscoveryLibraryVersion()), DISCOVERY_LIBRARY_VERSION);
    }

    #[test]
    fn null_instance_returns_sentinels() {
        unsafe {
            assert!(DeviceDiscovery_GetLastErrorMessage(null_mut()).is_null());
            assert_eq!(DeviceDiscovery_DiscoverDevices(null_mut(), 0, 1, 1), -1);
            assert_eq!(DeviceDiscovery_GetNumDevices(null_mut()), -1);
            assert!(DeviceDiscovery_GetDeviceID(null_mut(), 0).is_null());
            DestroyDeviceDiscoveryInstance(null_mut());
        }
    }

    #[test]
    fn queries_before_discovery_fail_with_a_message() {
        let instance = CreateDeviceDiscoveryInstance();
        unsafe {
            assert_eq!(read_utf16(DeviceDiscovery_GetLastErrorMessage(instance)), "");
            assert_eq!(DeviceDiscovery_IsRefreshRequired(instance), 1);

            assert_eq!(DeviceDiscovery_GetNumDevices(instance), -1);
            assert_eq!(
                read_utf16(DeviceDiscovery_GetLastErrorMessage(instance)),
                "attempted to retrieve device count before performing device discovery"
            );

            assert!(DeviceDiscovery_GetDeviceVendor(instance, 0).is_null());
            assert_eq!(DeviceDiscovery_GetDeviceAdapterLUID(instance, 0), -1);
            assert_eq!(DeviceDiscovery_IsDeviceIntegrated(instance, 0), -1);
            assert_eq!(DeviceDiscovery_GetNumRuntimeFilesWow64(instance, 0), -1);
            assert!(DeviceDiscovery_GetRuntimeFileSource(instance, 0, 0).is_null());
            DestroyDeviceDiscoveryInstance(instance);
        }
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let instance = CreateDeviceDiscoveryInstance();
        unsafe {
            assert_eq!(DeviceDiscovery_DiscoverDevices(instance, 42, 1, 1), -1);
            assert_eq!(
                read_utf16(DeviceDiscovery_GetLastErrorMessage(instance)),
                "unknown device filter value: 42"
            );
            DestroyDeviceDiscoveryInstance(instance);
        }
    }

    #[test]
    fn discovered_devices_are_exposed_as_utf16() {
        let platform = fake_platform();
        let instance = fake_instance(&platform);
        unsafe {
            assert_eq!(DeviceDiscovery_DiscoverDevices(instance, 0, 1, 1), 0);
            assert_eq!(read_utf16(DeviceDiscovery_GetLastErrorMessage(instance)), "");
            assert_eq!(DeviceDiscovery_IsRefreshRequired(instance), 0);
            assert_eq!(DeviceDiscovery_GetNumDevices(instance), 1);

            assert_eq!(
                read_utf16(DeviceDiscovery_GetDeviceID(instance, 0)),
                "PCI\\VEN_10DE&DEV_2001&SUBSYS_14671458&REV_A1\\4&2F0F4D2C&0&0008"
            );
            assert_eq!(
                read_utf16(DeviceDiscovery_GetDeviceDescription(instance, 0)),
                "NVIDIA GeForce RTX 3090"
            );
            assert_eq!(read_utf16(DeviceDiscovery_GetDeviceVendor(instance, 0)), "NVIDIA");
            assert_eq!(
                read_utf16(DeviceDiscovery_GetDeviceLocationPath(instance, 0)),
                "PCIROOT(0)#PCI(0100)#PCI(0000)"
            );
            assert_eq!(
                read_utf16(DeviceDiscovery_GetDeviceDriverStorePath(instance, 0)),
                STORE_PATH
            );
            assert_eq!(DeviceDiscovery_GetDeviceAdapterLUID(instance, 0), 1);
            assert_eq!(DeviceDiscovery_IsDeviceIntegrated(instance, 0), 0);
            assert_eq!(DeviceDiscovery_DoesDeviceSupportCompute(instance, 0), 1);

            assert_eq!(DeviceDiscovery_GetNumRuntimeFiles(instance, 0), 1);
            assert_eq!(
                read_utf16(DeviceDiscovery_GetRuntimeFileSource(instance, 0, 0)),
                "nvcuda64.dll"
            );
            assert_eq!(
                read_utf16(DeviceDiscovery_GetRuntimeFileDestination(instance, 0, 0)),
                "nvcuda.dll"
            );
            assert_eq!(DeviceDiscovery_GetNumRuntimeFilesWow64(instance, 0), 1);
            assert_eq!(
                read_utf16(DeviceDiscovery_GetRuntimeFileSourceWow64(instance, 0, 0)),
                "nvcuda32.dll"
            );
            assert_eq!(
                read_utf16(DeviceDiscovery_GetRuntimeFileDestinationWow64(instance, 0, 0)),
                "nvcuda.dll"
            );

            assert!(DeviceDiscovery_GetRuntimeFileSource(instance, 0, 1).is_null());
            assert!(DeviceDiscovery_GetDeviceID(instance, 1).is_null());
            assert_eq!(
                read_utf16(DeviceDiscovery_GetLastErrorMessage(instance)),
                "requested device index is invalid: 1"
            );
            DestroyDeviceDiscoveryInstance(instance);
        }
    }

    #[test]
    fn failed_rediscovery_keeps_previous_strings() {
        let platform = fake_platform();
        let instance = fake_instance(&platform);
        unsafe {
            assert_eq!(DeviceDiscovery_DiscoverDevices(instance, 0, 1, 1), 0);
            let id = DeviceDiscovery_GetDeviceID(instance, 0);
            let source = DeviceDiscovery_GetRuntimeFileSource(instance, 0, 0);
            let expected_id = read_utf16(id);

            platform.pnp.fail_queries(true);
            assert_eq!(DeviceDiscovery_DiscoverDevices(instance, 0, 1, 1), -1);
            assert!(read_utf16(DeviceDiscovery_GetLastErrorMessage(instance))
                .starts_with("retrieving PnP devices for DirectX adapters"));

            assert_eq!(DeviceDiscovery_GetNumDevices(instance), 1);
            assert_eq!(DeviceDiscovery_GetDeviceID(instance, 0), id);
            assert_eq!(read_utf16(id), expected_id);
            assert_eq!(DeviceDiscovery_GetRuntimeFileSource(instance, 0, 0), source);
            assert_eq!(read_utf16(source), "nvcuda64.dll");
            assert_eq!(
                read_utf16(DeviceDiscovery_GetDeviceDriverStorePath(instance, 0)),
                STORE_PATH
            );
            DestroyDeviceDiscoveryInstance(instance);
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn discovery_is_unsupported_off_windows() {
        let instance = CreateDeviceDiscoveryInstance();
        unsafe {
            assert_eq!(DeviceDiscovery_DiscoverDevices(instance, 0, 1, 1), -1);
            let message = read_utf16(DeviceDiscovery_GetLastErrorMessage(instance));
            assert!(message.ends_with("device discovery is not supported on this platform"));
            assert_eq!(DeviceDiscovery_IsRefreshRequired(instance), 1);
            DestroyDeviceDiscoveryInstance(instance);
        }
    }
}
