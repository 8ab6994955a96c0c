// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

mod d3dkmt;
mod dxcore;
mod macros;
mod registry;
mod setupapi;

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use crate::discovery_defines::DiscoveryResult;
use crate::registry::RegistryPath;
use crate::traits::AdapterBackend;
use crate::traits::DriverAdapter;
use crate::traits::DriverBackend;
use crate::traits::PlatformProvider;
use crate::traits::PnpBackend;
use crate::traits::RegistryKey;

pub use d3dkmt::KernelAdapter;
pub use dxcore::DxCoreBackend;
pub use registry::OpenedKey;
pub use setupapi::SetupApiBackend;

/// Encodes `s` as a NUL-terminated wide string.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

/// Kernel thunks for adapter queries, Win32 registry for runtime file keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelDriverBackend;

impl DriverBackend for KernelDriverBackend {
    fn open_adapter(&self, instance_luid: i64) -> DiscoveryResult<Box<dyn DriverAdapter>> {
        Ok(Box::new(KernelAdapter::open(instance_luid)?))
    }

    fn open_registry_key(&self, path: &RegistryPath) -> DiscoveryResult<Box<dyn RegistryKey>> {
        Ok(Box::new(OpenedKey::open(path)?))
    }
}

/// DXCore for adapters, SetupAPI for PnP devices and D3DKMT for driver details.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeProvider;

impl NativeProvider {
    pub fn new() -> NativeProvider {
        NativeProvider
    }
}

impl PlatformProvider for NativeProvider {
    fn adapter_backend(&self) -> DiscoveryResult<Box<dyn AdapterBackend>> {
        Ok(Box::new(DxCoreBackend::new()?))
    }

    fn pnp_backend(&self) -> DiscoveryResult<Box<dyn PnpBackend>> {
        Ok(Box::new(SetupApiBackend))
    }

    fn driver_backend(&self) -> DiscoveryResult<Box<dyn DriverBackend>> {
        Ok(Box::new(KernelDriverBackend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_strings_are_terminated() {
        assert_eq!(to_wide("PCI"), vec![b'P' as u16, b'C' as u16, b'I' as u16, 0]);
        assert_eq!(to_wide(""), vec![0]);
    }
}
