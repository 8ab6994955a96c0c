// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::traits::AdapterBackend;
use crate::traits::DriverBackend;
use crate::traits::PlatformProvider;
use crate::traits::PnpBackend;

/// DirectX adapters only exist on Windows; every backend request fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeProvider;

impl NativeProvider {
    pub fn new() -> NativeProvider {
        NativeProvider
    }
}

impl PlatformProvider for NativeProvider {
    fn adapter_backend(&self) -> DiscoveryResult<Box<dyn AdapterBackend>> {
        Err(DiscoveryError::UnsupportedPlatform)
    }

    fn pnp_backend(&self) -> DiscoveryResult<Box<dyn PnpBackend>> {
        Err(DiscoveryError::UnsupportedPlatform)
    }

    fn driver_backend(&self) -> DiscoveryResult<Box<dyn DriverBackend>> {
        Err(DiscoveryError::UnsupportedPlatform)
    }
}
