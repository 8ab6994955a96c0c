// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

//! Contracts of the platform services the discovery pipeline runs on.

use std::collections::BTreeMap;

use crate::adapter::AdapterAttribute;
use crate::adapter::HardwareId;
use crate::discovery_defines::DiscoveryResult;
use crate::properties::PnpQuery;
use crate::properties::PropertyBag;
use crate::registry::FilesystemQuery;
use crate::registry::QueryOutcome;
use crate::registry::RegistryPath;

/// Constructs the three platform services for a session.
pub trait PlatformProvider {
    fn adapter_backend(&self) -> DiscoveryResult<Box<dyn AdapterBackend>>;

    fn pnp_backend(&self) -> DiscoveryResult<Box<dyn PnpBackend>>;

    fn driver_backend(&self) -> DiscoveryResult<Box<dyn DriverBackend>>;
}

/// The adapter enumeration service.
pub trait AdapterBackend {
    /// Lists the adapters that support `attribute`.
    fn create_adapter_list(&self, attribute: AdapterAttribute)
        -> DiscoveryResult<Box<dyn AdapterList>>;
}

pub trait AdapterList {
    fn adapter_count(&self) -> usize;

    fn adapter(&self, index: usize) -> DiscoveryResult<Box<dyn AdapterInfo>>;

    /// Set by the platform once the hardware topology changed after the list was created.
    fn is_stale(&self) -> bool;
}

pub trait AdapterInfo {
    fn instance_luid(&self) -> DiscoveryResult<i64>;

    fn hardware_id(&self) -> DiscoveryResult<HardwareId>;

    fn is_hardware(&self) -> DiscoveryResult<bool>;

    fn is_integrated(&self) -> DiscoveryResult<bool>;

    fn is_detachable(&self) -> DiscoveryResult<bool>;

    fn supports_attribute(&self, attribute: AdapterAttribute) -> bool;
}

/// The PnP device query service.
pub trait PnpBackend {
    /// Returns the property bags of the devices selected by `query`, in platform order.
    fn query_devices(&self, query: &PnpQuery) -> DiscoveryResult<Vec<Box<dyn PropertyBag>>>;
}

/// The driver and registry query service.
pub trait DriverBackend {
    /// Opens the adapter with the given LUID. The handle is released when the result is dropped.
    fn open_adapter(&self, instance_luid: i64) -> DiscoveryResult<Box<dyn DriverAdapter>>;

    fn open_registry_key(&self, path: &RegistryPath) -> DiscoveryResult<Box<dyn RegistryKey>>;
}

pub trait DriverAdapter {
    /// Issues one filesystem path query with a trailing output buffer of `capacity` bytes.
    fn query_filesystem_path(
        &self,
        query: FilesystemQuery,
        capacity: usize,
    ) -> DiscoveryResult<QueryOutcome>;
}

pub trait RegistryKey {
    /// Enumerates every value of the key, all of which must be REG_MULTI_SZ.
    fn multi_string_values(&self) -> DiscoveryResult<BTreeMap<String, Vec<String>>>;
}
