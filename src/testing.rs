// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

//! In-memory platform backends for unit tests.

use std::cell::Cell;
use std::cell::Ref;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::rc::Rc;

use crate::adapter::AdapterAttribute;
use crate::adapter::HardwareId;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
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
use crate::registry::FilesystemQuery;
use crate::registry::QueryOutcome;
use crate::registry::RegistryPath;
use crate::traits::AdapterBackend;
use crate::traits::AdapterInfo;
use crate::traits::AdapterList;
use crate::traits::DriverAdapter;
use crate::traits::DriverBackend;
use crate::traits::PlatformProvider;
use crate::traits::PnpBackend;
use crate::traits::RegistryKey;

pub const DRIVER_KEY: &str = "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Class\\\
                              {4d36e968-e325-11ce-bfc1-08002be10318}\\0000";

const STATUS_INVALID_PARAMETER: i32 = 0xC000000Du32 as i32;
const ERROR_FILE_NOT_FOUND: u32 = 2;

#[derive(Clone, Debug)]
pub struct FakeAdapter {
    luid: i64,
    hardware_id: HardwareId,
    hardware: bool,
    integrated: bool,
    detachable: bool,
    attributes: Vec<AdapterAttribute>,
    broken_luid: bool,
}

impl FakeAdapter {
    pub fn new(luid: i64) -> FakeAdapter {
        FakeAdapter {
            luid,
            hardware_id: HardwareId {
                vendor_id: 0x10de,
                device_id: 0x2000 + luid as u32,
                subsystem_id: 0x1467_1458,
                revision: 0xa1,
            },
            hardware: true,
            integrated: false,
            detachable: false,
            attributes: Vec::new(),
            broken_luid: false,
        }
    }

    pub fn hardware_id(&self) -> HardwareId {
        self.hardware_id
    }

    pub fn display(mut self) -> FakeAdapter {
        self.attributes.push(AdapterAttribute::D3D11Graphics);
        self.attributes.push(AdapterAttribute::D3D12Graphics);
        self
    }

    pub fn display_d3d11_only(mut self) -> FakeAdapter {
        self.attributes.push(AdapterAttribute::D3D11Graphics);
        self
    }

    pub fn compute(mut self) -> FakeAdapter {
        self.attributes.push(AdapterAttribute::D3D12CoreCompute);
        self
    }

    pub fn integrated(mut self) -> FakeAdapter {
        self.integrated = true;
        self
    }

    pub fn detachable(mut self) -> FakeAdapter {
        self.detachable = true;
        self
    }

    pub fn software(mut self) -> FakeAdapter {
        self.hardware = false;
        self
    }

    pub fn revision(mut self, revision: u32) -> FakeAdapter {
        self.hardware_id.revision = revision;
        self
    }

    pub fn broken_luid(mut self) -> FakeAdapter {
        self.broken_luid = true;
        self
    }
}

impl AdapterInfo for FakeAdapter {
    fn instance_luid(&self) -> DiscoveryResult<i64> {
        if self.broken_luid {
            return Err(DiscoveryError::Hresult {
                operation: "IDXCoreAdapter::GetProperty".to_string(),
                code: 0x887A0022u32 as i32,
                message: "the adapter was removed".to_string(),
            });
        }
        Ok(self.luid)
    }

    fn hardware_id(&self) -> DiscoveryResult<HardwareId> {
        Ok(self.hardware_id)
    }

    fn is_hardware(&self) -> DiscoveryResult<bool> {
        Ok(self.hardware)
    }

    fn is_integrated(&self) -> DiscoveryResult<bool> {
        Ok(self.integrated)
    }

    fn is_detachable(&self) -> DiscoveryResult<bool> {
        Ok(self.detachable)
    }

    fn supports_attribute(&self, attribute: AdapterAttribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

#[derive(Default)]
struct AdapterState {
    adapters: RefCell<Vec<FakeAdapter>>,
    stale: Rc<Cell<bool>>,
    fail: Cell<bool>,
    requested: RefCell<Vec<AdapterAttribute>>,
}

/// Lists a fixed set of adapters; every list it created shares one staleness switch.
#[derive(Clone, Default)]
pub struct FakeAdapterBackend {
    state: Rc<AdapterState>,
}

impl FakeAdapterBackend {
    pub fn new(adapters: Vec<FakeAdapter>) -> FakeAdapterBackend {
        let backend = FakeAdapterBackend::default();
        backend.set_adapters(adapters);
        backend
    }

    pub fn set_adapters(&self, adapters: Vec<FakeAdapter>) {
        *self.state.adapters.borrow_mut() = adapters;
    }

    pub fn set_stale(&self, stale: bool) {
        self.state.stale.set(stale);
    }

    pub fn fail_list_creation(&self, fail: bool) {
        self.state.fail.set(fail);
    }

    pub fn requested_attributes(&self) -> Ref<'_, Vec<AdapterAttribute>> {
        self.state.requested.borrow()
    }
}

impl AdapterBackend for FakeAdapterBackend {
    fn create_adapter_list(
        &self,
        attribute: AdapterAttribute,
    ) -> DiscoveryResult<Box<dyn AdapterList>> {
        self.state.requested.borrow_mut().push(attribute);
        if self.state.fail.get() {
            return Err(DiscoveryError::Hresult {
                operation: "IDXCoreAdapterFactory::CreateAdapterList".to_string(),
                code: 0x80004005u32 as i32,
                message: "unspecified error".to_string(),
            });
        }

        let adapters = self
            .state
            .adapters
            .borrow()
            .iter()
            .filter(|a| a.supports_attribute(attribute))
            .cloned()
            .collect();
        Ok(Box::new(FakeAdapterList {
            adapters,
            stale: self.state.stale.clone(),
        }))
    }
}

struct FakeAdapterList {
    adapters: Vec<FakeAdapter>,
    stale: Rc<Cell<bool>>,
}

impl AdapterList for FakeAdapterList {
    fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    fn adapter(&self, index: usize) -> DiscoveryResult<Box<dyn AdapterInfo>> {
        self.adapters
            .get(index)
            .map(|a| Box::new(a.clone()) as Box<dyn AdapterInfo>)
            .ok_or_else(|| DiscoveryError::message(format!("no adapter at index {index}")))
    }

    fn is_stale(&self) -> bool {
        self.stale.get()
    }
}

/// The property bag of a PnP display device belonging to an adapter with `hardware_id`.
pub fn pnp_device(hardware_id: &HardwareId, instance: &str, luid: PropertyValue) -> PropertyMap {
    PropertyMap::new()
        .with(
            PROPERTY_DEVICE_ID,
            PropertyValue::String(format!("{}\\{}", hardware_id.pnp_pattern().prefix(), instance)),
        )
        .with(
            PROPERTY_DESCRIPTION,
            PropertyValue::String("NVIDIA GeForce RTX 3090".to_string()),
        )
        .with(PROPERTY_MANUFACTURER, PropertyValue::String("NVIDIA".to_string()))
        .with(
            PROPERTY_DRIVER,
            PropertyValue::String("{4d36e968-e325-11ce-bfc1-08002be10318}\\0000".to_string()),
        )
        .with(
            PROPERTY_LOCATION_PATHS,
            PropertyValue::StringList(vec![
                "PCIROOT(0)#PCI(0100)#PCI(0000)".to_string(),
                "ACPI(_SB_)#ACPI(PCI0)#ACPI(PEG0)#ACPI(PEGP)".to_string(),
            ]),
        )
        .with(ADAPTER_LUID_KEY.property_name(), luid)
}

#[derive(Default)]
struct PnpState {
    devices: RefCell<Vec<PropertyMap>>,
    queries: RefCell<Vec<PnpQuery>>,
    fail: Cell<bool>,
}

/// Returns the stored devices whose ID matches the query.
#[derive(Clone, Default)]
pub struct FakePnpBackend {
    state: Rc<PnpState>,
}

impl FakePnpBackend {
    pub fn new(devices: Vec<PropertyMap>) -> FakePnpBackend {
        let backend = FakePnpBackend::default();
        backend.set_devices(devices);
        backend
    }

    pub fn set_devices(&self, devices: Vec<PropertyMap>) {
        *self.state.devices.borrow_mut() = devices;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.fail.set(fail);
    }

    pub fn query_count(&self) -> usize {
        self.state.queries.borrow().len()
    }

    pub fn last_query(&self) -> Option<PnpQuery> {
        self.state.queries.borrow().last().cloned()
    }
}

impl PnpBackend for FakePnpBackend {
    fn query_devices(&self, query: &PnpQuery) -> DiscoveryResult<Vec<Box<dyn PropertyBag>>> {
        self.state.queries.borrow_mut().push(query.clone());
        if self.state.fail.get() {
            return Err(DiscoveryError::Win32 {
                operation: "SetupDiGetClassDevsW".to_string(),
                code: 13,
            });
        }

        let mut bags: Vec<Box<dyn PropertyBag>> = Vec::new();
        for device in self.state.devices.borrow().iter() {
            let selected = match device.get(PROPERTY_DEVICE_ID)? {
                Some(PropertyValue::String(id)) => query.matches(&id),
                _ => true,
            };
            if selected {
                bags.push(Box::new(device.clone()));
            }
        }
        Ok(bags)
    }
}

#[derive(Clone, Default)]
struct FakeStore {
    path: String,
    required: usize,
    endless: bool,
}

#[derive(Clone, Default)]
struct FakeKey {
    values: BTreeMap<String, Vec<String>>,
    broken: bool,
}

#[derive(Default)]
struct DriverState {
    adapters: RefCell<HashMap<i64, FakeStore>>,
    keys: RefCell<HashMap<String, FakeKey>>,
    capacities: Rc<RefCell<Vec<usize>>>,
    opened_keys: Cell<usize>,
}

/// Driver store paths per LUID plus the runtime file subkeys under [`DRIVER_KEY`].
#[derive(Clone, Default)]
pub struct FakeDriverBackend {
    state: Rc<DriverState>,
}

impl FakeDriverBackend {
    pub fn new() -> FakeDriverBackend {
        Default::default()
    }

    pub fn add_adapter(&self, luid: i64, store_path: &str) {
        self.state.adapters.borrow_mut().insert(
            luid,
            FakeStore {
                path: store_path.to_string(),
                ..Default::default()
            },
        );
    }

    /// Makes queries on `luid` overflow until the buffer holds `bytes` bytes.
    pub fn require_buffer(&self, luid: i64, bytes: usize) {
        if let Some(store) = self.state.adapters.borrow_mut().get_mut(&luid) {
            store.required = bytes;
        }
    }

    pub fn overflow_forever(&self, luid: i64) {
        if let Some(store) = self.state.adapters.borrow_mut().get_mut(&luid) {
            store.endless = true;
        }
    }

    pub fn add_subkey(&self, subkey: &str, values: Vec<(&str, Vec<&str>)>) {
        let values = values
            .into_iter()
            .map(|(name, strings)| {
                (
                    name.to_string(),
                    strings.into_iter().map(String::from).collect(),
                )
            })
            .collect();
        self.state.keys.borrow_mut().insert(
            format!("{DRIVER_KEY}\\{subkey}"),
            FakeKey {
                values,
                broken: false,
            },
        );
    }

    /// Makes enumerating `subkey` fail as if it held a value that is not REG_MULTI_SZ.
    pub fn break_subkey(&self, subkey: &str) {
        self.state
            .keys
            .borrow_mut()
            .entry(format!("{DRIVER_KEY}\\{subkey}"))
            .or_default()
            .broken = true;
    }

    /// Buffer sizes of every driver store path query, in order.
    pub fn query_capacities(&self) -> Vec<usize> {
        self.state.capacities.borrow().clone()
    }

    pub fn opened_keys(&self) -> usize {
        self.state.opened_keys.get()
    }
}

impl DriverBackend for FakeDriverBackend {
    fn open_adapter(&self, instance_luid: i64) -> DiscoveryResult<Box<dyn DriverAdapter>> {
        let store = self
            .state
            .adapters
            .borrow()
            .get(&instance_luid)
            .cloned()
            .ok_or(DiscoveryError::NtStatus {
                operation: "D3DKMTOpenAdapterFromLuid".to_string(),
                status: STATUS_INVALID_PARAMETER,
            })?;

        Ok(Box::new(FakeDriverAdapter {
            store,
            capacities: self.state.capacities.clone(),
        }))
    }

    fn open_registry_key(&self, path: &RegistryPath) -> DiscoveryResult<Box<dyn RegistryKey>> {
        self.state.opened_keys.set(self.state.opened_keys.get() + 1);
        let key = self
            .state
            .keys
            .borrow()
            .get(&path.to_string())
            .cloned()
            .ok_or(DiscoveryError::Win32 {
                operation: "RegOpenKeyExW".to_string(),
                code: ERROR_FILE_NOT_FOUND,
            })?;
        Ok(Box::new(key))
    }
}

struct FakeDriverAdapter {
    store: FakeStore,
    capacities: Rc<RefCell<Vec<usize>>>,
}

impl DriverAdapter for FakeDriverAdapter {
    fn query_filesystem_path(
        &self,
        _query: FilesystemQuery,
        capacity: usize,
    ) -> DiscoveryResult<QueryOutcome> {
        self.capacities.borrow_mut().push(capacity);
        if self.store.endless {
            return Ok(QueryOutcome::BufferOverflow {
                required: capacity + 64,
            });
        }
        if capacity < self.store.required {
            return Ok(QueryOutcome::BufferOverflow {
                required: self.store.required,
            });
        }
        Ok(QueryOutcome::Complete(self.store.path.clone()))
    }
}

impl RegistryKey for FakeKey {
    fn multi_string_values(&self) -> DiscoveryResult<BTreeMap<String, Vec<String>>> {
        if self.broken {
            return Err(DiscoveryError::message(
                "registry value InstalledDisplayDrivers has type 1, expected REG_MULTI_SZ",
            ));
        }
        Ok(self.values.clone())
    }
}

/// Hands out clones of the fake backends and counts how often it was asked.
#[derive(Clone, Default)]
pub struct FakePlatform {
    pub adapters: FakeAdapterBackend,
    pub pnp: FakePnpBackend,
    pub driver: FakeDriverBackend,
    constructed: Rc<Cell<usize>>,
}

impl FakePlatform {
    /// How many times the backends were constructed.
    pub fn constructions(&self) -> usize {
        self.constructed.get()
    }
}

impl PlatformProvider for FakePlatform {
    fn adapter_backend(&self) -> DiscoveryResult<Box<dyn AdapterBackend>> {
        self.constructed.set(self.constructed.get() + 1);
        Ok(Box::new(self.adapters.clone()))
    }

    fn pnp_backend(&self) -> DiscoveryResult<Box<dyn PnpBackend>> {
        Ok(Box::new(self.pnp.clone()))
    }

    fn driver_backend(&self) -> DiscoveryResult<Box<dyn DriverBackend>> {
        Ok(Box::new(self.driver.clone()))
    }
}
