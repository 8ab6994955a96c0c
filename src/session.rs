// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::catalog::AdapterCatalog;
use crate::config::DiscoveryConfig;
use crate::correlator::DeviceCorrelator;
use crate::device::DeviceRecord;
use crate::device::RuntimeFileEntry;
use crate::device::RuntimeFileList;
use crate::discovery_defines::CapabilityFilter;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::ResultExt;
use crate::discovery_log;
use crate::resolver::DriverMetadataResolver;
use crate::sys::platform::NativeProvider;
use crate::traits::PlatformProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Discovering,
    Ready,
    Failed,
}

/// Per-device values exposed by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceField {
    AdapterLuid,
    Id,
    Description,
    DriverRegistryKey,
    DriverStorePath,
    LocationPath,
    Vendor,
    IsIntegrated,
    IsDetachable,
    SupportsDisplay,
    SupportsCompute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceFieldValue<'a> {
    Integer(i64),
    Text(&'a str),
    Flag(bool),
}

impl fmt::Display for DeviceFieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFieldValue::Integer(v) => write!(f, "{v}"),
            DeviceFieldValue::Text(s) => f.write_str(s),
            DeviceFieldValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

struct Pipeline {
    catalog: AdapterCatalog,
    correlator: DeviceCorrelator,
    resolver: DriverMetadataResolver,
}

impl Pipeline {
    fn new(provider: &dyn PlatformProvider, config: &DiscoveryConfig) -> DiscoveryResult<Pipeline> {
        Ok(Pipeline {
            catalog: AdapterCatalog::new(
                provider
                    .adapter_backend()
                    .context("creating adapter enumeration backend")?,
                config.logger.clone(),
            ),
            correlator: DeviceCorrelator::new(
                provider.pnp_backend().context("creating PnP device backend")?,
                config.logger.clone(),
            ),
            resolver: DriverMetadataResolver::new(
                provider
                    .driver_backend()
                    .context("creating driver query backend")?,
                config,
            ),
        })
    }

    fn run(
        &mut self,
        filter: CapabilityFilter,
        include_integrated: bool,
        include_detachable: bool,
    ) -> DiscoveryResult<Vec<DeviceRecord>> {
        let adapters = self
            .catalog
            .enumerate(filter, include_integrated, include_detachable)
            .context("enumerating DirectX adapters")?;

        let mut devices = self
            .correlator
            .correlate(adapters)
            .context("retrieving PnP devices for DirectX adapters")?;

        for device in devices.iter_mut() {
            self.resolver
                .resolve(device)
                .with_context(|| format!("retrieving driver details for device {}", device.id))?;
        }

        Ok(devices)
    }
}

/// Runs device discovery and holds the devices of the latest successful run.
///
/// A session is not internally synchronized; separate sessions are independent.
pub struct DiscoverySession {
    provider: Box<dyn PlatformProvider>,
    config: DiscoveryConfig,
    pipeline: Option<Pipeline>,
    devices: Option<Vec<DeviceRecord>>,
    state: SessionState,
    last_error: String,
}

impl DiscoverySession {
    pub fn new(provider: Box<dyn PlatformProvider>) -> DiscoverySession {
        DiscoverySession::with_config(provider, DiscoveryConfig::default())
    }

    pub fn with_config(
        provider: Box<dyn PlatformProvider>,
        config: DiscoveryConfig,
    ) -> DiscoverySession {
        DiscoverySession {
            provider,
            config,
            pipeline: None,
            devices: None,
            state: SessionState::Uninitialized,
            last_error: String::new(),
        }
    }

    /// A session backed by the platform's own services.
    pub fn native(config: DiscoveryConfig) -> DiscoverySession {
        DiscoverySession::with_config(Box::new(NativeProvider::new()), config)
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Empty when the last tracked call succeeded.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Discovers the devices matching the filter. The device list is only replaced when every
    /// stage succeeds.
    pub fn discover(
        &mut self,
        filter: CapabilityFilter,
        include_integrated: bool,
        include_detachable: bool,
    ) -> DiscoveryResult<()> {
        self.state = SessionState::Discovering;
        discovery_log!(
            self.config.logger,
            "discovering devices: filter={filter} include_integrated={include_integrated} \
             include_detachable={include_detachable}"
        );

        let result = self.run_pipeline(filter, include_integrated, include_detachable);
        match result {
            Ok(devices) => {
                discovery_log!(self.config.logger, "discovered {} devices", devices.len());
                self.devices = Some(devices);
                self.state = SessionState::Ready;
                self.last_error.clear();
                Ok(())
            }
            Err(e) => {
                discovery_log!(self.config.logger, "device discovery failed: {e}");
                self.state = SessionState::Failed;
                self.last_error = e.to_string();
                Err(e)
            }
        }
    }

    fn run_pipeline(
        &mut self,
        filter: CapabilityFilter,
        include_integrated: bool,
        include_detachable: bool,
    ) -> DiscoveryResult<Vec<DeviceRecord>> {
        let mut pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => Pipeline::new(self.provider.as_ref(), &self.config)?,
        };
        let result = pipeline.run(filter, include_integrated, include_detachable);
        self.pipeline = Some(pipeline);
        result
    }

    /// True until a discovery succeeded, and whenever the platform reports that the adapters
    /// changed since.
    pub fn is_refresh_required(&self) -> bool {
        match (&self.devices, &self.pipeline) {
            (Some(_), Some(pipeline)) => pipeline.catalog.is_stale(),
            _ => true,
        }
    }

    /// Records the outcome of a query in the last error slot.
    pub fn track<T>(&mut self, result: DiscoveryResult<T>) -> DiscoveryResult<T> {
        match &result {
            Ok(_) => self.last_error.clear(),
            Err(e) => self.last_error = e.to_string(),
        }
        result
    }

    pub fn devices(&self) -> DiscoveryResult<&[DeviceRecord]> {
        self.devices
            .as_deref()
            .ok_or(DiscoveryError::NotDiscovered("devices"))
    }

    pub fn device_count(&self) -> DiscoveryResult<usize> {
        self.devices
            .as_ref()
            .map(Vec::len)
            .ok_or(DiscoveryError::NotDiscovered("device count"))
    }

    pub fn device(&self, index: usize) -> DiscoveryResult<&DeviceRecord> {
        self.devices
            .as_ref()
            .ok_or(DiscoveryError::NotDiscovered("device details"))?
            .get(index)
            .ok_or(DiscoveryError::InvalidDeviceIndex(index))
    }

    pub fn device_field(
        &self,
        index: usize,
        field: DeviceField,
    ) -> DiscoveryResult<DeviceFieldValue<'_>> {
        let device = self.device(index)?;
        let value = match field {
            DeviceField::AdapterLuid => DeviceFieldValue::Integer(device.adapter.instance_luid),
            DeviceField::Id => DeviceFieldValue::Text(&device.id),
            DeviceField::Description => DeviceFieldValue::Text(&device.description),
            DeviceField::DriverRegistryKey => DeviceFieldValue::Text(&device.driver_registry_key),
            DeviceField::DriverStorePath => DeviceFieldValue::Text(&device.driver_store_path),
            DeviceField::LocationPath => DeviceFieldValue::Text(&device.location_path),
            DeviceField::Vendor => DeviceFieldValue::Text(&device.vendor),
            DeviceField::IsIntegrated => DeviceFieldValue::Flag(device.adapter.is_integrated),
            DeviceField::IsDetachable => DeviceFieldValue::Flag(device.adapter.is_detachable),
            DeviceField::SupportsDisplay => DeviceFieldValue::Flag(device.adapter.supports_display),
            DeviceField::SupportsCompute => DeviceFieldValue::Flag(device.adapter.supports_compute),
        };
        Ok(value)
    }

    pub fn runtime_file_count(
        &self,
        index: usize,
        list: RuntimeFileList,
    ) -> DiscoveryResult<usize> {
        Ok(self.device(index)?.runtime_files(list).len())
    }

    pub fn runtime_file(
        &self,
        index: usize,
        list: RuntimeFileList,
        file_index: usize,
    ) -> DiscoveryResult<&RuntimeFileEntry> {
        self.device(index)?
            .runtime_files(list)
            .get(file_index)
            .ok_or(DiscoveryError::InvalidFileIndex(file_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DiscoveryLogger;
    use crate::properties::PropertyValue;
    use crate::testing::pnp_device;
    use crate::testing::FakeAdapter;
    use crate::testing::FakePlatform;

    fn platform() -> FakePlatform {
        let platform = FakePlatform::default();
        let a = FakeAdapter::new(1).display().compute();
        let b = FakeAdapter::new(2).display().compute().integrated();

        platform.pnp.set_devices(vec![
            pnp_device(&a.hardware_id(), "4&1", PropertyValue::Int64(1)),
            pnp_device(&b.hardware_id(), "4&2", PropertyValue::String("2".to_string())),
        ]);
        platform.adapters.set_adapters(vec![a, b]);
        platform
            .driver
            .add_adapter(1, "\\SystemRoot\\System32\\DriverStore\\FileRepository\\a.inf");
        platform
            .driver
            .add_adapter(2, "\\SystemRoot\\System32\\DriverStore\\FileRepository\\b.inf");
        platform.driver.add_subkey(
            "CopyToVmOverwrite",
            vec![("cuda", vec!["nvcuda64.dll", "nvcuda.dll"]), ("ml", vec!["nvml.dll"])],
        );
        platform
    }

    fn session(platform: &FakePlatform) -> DiscoverySession {
        let config = DiscoveryConfig::default()
            .with_logger(DiscoveryLogger::new(true))
            .with_system_root("C:\\Windows");
        DiscoverySession::with_config(Box::new(platform.clone()), config)
    }

    #[test]
    fn accessors_fail_before_discovery() {
        let platform = platform();
        let mut session = session(&platform);

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.is_refresh_required());

        let result = session.device_count();
        let err = session.track(result).unwrap_err();
        assert_eq!(
            err.to_string(),
            "attempted to retrieve device count before performing device discovery"
        );
        assert_eq!(session.last_error(), err.to_string());
        assert!(session.device_field(0, DeviceField::Id).is_err());
        assert_eq!(platform.constructions(), 0);
    }

    #[test]
    fn discovery_populates_devices() {
        let platform = platform();
        let mut session = session(&platform);

        session.discover(CapabilityFilter::All, true, true).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.last_error(), "");
        assert!(!session.is_refresh_required());
        assert_eq!(session.device_count().unwrap(), 2);

        assert_eq!(
            session.device_field(0, DeviceField::AdapterLuid).unwrap(),
            DeviceFieldValue::Integer(1)
        );
        assert_eq!(
            session.device_field(1, DeviceField::IsIntegrated).unwrap(),
            DeviceFieldValue::Flag(true)
        );
        assert_eq!(
            session
                .device_field(0, DeviceField::DriverStorePath)
                .unwrap()
                .to_string(),
            "C:\\Windows\\System32\\DriverStore\\FileRepository\\a.inf"
        );
        assert_eq!(
            session.runtime_file_count(0, RuntimeFileList::Primary).unwrap(),
            2
        );
        assert_eq!(
            session
                .runtime_file(0, RuntimeFileList::Primary, 0)
                .unwrap()
                .destination_name,
            "nvcuda.dll"
        );
        assert_eq!(session.runtime_file_count(0, RuntimeFileList::Wow64).unwrap(), 0);
    }

    #[test]
    fn out_of_range_indices_leave_devices_untouched() {
        let platform = platform();
        let mut session = session(&platform);
        session.discover(CapabilityFilter::All, true, true).unwrap();
        let before = session.devices().unwrap().to_vec();

        let result = session.device_field(2, DeviceField::Id).map(|_| ());
        let err = session.track(result).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidDeviceIndex(2)));
        assert_eq!(session.last_error(), "requested device index is invalid: 2");

        let result = session.runtime_file(0, RuntimeFileList::Primary, 2).map(|_| ());
        let err = session.track(result).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidFileIndex(2)));
        assert!(err.is_index_error());

        assert_eq!(session.devices().unwrap(), before.as_slice());
        assert_eq!(session.state(), SessionState::Ready);

        let result = session.device_count();
        session.track(result).unwrap();
        assert_eq!(session.last_error(), "");
    }

    #[test]
    fn failed_discovery_keeps_previous_devices() {
        let platform = platform();
        let mut session = session(&platform);
        session.discover(CapabilityFilter::All, true, true).unwrap();
        let before = session.devices().unwrap().to_vec();

        platform.pnp.fail_queries(true);
        let err = session
            .discover(CapabilityFilter::All, false, true)
            .unwrap_err();
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session
            .last_error()
            .starts_with("retrieving PnP devices for DirectX adapters: querying PnP devices"));
        assert_eq!(session.last_error(), err.to_string());
        assert_eq!(session.devices().unwrap(), before.as_slice());

        platform.pnp.fail_queries(false);
        session.discover(CapabilityFilter::All, false, true).unwrap();
        assert_eq!(session.last_error(), "");
        assert_eq!(session.device_count().unwrap(), 1);
        assert_eq!(platform.constructions(), 1);
    }

    #[test]
    fn failed_resolution_leaves_no_partial_list() {
        let platform = platform();
        platform.driver.overflow_forever(2);
        let mut session = session(&platform);

        let err = session.discover(CapabilityFilter::All, true, true).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("retrieving driver details for device PCI\\VEN_10DE&DEV_2002"));
        assert!(matches!(err.root_cause(), DiscoveryError::QueryRetryLimit(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.device_count().is_err());
        assert!(session.is_refresh_required());
    }

    #[test]
    fn staleness_requires_refresh() {
        let platform = platform();
        let mut session = session(&platform);
        session.discover(CapabilityFilter::DisplaySupported, true, true).unwrap();
        assert!(!session.is_refresh_required());

        // An adapter is hot-plugged.
        platform.adapters.set_stale(true);
        platform
            .adapters
            .set_adapters(vec![FakeAdapter::new(1).display().compute()]);
        assert!(session.is_refresh_required());

        platform.adapters.set_stale(false);
        session.discover(CapabilityFilter::DisplaySupported, true, true).unwrap();
        assert!(!session.is_refresh_required());
        assert_eq!(session.device_count().unwrap(), 1);
    }

    #[test]
    fn display_and_compute_scenario() {
        let platform = FakePlatform::default();
        let a = FakeAdapter::new(1).display().compute().integrated();
        let b = FakeAdapter::new(2).display().compute();
        let c = FakeAdapter::new(3).display();
        platform.pnp.set_devices(
            [&a, &b, &c]
                .iter()
                .enumerate()
                .map(|(i, adapter)| {
                    pnp_device(
                        &adapter.hardware_id(),
                        &format!("4&{i}"),
                        PropertyValue::Int64(i as i64 + 1),
                    )
                })
                .collect(),
        );
        platform.adapters.set_adapters(vec![a, b, c]);
        for luid in 1..=3 {
            platform
                .driver
                .add_adapter(luid, "C:\\Windows\\System32\\DriverStore\\FileRepository\\x.inf");
        }

        let mut session = session(&platform);
        session
            .discover(CapabilityFilter::DisplayAndCompute, false, true)
            .unwrap();
        let luids: Vec<i64> = session
            .devices()
            .unwrap()
            .iter()
            .map(|d| d.adapter.instance_luid)
            .collect();
        assert_eq!(luids, vec![2]);
    }
}
