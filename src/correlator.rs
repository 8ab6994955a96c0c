// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use crate::adapter::AdapterSet;
use crate::device::DeviceRecord;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::ResultExt;
use crate::discovery_defines::DRIVER_CLASS_KEY_PREFIX;
use crate::discovery_log;
use crate::logging::DiscoveryLogger;
use crate::properties::PnpQuery;
use crate::properties::PropertyBag;
use crate::properties::ADAPTER_LUID_KEY;
use crate::properties::PROPERTY_DESCRIPTION;
use crate::properties::PROPERTY_DEVICE_ID;
use crate::properties::PROPERTY_DRIVER;
use crate::properties::PROPERTY_LOCATION_PATHS;
use crate::properties::PROPERTY_MANUFACTURER;
use crate::traits::PnpBackend;

/// Finds the PnP device behind each enumerated adapter.
pub struct DeviceCorrelator {
    backend: Box<dyn PnpBackend>,
    logger: DiscoveryLogger,
}

impl DeviceCorrelator {
    pub fn new(backend: Box<dyn PnpBackend>, logger: DiscoveryLogger) -> DeviceCorrelator {
        DeviceCorrelator { backend, logger }
    }

    /// Returns one device per PnP record whose adapter LUID is in `adapters`, in the order the
    /// platform reports them.
    pub fn correlate(&self, adapters: &AdapterSet) -> DiscoveryResult<Vec<DeviceRecord>> {
        if adapters.is_empty() {
            return Ok(Vec::new());
        }

        let query = PnpQuery::new(adapters.values().map(|a| a.hardware_id.pnp_pattern()));
        discovery_log!(self.logger, "querying {query}");

        let bags = self
            .backend
            .query_devices(&query)
            .context("querying PnP devices for the enumerated adapters")?;

        let mut devices = Vec::with_capacity(bags.len());
        for (index, bag) in bags.iter().enumerate() {
            let (mut device, luid) = read_device(bag.as_ref())
                .with_context(|| format!("reading properties of PnP device {index}"))?;

            let Some(luid) = luid else {
                discovery_log!(self.logger, "device {} has no adapter LUID, skipping", device.id);
                continue;
            };

            match adapters.get(&luid) {
                Some(adapter) => {
                    device.adapter = adapter.clone();
                    discovery_log!(
                        self.logger,
                        "matched device {} to adapter {:#x}",
                        device.id,
                        luid
                    );
                    devices.push(device);
                }
                None => {
                    discovery_log!(
                        self.logger,
                        "device {} belongs to adapter {:#x}, which was not enumerated",
                        device.id,
                        luid
                    );
                }
            }
        }

        Ok(devices)
    }
}

fn optional_string(bag: &dyn PropertyBag, name: &str) -> DiscoveryResult<Option<String>> {
    bag.get(name)?.map(|v| v.into_string(name)).transpose()
}

/// Reads the PnP properties of a device. The adapter is left as a placeholder.
fn read_device(bag: &dyn PropertyBag) -> DiscoveryResult<(DeviceRecord, Option<i64>)> {
    let id = optional_string(bag, PROPERTY_DEVICE_ID)?.ok_or_else(|| {
        DiscoveryError::message(format!("device has no {PROPERTY_DEVICE_ID} property"))
    })?;

    let driver_registry_key = optional_string(bag, PROPERTY_DRIVER)?
        .map(|key| format!("{DRIVER_CLASS_KEY_PREFIX}{key}"))
        .unwrap_or_default();

    let location_path = bag
        .get(PROPERTY_LOCATION_PATHS)?
        .map(|v| v.into_string_list(PROPERTY_LOCATION_PATHS))
        .transpose()?
        .and_then(|paths| paths.into_iter().next())
        .unwrap_or_default();

    let luid_name = ADAPTER_LUID_KEY.property_name();
    let luid = bag
        .get(&luid_name)?
        .map(|v| v.to_i64(&luid_name))
        .transpose()?;

    let device = DeviceRecord {
        description: optional_string(bag, PROPERTY_DESCRIPTION)?.unwrap_or_default(),
        vendor: optional_string(bag, PROPERTY_MANUFACTURER)?.unwrap_or_default(),
        id,
        driver_registry_key,
        location_path,
        ..Default::default()
    };

    Ok((device, luid))
}
