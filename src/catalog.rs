// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use crate::adapter::AdapterAttribute;
use crate::adapter::AdapterRecord;
use crate::adapter::AdapterSet;
use crate::discovery_defines::CapabilityFilter;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::ResultExt;
use crate::discovery_log;
use crate::logging::DiscoveryLogger;
use crate::traits::AdapterBackend;
use crate::traits::AdapterInfo;
use crate::traits::AdapterList;

/// Enumerates the DirectX adapters of the system and keeps the adapter lists of the latest
/// enumeration so that hardware topology changes can be detected.
pub struct AdapterCatalog {
    backend: Box<dyn AdapterBackend>,
    logger: DiscoveryLogger,
    lists: Vec<Box<dyn AdapterList>>,
    adapters: AdapterSet,
    enumerated: bool,
}

impl AdapterCatalog {
    pub fn new(backend: Box<dyn AdapterBackend>, logger: DiscoveryLogger) -> AdapterCatalog {
        AdapterCatalog {
            backend,
            logger,
            lists: Vec::new(),
            adapters: AdapterSet::new(),
            enumerated: false,
        }
    }

    /// Lists the adapters that pass `filter` and the integrated/detachable gates.
    ///
    /// The previous result is only replaced once the whole enumeration succeeded.
    pub fn enumerate(
        &mut self,
        filter: CapabilityFilter,
        include_integrated: bool,
        include_detachable: bool,
    ) -> DiscoveryResult<&AdapterSet> {
        let mut lists = Vec::new();
        let mut adapters = AdapterSet::new();

        for attribute in AdapterAttribute::groups_for(filter) {
            let list = self
                .backend
                .create_adapter_list(attribute)
                .with_context(|| format!("creating adapter list for attribute {attribute}"))?;

            let count = list.adapter_count();
            discovery_log!(self.logger, "{count} adapters support {attribute}");

            for index in 0..count {
                let info = list
                    .adapter(index)
                    .with_context(|| format!("retrieving adapter {index} of {attribute} list"))?;
                let record = read_adapter(info.as_ref()).with_context(|| {
                    format!("reading properties of adapter {index} of {attribute} list")
                })?;

                if !record.is_selected_by(filter, include_integrated, include_detachable) {
                    discovery_log!(
                        self.logger,
                        "skipping adapter {:#x} ({:04X}:{:04X}): hardware={} integrated={} \
                         detachable={} display={} compute={}",
                        record.instance_luid,
                        record.hardware_id.vendor_id,
                        record.hardware_id.device_id,
                        record.is_hardware,
                        record.is_integrated,
                        record.is_detachable,
                        record.supports_display,
                        record.supports_compute
                    );
                    continue;
                }

                if adapters.insert(record.instance_luid, record).is_some() {
                    discovery_log!(self.logger, "adapter listed again under {attribute}");
                }
            }

            lists.push(list);
        }

        discovery_log!(
            self.logger,
            "enumerated {} adapters with filter {filter}",
            adapters.len()
        );

        self.lists = lists;
        self.adapters = adapters;
        self.enumerated = true;
        Ok(&self.adapters)
    }

    /// The adapters of the last successful enumeration.
    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// True before the first enumeration, or once the platform invalidated one of its lists.
    pub fn is_stale(&self) -> bool {
        !self.enumerated || self.lists.iter().any(|list| list.is_stale())
    }
}

fn read_adapter(info: &dyn AdapterInfo) -> DiscoveryResult<AdapterRecord> {
    Ok(AdapterRecord {
        instance_luid: info.instance_luid().context("reading instance LUID")?,
        hardware_id: info.hardware_id().context("reading hardware ID")?,
        is_hardware: info.is_hardware().context("reading hardware flag")?,
        is_integrated: info.is_integrated().context("reading integrated flag")?,
        is_detachable: info.is_detachable().context("reading detachable flag")?,
        supports_display: info.supports_attribute(AdapterAttribute::D3D11Graphics)
            || info.supports_attribute(AdapterAttribute::D3D12Graphics),
        // Compute means D3D12 core compute support, independent of graphics support.
        supports_compute: info.supports_attribute(AdapterAttribute::D3D12CoreCompute),
    })
}
