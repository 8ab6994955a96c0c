// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::discovery_defines::CapabilityFilter;

/// PnP hardware identification of an adapter, as reported by the adapter enumeration service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HardwareId {
    pub vendor_id: u32,
    pub device_id: u32,
    pub subsystem_id: u32,
    pub revision: u32,
}

impl HardwareId {
    /// Builds the PCI hardware identifier prefix for this adapter; the device instance suffix is
    /// left open.
    ///
    /// See
    /// <https://learn.microsoft.com/windows-hardware/drivers/install/identifiers-for-pci-devices>
    pub fn pnp_pattern(&self) -> HardwareIdPattern {
        HardwareIdPattern(format!(
            "PCI\\VEN_{:04X}&DEV_{:04X}&SUBSYS_{:08X}&REV_{:02X}",
            self.vendor_id, self.device_id, self.subsystem_id, self.revision
        ))
    }
}

/// A PnP device ID prefix; the instance part of the device ID is wildcarded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareIdPattern(String);

impl HardwareIdPattern {
    pub fn prefix(&self) -> &str {
        &self.0
    }

    /// PnP device IDs compare case-insensitively.
    pub fn matches(&self, device_id: &str) -> bool {
        device_id
            .get(..self.0.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.0))
    }
}

impl fmt::Display for HardwareIdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*", self.0)
    }
}

/// Capability attributes the adapter enumeration service groups adapters by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterAttribute {
    D3D11Graphics,
    D3D12Graphics,
    D3D12CoreCompute,
}

impl AdapterAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterAttribute::D3D11Graphics => "DXCORE_ADAPTER_ATTRIBUTE_D3D11_GRAPHICS",
            AdapterAttribute::D3D12Graphics => "DXCORE_ADAPTER_ATTRIBUTE_D3D12_GRAPHICS",
            AdapterAttribute::D3D12CoreCompute => "DXCORE_ADAPTER_ATTRIBUTE_D3D12_CORE_COMPUTE",
        }
    }

    /// The attribute groups that have to be listed to find every adapter `filter` can retain.
    pub fn groups_for(filter: CapabilityFilter) -> Vec<AdapterAttribute> {
        let mut groups = Vec::with_capacity(3);
        if filter != CapabilityFilter::ComputeOnly && filter != CapabilityFilter::DisplayAndCompute
        {
            groups.push(AdapterAttribute::D3D11Graphics);
        }
        if filter != CapabilityFilter::ComputeOnly {
            groups.push(AdapterAttribute::D3D12Graphics);
        }
        if filter != CapabilityFilter::DisplayOnly {
            groups.push(AdapterAttribute::D3D12CoreCompute);
        }
        groups
    }
}

impl fmt::Display for AdapterAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A DirectX adapter as enumerated by the adapter enumeration service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AdapterRecord {
    /// Locally unique identifier of the adapter.
    pub instance_luid: i64,
    pub hardware_id: HardwareId,
    /// False for software (WARP, Basic Render Driver) and other virtual adapters.
    pub is_hardware: bool,
    pub is_integrated: bool,
    /// Whether the adapter can be removed at runtime.
    pub is_detachable: bool,
    /// Supports D3D11 or D3D12 graphics.
    pub supports_display: bool,
    /// Supports D3D12 core compute.
    pub supports_compute: bool,
}

impl AdapterRecord {
    /// Applies the enumeration filtering rules to this adapter.
    pub fn is_selected_by(
        &self,
        filter: CapabilityFilter,
        include_integrated: bool,
        include_detachable: bool,
    ) -> bool {
        if !self.is_hardware {
            return false;
        }

        let capability_mismatch = match filter {
            CapabilityFilter::DisplayOnly => self.supports_compute,
            CapabilityFilter::ComputeOnly => self.supports_display,
            CapabilityFilter::DisplayAndCompute => {
                !self.supports_display || !self.supports_compute
            }
            _ => false,
        };
        if capability_mismatch {
            return false;
        }

        if self.is_integrated && !include_integrated {
            return false;
        }

        !(self.is_detachable && !include_detachable)
    }
}

/// The adapters of one enumeration pass, keyed by LUID.
pub type AdapterSet = BTreeMap<i64, AdapterRecord>;
