// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::mem::size_of;
use std::os::raw::c_void;

use windows::core::GUID;
use windows::Win32::Foundation::LUID;
use windows::Win32::Graphics::DXCore::*;

use crate::adapter::AdapterAttribute;
use crate::adapter::HardwareId;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::traits::AdapterBackend;
use crate::traits::AdapterInfo;
use crate::traits::AdapterList;

fn hresult_error(operation: &str, e: windows::core::Error) -> DiscoveryError {
    DiscoveryError::Hresult {
        operation: operation.to_string(),
        code: e.code().0,
        message: e.message().to_string(),
    }
}

fn attribute_guid(attribute: AdapterAttribute) -> GUID {
    match attribute {
        AdapterAttribute::D3D11Graphics => DXCORE_ADAPTER_ATTRIBUTE_D3D11_GRAPHICS,
        AdapterAttribute::D3D12Graphics => DXCORE_ADAPTER_ATTRIBUTE_D3D12_GRAPHICS,
        AdapterAttribute::D3D12CoreCompute => DXCORE_ADAPTER_ATTRIBUTE_D3D12_CORE_COMPUTE,
    }
}

/// Adapter enumeration through the DXCore adapter factory.
pub struct DxCoreBackend {
    factory: IDXCoreAdapterFactory,
}

impl DxCoreBackend {
    pub fn new() -> DiscoveryResult<DxCoreBackend> {
        // SAFETY: DXCoreCreateAdapterFactory has no preconditions.
        let factory = unsafe { DXCoreCreateAdapterFactory::<IDXCoreAdapterFactory>() }
            .map_err(|e| hresult_error("DXCoreCreateAdapterFactory", e))?;
        Ok(DxCoreBackend { factory })
    }
}

impl AdapterBackend for DxCoreBackend {
    fn create_adapter_list(
        &self,
        attribute: AdapterAttribute,
    ) -> DiscoveryResult<Box<dyn AdapterList>> {
        let filter = [attribute_guid(attribute)];
        // SAFETY: `filter` outlives the call.
        let list = unsafe { self.factory.CreateAdapterList::<IDXCoreAdapterList>(&filter) }
            .map_err(|e| hresult_error("IDXCoreAdapterFactory::CreateAdapterList", e))?;
        Ok(Box::new(DxCoreAdapterList { list }))
    }
}

struct DxCoreAdapterList {
    list: IDXCoreAdapterList,
}

impl AdapterList for DxCoreAdapterList {
    fn adapter_count(&self) -> usize {
        // SAFETY: `list` is a live adapter list.
        unsafe { self.list.GetAdapterCount() as usize }
    }

    fn adapter(&self, index: usize) -> DiscoveryResult<Box<dyn AdapterInfo>> {
        // SAFETY: `list` is a live adapter list; out of range indices are reported as errors.
        let adapter = unsafe { self.list.GetAdapter::<IDXCoreAdapter>(index as u32) }
            .map_err(|e| hresult_error("IDXCoreAdapterList::GetAdapter", e))?;
        Ok(Box::new(DxCoreAdapter { adapter }))
    }

    fn is_stale(&self) -> bool {
        // SAFETY: `list` is a live adapter list.
        unsafe { self.list.IsStale() }
    }
}

struct DxCoreAdapter {
    adapter: IDXCoreAdapter,
}

impl DxCoreAdapter {
    /// Reads a fixed-size property into a value of type `T`.
    fn property<T: Default>(
        &self,
        property: DXCoreAdapterProperty,
        name: &str,
    ) -> DiscoveryResult<T> {
        let mut value = T::default();
        // SAFETY: `value` is a properly typed destination of exactly `size_of::<T>()` bytes.
        unsafe {
            self.adapter.GetProperty(
                property,
                size_of::<T>(),
                &mut value as *mut T as *mut c_void,
            )
        }
        .map_err(|e| hresult_error(&format!("IDXCoreAdapter::GetProperty({name})"), e))?;
        Ok(value)
    }

    fn flag(&self, property: DXCoreAdapterProperty, name: &str) -> DiscoveryResult<bool> {
        Ok(self.property::<u8>(property, name)? != 0)
    }
}

impl AdapterInfo for DxCoreAdapter {
    fn instance_luid(&self) -> DiscoveryResult<i64> {
        let luid: LUID = self.property(InstanceLuid, "InstanceLuid")?;
        Ok((i64::from(luid.HighPart) << 32) | i64::from(luid.LowPart))
    }

    fn hardware_id(&self) -> DiscoveryResult<HardwareId> {
        let id: DXCoreHardwareID = self.property(HardwareID, "HardwareID")?;
        Ok(HardwareId {
            vendor_id: id.vendorID,
            device_id: id.deviceID,
            subsystem_id: id.subSysID,
            revision: id.revision,
        })
    }

    fn is_hardware(&self) -> DiscoveryResult<bool> {
        self.flag(IsHardware, "IsHardware")
    }

    fn is_integrated(&self) -> DiscoveryResult<bool> {
        self.flag(IsIntegrated, "IsIntegrated")
    }

    fn is_detachable(&self) -> DiscoveryResult<bool> {
        self.flag(IsDetachable, "IsDetachable")
    }

    fn supports_attribute(&self, attribute: AdapterAttribute) -> bool {
        let guid = attribute_guid(attribute);
        // SAFETY: `guid` outlives the call.
        unsafe { self.adapter.IsAttributeSupported(&guid) }
    }
}
