// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::mem::size_of;
use std::os::raw::c_void;
use std::ptr::addr_of;
use std::slice::from_raw_parts;

use libc::wcslen;

use windows_sys::Wdk::Graphics::Direct3D::*;
use windows_sys::Win32::Foundation::LUID;

use crate::check_ntstatus;
use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::log_ntstatus;
use crate::registry::FilesystemQuery;
use crate::registry::QueryOutcome;
use crate::traits::DriverAdapter;

type D3dkmtHandle = u32;

pub fn luid_from_i64(value: i64) -> LUID {
    LUID {
        LowPart: value as u32,
        HighPart: (value >> 32) as i32,
    }
}

/// A kernel-mode adapter handle, closed on drop.
pub struct KernelAdapter {
    handle: D3dkmtHandle,
}

impl KernelAdapter {
    pub fn open(instance_luid: i64) -> DiscoveryResult<KernelAdapter> {
        let mut open = D3DKMT_OPENADAPTERFROMLUID {
            AdapterLuid: luid_from_i64(instance_luid),
            hAdapter: 0,
        };

        // SAFETY:
        //  - `open` is stack-allocated and properly typed.
        //  - D3DKMTOpenAdapterFromLuid only writes `hAdapter`.
        check_ntstatus!("D3DKMTOpenAdapterFromLuid", unsafe {
            D3DKMTOpenAdapterFromLuid(&mut open as *mut D3DKMT_OPENADAPTERFROMLUID)
        })?;

        Ok(KernelAdapter {
            handle: open.hAdapter,
        })
    }
}

impl DriverAdapter for KernelAdapter {
    fn query_filesystem_path(
        &self,
        query: FilesystemQuery,
        capacity: usize,
    ) -> DiscoveryResult<QueryOutcome> {
        // The output string extends past the end of the struct into the trailing buffer.
        let total = size_of::<D3DDDI_QUERYREGISTRY_INFO>() + capacity;
        let mut buffer = vec![0u64; total.div_ceil(size_of::<u64>())];
        let info = buffer.as_mut_ptr() as *mut D3DDDI_QUERYREGISTRY_INFO;

        let query_type = match query {
            FilesystemQuery::DriverStorePath => D3DDDI_QUERYREGISTRY_DRIVERSTOREPATH,
        };

        // SAFETY: `buffer` is zeroed, 8-byte aligned and holds at least one
        // D3DDDI_QUERYREGISTRY_INFO.
        unsafe {
            (*info).QueryType = query_type;
        }

        let mut adapter_info = D3DKMT_QUERYADAPTERINFO {
            hAdapter: self.handle,
            Type: KMTQAITYPE_QUERYREGISTRY,
            pPrivateDriverData: info as *mut c_void,
            PrivateDriverDataSize: total as u32,
        };

        // SAFETY:
        //  - `adapter_info` is stack-allocated and properly typed.
        //  - `pPrivateDriverData` points to `total` writable bytes, matching
        //      `PrivateDriverDataSize`.
        check_ntstatus!("D3DKMTQueryAdapterInfo", unsafe {
            D3DKMTQueryAdapterInfo(&mut adapter_info as *mut D3DKMT_QUERYADAPTERINFO)
        })?;

        // SAFETY: the kernel filled in the header of `buffer`.
        let (status, output_size) = unsafe { ((*info).Status, (*info).OutputValueSize as usize) };

        match status {
            D3DDDI_QUERYREGISTRY_STATUS_SUCCESS => {
                // SAFETY:
                //  - The output string lies inside `buffer` and the kernel NUL-terminates it within
                //      the trailing buffer.
                //  - WCHAR/wchar_t are 16-bits on Windows.
                let output = unsafe { addr_of!((*info).Anonymous.OutputString) as *const u16 };
                let len = unsafe { wcslen(output) };
                let slice: &[u16] = unsafe { from_raw_parts(output, len) };

                let path = String::from_utf16(slice).map_err(|_| {
                    DiscoveryError::message(format!("{query} is not valid UTF-16"))
                })?;
                Ok(QueryOutcome::Complete(path))
            }
            D3DDDI_QUERYREGISTRY_STATUS_BUFFER_OVERFLOW => Ok(QueryOutcome::BufferOverflow {
                required: output_size,
            }),
            other => Err(DiscoveryError::message(format!(
                "{query} query returned registry status {other}"
            ))),
        }
    }
}

impl Drop for KernelAdapter {
    fn drop(&mut self) {
        let mut close = D3DKMT_CLOSEADAPTER {
            hAdapter: self.handle,
        };
        // SAFETY: Safe since we own the adapter handle
        log_ntstatus!("D3DKMTCloseAdapter", unsafe {
            D3DKMTCloseAdapter(&mut close as *mut D3DKMT_CLOSEADAPTER)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luid_halves() {
        let luid = luid_from_i64(0x0000_0001_0000_d2a3);
        assert_eq!(luid.LowPart, 0xd2a3);
        assert_eq!(luid.HighPart, 1);

        let luid = luid_from_i64(-1);
        assert_eq!(luid.LowPart, u32::MAX);
        assert_eq!(luid.HighPart, -1);
    }
}
