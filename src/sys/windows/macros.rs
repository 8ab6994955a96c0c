// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

#[macro_export]
macro_rules! check_ntstatus {
    ($operation: expr, $x: expr) => {{
        match $x {
            windows_sys::Win32::Foundation::STATUS_SUCCESS => Ok(()),
            status => Err($crate::DiscoveryError::NtStatus {
                operation: $operation.to_string(),
                status,
            }),
        }
    }};
}

#[macro_export]
macro_rules! log_ntstatus {
    ($operation: expr, $x: expr) => {{
        match $x {
            windows_sys::Win32::Foundation::STATUS_SUCCESS => (),
            status => log::error!("{} failed with NTSTATUS {:#X}", $operation, status),
        }
    }};
}

/// Checks a function that returns a Win32 error code directly.
#[macro_export]
macro_rules! check_win32 {
    ($operation: expr, $x: expr) => {{
        match $x {
            windows_sys::Win32::Foundation::ERROR_SUCCESS => Ok(()),
            code => Err($crate::DiscoveryError::Win32 {
                operation: $operation.to_string(),
                code,
            }),
        }
    }};
}

/// Checks a function that returns a `BOOL` and reports failures through `GetLastError`.
#[macro_export]
macro_rules! check_bool {
    ($operation: expr, $x: expr) => {{
        if $x != 0 {
            Ok(())
        } else {
            // SAFETY: GetLastError only reads thread-local state.
            let code = unsafe { windows_sys::Win32::Foundation::GetLastError() };
            Err($crate::DiscoveryError::Win32 {
                operation: $operation.to_string(),
                code,
            })
        }
    }};
}
