// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::fmt;

use remain::sorted;
use serde::Serialize;
use thiserror::Error;

pub const DISCOVERY_LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry root under which PnP driver keys live; the driver property only carries the subkey.
pub const DRIVER_CLASS_KEY_PREFIX: &str =
    "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Class\\";

/// Prefix the kernel uses for driver store paths relative to the Windows directory.
pub const SYSTEM_ROOT_PREFIX: &str = "\\SystemRoot";

/// Path component that only appears when the driver store is mapped into a container.
pub const HOST_DRIVER_STORE_MARKER: &str = "HostDriverStore";

pub const DEFAULT_MAX_QUERY_ATTEMPTS: usize = 8;

/// All errors produced while discovering devices.
#[sorted]
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DiscoveryError>,
    },
    #[error("{operation} failed with HRESULT {code:#010X}: {message}")]
    Hresult {
        operation: String,
        code: i32,
        message: String,
    },
    #[error("requested device index is invalid: {0}")]
    InvalidDeviceIndex(usize),
    #[error("requested runtime file index is invalid: {0}")]
    InvalidFileIndex(usize),
    #[error("unknown device filter value: {0}")]
    InvalidFilter(i32),
    #[error("{0}")]
    Message(String),
    #[error("attempted to retrieve {0} before performing device discovery")]
    NotDiscovered(&'static str),
    #[error("{operation} failed with NTSTATUS {status:#010X}")]
    NtStatus { operation: String, status: i32 },
    #[error("output buffer still too small after {0} query attempts")]
    QueryRetryLimit(usize),
    #[error("device discovery is not supported on this platform")]
    UnsupportedPlatform,
    #[error("{operation} failed with Win32 error {code}")]
    Win32 { operation: String, code: u32 },
}

impl DiscoveryError {
    pub fn message<S: Into<String>>(message: S) -> DiscoveryError {
        DiscoveryError::Message(message.into())
    }

    /// Wraps this error in a description of what the caller was doing.
    pub fn wrap<S: Into<String>>(self, context: S) -> DiscoveryError {
        DiscoveryError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error reports a caller-side lookup problem rather than a platform failure.
    pub fn is_index_error(&self) -> bool {
        match self {
            DiscoveryError::InvalidDeviceIndex(_)
            | DiscoveryError::InvalidFileIndex(_)
            | DiscoveryError::NotDiscovered(_) => true,
            DiscoveryError::Context { source, .. } => source.is_index_error(),
            _ => false,
        }
    }

    /// The innermost error of a context chain.
    pub fn root_cause(&self) -> &DiscoveryError {
        match self {
            DiscoveryError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, context: S) -> DiscoveryResult<T>;

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> DiscoveryResult<T>;
}

impl<T> ResultExt<T> for DiscoveryResult<T> {
    fn context<S: Into<String>>(self, context: S) -> DiscoveryResult<T> {
        self.map_err(|e| e.wrap(context))
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> DiscoveryResult<T> {
        self.map_err(|e| e.wrap(f()))
    }
}

/// Which adapters survive the capability filter of an enumeration.
///
/// The discriminants are the integer codes of the C interface.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum CapabilityFilter {
    #[default]
    All = 0,
    DisplaySupported = 1,
    ComputeSupported = 2,
    DisplayOnly = 3,
    ComputeOnly = 4,
    DisplayAndCompute = 5,
}

impl CapabilityFilter {
    pub const ALL_FILTERS: [CapabilityFilter; 6] = [
        CapabilityFilter::All,
        CapabilityFilter::DisplaySupported,
        CapabilityFilter::ComputeSupported,
        CapabilityFilter::DisplayOnly,
        CapabilityFilter::ComputeOnly,
        CapabilityFilter::DisplayAndCompute,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CapabilityFilter::All => "AllDevices",
            CapabilityFilter::DisplaySupported => "DisplaySupported",
            CapabilityFilter::ComputeSupported => "ComputeSupported",
            CapabilityFilter::DisplayOnly => "DisplayOnly",
            CapabilityFilter::ComputeOnly => "ComputeOnly",
            CapabilityFilter::DisplayAndCompute => "DisplayAndCompute",
        }
    }

    /// Looks a filter up by its name, ignoring case.
    pub fn from_name(name: &str) -> Option<CapabilityFilter> {
        CapabilityFilter::ALL_FILTERS
            .into_iter()
            .find(|filter| filter.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<i32> for CapabilityFilter {
    type Error = DiscoveryError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        CapabilityFilter::ALL_FILTERS
            .into_iter()
            .find(|filter| *filter as i32 == code)
            .ok_or(DiscoveryError::InvalidFilter(code))
    }
}

impl fmt::Display for CapabilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_codes_round_trip_through_the_abi_integer() {
        for filter in CapabilityFilter::ALL_FILTERS {
            assert_eq!(CapabilityFilter::try_from(filter as i32).unwrap(), filter);
        }

        assert!(matches!(
            CapabilityFilter::try_from(6),
            Err(DiscoveryError::InvalidFilter(6))
        ));
        assert!(CapabilityFilter::try_from(-1).is_err());
    }

    #[test]
    fn filter_names() {
        assert_eq!(CapabilityFilter::All.to_string(), "AllDevices");
        assert_eq!(
            CapabilityFilter::from_name("displayandcompute"),
            Some(CapabilityFilter::DisplayAndCompute)
        );
        assert_eq!(CapabilityFilter::from_name("gpu"), None);
    }

    #[test]
    fn context_chain_reads_outer_to_inner() {
        let error = DiscoveryError::NtStatus {
            operation: "D3DKMTOpenAdapterFromLuid".to_string(),
            status: 0xC000000Du32 as i32,
        }
        .wrap("opening adapter with LUID 42")
        .wrap("resolving driver details for device PCI\\VEN_10DE");

        assert_eq!(
            error.to_string(),
            "resolving driver details for device PCI\\VEN_10DE: opening adapter with LUID 42: \
             D3DKMTOpenAdapterFromLuid failed with NTSTATUS 0xC000000D"
        );
        assert!(matches!(
            error.root_cause(),
            DiscoveryError::NtStatus { .. }
        ));
        assert!(!error.is_index_error());
    }

    #[test]
    fn index_errors_are_classified_through_context() {
        let error: DiscoveryResult<()> = Err(DiscoveryError::InvalidFileIndex(3));
        let error = error.context("reading runtime file").unwrap_err();
        assert!(error.is_index_error());
        assert!(DiscoveryError::NotDiscovered("device count").is_index_error());
        assert!(!DiscoveryError::UnsupportedPlatform.is_index_error());
    }
}
