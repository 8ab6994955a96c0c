// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

//! Discovery of DirectX adapters, the PnP devices behind them and the driver runtime files a
//! container needs mapped in to use them.

mod adapter;
mod catalog;
mod config;
mod correlator;
mod device;
mod discovery_defines;
mod logging;
mod properties;
mod registry;
mod resolver;
mod session;
mod sys;
#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod testing;
mod traits;

pub use discovery_defines::*;

pub use adapter::AdapterAttribute;
pub use adapter::AdapterRecord;
pub use adapter::AdapterSet;
pub use adapter::HardwareId;
pub use adapter::HardwareIdPattern;
pub use catalog::AdapterCatalog;
pub use config::DiscoveryConfig;
pub use correlator::DeviceCorrelator;
pub use device::DeviceRecord;
pub use device::RuntimeFileEntry;
pub use device::RuntimeFileList;
pub use logging::DiscoveryLogger;
pub use logging::LOG_TARGET;
pub use properties::DevPropKey;
pub use properties::PnpQuery;
pub use properties::PropertyBag;
pub use properties::PropertyMap;
pub use properties::PropertyValue;
pub use registry::FilesystemQuery;
pub use registry::QueryOutcome;
pub use registry::RegistryPath;
pub use registry::RegistryRoot;
pub use resolver::DriverMetadataResolver;
pub use session::DeviceField;
pub use session::DeviceFieldValue;
pub use session::DiscoverySession;
pub use session::SessionState;
pub use sys::platform::NativeProvider;
pub use traits::*;
