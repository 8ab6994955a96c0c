// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use crate::config::DiscoveryConfig;
use crate::device::DeviceRecord;
use crate::device::RuntimeFileEntry;
use crate::device::RuntimeFileList;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::ResultExt;
use crate::discovery_defines::HOST_DRIVER_STORE_MARKER;
use crate::discovery_log;
use crate::logging::DiscoveryLogger;
use crate::registry::expand_system_root;
use crate::registry::query_filesystem_path;
use crate::registry::FilesystemQuery;
use crate::registry::RegistryPath;
use crate::traits::DriverBackend;

/// Driver registry subkeys listing the files to copy into a container, and the list each one
/// feeds.
///
/// See <https://learn.microsoft.com/en-us/windows-hardware/drivers/display/container-non-dx>.
pub const RUNTIME_FILE_SUBKEYS: [(&str, RuntimeFileList); 4] = [
    ("CopyToVmOverwrite", RuntimeFileList::Primary),
    ("CopyToVmWhenNewer", RuntimeFileList::Primary),
    ("CopyToVmOverwriteWow64", RuntimeFileList::Wow64),
    ("CopyToVmWhenNewerWow64", RuntimeFileList::Wow64),
];

/// Fills in the driver details of correlated devices.
pub struct DriverMetadataResolver {
    backend: Box<dyn DriverBackend>,
    logger: DiscoveryLogger,
    system_root: String,
    max_query_attempts: usize,
}

impl DriverMetadataResolver {
    pub fn new(
        backend: Box<dyn DriverBackend>,
        config: &DiscoveryConfig,
    ) -> DriverMetadataResolver {
        DriverMetadataResolver {
            backend,
            logger: config.logger.clone(),
            system_root: config.system_root.clone(),
            max_query_attempts: config.max_query_attempts,
        }
    }

    /// Resolves the driver store path and the runtime files of `device`.
    ///
    /// Only opening the adapter and querying the driver store path can fail; runtime file
    /// sources that cannot be read contribute no files.
    pub fn resolve(&self, device: &mut DeviceRecord) -> DiscoveryResult<()> {
        discovery_log!(self.logger, "querying driver details for device {}", device.id);

        let luid = device.adapter.instance_luid;
        let adapter = self
            .backend
            .open_adapter(luid)
            .with_context(|| format!("opening adapter with LUID {luid}"))?;

        let path = query_filesystem_path(
            adapter.as_ref(),
            FilesystemQuery::DriverStorePath,
            self.max_query_attempts,
        )
        .context("querying driver store path")?;
        device.driver_store_path = expand_system_root(&path, &self.system_root);

        if device.driver_store_path.contains(HOST_DRIVER_STORE_MARKER) {
            discovery_log!(
                self.logger,
                "running inside a container, skipping runtime file enumeration"
            );
            return Ok(());
        }

        for (subkey, list) in RUNTIME_FILE_SUBKEYS {
            let files = self.best_effort(subkey, || self.runtime_files(device, subkey));
            for ignored in device.append_runtime_files(list, files) {
                discovery_log!(
                    self.logger,
                    "{subkey}: ignoring runtime file with duplicate destination filename {}",
                    ignored.destination_name
                );
            }
        }

        Ok(())
    }

    /// Runs `f`, logging and discarding its error.
    fn best_effort<T, F>(&self, source: &str, f: F) -> Vec<T>
    where
        F: FnOnce() -> DiscoveryResult<Vec<T>>,
    {
        f().unwrap_or_else(|e| {
            discovery_log!(
                self.logger,
                "could not enumerate runtime files for the {source} key: {e}"
            );
            Vec::new()
        })
    }

    fn runtime_files(
        &self,
        device: &DeviceRecord,
        subkey: &str,
    ) -> DiscoveryResult<Vec<RuntimeFileEntry>> {
        let path = RegistryPath::parse(&device.driver_registry_key)?.join(subkey);
        let key = self
            .backend
            .open_registry_key(&path)
            .with_context(|| format!("opening registry key {path}"))?;
        let values = key
            .multi_string_values()
            .with_context(|| format!("enumerating values of {path}"))?;

        Ok(values
            .values()
            .filter_map(|strings| RuntimeFileEntry::from_strings(strings))
            .collect())
    }
}
