// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::fmt;

use serde::Serialize;

use crate::adapter::AdapterRecord;

/// A file that has to be copied from the driver store into the system directory for non-DirectX
/// runtimes to work with a device.
///
/// See <https://learn.microsoft.com/en-us/windows-hardware/drivers/display/container-non-dx>.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeFileEntry {
    /// Relative path of the file inside the driver store.
    pub source_path: String,
    /// Filename at the destination.
    pub destination_name: String,
}

impl RuntimeFileEntry {
    /// An empty `destination_name` falls back to the filename of `source_path`.
    pub fn new<S: Into<String>>(source_path: S, destination_name: &str) -> RuntimeFileEntry {
        let source_path = source_path.into();
        let destination_name = if destination_name.is_empty() {
            source_path
                .rsplit(['\\', '/'])
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            destination_name.to_string()
        };

        RuntimeFileEntry {
            source_path,
            destination_name,
        }
    }

    /// Builds an entry from the strings of a REG_MULTI_SZ value: `[source]` or
    /// `[source, destination]`. Any other shape keeps the default destination.
    pub fn from_strings(strings: &[String]) -> Option<RuntimeFileEntry> {
        match strings {
            [] => None,
            [source, destination] => Some(RuntimeFileEntry::new(source.as_str(), destination)),
            [source, ..] => Some(RuntimeFileEntry::new(source.as_str(), "")),
        }
    }
}

impl fmt::Display for RuntimeFileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.source_path, self.destination_name)
    }
}

/// Selects one of the two runtime file lists of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeFileList {
    /// Files for System32.
    Primary,
    /// Files for SysWOW64.
    Wow64,
}

/// The PnP device underlying a DirectX adapter, with its driver details.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub adapter: AdapterRecord,
    /// PnP device instance ID.
    pub id: String,
    pub description: String,
    pub vendor: String,
    pub driver_registry_key: String,
    /// Absolute path of the driver store directory holding the driver files.
    pub driver_store_path: String,
    pub location_path: String,
    pub runtime_files: Vec<RuntimeFileEntry>,
    pub runtime_files_wow64: Vec<RuntimeFileEntry>,
}

impl DeviceRecord {
    pub fn runtime_files(&self, list: RuntimeFileList) -> &[RuntimeFileEntry] {
        match list {
            RuntimeFileList::Primary => &self.runtime_files,
            RuntimeFileList::Wow64 => &self.runtime_files_wow64,
        }
    }

    fn runtime_files_mut(&mut self, list: RuntimeFileList) -> &mut Vec<RuntimeFileEntry> {
        match list {
            RuntimeFileList::Primary => &mut self.runtime_files,
            RuntimeFileList::Wow64 => &mut self.runtime_files_wow64,
        }
    }

    /// Appends `files` to one of the lists. Entries whose destination name is already taken are
    /// not added; they are returned instead.
    pub fn append_runtime_files<I>(
        &mut self,
        list: RuntimeFileList,
        files: I,
    ) -> Vec<RuntimeFileEntry>
    where
        I: IntoIterator<Item = RuntimeFileEntry>,
    {
        let existing = self.runtime_files_mut(list);
        let mut ignored = Vec::new();

        for file in files {
            if existing
                .iter()
                .any(|f| f.destination_name == file.destination_name)
            {
                ignored.push(file);
            } else {
                existing.push(file);
            }
        }

        ignored
    }
}
