// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::fmt;
use std::str::FromStr;

use crate::discovery_defines::DiscoveryError;
use crate::discovery_defines::DiscoveryResult;
use crate::discovery_defines::SYSTEM_ROOT_PREFIX;
use crate::traits::DriverAdapter;

/// The predefined registry keys a path can start from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryRoot {
    ClassesRoot,
    CurrentConfig,
    CurrentUser,
    LocalMachine,
    PerformanceData,
    Users,
}

impl RegistryRoot {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryRoot::ClassesRoot => "HKEY_CLASSES_ROOT",
            RegistryRoot::CurrentConfig => "HKEY_CURRENT_CONFIG",
            RegistryRoot::CurrentUser => "HKEY_CURRENT_USER",
            RegistryRoot::LocalMachine => "HKEY_LOCAL_MACHINE",
            RegistryRoot::PerformanceData => "HKEY_PERFORMANCE_DATA",
            RegistryRoot::Users => "HKEY_USERS",
        }
    }
}

impl FromStr for RegistryRoot {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let root = match s {
            "HKEY_CLASSES_ROOT" => RegistryRoot::ClassesRoot,
            "HKEY_CURRENT_CONFIG" => RegistryRoot::CurrentConfig,
            "HKEY_CURRENT_USER" => RegistryRoot::CurrentUser,
            "HKEY_LOCAL_MACHINE" => RegistryRoot::LocalMachine,
            "HKEY_PERFORMANCE_DATA" => RegistryRoot::PerformanceData,
            "HKEY_USERS" => RegistryRoot::Users,
            _ => {
                return Err(DiscoveryError::message(format!(
                    "unknown registry root key: {s}"
                )))
            }
        };
        Ok(root)
    }
}

/// A registry key given as `ROOT\sub\key`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegistryPath {
    pub root: RegistryRoot,
    pub subkey: String,
}

impl RegistryPath {
    pub fn parse(path: &str) -> DiscoveryResult<RegistryPath> {
        let (root, subkey) = path.split_once('\\').ok_or_else(|| {
            DiscoveryError::message(format!("invalid registry key path: {path}"))
        })?;
        if subkey.is_empty() {
            return Err(DiscoveryError::message(format!(
                "registry key path has no subkey: {path}"
            )));
        }

        Ok(RegistryPath {
            root: root.parse()?,
            subkey: subkey.to_string(),
        })
    }

    pub fn join(&self, child: &str) -> RegistryPath {
        RegistryPath {
            root: self.root,
            subkey: format!("{}\\{}", self.subkey, child),
        }
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.root.name(), self.subkey)
    }
}

/// Splits a REG_MULTI_SZ payload. The list ends at the first empty string.
pub fn decode_multi_string(data: &[u16]) -> Vec<String> {
    data.split(|c| *c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// Replaces a leading `\SystemRoot` with the Windows directory.
pub fn expand_system_root(path: &str, system_root: &str) -> String {
    match path.strip_prefix(SYSTEM_ROOT_PREFIX) {
        Some(rest) => format!("{system_root}{rest}"),
        None => path.to_string(),
    }
}

/// Filesystem paths the kernel driver interface can report for an adapter.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilesystemQuery {
    /// The driver store directory of the adapter's driver package.
    DriverStorePath,
}

impl fmt::Display for FilesystemQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemQuery::DriverStorePath => f.write_str("driver store path"),
        }
    }
}

/// Result of one attempt of the buffered query protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    Complete(String),
    /// The trailing buffer was too small; `required` is the size in bytes the platform asked for.
    BufferOverflow { required: usize },
}

/// Runs the buffered query protocol: start with an empty output buffer and grow it to the size
/// the platform reports until the query completes, for at most `max_attempts` attempts.
pub fn query_filesystem_path(
    adapter: &dyn DriverAdapter,
    query: FilesystemQuery,
    max_attempts: usize,
) -> DiscoveryResult<String> {
    let mut capacity = 0;

    for _ in 0..max_attempts {
        match adapter.query_filesystem_path(query, capacity)? {
            QueryOutcome::Complete(path) => return Ok(path),
            QueryOutcome::BufferOverflow { required } => {
                if required <= capacity {
                    return Err(DiscoveryError::message(format!(
                        "{query} query overflowed a {capacity} byte buffer but asked for \
                         {required} bytes"
                    )));
                }
                capacity = required;
            }
        }
    }

    Err(DiscoveryError::QueryRetryLimit(max_attempts))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    struct GrowingAdapter {
        sizes: Vec<usize>,
        requested: RefCell<Vec<usize>>,
    }

    impl DriverAdapter for GrowingAdapter {
        fn query_filesystem_path(
            &self,
            _query: FilesystemQuery,
            capacity: usize,
        ) -> DiscoveryResult<QueryOutcome> {
            let mut requested = self.requested.borrow_mut();
            requested.push(capacity);
            match self.sizes.get(requested.len() - 1) {
                Some(required) => Ok(QueryOutcome::BufferOverflow {
                    required: *required,
                }),
                None => Ok(QueryOutcome::Complete("C:\\store".to_string())),
            }
        }
    }

    #[test]
    fn parse_paths() {
        let path = RegistryPath::parse(
            "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Class\\\
             {4d36e968-e325-11ce-bfc1-08002be10318}\\0001",
        )
        .unwrap();
        assert_eq!(path.root, RegistryRoot::LocalMachine);
        assert_eq!(
            path.subkey,
            "SYSTEM\\CurrentControlSet\\Control\\Class\\{4d36e968-e325-11ce-bfc1-08002be10318}\\\
             0001"
        );
        assert_eq!(
            path.join("CopyToVmOverwrite").to_string(),
            "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Class\\\
             {4d36e968-e325-11ce-bfc1-08002be10318}\\0001\\CopyToVmOverwrite"
        );

        for root in [
            "HKEY_CLASSES_ROOT",
            "HKEY_CURRENT_CONFIG",
            "HKEY_CURRENT_USER",
            "HKEY_PERFORMANCE_DATA",
            "HKEY_USERS",
        ] {
            let path = RegistryPath::parse(&format!("{root}\\Software")).unwrap();
            assert_eq!(path.root.name(), root);
        }
    }

    #[test]
    fn reject_malformed_paths() {
        assert!(RegistryPath::parse("HKEY_LOCAL_MACHINE").is_err());
        assert!(RegistryPath::parse("HKEY_LOCAL_MACHINE\\").is_err());
        assert!(RegistryPath::parse("HKLM\\SYSTEM").is_err());
        assert!(RegistryPath::parse("").is_err());
    }

    #[test]
    fn multi_string_stops_at_first_empty_string() {
        let mut data = utf16("nvcuda32.dll\0nvcuda.dll\0\0");
        assert_eq!(decode_multi_string(&data), vec!["nvcuda32.dll", "nvcuda.dll"]);

        data.extend(utf16("ignored\0\0"));
        assert_eq!(decode_multi_string(&data).len(), 2);

        assert!(decode_multi_string(&utf16("\0")).is_empty());
        assert!(decode_multi_string(&[]).is_empty());
        assert_eq!(decode_multi_string(&utf16("unterminated")), vec!["unterminated"]);
    }

    #[test]
    fn system_root_expansion() {
        assert_eq!(
            expand_system_root(
                "\\SystemRoot\\System32\\DriverStore\\FileRepository\\nv_dispi.inf_amd64_1",
                "C:\\Windows"
            ),
            "C:\\Windows\\System32\\DriverStore\\FileRepository\\nv_dispi.inf_amd64_1"
        );
        assert_eq!(
            expand_system_root("C:\\Windows\\System32\\HostDriverStore\\x", "D:\\Windows"),
            "C:\\Windows\\System32\\HostDriverStore\\x"
        );
    }

    #[test]
    fn buffer_grows_to_the_reported_size() {
        let adapter = GrowingAdapter {
            sizes: vec![260, 520],
            requested: RefCell::new(Vec::new()),
        };
        let path = query_filesystem_path(&adapter, FilesystemQuery::DriverStorePath, 8).unwrap();
        assert_eq!(path, "C:\\store");
        assert_eq!(*adapter.requested.borrow(), vec![0, 260, 520]);
    }

    #[test]
    fn attempts_are_capped() {
        let adapter = GrowingAdapter {
            sizes: (1..=20).map(|i| i * 100).collect(),
            requested: RefCell::new(Vec::new()),
        };
        let err = query_filesystem_path(&adapter, FilesystemQuery::DriverStorePath, 4).unwrap_err();
        assert!(matches!(err, DiscoveryError::QueryRetryLimit(4)));
        assert_eq!(adapter.requested.borrow().len(), 4);
    }

    #[test]
    fn overflow_without_growth_is_an_error() {
        let adapter = GrowingAdapter {
            sizes: vec![0],
            requested: RefCell::new(Vec::new()),
        };
        assert!(query_filesystem_path(&adapter, FilesystemQuery::DriverStorePath, 8).is_err());
    }
}
