// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::env;

use crate::discovery_defines::DEFAULT_MAX_QUERY_ATTEMPTS;
use crate::logging::DiscoveryLogger;

const DEFAULT_SYSTEM_ROOT: &str = "C:\\Windows";

/// Settings shared by the components of a discovery session.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub logger: DiscoveryLogger,
    /// Upper bound on attempts of one buffered driver query.
    pub max_query_attempts: usize,
    /// Windows directory substituted for `\SystemRoot` in driver paths.
    pub system_root: String,
}

impl DiscoveryConfig {
    pub fn with_logger(mut self, logger: DiscoveryLogger) -> DiscoveryConfig {
        self.logger = logger;
        self
    }

    pub fn with_max_query_attempts(mut self, attempts: usize) -> DiscoveryConfig {
        self.max_query_attempts = attempts.max(1);
        self
    }

    pub fn with_system_root<S: Into<String>>(mut self, system_root: S) -> DiscoveryConfig {
        self.system_root = system_root.into();
        self
    }
}

impl Default for DiscoveryConfig {
    fn default() -> DiscoveryConfig {
        DiscoveryConfig {
            logger: DiscoveryLogger::process_default(),
            max_query_attempts: DEFAULT_MAX_QUERY_ATTEMPTS,
            system_root: env::var("SystemRoot").unwrap_or_else(|_| DEFAULT_SYSTEM_ROOT.to_string()),
        }
    }
}
