// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

pub const LOG_TARGET: &str = "dxdevice_discovery";

/// Switches the diagnostic output of the sessions it is given to.
///
/// Clones share the same switch.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryLogger {
    enabled: Arc<AtomicBool>,
}

impl DiscoveryLogger {
    pub fn new(enabled: bool) -> DiscoveryLogger {
        DiscoveryLogger {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// The process-wide handle used by sessions that are not given one. Off until enabled.
    pub fn process_default() -> DiscoveryLogger {
        static DEFAULT: OnceLock<DiscoveryLogger> = OnceLock::new();
        DEFAULT.get_or_init(|| DiscoveryLogger::new(false)).clone()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Logs at info level through `log` when the given [`DiscoveryLogger`] is enabled.
#[macro_export]
macro_rules! discovery_log {
    ($logger:expr, $($arg:tt)+) => {
        if $logger.is_enabled() {
            ::log::info!(target: $crate::LOG_TARGET, $($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_switch() {
        let logger = DiscoveryLogger::new(false);
        let clone = logger.clone();
        clone.enable();
        assert!(logger.is_enabled());
        logger.disable();
        assert!(!clone.is_enabled());
    }

    #[test]
    fn separate_handles_are_independent() {
        let a = DiscoveryLogger::new(true);
        let b = DiscoveryLogger::default();
        assert!(a.is_enabled());
        assert!(!b.is_enabled());
    }
}
