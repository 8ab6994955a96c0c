// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

#[cfg(windows)]
pub mod windows;

#[cfg(not(windows))]
pub mod unsupported;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        pub use windows as platform;
    } else {
        pub use unsupported as platform;
    }
}
