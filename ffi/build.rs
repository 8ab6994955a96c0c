// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:rerun-if-changed=build.rs");

    if target_os.contains("linux") {
        println!("cargo:rustc-cdylib-link-arg=-Wl,-soname,libdxdevice_discovery_ffi.so.0");
    }
}
