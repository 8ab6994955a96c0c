// Copyright 2025 The DirectX Device Discovery Authors
// SPDX-License-Identifier: MIT

use std::process::ExitCode;

use clap::Parser;
use clap::ValueEnum;
use dxdevice_discovery::CapabilityFilter;
use dxdevice_discovery::DeviceRecord;
use dxdevice_discovery::DiscoveryConfig;
use dxdevice_discovery::DiscoveryError;
use dxdevice_discovery::DiscoveryLogger;
use dxdevice_discovery::DiscoveryResult;
use dxdevice_discovery::DiscoverySession;
use dxdevice_discovery::RuntimeFileList;
use dxdevice_discovery::DISCOVERY_LIBRARY_VERSION;
use dxdevice_discovery::LOG_TARGET;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_filter(name: &str) -> Result<CapabilityFilter, String> {
    CapabilityFilter::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = CapabilityFilter::ALL_FILTERS
            .iter()
            .map(|filter| filter.name())
            .collect();
        format!("expected one of {}", names.join(", "))
    })
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Capability filter applied to the enumerated adapters
    #[arg(long, default_value = "AllDevices", value_parser = parse_filter)]
    filter: CapabilityFilter,

    /// Skip integrated adapters
    #[arg(long)]
    exclude_integrated: bool,

    /// Skip adapters that can be removed at runtime
    #[arg(long)]
    exclude_detachable: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log every discovery step to stderr
    #[arg(long)]
    verbose: bool,
}

fn print_runtime_files(device: &DeviceRecord, list: RuntimeFileList, directory: &str) {
    let files = device.runtime_files(list);
    println!();
    println!("{} Additional {directory} runtime files:", files.len());
    for file in files {
        println!("    {} => {}", file.source_path, file.destination_name);
    }
}

fn print_device(index: usize, device: &DeviceRecord) {
    println!("[Device {index} details]");
    println!();
    println!("PnP Hardware ID:     {}", device.id);
    println!("DX Adapter LUID:     {}", device.adapter.instance_luid);
    println!("Description:         {}", device.description);
    println!("Driver Registry Key: {}", device.driver_registry_key);
    println!("DriverStore Path:    {}", device.driver_store_path);
    println!("LocationPath:        {}", device.location_path);
    println!("Vendor:              {}", device.vendor);
    println!("Is Integrated:       {}", device.adapter.is_integrated);
    println!("Is Detachable:       {}", device.adapter.is_detachable);
    println!("Supports Display:    {}", device.adapter.supports_display);
    println!("Supports Compute:    {}", device.adapter.supports_compute);
    print_runtime_files(device, RuntimeFileList::Primary, "System32");
    print_runtime_files(device, RuntimeFileList::Wow64, "SysWOW64");
    println!();
}

fn run(args: &Args, session: &mut DiscoverySession) -> DiscoveryResult<()> {
    session.discover(args.filter, !args.exclude_integrated, !args.exclude_detachable)?;
    let devices = session.devices()?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(devices)
                .map_err(|e| DiscoveryError::message(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("DirectX device discovery library version {DISCOVERY_LIBRARY_VERSION}");
            println!("Discovered {} devices.", devices.len());
            println!();
            for (index, device) in devices.iter().enumerate() {
                print_device(index, device);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_module(LOG_TARGET, level)
        .init();

    let config = DiscoveryConfig::default().with_logger(DiscoveryLogger::new(args.verbose));
    let mut session = DiscoverySession::native(config);

    match run(&args, &mut session) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("device discovery failed: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_parse_case_insensitively() {
        assert_eq!(parse_filter("displayonly"), Ok(CapabilityFilter::DisplayOnly));
        assert_eq!(parse_filter("AllDevices"), Ok(CapabilityFilter::All));
        assert!(parse_filter("Everything").unwrap_err().contains("DisplayAndCompute"));
    }

    #[test]
    fn arguments_default_to_every_device() {
        let args = Args::parse_from(["dxdevice-probe"]);
        assert_eq!(args.filter, CapabilityFilter::All);
        assert!(!args.exclude_integrated);
        assert!(!args.exclude_detachable);
        assert_eq!(args.format, OutputFormat::Text);

        let args = Args::parse_from([
            "dxdevice-probe",
            "--filter",
            "ComputeOnly",
            "--exclude-integrated",
            "--format",
            "json",
        ]);
        assert_eq!(args.filter, CapabilityFilter::ComputeOnly);
        assert!(args.exclude_integrated);
        assert_eq!(args.format, OutputFormat::Json);
    }
}
