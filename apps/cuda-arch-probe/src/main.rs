// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the cuda_arch host probe.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Diagnostic CLI around `cuda-arch-core`. Prints the capability record the
//! registry would publish for this host, either as a plain
//! `__cuda_arch=<version>=<build>` line or as JSON, and can dump the raw
//! device inventory for troubleshooting.

use std::env;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use cuda_arch_core::mock::MockDriver;
use cuda_arch_core::{
    cached_minimum_sm, resolve_from, CudaDriver, DriverApi, VirtualPackage, OVERRIDE_ENV,
    VIRTUAL_PACKAGE_NAME,
};
use log::info;

/// CLI arguments for the cuda_arch probe.
#[derive(Debug, Parser)]
#[command(author, version, about = "cuda_arch virtual package host probe")]
struct Args {
    /// Print the capability record as pretty JSON instead of a plain line.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Use a deterministic mock driver instead of the real CUDA library.
    #[arg(long, action = ArgAction::SetTrue)]
    mock: bool,
    /// Log driver version and every detected device before printing.
    #[arg(long, action = ArgAction::SetTrue)]
    devices: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.devices {
        list_devices(args.mock)?;
    }

    let result = if args.mock {
        let driver = MockDriver::demo();
        resolve_from(env::var(OVERRIDE_ENV).ok().as_deref(), &driver)
    } else {
        cached_minimum_sm().clone()
    };

    match VirtualPackage::from_result(&result) {
        Some(record) if args.json => println!("{}", serde_json::to_string_pretty(&record)?),
        Some(record) => println!("__{}={}={}", record.name, record.version, record.build),
        None => info!("no {VIRTUAL_PACKAGE_NAME} capability on this host; nothing published"),
    }
    Ok(())
}

/// Walk the driver directly and log what it reports, mirroring the record's
/// inputs. Driver failures here are hard errors so a broken install is
/// visible, unlike plain resolution which degrades to absence.
fn list_devices(mock: bool) -> Result<()> {
    let driver: Box<dyn DriverApi> = if mock {
        Box::new(MockDriver::demo())
    } else {
        Box::new(CudaDriver::load().context("load cuda driver library")?)
    };
    let (major, minor) = driver.driver_version().context("query driver version")?;
    info!("driver version: {major}.{minor}");
    driver.init().context("initialise cuda driver")?;
    let count = driver.device_count().context("query device count")?;
    info!("device count: {count}");
    for ordinal in 0..count {
        let device = driver
            .device_attributes(ordinal)
            .with_context(|| format!("query device {ordinal}"))?;
        info!("device {ordinal}: {} {:?}", device.capability, device.name);
    }
    Ok(())
}
