// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve the minimum CUDA compute capability for this host.
// Author: Lukas Bower

//! Capability resolution: override parsing, device enumeration, the
//! minimum reduction, and device-name sanitization. The resolver never
//! raises; every driver failure collapses to [`CapabilityResult::Absent`].

use std::env;

use log::{debug, warn};

use crate::driver::{ComputeCapability, CudaDriver, DeviceRecord, DriverApi, DriverError};

/// Environment variable that bypasses live detection entirely.
pub const OVERRIDE_ENV: &str = "CONDA_OVERRIDE_CUDA_ARCH";

/// Build label substituted when an override omits or mangles its label.
pub const DEFAULT_OVERRIDE_BUILD: &str = "0";

const SM_SENTINEL: i32 = 999;
const PLACEHOLDER_DEVICE_NAME: &str = "None";
const MAX_BUILD_LEN: usize = 64;
const VENDOR_MARK: &str = "nvidia";

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityResult {
    /// A capability was determined; `version` is `"{major}.{minor}"` and
    /// `build` is the sanitized device name or override label.
    Present {
        /// Formatted compute-capability version.
        version: String,
        /// Sanitized model label.
        build: String,
    },
    /// No capability could be determined; nothing will be published.
    Absent,
}

impl CapabilityResult {
    /// True when a capability record will be published.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

/// Resolve the host capability from the process environment.
///
/// A set, non-empty [`OVERRIDE_ENV`] variable always takes the override
/// path, even when it cannot be parsed; only when the variable is unset or
/// empty does the resolver load the driver library and enumerate devices.
/// Driver load failure is the ordinary no-GPU case and yields `Absent`.
pub fn resolve() -> CapabilityResult {
    let override_value = env::var(OVERRIDE_ENV).ok();
    match override_value.as_deref() {
        Some(raw) if !raw.is_empty() => resolve_override(raw.trim()),
        _ => match CudaDriver::load() {
            Ok(driver) => resolve_with(&driver),
            Err(err) => {
                warn!("cuda driver library unavailable: {err}");
                CapabilityResult::Absent
            }
        },
    }
}

/// Resolve from an explicit override value and driver, without consulting
/// the process environment. The driver is untouched whenever the override
/// is set and non-empty, including values the grammar rejects.
pub fn resolve_from(override_value: Option<&str>, driver: &dyn DriverApi) -> CapabilityResult {
    match override_value {
        Some(raw) if !raw.is_empty() => resolve_override(raw.trim()),
        _ => resolve_with(driver),
    }
}

/// Enumerate devices through `driver` and reduce to the published floor.
pub fn resolve_with(driver: &dyn DriverApi) -> CapabilityResult {
    match enumerate_minimum(driver) {
        Ok(result) => result,
        Err(err) => {
            warn!("cuda device enumeration failed: {err}");
            CapabilityResult::Absent
        }
    }
}

fn enumerate_minimum(driver: &dyn DriverApi) -> Result<CapabilityResult, DriverError> {
    driver.init()?;
    let count = driver.device_count()?;
    if count <= 0 {
        debug!("no cuda devices reported");
        return Ok(CapabilityResult::Absent);
    }
    let mut devices = Vec::with_capacity(count as usize);
    for ordinal in 0..count {
        devices.push(driver.device_attributes(ordinal)?);
    }
    let (minimum, name) = reduce_minimum(devices);
    Ok(CapabilityResult::Present {
        version: minimum.to_string(),
        build: sanitize_device_name(&name),
    })
}

/// Reduce an enumeration pass to the published (capability, name) floor.
///
/// A device replaces the running minimum only when BOTH components strictly
/// decrease. This is intentionally not a lexicographic minimum; the
/// selection rule is a preserved compatibility contract (see DESIGN.md).
/// An empty pass leaves the sentinels in place.
pub fn reduce_minimum(
    devices: impl IntoIterator<Item = DeviceRecord>,
) -> (ComputeCapability, String) {
    let mut minimum = ComputeCapability {
        major: SM_SENTINEL,
        minor: SM_SENTINEL,
    };
    let mut name = PLACEHOLDER_DEVICE_NAME.to_owned();
    for device in devices {
        if device.capability.major < minimum.major && device.capability.minor < minimum.minor {
            minimum = device.capability;
            name = device.name;
        }
    }
    (minimum, name)
}

fn resolve_override(raw: &str) -> CapabilityResult {
    let (version, build) = match raw.split_once('=') {
        Some((version, build)) => (version, Some(build)),
        None => (raw, None),
    };
    if !is_version(version) {
        warn!("{OVERRIDE_ENV}: version {version:?} does not match <digits>.<digits>; ignoring override");
        return CapabilityResult::Absent;
    }
    let build = match build {
        Some(build) if is_build_label(build) => build,
        Some(build) => {
            warn!(
                "{OVERRIDE_ENV}: build label {build:?} contains characters outside [A-Za-z0-9_.+]; using {DEFAULT_OVERRIDE_BUILD:?}"
            );
            DEFAULT_OVERRIDE_BUILD
        }
        None => {
            warn!("{OVERRIDE_ENV}: no build label supplied; using {DEFAULT_OVERRIDE_BUILD:?}");
            DEFAULT_OVERRIDE_BUILD
        }
    };
    CapabilityResult::Present {
        version: version.to_owned(),
        build: build.to_owned(),
    }
}

fn is_version(text: &str) -> bool {
    match text.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn is_build_label(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'+'))
}

/// Sanitize a raw device name into a build label: keep ASCII alphanumerics,
/// strip every case-insensitive `NVIDIA`, cap at 64 characters. The result
/// may legitimately be empty.
#[must_use]
pub fn sanitize_device_name(raw: &str) -> String {
    let mut name: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
    strip_vendor(&mut name);
    name.truncate(MAX_BUILD_LEN);
    name
}

fn strip_vendor(name: &mut String) {
    // Removal can splice a fresh occurrence together, so rescan until none
    // remain; this keeps the transform idempotent.
    loop {
        match name.to_ascii_lowercase().find(VENDOR_MARK) {
            Some(at) => {
                name.replace_range(at..at + VENDOR_MARK.len(), "");
            }
            None => break,
        }
    }
}
