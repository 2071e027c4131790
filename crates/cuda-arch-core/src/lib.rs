// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Detect the minimum CUDA compute capability of this host.
// Author: Lukas Bower
#![warn(missing_docs)]

//! Core of the `cuda_arch` virtual package: detect the CUDA devices visible
//! to this host and reduce them to a single (version, build) pair that a
//! package resolver can compare against. Resolution happens at most once
//! per process; the cached result is immutable afterwards.
//!
//! The `CONDA_OVERRIDE_CUDA_ARCH` environment variable bypasses hardware
//! detection entirely, for cross-compilation and constrained environments.

use std::sync::OnceLock;

use serde::Serialize;

pub mod driver;
pub mod mock;
pub mod resolver;

pub use driver::{ComputeCapability, CudaDriver, DeviceRecord, DriverApi, DriverError};
pub use resolver::{
    resolve, resolve_from, resolve_with, sanitize_device_name, CapabilityResult,
    DEFAULT_OVERRIDE_BUILD, OVERRIDE_ENV,
};

/// Name of the published virtual package record.
pub const VIRTUAL_PACKAGE_NAME: &str = "cuda_arch";

/// The record published to the package resolver's capability registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualPackage {
    /// Fixed record identifier.
    pub name: &'static str,
    /// Minimum compute capability as `"{major}.{minor}"`.
    pub version: String,
    /// Sanitized device model or override label.
    pub build: String,
}

impl VirtualPackage {
    /// Map a resolution outcome to a publishable record; `Absent` publishes
    /// nothing.
    #[must_use]
    pub fn from_result(result: &CapabilityResult) -> Option<Self> {
        match result {
            CapabilityResult::Present { version, build } => Some(Self {
                name: VIRTUAL_PACKAGE_NAME,
                version: version.clone(),
                build: build.clone(),
            }),
            CapabilityResult::Absent => None,
        }
    }
}

static MINIMUM_SM: OnceLock<CapabilityResult> = OnceLock::new();

/// Resolve the host capability, at most once per process.
pub fn cached_minimum_sm() -> &'static CapabilityResult {
    MINIMUM_SM.get_or_init(resolver::resolve)
}

/// Registration-hook surface: the record to publish for this process, or
/// `None` when no CUDA capability could be determined.
pub fn virtual_package() -> Option<VirtualPackage> {
    VirtualPackage::from_result(cached_minimum_sm())
}
