// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Deterministic driver stand-in for tests and the probe's mock mode.
// Author: Lukas Bower

//! Mock [`DriverApi`] implementation. Mirrors the real binding call for
//! call, counts every query it receives, and can inject a failure at any
//! of the query sites.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::driver::{ComputeCapability, DeviceRecord, DriverApi, DriverError};

/// Where the mock should fail, and with which native status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// `init` returns the given status.
    Init(i32),
    /// `device_count` returns the given status.
    Count(i32),
    /// `device_attributes` for the given ordinal returns the given status.
    Attributes(i32, i32),
}

/// Scripted driver with a fixed device inventory.
#[derive(Debug, Default)]
pub struct MockDriver {
    devices: Vec<DeviceRecord>,
    driver_version: (i32, i32),
    fault: Option<MockFault>,
    calls: AtomicUsize,
}

impl MockDriver {
    /// Mock exposing the given devices in enumeration order.
    #[must_use]
    pub fn with_devices(devices: Vec<DeviceRecord>) -> Self {
        Self {
            devices,
            driver_version: (12, 4),
            fault: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Inject a failure at one query site.
    #[must_use]
    pub fn with_fault(mut self, fault: MockFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Two-device inventory used by the probe's `--mock` mode.
    #[must_use]
    pub fn demo() -> Self {
        Self::with_devices(vec![
            DeviceRecord {
                capability: ComputeCapability { major: 8, minor: 9 },
                name: "NVIDIA GeForce RTX 4090".to_owned(),
            },
            DeviceRecord {
                capability: ComputeCapability { major: 8, minor: 0 },
                name: "NVIDIA A100-SXM4-80GB".to_owned(),
            },
        ])
    }

    /// Number of driver queries issued against this mock.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

impl DriverApi for MockDriver {
    fn init(&self) -> Result<(), DriverError> {
        self.record_call();
        match self.fault {
            Some(MockFault::Init(status)) => Err(DriverError::InitFailed(status)),
            _ => Ok(()),
        }
    }

    fn driver_version(&self) -> Result<(i32, i32), DriverError> {
        self.record_call();
        Ok(self.driver_version)
    }

    fn device_count(&self) -> Result<i32, DriverError> {
        self.record_call();
        match self.fault {
            Some(MockFault::Count(status)) => Err(DriverError::QueryFailed(status)),
            _ => Ok(self.devices.len() as i32),
        }
    }

    fn device_attributes(&self, ordinal: i32) -> Result<DeviceRecord, DriverError> {
        self.record_call();
        if let Some(MockFault::Attributes(at, status)) = self.fault {
            if at == ordinal {
                return Err(DriverError::QueryFailed(status));
            }
        }
        self.devices
            .get(ordinal as usize)
            .cloned()
            .ok_or(DriverError::QueryFailed(101))
    }
}
