// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Minimal dynamic binding to the CUDA driver library.
// Author: Lukas Bower

//! Runtime binding to the vendor driver using dynamic loading of
//! `libcuda.so` (POSIX) or `nvcuda.dll` (Windows). The binding exposes the
//! four entry points the resolver needs and nothing else; every status code
//! is translated into [`DriverError`] rather than surfaced raw.

use std::ffi::{c_char, c_int, c_uint};
use std::fmt;

use libloading::Library;
use thiserror::Error;

const CUDA_SUCCESS: c_int = 0;
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR: c_int = 75;
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR: c_int = 76;

/// Fixed buffer length for `cuDeviceGetName`.
pub const DEVICE_NAME_BUFFER_LEN: usize = 256;

type FnCuInit = unsafe extern "C" fn(flags: c_uint) -> c_int;
type FnCuDriverGetVersion = unsafe extern "C" fn(version: *mut c_int) -> c_int;
type FnCuDeviceGetCount = unsafe extern "C" fn(count: *mut c_int) -> c_int;
type FnCuDeviceGetAttribute =
    unsafe extern "C" fn(value: *mut c_int, attribute: c_int, device: c_int) -> c_int;
type FnCuDeviceGetName =
    unsafe extern "C" fn(name: *mut c_char, len: c_int, device: c_int) -> c_int;

/// Failures raised by the driver binding.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The host platform has no known driver library name.
    #[error("no CUDA driver library name for this platform")]
    UnsupportedPlatform,
    /// The driver library could not be loaded or is missing a symbol.
    #[error("failed to load {library}: {source}")]
    Load {
        /// Platform library name that was attempted.
        library: &'static str,
        /// Underlying loader failure.
        #[source]
        source: libloading::Error,
    },
    /// `cuInit` returned a non-success status.
    #[error("cuInit failed with status {0}")]
    InitFailed(i32),
    /// A version, count, or attribute query returned a non-success status.
    #[error("driver query failed with status {0}")]
    QueryFailed(i32),
}

/// One device's architecture level, ordered by (major, minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputeCapability {
    /// Major architecture generation.
    pub major: i32,
    /// Minor revision within the generation.
    pub minor: i32,
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Attributes reported for one device during an enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Compute capability of the device.
    pub capability: ComputeCapability,
    /// Raw device name as reported by the driver.
    pub name: String,
}

/// Driver query surface consumed by the resolver.
///
/// The real implementation is [`CudaDriver`]; tests and the probe's mock
/// mode substitute deterministic stand-ins.
pub trait DriverApi {
    /// Initialise the driver (`cuInit` with flag 0).
    fn init(&self) -> Result<(), DriverError>;
    /// Driver version as a (major, minor) pair.
    fn driver_version(&self) -> Result<(i32, i32), DriverError>;
    /// Number of visible devices.
    fn device_count(&self) -> Result<i32, DriverError>;
    /// Capability and name of the device at `ordinal`.
    fn device_attributes(&self, ordinal: i32) -> Result<DeviceRecord, DriverError>;
}

fn library_name() -> Result<&'static str, DriverError> {
    if cfg!(windows) {
        Ok("nvcuda.dll")
    } else if cfg!(unix) {
        Ok("libcuda.so")
    } else {
        Err(DriverError::UnsupportedPlatform)
    }
}

/// Split the combined driver version integer into (major, minor).
fn decode_driver_version(raw: i32) -> (i32, i32) {
    (raw / 1000, (raw % 1000) / 10)
}

/// Decode a NUL-terminated name buffer, tolerating a full buffer.
fn decode_name_buffer(buffer: &[u8]) -> String {
    let end = buffer
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}

fn check(status: c_int) -> Result<(), DriverError> {
    if status == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(DriverError::QueryFailed(status))
    }
}

/// Live binding to the CUDA driver library.
///
/// All entry points are resolved once at load so a broken install fails
/// up front rather than mid-enumeration.
pub struct CudaDriver {
    cu_init: FnCuInit,
    cu_driver_get_version: FnCuDriverGetVersion,
    cu_device_get_count: FnCuDeviceGetCount,
    cu_device_get_attribute: FnCuDeviceGetAttribute,
    cu_device_get_name: FnCuDeviceGetName,
    // Keeps the resolved symbols valid; never read after load.
    _lib: Library,
}

impl fmt::Debug for CudaDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaDriver").finish_non_exhaustive()
    }
}

impl CudaDriver {
    /// Load the platform's driver library and resolve its entry points.
    pub fn load() -> Result<Self, DriverError> {
        let library = library_name()?;
        let load_err = |source| DriverError::Load { library, source };
        // SAFETY: symbol names and signatures follow the driver API contract;
        // the fn pointers stay valid for as long as `_lib` is held.
        let lib = unsafe { Library::new(library) }.map_err(load_err)?;
        unsafe {
            let cu_init = *lib.get::<FnCuInit>(b"cuInit\0").map_err(load_err)?;
            let cu_driver_get_version = *lib
                .get::<FnCuDriverGetVersion>(b"cuDriverGetVersion\0")
                .map_err(load_err)?;
            let cu_device_get_count = *lib
                .get::<FnCuDeviceGetCount>(b"cuDeviceGetCount\0")
                .map_err(load_err)?;
            let cu_device_get_attribute = *lib
                .get::<FnCuDeviceGetAttribute>(b"cuDeviceGetAttribute\0")
                .map_err(load_err)?;
            let cu_device_get_name = *lib
                .get::<FnCuDeviceGetName>(b"cuDeviceGetName\0")
                .map_err(load_err)?;
            Ok(Self {
                cu_init,
                cu_driver_get_version,
                cu_device_get_count,
                cu_device_get_attribute,
                cu_device_get_name,
                _lib: lib,
            })
        }
    }
}

impl DriverApi for CudaDriver {
    fn init(&self) -> Result<(), DriverError> {
        // Flag 0 is the only defined cuInit value.
        let status = unsafe { (self.cu_init)(0) };
        if status == CUDA_SUCCESS {
            Ok(())
        } else {
            Err(DriverError::InitFailed(status))
        }
    }

    fn driver_version(&self) -> Result<(i32, i32), DriverError> {
        let mut raw: c_int = 0;
        check(unsafe { (self.cu_driver_get_version)(&mut raw) })?;
        Ok(decode_driver_version(raw))
    }

    fn device_count(&self) -> Result<i32, DriverError> {
        let mut count: c_int = 0;
        check(unsafe { (self.cu_device_get_count)(&mut count) })?;
        Ok(count)
    }

    fn device_attributes(&self, ordinal: i32) -> Result<DeviceRecord, DriverError> {
        let mut major: c_int = 0;
        let mut minor: c_int = 0;
        check(unsafe {
            (self.cu_device_get_attribute)(
                &mut major,
                CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
                ordinal,
            )
        })?;
        check(unsafe {
            (self.cu_device_get_attribute)(
                &mut minor,
                CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
                ordinal,
            )
        })?;
        let mut buffer = [0u8; DEVICE_NAME_BUFFER_LEN];
        check(unsafe {
            (self.cu_device_get_name)(
                buffer.as_mut_ptr().cast::<c_char>(),
                buffer.len() as c_int,
                ordinal,
            )
        })?;
        Ok(DeviceRecord {
            capability: ComputeCapability { major, minor },
            name: decode_name_buffer(&buffer),
        })
    }
}
