//! # gpapi: one device vocabulary over OpenCL, CUDA and the host CPU
//!
//! gpapi enumerates compute devices, filters them by vendor and class,
//! compiles one kernel source for every survivor and drives each device
//! through the same buffer / kernel / launch lifecycle, whichever backend
//! the crate was built with.
//!
//! ## Core Modules
//!
//! - **[`core`]**: Vendor filter, name-based classification, device info and build configuration.
//! - **[`backend`]**: The [`Backend`] capability trait and its OpenCL, CUDA and native implementations.
//! - **[`runtime`]**: [`Device`], [`Buffer`], kernel launch and the [`init`] / [`free`] entry points.
//!
//! ## Features
//!
//! - `opencl`: OpenCL ICD backend, loaded at runtime.
//! - `cuda`: CUDA driver API + NVRTC backend via `cudarc`.
//!
//! With neither feature, [`ActiveBackend`] is the in-process native backend.
//! When both are enabled CUDA wins.
//!
//! ## Example
//!
//! ```
//! use gpapi::{init, free, round_up_global, ActiveBackend, KernelSource, VendorFilter};
//!
//! # #[cfg(not(any(feature = "cuda", feature = "opencl")))]
//! # fn main() -> gpapi::Result<()> {
//! let source = KernelSource::new("vec_add", "builtin");
//! let mut devices = init::<ActiveBackend>(&source, &VendorFilter::default())?;
//!
//! for device in devices.iter_mut() {
//!     let n = 1000;
//!     let a: Vec<i32> = (0..n).collect();
//!     let b: Vec<i32> = (0..n).map(|i| i * 2).collect();
//!
//!     device.set_kernel("vecAdd")?;
//!     device.add_param_slice(&a)?;
//!     device.add_param_slice(&b)?;
//!     let c = device.add_param_output::<i32>(n as usize)?;
//!     device.add_param_int(n)?;
//!     device.launch_kernel(round_up_global(n as usize, 64), 64)?;
//!     device.wait()?;
//!
//!     let mut out = vec![0i32; n as usize];
//!     device.download_slice(c, &mut out)?;
//!     assert_eq!(out[999], 2997);
//! }
//! free(&mut devices)?;
//! # Ok(())
//! # }
//! # #[cfg(any(feature = "cuda", feature = "opencl"))]
//! # fn main() {}
//! ```

pub mod backend;
pub mod core;
pub mod error;
pub mod runtime;

pub use crate::backend::native::{global_id, register_kernel, NativeArgs, NativeBackend};
pub use crate::backend::{Backend, DeviceRecord, KernelArg, KernelSource};
pub use crate::core::{BackendKind, BuildConfig, Config, DeviceClass, DeviceInfo, Vendor, VendorFilter, VendorMask};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::runtime::{
    free, init, init_with_config, round_up_global, Buffer, BufferId, Device, DeviceBinding, KernelLaunch,
};

#[cfg(feature = "opencl")]
pub use crate::backend::opencl::OpenClBackend;

#[cfg(feature = "cuda")]
pub use crate::backend::cuda::CudaBackend;

/// The backend this build drives by default.
#[cfg(feature = "cuda")]
pub type ActiveBackend = backend::cuda::CudaBackend;

#[cfg(all(feature = "opencl", not(feature = "cuda")))]
pub type ActiveBackend = backend::opencl::OpenClBackend;

#[cfg(not(any(feature = "cuda", feature = "opencl")))]
pub type ActiveBackend = backend::native::NativeBackend;
