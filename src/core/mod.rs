pub mod classify;
pub mod config;
pub mod device;
pub mod filter;

pub use config::{BuildConfig, Config};
pub use device::{BackendKind, DeviceInfo};
pub use filter::{DeviceClass, Vendor, VendorFilter, VendorMask};
