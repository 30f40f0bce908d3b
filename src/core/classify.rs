//! Best-effort vendor/class guess from an advertised device name.
//!
//! This is plain substring matching and is not reliable: names that match
//! none of the markers resolve to `Unknown`.

use super::filter::{DeviceClass, Vendor};

const NVIDIA_MARKERS: [&str; 3] = ["geforce", "quadro", "tesla"];

pub fn vendor_from_name(name: &str) -> Vendor {
    let name = name.to_lowercase();
    if name.contains("intel") {
        Vendor::Intel
    } else if NVIDIA_MARKERS.iter().any(|m| name.contains(m)) {
        Vendor::Nvidia
    } else if name.contains("hd graphics") {
        Vendor::Intel
    } else if name.contains("amd") {
        Vendor::Amd
    } else {
        Vendor::Unknown
    }
}

pub fn class_from_name(name: &str) -> DeviceClass {
    let name = name.to_lowercase();
    if name.contains("intel(r) core") {
        DeviceClass::Cpu
    } else if NVIDIA_MARKERS.iter().any(|m| name.contains(m))
        || name.contains("hd graphics")
        || name.contains("hawaii")
    {
        DeviceClass::Gpu
    } else {
        DeviceClass::Unknown
    }
}

pub fn classify(name: &str) -> (Vendor, DeviceClass) {
    (vendor_from_name(name), class_from_name(name))
}
