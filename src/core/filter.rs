//! Vendor / device-class filter applied during enumeration.
//!
//! ```
//! use gpapi::{VendorFilter, Vendor, DeviceClass};
//!
//! let mut filter = VendorFilter::default(); // every device enabled
//! filter.intel.set_enabled(false);
//! filter.nvidia.set_enabled(false);
//! filter.amd.set_enabled(false);
//! filter.amd.set_mask(u32::MAX, DeviceClass::Cpu);
//! // only AMD CPUs and devices of unknown vendor survive
//! assert!(filter.is_active(Vendor::Amd, DeviceClass::Cpu, 0));
//! assert!(!filter.is_active(Vendor::Amd, DeviceClass::Gpu, 0));
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Intel,
    Nvidia,
    Amd,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Cpu,
    Gpu,
    Accelerator,
    Unknown,
}

/// Per-class bitmasks for one vendor. Bit `i` gates the `i`-th device of that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMask {
    pub cpu: u32,
    pub gpu: u32,
    pub accel: u32,
    pub other: u32,
}

impl VendorMask {
    pub const ALL: VendorMask = VendorMask {
        cpu: u32::MAX,
        gpu: u32::MAX,
        accel: u32::MAX,
        other: u32::MAX,
    };

    pub const NONE: VendorMask = VendorMask {
        cpu: 0,
        gpu: 0,
        accel: 0,
        other: 0,
    };

    /// Turns every device class of this vendor on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        *self = if enabled { Self::ALL } else { Self::NONE };
    }

    pub fn set_mask(&mut self, mask: u32, class: DeviceClass) {
        *self.mask_mut(class) = mask;
    }

    pub fn mask(&self, class: DeviceClass) -> u32 {
        match class {
            DeviceClass::Cpu => self.cpu,
            DeviceClass::Gpu => self.gpu,
            DeviceClass::Accelerator => self.accel,
            DeviceClass::Unknown => self.other,
        }
    }

    fn mask_mut(&mut self, class: DeviceClass) -> &mut u32 {
        match class {
            DeviceClass::Cpu => &mut self.cpu,
            DeviceClass::Gpu => &mut self.gpu,
            DeviceClass::Accelerator => &mut self.accel,
            DeviceClass::Unknown => &mut self.other,
        }
    }

    /// Ordinals past the mask width are only admitted by a fully enabled mask.
    pub fn is_active(&self, class: DeviceClass, ordinal: u32) -> bool {
        let mask = self.mask(class);
        match 1u32.checked_shl(ordinal) {
            Some(bit) => mask & bit != 0,
            None => mask == u32::MAX,
        }
    }
}

impl Default for VendorMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Decides which enumerated devices are materialized by [`crate::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorFilter {
    pub intel: VendorMask,
    pub nvidia: VendorMask,
    pub amd: VendorMask,
    pub other: VendorMask,
}

impl VendorFilter {
    /// A filter that rejects every device.
    pub fn none() -> Self {
        Self {
            intel: VendorMask::NONE,
            nvidia: VendorMask::NONE,
            amd: VendorMask::NONE,
            other: VendorMask::NONE,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        for vendor in [Vendor::Intel, Vendor::Nvidia, Vendor::Amd, Vendor::Unknown] {
            self.vendor_mut(vendor).set_enabled(enabled);
        }
    }

    pub fn vendor(&self, vendor: Vendor) -> &VendorMask {
        match vendor {
            Vendor::Intel => &self.intel,
            Vendor::Nvidia => &self.nvidia,
            Vendor::Amd => &self.amd,
            Vendor::Unknown => &self.other,
        }
    }

    pub fn vendor_mut(&mut self, vendor: Vendor) -> &mut VendorMask {
        match vendor {
            Vendor::Intel => &mut self.intel,
            Vendor::Nvidia => &mut self.nvidia,
            Vendor::Amd => &mut self.amd,
            Vendor::Unknown => &mut self.other,
        }
    }

    pub fn is_active(&self, vendor: Vendor, class: DeviceClass, ordinal: u32) -> bool {
        self.vendor(vendor).is_active(class, ordinal)
    }
}

/// Hands out per-(vendor, class) ordinals in enumeration order.
#[derive(Debug, Default)]
#[cfg_attr(not(feature = "opencl"), allow(dead_code))]
pub(crate) struct OrdinalCounter {
    seen: std::collections::HashMap<(Vendor, DeviceClass), u32>,
}

#[cfg_attr(not(feature = "opencl"), allow(dead_code))]
impl OrdinalCounter {
    pub(crate) fn next(&mut self, vendor: Vendor, class: DeviceClass) -> u32 {
        let slot = self.seen.entry((vendor, class)).or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        ordinal
    }
}
