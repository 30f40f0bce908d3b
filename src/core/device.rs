use serde::{Deserialize, Serialize};

use super::filter::{DeviceClass, Vendor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    OpenCl,
    Cuda,
    Native,
}

impl BackendKind {
    pub fn is_gpu(self) -> bool {
        !matches!(self, BackendKind::Native)
    }
}

/// Identity and capability data captured for one device during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub backend: BackendKind,
    pub name: String, // "GeForce GTX 780", "Intel(R) Core(TM) i7", "NATIVE"
    pub vendor: Vendor,
    pub class: DeviceClass,
    /// Position among devices of the same vendor and class, as seen by the filter.
    pub ordinal: u32,

    pub local_memory_size: usize, // shared memory per block / local memory per work-group
    pub max_threads_per_block: usize,
}
