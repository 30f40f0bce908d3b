//! Packed kernel parameter block for drivers that take `void** kernelParams`.

use std::ffi::c_void;
use std::fmt;
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::error::{Error, Result};

pub const MAX_PARAM_BYTES: usize = 4096;
pub const MAX_PARAMS: usize = 1024;

/// Argument values copied back to back at their natural alignment.
///
/// The block never reallocates, so offsets recorded at push time stay valid
/// until [`ParamBlock::clear`].
pub struct ParamBlock {
    storage: Box<[u64]>,
    offsets: Vec<usize>,
    used: usize,
}

impl Default for ParamBlock {
    fn default() -> Self {
        Self {
            storage: vec![0u64; MAX_PARAM_BYTES / size_of::<u64>()].into_boxed_slice(),
            offsets: Vec::new(),
            used: 0,
        }
    }
}

impl ParamBlock {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.used
    }

    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    pub fn push<T: Pod>(&mut self, value: T) -> Result<()> {
        if self.offsets.len() >= MAX_PARAMS {
            return Err(Error::invalid_argument(format!(
                "kernel takes at most {} parameters",
                MAX_PARAMS
            )));
        }
        let offset = self.used.next_multiple_of(align_of::<T>());
        let end = offset + size_of::<T>();
        if end > MAX_PARAM_BYTES {
            return Err(Error::invalid_argument(format!(
                "parameter {} needs bytes {}..{} of a {} byte block",
                self.offsets.len(),
                offset,
                end,
                MAX_PARAM_BYTES
            )));
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.storage[..]);
        bytes[offset..end].copy_from_slice(bytemuck::bytes_of(&value));
        self.offsets.push(offset);
        self.used = end;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.storage[..])[..self.used]
    }

    /// One pointer per parameter, into this block. Valid while `self` is
    /// borrowed and unmodified.
    pub fn kernel_params(&self) -> Vec<*mut c_void> {
        let base = self.storage.as_ptr() as *const u8;
        self.offsets
            .iter()
            .map(|&off| unsafe { base.add(off) } as *mut c_void)
            .collect()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.used = 0;
    }
}

impl fmt::Debug for ParamBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamBlock")
            .field("offsets", &self.offsets)
            .field("used", &self.used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_land_at_natural_alignment() {
        let mut block = ParamBlock::default();
        block.push(7i32).unwrap();
        block.push(0xdead_beef_u64).unwrap(); // device pointer
        block.push(1.5f32).unwrap();

        assert_eq!(block.len(), 3);
        assert_eq!(block.offset(0), Some(0));
        assert_eq!(block.offset(1), Some(8));
        assert_eq!(block.offset(2), Some(16));
        assert_eq!(block.bytes_used(), 20);

        let bytes = block.as_bytes();
        assert_eq!(&bytes[0..4], &7i32.to_ne_bytes());
        assert_eq!(&bytes[8..16], &0xdead_beef_u64.to_ne_bytes());
        assert_eq!(&bytes[16..20], &1.5f32.to_ne_bytes());
    }

    #[test]
    fn test_kernel_params_point_into_block() {
        let mut block = ParamBlock::default();
        block.push(3i32).unwrap();
        block.push(42u64).unwrap();

        let params = block.kernel_params();
        assert_eq!(params.len(), 2);
        let first = unsafe { *(params[0] as *const i32) };
        let second = unsafe { *(params[1] as *const u64) };
        assert_eq!(first, 3);
        assert_eq!(second, 42);
        assert_eq!(params[1] as usize % align_of::<u64>(), 0);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut block = ParamBlock::default();
        for _ in 0..MAX_PARAM_BYTES / 8 {
            block.push(0u64).unwrap();
        }
        let err = block.push(1i32).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert_eq!(block.len(), MAX_PARAM_BYTES / 8);

        block.clear();
        assert!(block.is_empty());
        for _ in 0..MAX_PARAMS {
            block.push(0i32).unwrap();
        }
        assert!(block.push(0i32).is_err());
    }
}
