use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};

const ALIGN: usize = 16;

/// Host allocation standing in for device memory.
struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The allocation is plain bytes; access is serialized by the owning Device.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Native "device" memory. Clones share the allocation, which is released
/// once the buffer and every launch referencing it let go.
#[derive(Clone)]
pub struct NativeMemory {
    inner: Arc<Allocation>,
    len: usize,
}

impl NativeMemory {
    pub(crate) fn zeroed(len: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len.max(1), ALIGN)
            .map_err(|e| Error::invalid_argument(format!("allocation of {} bytes: {}", len, e)))?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            Error::status(ErrorKind::OutOfMemory, "alloc_zeroed", -1)
        })?;
        Ok(Self {
            inner: Arc::new(Allocation { ptr, layout }),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Host address of the allocation; device memory is host memory on this backend.
    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.ptr.as_ptr()
    }

    pub(crate) fn write(&self, src: &[u8]) -> Result<()> {
        self.check_range(0, src.len())?;
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.as_ptr(), src.len()) };
        Ok(())
    }

    pub(crate) fn read(&self, dst: &mut [u8]) -> Result<()> {
        self.check_range(0, dst.len())?;
        unsafe { std::ptr::copy_nonoverlapping(self.as_ptr(), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    pub(crate) fn check_range(&self, offset: usize, size: usize) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::invalid_argument(format!(
                "range [{}..{}+{}] exceeds allocation of {} bytes",
                offset, offset, size, self.len
            ))),
        }
    }
}

impl fmt::Debug for NativeMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMemory")
            .field("ptr", &self.inner.ptr)
            .field("len", &self.len)
            .finish()
    }
}
