use std::marker::PhantomData;
use std::ptr;

use cudarc::driver::sys;

use super::check;
use crate::error::{ErrorKind, Result};

/// Makes a context current on this thread for the guard's lifetime.
///
/// The driver keeps a per-thread stack of current contexts; the guard pushes
/// on creation and pops on drop, so the caller's previous context is
/// restored on every exit path.
pub(crate) struct ContextGuard {
    // the pushed context belongs to this thread's stack
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    #[track_caller]
    pub(crate) fn push(context: sys::CUcontext) -> Result<Self> {
        check(
            unsafe { sys::lib().cuCtxPushCurrent_v2(context) },
            "cuCtxPushCurrent",
            ErrorKind::DeviceLost,
        )?;
        Ok(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let mut popped: sys::CUcontext = ptr::null_mut();
        let res = unsafe { sys::lib().cuCtxPopCurrent_v2(&mut popped) };
        if res as i32 != 0 {
            log::warn!("cuCtxPopCurrent returned {:?}", res);
        }
    }
}

/// Creates a context for `device` and leaves the calling thread's context stack unchanged.
pub(crate) fn create(device: sys::CUdevice) -> Result<sys::CUcontext> {
    let mut context: sys::CUcontext = ptr::null_mut();
    check(
        unsafe { sys::lib().cuCtxCreate_v2(&mut context, 0, device) },
        "cuCtxCreate",
        ErrorKind::DeviceLost,
    )?;
    // cuCtxCreate makes the new context current
    let mut popped: sys::CUcontext = ptr::null_mut();
    check(
        unsafe { sys::lib().cuCtxPopCurrent_v2(&mut popped) },
        "cuCtxPopCurrent",
        ErrorKind::DeviceLost,
    )?;
    Ok(context)
}
