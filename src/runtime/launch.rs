use crate::backend::{Backend, KernelArg};
use crate::core::BackendKind;
use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::kernel::Kernel;

/// Smallest multiple of `local_size` that covers `n` work-items.
///
/// ```
/// assert_eq!(gpapi::round_up_global(1000, 64), 1024);
/// assert_eq!(gpapi::round_up_global(1024, 64), 1024);
/// ```
pub fn round_up_global(n: usize, local_size: usize) -> usize {
    if local_size == 0 {
        return n;
    }
    n.div_ceil(local_size) * local_size
}

pub(crate) fn validate_launch(kind: BackendKind, global_size: usize, local_size: usize) -> Result<()> {
    if local_size == 0 {
        return Err(Error::invalid_argument("local size must be non-zero"));
    }
    if kind.is_gpu() && global_size % local_size != 0 {
        return Err(Error::invalid_argument(format!(
            "global size {} is not a multiple of local size {}; round it up with round_up_global",
            global_size, local_size
        )));
    }
    Ok(())
}

/// Positional arguments for the next dispatch of one kernel.
///
/// Arguments must be added in the kernel's declared parameter order.
#[derive(Debug)]
pub struct KernelLaunch<B: Backend> {
    kernel: Option<B::Kernel>,
    args: B::Args,
    num_args: usize,
}

impl<B: Backend> Default for KernelLaunch<B> {
    fn default() -> Self {
        Self {
            kernel: None,
            args: B::Args::default(),
            num_args: 0,
        }
    }
}

impl<B: Backend> KernelLaunch<B> {
    /// Targets `kernel` and drops all accumulated arguments.
    pub fn bind(&mut self, kernel: &Kernel<B>) {
        self.reset();
        self.kernel = kernel.get().copied();
    }

    pub fn is_bound(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn reset(&mut self) {
        self.args = B::Args::default();
        self.num_args = 0;
    }

    fn push(&mut self, arg: KernelArg<'_, B>) -> Result<()> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("no kernel bound; call set_kernel first"))?;
        B::push_arg(&mut self.args, kernel, arg)?;
        self.num_args += 1;
        Ok(())
    }

    pub fn add_buffer(&mut self, buffer: &Buffer<B>) -> Result<()> {
        let memory = buffer.get().ok_or_else(|| {
            Error::invalid_argument(format!("argument {} is an empty buffer", self.num_args))
        })?;
        self.push(KernelArg::Buffer(memory))
    }

    pub fn add_int(&mut self, value: i32) -> Result<()> {
        self.push(KernelArg::Int(value))
    }

    pub fn add_float(&mut self, value: f32) -> Result<()> {
        self.push(KernelArg::Float(value))
    }

    pub fn num_args(&self) -> usize {
        self.num_args
    }

    pub fn run(&self, queue: &B::Queue, context: &B::Context, global_size: usize, local_size: usize) -> Result<()> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("no kernel bound; call set_kernel first"))?;
        validate_launch(B::KIND, global_size, local_size)?;
        B::dispatch(queue, context, kernel, &self.args, global_size, local_size)
    }

    pub fn wait(&self, queue: &B::Queue, context: &B::Context) -> Result<()> {
        B::synchronize(queue, context)
    }

    /// Drops scalar copies and buffer references held for dispatch, and
    /// forgets the kernel handle.
    pub fn free_mem(&mut self) {
        self.reset();
        self.kernel = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_round_up_global() {
        assert_eq!(round_up_global(0, 64), 0);
        assert_eq!(round_up_global(1, 64), 64);
        assert_eq!(round_up_global(64, 64), 64);
        assert_eq!(round_up_global(65, 64), 128);
    }

    #[test]
    fn test_zero_local_size_is_rejected_everywhere() {
        for kind in [BackendKind::Native, BackendKind::OpenCl, BackendKind::Cuda] {
            let err = validate_launch(kind, 64, 0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_divisibility_only_matters_on_gpus() {
        assert!(validate_launch(BackendKind::Cuda, 1000, 64).is_err());
        assert!(validate_launch(BackendKind::OpenCl, 1000, 64).is_err());
        assert!(validate_launch(BackendKind::Cuda, 1024, 64).is_ok());
        assert!(validate_launch(BackendKind::Native, 1000, 64).is_ok());
    }
}
