//! Backend capability interface and its implementations.
//!
//! Exactly one backend is active per build (see [`crate::ActiveBackend`]);
//! everything in [`crate::runtime`] is generic over [`Backend`] and contains
//! no backend-specific branches.

use std::fmt::Debug;

use crate::core::{BackendKind, BuildConfig, DeviceInfo, VendorFilter};
use crate::error::Result;

pub mod native;
pub mod params;

#[cfg(feature = "opencl")]
pub mod opencl;

#[cfg(feature = "cuda")]
pub mod cuda;

/// Kernel source text that has already been read, plus a name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct KernelSource<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

impl<'a> KernelSource<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }
}

/// One positional kernel argument in backend-neutral form.
#[derive(Debug)]
pub enum KernelArg<'a, B: Backend> {
    Buffer(&'a B::Memory),
    Int(i32),
    Float(f32),
}

/// A device that survived filtering, with the context created for it.
#[derive(Debug)]
pub struct DeviceRecord<B: Backend> {
    pub platform: B::Platform,
    pub device: B::DeviceId,
    pub context: B::Context,
    pub info: DeviceInfo,
}

/// Memory, queue and execution primitives of one compute backend.
///
/// Implementations check every native status code right after the call and
/// turn failures into [`crate::Error`]; none of them panic or exit.
pub trait Backend: Sized + Send + 'static {
    const KIND: BackendKind;

    type Platform: Copy + Debug + Send;
    type DeviceId: Copy + Debug + Send;
    type Context: Copy + Debug + Send;
    type Program: Copy + Debug + Send;
    type Queue: Copy + Debug + Send;
    type Memory: Debug + Send;
    type Kernel: Copy + Debug + Send;
    /// Accumulated arguments for the next dispatch, in the backend's native format.
    type Args: Default + Debug + Send;

    // Discovery

    /// Lists devices, drops those rejected by `filter` and creates one context per survivor.
    fn enumerate(filter: &VendorFilter) -> Result<Vec<DeviceRecord<Self>>>;

    /// Produces one program per record, in record order.
    fn compile(
        source: &KernelSource<'_>,
        config: &BuildConfig,
        devices: &[DeviceRecord<Self>],
    ) -> Result<Vec<Self::Program>>;

    fn release_program(context: &Self::Context, program: Self::Program) -> Result<()>;
    fn release_context(context: Self::Context) -> Result<()>;

    // Queue

    fn create_queue(device: &Self::DeviceId, context: &Self::Context) -> Result<Self::Queue>;
    fn release_queue(queue: Self::Queue) -> Result<()>;

    // Memory

    fn allocate(queue: &Self::Queue, context: &Self::Context, num_bytes: usize) -> Result<Self::Memory>;
    /// Blocking host-to-device copy of `src.len()` bytes to the start of `memory`.
    fn upload(queue: &Self::Queue, context: &Self::Context, memory: &Self::Memory, src: &[u8]) -> Result<()>;
    /// Blocking device-to-host copy of `dst.len()` bytes from the start of `memory`.
    fn download(queue: &Self::Queue, context: &Self::Context, memory: &Self::Memory, dst: &mut [u8]) -> Result<()>;
    fn free(context: &Self::Context, memory: Self::Memory) -> Result<()>;

    // Execution

    fn bind(context: &Self::Context, program: &Self::Program, name: &str) -> Result<Self::Kernel>;
    fn unbind(context: &Self::Context, kernel: Self::Kernel) -> Result<()>;
    fn push_arg(args: &mut Self::Args, kernel: &Self::Kernel, arg: KernelArg<'_, Self>) -> Result<()>;
    fn dispatch(
        queue: &Self::Queue,
        context: &Self::Context,
        kernel: &Self::Kernel,
        args: &Self::Args,
        global_size: usize,
        local_size: usize,
    ) -> Result<()>;
    /// Blocks until everything submitted to `queue` has completed.
    fn synchronize(queue: &Self::Queue, context: &Self::Context) -> Result<()>;
}
