use std::mem::size_of;

use bytemuck::Pod;

use crate::backend::{Backend, DeviceRecord};
use crate::core::DeviceInfo;
use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::kernel::Kernel;
use super::launch::KernelLaunch;
use super::queue::Queue;

/// Handle to a buffer owned by a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// Everything [`Device`] needs from enumeration and compilation.
#[derive(Debug)]
pub struct DeviceBinding<B: Backend> {
    pub record: DeviceRecord<B>,
    pub program: B::Program,
}

/// One compute device with its queue, kernel, pending launch and buffers.
///
/// A device owns its context and program: [`Device::release`] (or drop)
/// releases buffers, kernel and queue, then the program, then the context.
/// Devices share nothing, so each may be driven from its own thread.
#[derive(Debug)]
pub struct Device<B: Backend> {
    info: DeviceInfo,
    platform: B::Platform,
    device: B::DeviceId,
    context: Option<B::Context>,
    program: Option<B::Program>,
    queue: Queue<B>,
    kernel: Kernel<B>,
    launch: KernelLaunch<B>,
    buffers: Vec<Buffer<B>>,
}

impl<B: Backend> Device<B> {
    pub fn new(binding: DeviceBinding<B>) -> Result<Self> {
        let DeviceBinding { record, program } = binding;
        let mut device = Self {
            info: record.info,
            platform: record.platform,
            device: record.device,
            context: Some(record.context),
            program: Some(program),
            queue: Queue::default(),
            kernel: Kernel::default(),
            launch: KernelLaunch::default(),
            buffers: Vec::new(),
        };
        // on failure, dropping `device` releases program and context
        device.queue.init(&device.device, &record.context)?;
        Ok(device)
    }

    /// Tears down everything this device owns, then adopts `binding`.
    pub fn init(&mut self, binding: DeviceBinding<B>) -> Result<()> {
        self.teardown()?;
        let DeviceBinding { record, program } = binding;
        self.info = record.info;
        self.platform = record.platform;
        self.device = record.device;
        self.context = Some(record.context);
        self.program = Some(program);
        self.queue.init(&self.device, &record.context)
    }

    fn bound_context(&self) -> Result<&B::Context> {
        self.context
            .as_ref()
            .ok_or_else(|| Error::invalid_argument(format!("device {} has been released", self.info.name)))
    }

    fn bound_queue(&self) -> Result<&B::Queue> {
        self.queue
            .get()
            .ok_or_else(|| Error::invalid_argument(format!("device {} has no queue", self.info.name)))
    }

    /// Binds `name` inside this device's program and clears pending arguments.
    pub fn set_kernel(&mut self, name: &str) -> Result<()> {
        let context = *self.bound_context()?;
        let program = self
            .program
            .ok_or_else(|| Error::invalid_argument(format!("device {} has no program", self.info.name)))?;
        let bound = self.kernel.init(name, &context, &program);
        // the previous kernel is gone even when binding the new one failed
        self.launch.bind(&self.kernel);
        bound?;
        log::info!("kernel {} for device {} bound", name, self.info.name);
        Ok(())
    }

    pub fn add_param_int(&mut self, value: i32) -> Result<()> {
        self.launch.add_int(value)
    }

    pub fn add_param_float(&mut self, value: f32) -> Result<()> {
        self.launch.add_float(value)
    }

    /// Allocates a device-owned buffer of `num_bytes`, uploads `host` when
    /// given, and appends it as the next kernel argument.
    ///
    /// On failure nothing is allocated and no [`BufferId`] is consumed.
    pub fn add_param_buffer(&mut self, host: Option<&[u8]>, num_bytes: usize) -> Result<BufferId> {
        let context = *self.bound_context()?;
        let queue = *self.bound_queue()?;
        if !self.launch.is_bound() {
            return Err(Error::invalid_argument("no kernel bound; call set_kernel first"));
        }
        if num_bytes == 0 {
            return Err(Error::invalid_argument(format!(
                "argument {} is an empty buffer",
                self.launch.num_args()
            )));
        }

        let mut buffer = Buffer::new();
        buffer.init(&queue, &context, host, num_bytes)?;
        let id = BufferId(self.buffers.len());
        self.buffers.push(buffer);
        if let Err(e) = self.add_buffer_arg(id) {
            if let Some(mut orphan) = self.buffers.pop() {
                if let Err(release) = orphan.free_mem() {
                    log::warn!("failed to release buffer {:?}: {}", id, release);
                }
            }
            return Err(e);
        }
        Ok(id)
    }

    pub fn add_param_slice<T: Pod>(&mut self, data: &[T]) -> Result<BufferId> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.add_param_buffer(Some(bytes), bytes.len())
    }

    /// Uninitialized output buffer of `len` elements of `T`.
    pub fn add_param_output<T: Pod>(&mut self, len: usize) -> Result<BufferId> {
        self.add_param_buffer(None, len * size_of::<T>())
    }

    /// Passes an already owned buffer as the next kernel argument.
    pub fn add_buffer_arg(&mut self, id: BufferId) -> Result<()> {
        let buffer = self
            .buffers
            .get(id.0)
            .ok_or_else(|| Error::invalid_argument(format!("unknown buffer {:?}", id)))?;
        self.launch.add_buffer(buffer)
    }

    pub fn launch_kernel(&mut self, global_size: usize, local_size: usize) -> Result<()> {
        let context = *self.bound_context()?;
        let queue = *self.bound_queue()?;
        log::debug!(
            "launching `{}` on {} with {} args, global={} local={}",
            self.kernel.name(),
            self.info.name,
            self.launch.num_args(),
            global_size,
            local_size
        );
        self.launch.run(&queue, &context, global_size, local_size)
    }

    pub fn wait(&self) -> Result<()> {
        self.launch.wait(self.bound_queue()?, self.bound_context()?)
    }

    /// Copies `dst.len()` bytes from the start of buffer `id`.
    pub fn download(&self, id: BufferId, dst: &mut [u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get(id.0)
            .ok_or_else(|| Error::invalid_argument(format!("unknown buffer {:?}", id)))?;
        let num_bytes = dst.len();
        buffer.download(self.bound_queue()?, self.bound_context()?, dst, num_bytes)
    }

    pub fn download_slice<T: Pod>(&self, id: BufferId, dst: &mut [T]) -> Result<()> {
        self.download(id, bytemuck::cast_slice_mut(dst))
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer<B>> {
        self.buffers.get(id.0)
    }

    /// Releases owned buffers, then the kernel, then the queue. Calling it
    /// again is a no-op. Keeps going past failures and returns the first.
    pub fn free_mem(&mut self) -> Result<()> {
        let mut first = Ok(());
        let mut keep = |result: Result<()>| {
            if let Err(e) = result {
                log::warn!("release failed: {}", e);
                if first.is_ok() {
                    first = Err(e);
                }
            }
        };

        for mut buffer in self.buffers.drain(..) {
            keep(buffer.free_mem());
        }
        self.launch.free_mem();
        keep(self.kernel.free_mem());
        keep(self.queue.free_mem());
        first
    }

    fn teardown(&mut self) -> Result<()> {
        let mut result = self.free_mem();
        if let (Some(program), Some(context)) = (self.program.take(), self.context.as_ref()) {
            if let Err(e) = B::release_program(context, program) {
                log::warn!("failed to release program of {}: {}", self.info.name, e);
                result = result.and(Err(e));
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = B::release_context(context) {
                log::warn!("failed to release context of {}: {}", self.info.name, e);
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Full teardown, reporting the first failure.
    pub fn release(mut self) -> Result<()> {
        self.teardown()
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn platform(&self) -> &B::Platform {
        &self.platform
    }

    pub fn device_id(&self) -> &B::DeviceId {
        &self.device
    }

    pub fn context(&self) -> Option<&B::Context> {
        self.context.as_ref()
    }

    pub fn program(&self) -> Option<&B::Program> {
        self.program.as_ref()
    }

    pub fn kernel(&self) -> Option<&B::Kernel> {
        self.kernel.get()
    }

    /// Arguments accumulated since the last [`Device::set_kernel`].
    pub fn num_args(&self) -> usize {
        self.launch.num_args()
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn queue(&self) -> Option<&B::Queue> {
        self.queue.get()
    }

    pub fn local_memory_size(&self) -> usize {
        self.info.local_memory_size
    }

    pub fn max_threads_per_block(&self) -> usize {
        self.info.max_threads_per_block
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("teardown of device {} failed: {}", self.info.name, e);
        }
    }
}
