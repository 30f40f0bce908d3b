//! In-process CPU fallback.
//!
//! Device memory is host memory and kernels are Rust functions registered
//! by name. A launch calls the kernel once per work-item, sequentially on
//! the calling thread; the kernel reads its work-item index with
//! [`global_id`].

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::backend::{Backend, DeviceRecord, KernelArg, KernelSource};
use crate::core::{BackendKind, BuildConfig, DeviceClass, DeviceInfo, Vendor, VendorFilter};
use crate::error::{Error, Result};

mod args;
pub mod kernels;
mod memory;

pub use args::NativeArgs;
pub use memory::NativeMemory;

pub const DEVICE_NAME: &str = "NATIVE";

/// Signature of a kernel runnable on the native backend.
pub type NativeKernelFn = fn(&NativeArgs) -> Result<()>;

thread_local! {
    static WORK_ITEM: Cell<usize> = const { Cell::new(0) };
}

/// Index of the work-item currently executing on this thread.
pub fn global_id() -> usize {
    WORK_ITEM.with(|w| w.get())
}

fn registry() -> &'static RwLock<HashMap<String, NativeKernelFn>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, NativeKernelFn>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let builtins = kernels::builtins()
            .iter()
            .map(|(name, f)| (name.to_string(), *f))
            .collect();
        RwLock::new(builtins)
    })
}

/// Makes `func` bindable under `name` on every native device. Replaces any
/// kernel previously registered under the same name.
pub fn register_kernel(name: impl Into<String>, func: NativeKernelFn) {
    let mut map = registry().write().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.insert(name.into(), func);
}

fn lookup_kernel(name: &str) -> Option<NativeKernelFn> {
    let map = registry().read().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.get(name).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeContext(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeProgram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeQueue;

#[derive(Clone, Copy)]
pub struct NativeKernel {
    pub func: NativeKernelFn,
}

impl std::fmt::Debug for NativeKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeKernel")
            .field("func", &(self.func as *const ()))
            .finish()
    }
}

#[derive(Debug)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn device_info() -> DeviceInfo {
        let logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        DeviceInfo {
            backend: BackendKind::Native,
            name: DEVICE_NAME.to_string(),
            vendor: Vendor::Unknown,
            class: DeviceClass::Unknown,
            ordinal: 0,
            local_memory_size: 0, // no separate shared memory on the host
            max_threads_per_block: logical_cores,
        }
    }
}

impl Backend for NativeBackend {
    const KIND: BackendKind = BackendKind::Native;

    type Platform = u32;
    type DeviceId = u32;
    type Context = NativeContext;
    type Program = NativeProgram;
    type Queue = NativeQueue;
    type Memory = NativeMemory;
    type Kernel = NativeKernel;
    type Args = NativeArgs;

    fn enumerate(filter: &VendorFilter) -> Result<Vec<DeviceRecord<Self>>> {
        let info = Self::device_info();
        log::info!(
            "found device '0' = \"{}\", sharedMem={}, threadsPerBlock={}",
            info.name,
            info.local_memory_size,
            info.max_threads_per_block
        );
        if !filter.is_active(info.vendor, info.class, info.ordinal) {
            log::info!("Skipped device named {}", info.name);
            return Ok(Vec::new());
        }
        Ok(vec![DeviceRecord {
            platform: 0,
            device: 0,
            context: NativeContext(0),
            info,
        }])
    }

    fn compile(
        source: &KernelSource<'_>,
        _config: &BuildConfig,
        devices: &[DeviceRecord<Self>],
    ) -> Result<Vec<Self::Program>> {
        // Native kernels are linked in; the text only identifies the program.
        log::debug!(
            "native program `{}` ({} bytes of source) resolves kernels from the registry",
            source.name,
            source.text.len()
        );
        let programs = vec![NativeProgram; devices.len()];
        for i in 0..programs.len() {
            log::info!("program for device {} compiled", i);
        }
        Ok(programs)
    }

    fn release_program(_context: &Self::Context, _program: Self::Program) -> Result<()> {
        Ok(())
    }

    fn release_context(_context: Self::Context) -> Result<()> {
        Ok(())
    }

    fn create_queue(_device: &Self::DeviceId, _context: &Self::Context) -> Result<Self::Queue> {
        Ok(NativeQueue)
    }

    fn release_queue(_queue: Self::Queue) -> Result<()> {
        Ok(())
    }

    fn allocate(_queue: &Self::Queue, _context: &Self::Context, num_bytes: usize) -> Result<Self::Memory> {
        log::trace!("native alloc {} bytes", num_bytes);
        NativeMemory::zeroed(num_bytes)
    }

    fn upload(_queue: &Self::Queue, _context: &Self::Context, memory: &Self::Memory, src: &[u8]) -> Result<()> {
        memory.write(src)
    }

    fn download(_queue: &Self::Queue, _context: &Self::Context, memory: &Self::Memory, dst: &mut [u8]) -> Result<()> {
        memory.read(dst)
    }

    fn free(_context: &Self::Context, memory: Self::Memory) -> Result<()> {
        drop(memory);
        Ok(())
    }

    fn bind(_context: &Self::Context, _program: &Self::Program, name: &str) -> Result<Self::Kernel> {
        lookup_kernel(name)
            .map(|func| NativeKernel { func })
            .ok_or_else(|| Error::invalid_argument(format!("no native kernel registered as `{}`", name)))
    }

    fn unbind(_context: &Self::Context, _kernel: Self::Kernel) -> Result<()> {
        Ok(())
    }

    fn push_arg(args: &mut Self::Args, _kernel: &Self::Kernel, arg: KernelArg<'_, Self>) -> Result<()> {
        match arg {
            KernelArg::Buffer(memory) => args.push_buffer(memory),
            KernelArg::Int(v) => args.push_int(v),
            KernelArg::Float(v) => args.push_float(v),
        }
        Ok(())
    }

    fn dispatch(
        _queue: &Self::Queue,
        _context: &Self::Context,
        kernel: &Self::Kernel,
        args: &Self::Args,
        global_size: usize,
        local_size: usize,
    ) -> Result<()> {
        let tasks = global_size.checked_mul(local_size).ok_or_else(|| {
            Error::invalid_argument(format!("{} x {} work-items overflow", global_size, local_size))
        })?;
        log::trace!("native dispatch of {} work-items", tasks);

        // Sequential by construction: the index cell is per thread and set before each call.
        let result = (0..tasks).try_for_each(|i| {
            WORK_ITEM.with(|w| w.set(i));
            (kernel.func)(args)
        });
        WORK_ITEM.with(|w| w.set(0));
        result
    }

    fn synchronize(_queue: &Self::Queue, _context: &Self::Context) -> Result<()> {
        // dispatch already ran to completion
        Ok(())
    }
}
