//! CUDA driver API backend.
//!
//! Source is compiled once with NVRTC and the resulting PTX is JIT-loaded
//! into every device's context. Arguments are packed into a
//! [`ParamBlock`] and handed to `cuLaunchKernel` as `kernelParams`.
//!
//! The driver tracks a current context per host thread, so every call that
//! needs one runs under a [`context::ContextGuard`].

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::OnceLock;

use cudarc::driver::sys;
use cudarc::nvrtc::{compile_ptx_with_opts, CompileError, CompileOptions};

use crate::backend::params::ParamBlock;
use crate::backend::{Backend, DeviceRecord, KernelArg, KernelSource};
use crate::core::{BackendKind, BuildConfig, DeviceClass, DeviceInfo, Vendor, VendorFilter};
use crate::error::{Error, ErrorKind, Result};

mod context;

use context::ContextGuard;

const JIT_LOG_SIZE: usize = 8192;

pub fn kind_of(code: i32, default: ErrorKind) -> ErrorKind {
    match code {
        2 => ErrorKind::OutOfMemory,
        1 | 201 | 400 | 500 => ErrorKind::InvalidArgument,
        200 | 209 | 218 => ErrorKind::CompileFailed,
        3 | 4 | 100 | 101 | 214 | 700 | 714 | 719 => ErrorKind::DeviceLost,
        701 | 702 => ErrorKind::LaunchFailed,
        _ => default,
    }
}

#[track_caller]
pub(crate) fn check(res: sys::CUresult, call: &'static str, default: ErrorKind) -> Result<()> {
    let code = res as i32;
    if code == 0 {
        Ok(())
    } else {
        Err(Error::status(kind_of(code, default), call, code))
    }
}

/// Loads the driver and runs `cuInit` once per process.
/// `Ok(false)` means the driver is present but reports no device.
fn driver() -> Result<bool> {
    static INIT: OnceLock<std::result::Result<bool, String>> = OnceLock::new();
    INIT.get_or_init(|| {
        if std::panic::catch_unwind(|| unsafe {
            sys::lib();
        })
        .is_err()
        {
            return Err("CUDA driver library could not be loaded".to_string());
        }
        let code = unsafe { sys::lib().cuInit(0) } as i32;
        match code {
            0 => Ok(true),
            100 => Ok(false), // CUDA_ERROR_NO_DEVICE
            code => Err(format!("cuInit returned {}", code)),
        }
    })
    .clone()
    .map_err(Error::unavailable)
}

macro_rules! cu_handle {
    ($($name:ident($raw:ty)),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name(pub(crate) $raw);

            unsafe impl Send for $name {}
        )*
    };
}

cu_handle!(
    CuContext(sys::CUcontext),
    CuModule(sys::CUmodule),
    CuFunction(sys::CUfunction),
);

#[derive(Debug)]
pub struct CuMemory(pub(crate) sys::CUdeviceptr);

/// Work goes to the legacy default stream of the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuQueue;

fn device_attribute(device: sys::CUdevice, attribute: sys::CUdevice_attribute) -> Result<i32> {
    let mut value = 0;
    check(
        unsafe { sys::lib().cuDeviceGetAttribute(&mut value, attribute, device) },
        "cuDeviceGetAttribute",
        ErrorKind::InvalidArgument,
    )?;
    Ok(value)
}

fn device_name(device: sys::CUdevice) -> Result<String> {
    let mut buf = [0 as c_char; 256];
    check(
        unsafe { sys::lib().cuDeviceGetName(buf.as_mut_ptr(), buf.len() as i32, device) },
        "cuDeviceGetName",
        ErrorKind::InvalidArgument,
    )?;
    Ok(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned())
}

fn log_text(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim_end().to_string()
}

fn discover(filter: &VendorFilter, records: &mut Vec<DeviceRecord<CudaBackend>>) -> Result<()> {
    let mut count = 0;
    check(
        unsafe { sys::lib().cuDeviceGetCount(&mut count) },
        "cuDeviceGetCount",
        ErrorKind::DeviceLost,
    )?;

    for i in 0..count {
        let mut device: sys::CUdevice = 0;
        check(unsafe { sys::lib().cuDeviceGet(&mut device, i) }, "cuDeviceGet", ErrorKind::DeviceLost)?;

        let name = device_name(device)?;
        let shared = device_attribute(
            device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK,
        )?;
        let threads = device_attribute(device, sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?;
        log::info!(
            "found device '{}' = \"{}\", sharedMem={}, threadsPerBlock={}",
            i,
            name,
            shared,
            threads
        );

        // every CUDA device is an NVIDIA GPU; the ordinal is the driver index
        let ordinal = i as u32;
        if !filter.is_active(Vendor::Nvidia, DeviceClass::Gpu, ordinal) {
            log::info!("Skipped device named {}", name);
            continue;
        }

        let context = context::create(device)?;
        records.push(DeviceRecord {
            platform: 0,
            device,
            context: CuContext(context),
            info: DeviceInfo {
                backend: BackendKind::Cuda,
                name,
                vendor: Vendor::Nvidia,
                class: DeviceClass::Gpu,
                ordinal,
                local_memory_size: shared.max(0) as usize,
                max_threads_per_block: threads.max(0) as usize,
            },
        });
    }
    Ok(())
}

fn nvrtc_options(config: &BuildConfig) -> CompileOptions {
    let mut options = Vec::new();
    if let Some(arch) = &config.cuda_arch {
        options.push(format!("--gpu-architecture={}", arch));
    }
    options.extend(config.extra_options.iter().cloned());

    CompileOptions {
        maxrregcount: Some(config.max_registers as usize),
        use_fast_math: config.fast_math.then_some(true),
        options,
        ..Default::default()
    }
}

fn load_module(image: &CStr, config: &BuildConfig, context: &CuContext) -> Result<sys::CUmodule> {
    let _guard = ContextGuard::push(context.0)?;

    let mut info_log = vec![0u8; JIT_LOG_SIZE];
    let mut error_log = vec![0u8; JIT_LOG_SIZE];
    let mut options = [
        sys::CUjit_option::CU_JIT_MAX_REGISTERS,
        sys::CUjit_option::CU_JIT_OPTIMIZATION_LEVEL,
        sys::CUjit_option::CU_JIT_INFO_LOG_BUFFER,
        sys::CUjit_option::CU_JIT_INFO_LOG_BUFFER_SIZE_BYTES,
        sys::CUjit_option::CU_JIT_ERROR_LOG_BUFFER,
        sys::CUjit_option::CU_JIT_ERROR_LOG_BUFFER_SIZE_BYTES,
    ];
    // scalar option values travel in the pointer slot itself
    let mut values: [*mut c_void; 6] = [
        config.max_registers as usize as *mut c_void,
        config.optimization_level.min(4) as usize as *mut c_void,
        info_log.as_mut_ptr().cast(),
        JIT_LOG_SIZE as *mut c_void,
        error_log.as_mut_ptr().cast(),
        JIT_LOG_SIZE as *mut c_void,
    ];

    let mut module: sys::CUmodule = ptr::null_mut();
    let res = unsafe {
        sys::lib().cuModuleLoadDataEx(
            &mut module,
            image.as_ptr().cast(),
            options.len() as u32,
            options.as_mut_ptr(),
            values.as_mut_ptr(),
        )
    };
    if let Err(e) = check(res, "cuModuleLoadDataEx", ErrorKind::CompileFailed) {
        let log = log_text(&error_log);
        return Err(if log.is_empty() { e } else { Error::compile("ptx", log) });
    }

    let info = log_text(&info_log);
    if !info.is_empty() {
        log::debug!("{}", info);
    }
    Ok(module)
}

#[derive(Debug)]
pub struct CudaBackend;

impl Backend for CudaBackend {
    const KIND: BackendKind = BackendKind::Cuda;

    type Platform = u32;
    type DeviceId = sys::CUdevice;
    type Context = CuContext;
    type Program = CuModule;
    type Queue = CuQueue;
    type Memory = CuMemory;
    type Kernel = CuFunction;
    type Args = ParamBlock;

    fn enumerate(filter: &VendorFilter) -> Result<Vec<DeviceRecord<Self>>> {
        if !driver()? {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        if let Err(e) = discover(filter, &mut records) {
            for record in records {
                if let Err(release) = Self::release_context(record.context) {
                    log::warn!("releasing context of {}: {}", record.info.name, release);
                }
            }
            return Err(e);
        }
        Ok(records)
    }

    fn compile(
        source: &KernelSource<'_>,
        config: &BuildConfig,
        devices: &[DeviceRecord<Self>],
    ) -> Result<Vec<Self::Program>> {
        if devices.is_empty() {
            return Ok(Vec::new());
        }

        let ptx = compile_ptx_with_opts(source.text, nvrtc_options(config)).map_err(|e| match e {
            CompileError::CompileError { log, .. } => Error::compile(source.name, log.to_string_lossy()),
            other => Error::compile(source.name, format!("{:?}", other)),
        })?;
        let image = CString::new(ptx.to_src())
            .map_err(|_| Error::invalid_argument("PTX image contains a NUL byte"))?;

        let mut modules = Vec::with_capacity(devices.len());
        for (i, record) in devices.iter().enumerate() {
            match load_module(&image, config, &record.context) {
                Ok(module) => {
                    log::info!("program {} compiled successfully", i);
                    modules.push(CuModule(module));
                }
                Err(e) => {
                    for (record, module) in devices.iter().zip(modules) {
                        if let Err(release) = Self::release_program(&record.context, module) {
                            log::warn!("unloading module of {}: {}", record.info.name, release);
                        }
                    }
                    return Err(match e {
                        Error::Compile { log, .. } => Error::compile(source.name, log),
                        other => other,
                    });
                }
            }
        }
        Ok(modules)
    }

    fn release_program(context: &Self::Context, program: Self::Program) -> Result<()> {
        let _guard = ContextGuard::push(context.0)?;
        check(
            unsafe { sys::lib().cuModuleUnload(program.0) },
            "cuModuleUnload",
            ErrorKind::InvalidArgument,
        )
    }

    fn release_context(context: Self::Context) -> Result<()> {
        check(
            unsafe { sys::lib().cuCtxDestroy_v2(context.0) },
            "cuCtxDestroy",
            ErrorKind::InvalidArgument,
        )
    }

    fn create_queue(_device: &Self::DeviceId, _context: &Self::Context) -> Result<Self::Queue> {
        Ok(CuQueue)
    }

    fn release_queue(_queue: Self::Queue) -> Result<()> {
        Ok(())
    }

    fn allocate(_queue: &Self::Queue, context: &Self::Context, num_bytes: usize) -> Result<Self::Memory> {
        let _guard = ContextGuard::push(context.0)?;
        let mut dptr: sys::CUdeviceptr = 0;
        check(
            unsafe { sys::lib().cuMemAlloc_v2(&mut dptr, num_bytes) },
            "cuMemAlloc",
            ErrorKind::OutOfMemory,
        )?;
        Ok(CuMemory(dptr))
    }

    fn upload(_queue: &Self::Queue, context: &Self::Context, memory: &Self::Memory, src: &[u8]) -> Result<()> {
        let _guard = ContextGuard::push(context.0)?;
        check(
            unsafe { sys::lib().cuMemcpyHtoD_v2(memory.0, src.as_ptr().cast(), src.len()) },
            "cuMemcpyHtoD",
            ErrorKind::InvalidArgument,
        )
    }

    fn download(_queue: &Self::Queue, context: &Self::Context, memory: &Self::Memory, dst: &mut [u8]) -> Result<()> {
        let _guard = ContextGuard::push(context.0)?;
        check(
            unsafe { sys::lib().cuMemcpyDtoH_v2(dst.as_mut_ptr().cast(), memory.0, dst.len()) },
            "cuMemcpyDtoH",
            ErrorKind::InvalidArgument,
        )
    }

    fn free(context: &Self::Context, memory: Self::Memory) -> Result<()> {
        let _guard = ContextGuard::push(context.0)?;
        check(unsafe { sys::lib().cuMemFree_v2(memory.0) }, "cuMemFree", ErrorKind::InvalidArgument)
    }

    fn bind(context: &Self::Context, program: &Self::Program, name: &str) -> Result<Self::Kernel> {
        let c_name = CString::new(name)
            .map_err(|_| Error::invalid_argument(format!("kernel name {:?} contains NUL", name)))?;
        let _guard = ContextGuard::push(context.0)?;
        let mut function: sys::CUfunction = ptr::null_mut();
        check(
            unsafe { sys::lib().cuModuleGetFunction(&mut function, program.0, c_name.as_ptr()) },
            "cuModuleGetFunction",
            ErrorKind::InvalidArgument,
        )?;
        Ok(CuFunction(function))
    }

    fn unbind(_context: &Self::Context, _kernel: Self::Kernel) -> Result<()> {
        // functions live as long as their module
        Ok(())
    }

    fn push_arg(args: &mut Self::Args, _kernel: &Self::Kernel, arg: KernelArg<'_, Self>) -> Result<()> {
        match arg {
            KernelArg::Buffer(memory) => args.push::<sys::CUdeviceptr>(memory.0),
            KernelArg::Int(v) => args.push(v),
            KernelArg::Float(v) => args.push(v),
        }
    }

    fn dispatch(
        _queue: &Self::Queue,
        context: &Self::Context,
        kernel: &Self::Kernel,
        args: &Self::Args,
        global_size: usize,
        local_size: usize,
    ) -> Result<()> {
        let blocks = u32::try_from(global_size / local_size)
            .map_err(|_| Error::invalid_argument(format!("grid of {} blocks is too large", global_size / local_size)))?;
        let threads = u32::try_from(local_size)
            .map_err(|_| Error::invalid_argument(format!("block of {} threads is too large", local_size)))?;
        log::debug!("cuLaunchKernel grid={} block={} params={}", blocks, threads, args.len());

        let mut params = args.kernel_params();
        let _guard = ContextGuard::push(context.0)?;
        check(
            unsafe {
                sys::lib().cuLaunchKernel(
                    kernel.0,
                    blocks,
                    1,
                    1,
                    threads,
                    1,
                    1,
                    0,
                    ptr::null_mut(),
                    params.as_mut_ptr(),
                    ptr::null_mut(),
                )
            },
            "cuLaunchKernel",
            ErrorKind::LaunchFailed,
        )
    }

    fn synchronize(_queue: &Self::Queue, context: &Self::Context) -> Result<()> {
        let _guard = ContextGuard::push(context.0)?;
        check(unsafe { sys::lib().cuCtxSynchronize() }, "cuCtxSynchronize", ErrorKind::LaunchFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(kind_of(2, ErrorKind::LaunchFailed), ErrorKind::OutOfMemory);
        assert_eq!(kind_of(218, ErrorKind::LaunchFailed), ErrorKind::CompileFailed);
        assert_eq!(kind_of(700, ErrorKind::LaunchFailed), ErrorKind::DeviceLost);
        assert_eq!(kind_of(1, ErrorKind::LaunchFailed), ErrorKind::InvalidArgument);
        assert_eq!(kind_of(999, ErrorKind::OutOfMemory), ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_nvrtc_options_follow_config() {
        let config = BuildConfig {
            cuda_arch: Some("compute_75".into()),
            fast_math: false,
            ..Default::default()
        };
        let opts = nvrtc_options(&config);
        assert_eq!(opts.maxrregcount, Some(64));
        assert_eq!(opts.use_fast_math, None);
        assert_eq!(opts.options, vec!["--gpu-architecture=compute_75".to_string()]);
    }

    #[test]
    fn test_jit_log_is_trimmed() {
        assert_eq!(log_text(b"ptxas info: 12 registers\n\0\0\0"), "ptxas info: 12 registers");
        assert_eq!(log_text(&[0u8; 8]), "");
    }
}
