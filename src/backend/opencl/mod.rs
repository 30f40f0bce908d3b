//! OpenCL backend.
//!
//! Arguments are bound one at a time with `clSetKernelArg`, so a kernel
//! object carries its argument state between `push_arg` and `dispatch`.

use std::ffi::{c_char, c_void, CString};
use std::ptr;

use bytemuck::Pod;

use crate::backend::{Backend, DeviceRecord, KernelArg, KernelSource};
use crate::core::classify::classify;
use crate::core::filter::OrdinalCounter;
use crate::core::{BackendKind, BuildConfig, DeviceInfo, VendorFilter};
use crate::error::{Error, ErrorKind, Result};

pub mod api;

use api::*;

/// Status code to error kind. Codes without a dedicated mapping take `default`.
pub fn kind_of(code: i32, default: ErrorKind) -> ErrorKind {
    match code {
        -4 | -5 | -6 => ErrorKind::OutOfMemory,
        -3 | -11 | -17 => ErrorKind::CompileFailed,
        -2 | -14 => ErrorKind::DeviceLost,
        -72..=-30 => ErrorKind::InvalidArgument,
        -1001 => ErrorKind::Unavailable, // PLATFORM_NOT_FOUND_KHR
        _ => default,
    }
}

#[track_caller]
fn check(status: i32, call: &'static str, default: ErrorKind) -> Result<()> {
    if status == CL_SUCCESS {
        Ok(())
    } else {
        Err(Error::status(kind_of(status, default), call, status))
    }
}

macro_rules! cl_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name(pub(crate) *mut c_void);

            // OpenCL objects are thread-safe except for clSetKernelArg, which
            // stays with the Device that owns the kernel.
            unsafe impl Send for $name {}
        )*
    };
}

cl_handle!(ClPlatform, ClDevice, ClContext, ClProgram, ClQueue, ClKernel);

#[derive(Debug)]
pub struct ClMemory(pub(crate) cl_mem);

unsafe impl Send for ClMemory {}

/// Running argument index for the bound kernel.
#[derive(Debug, Default)]
pub struct ClArgs {
    next_index: u32,
}

fn to_string(mut buf: Vec<u8>) -> String {
    if let Some(nul) = buf.iter().position(|&b| b == 0) {
        buf.truncate(nul);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Two-step size-then-fetch query for string-valued info parameters.
#[track_caller]
fn info_string(call: &'static str, query: impl Fn(usize, *mut c_void, *mut usize) -> i32) -> Result<String> {
    let mut size = 0usize;
    check(query(0, ptr::null_mut(), &mut size), call, ErrorKind::InvalidArgument)?;
    let mut buf = vec![0u8; size];
    check(
        query(size, buf.as_mut_ptr().cast(), ptr::null_mut()),
        call,
        ErrorKind::InvalidArgument,
    )?;
    Ok(to_string(buf))
}

#[track_caller]
fn info_value<T: Pod>(call: &'static str, query: impl Fn(usize, *mut c_void, *mut usize) -> i32) -> Result<T> {
    let mut value = T::zeroed();
    check(
        query(std::mem::size_of::<T>(), (&mut value as *mut T).cast(), ptr::null_mut()),
        call,
        ErrorKind::InvalidArgument,
    )?;
    Ok(value)
}

fn platform_ids(api: &ClApi) -> Result<Vec<cl_platform_id>> {
    let mut count = 0u32;
    let status = unsafe { (api.clGetPlatformIDs)(0, ptr::null_mut(), &mut count) };
    if status == -1001 {
        // the ICD loader reports "no platforms" this way
        return Ok(Vec::new());
    }
    check(status, "clGetPlatformIDs", ErrorKind::DeviceLost)?;

    let mut platforms = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(
            unsafe { (api.clGetPlatformIDs)(count, platforms.as_mut_ptr(), &mut count) },
            "clGetPlatformIDs",
            ErrorKind::DeviceLost,
        )?;
        platforms.truncate(count as usize);
    }
    Ok(platforms)
}

fn device_ids(api: &ClApi, platform: cl_platform_id) -> Result<Vec<cl_device_id>> {
    let mut count = 0u32;
    let status = unsafe { (api.clGetDeviceIDs)(platform, CL_DEVICE_TYPE_ALL, 0, ptr::null_mut(), &mut count) };
    if status == CL_DEVICE_NOT_FOUND {
        return Ok(Vec::new());
    }
    check(status, "clGetDeviceIDs", ErrorKind::DeviceLost)?;

    let mut devices = vec![ptr::null_mut(); count as usize];
    if count > 0 {
        check(
            unsafe { (api.clGetDeviceIDs)(platform, CL_DEVICE_TYPE_ALL, count, devices.as_mut_ptr(), &mut count) },
            "clGetDeviceIDs",
            ErrorKind::DeviceLost,
        )?;
        devices.truncate(count as usize);
    }
    Ok(devices)
}

fn create_context(api: &ClApi, platform: cl_platform_id, device: cl_device_id) -> Result<cl_context> {
    let properties = [CL_CONTEXT_PLATFORM, platform as isize, 0];
    let mut err = CL_SUCCESS;
    let context = unsafe {
        (api.clCreateContext)(properties.as_ptr(), 1, &device, ptr::null(), ptr::null_mut(), &mut err)
    };
    check(err, "clCreateContext", ErrorKind::DeviceLost)?;
    Ok(context)
}

fn build_log(api: &ClApi, program: cl_program, device: cl_device_id) -> String {
    info_string("clGetProgramBuildInfo", |size, value, ret| unsafe {
        (api.clGetProgramBuildInfo)(program, device, CL_PROGRAM_BUILD_LOG, size, value, ret)
    })
    .unwrap_or_else(|e| format!("<build log unavailable: {}>", e))
}

fn release_all<T>(items: impl IntoIterator<Item = T>, release: impl Fn(T) -> i32, call: &str) {
    for item in items {
        let status = release(item);
        if status != CL_SUCCESS {
            log::warn!("{} returned {} during cleanup", call, status);
        }
    }
}

/// Walks every device of every platform, creating a context for each one the
/// filter admits. Contexts already pushed stay in `records` on failure.
fn discover(
    api: &ClApi,
    platforms: &[cl_platform_id],
    filter: &VendorFilter,
    records: &mut Vec<DeviceRecord<OpenClBackend>>,
) -> Result<()> {
    let mut ordinals = OrdinalCounter::default();
    let mut index = 0usize;

    for &platform in platforms {
        for device in device_ids(api, platform)? {
            let name = info_string("clGetDeviceInfo", |size, value, ret| unsafe {
                (api.clGetDeviceInfo)(device, CL_DEVICE_NAME, size, value, ret)
            })?;
            let local_memory_size: u64 = info_value("clGetDeviceInfo", |size, value, ret| unsafe {
                (api.clGetDeviceInfo)(device, CL_DEVICE_LOCAL_MEM_SIZE, size, value, ret)
            })?;
            let max_work_group_size: usize = info_value("clGetDeviceInfo", |size, value, ret| unsafe {
                (api.clGetDeviceInfo)(device, CL_DEVICE_MAX_WORK_GROUP_SIZE, size, value, ret)
            })?;

            let (vendor, class) = classify(&name);
            let ordinal = ordinals.next(vendor, class);
            log::info!(
                "found device '{}' = \"{}\", sharedMem={}, threadsPerBlock={}",
                index,
                name,
                local_memory_size,
                max_work_group_size
            );
            index += 1;

            if !filter.is_active(vendor, class, ordinal) {
                log::info!("Skipped device named {}", name);
                continue;
            }

            let context = create_context(api, platform, device)?;
            records.push(DeviceRecord {
                platform: ClPlatform(platform),
                device: ClDevice(device),
                context: ClContext(context),
                info: DeviceInfo {
                    backend: BackendKind::OpenCl,
                    name,
                    vendor,
                    class,
                    ordinal,
                    local_memory_size: local_memory_size as usize,
                    max_threads_per_block: max_work_group_size,
                },
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct OpenClBackend;

impl Backend for OpenClBackend {
    const KIND: BackendKind = BackendKind::OpenCl;

    type Platform = ClPlatform;
    type DeviceId = ClDevice;
    type Context = ClContext;
    type Program = ClProgram;
    type Queue = ClQueue;
    type Memory = ClMemory;
    type Kernel = ClKernel;
    type Args = ClArgs;

    fn enumerate(filter: &VendorFilter) -> Result<Vec<DeviceRecord<Self>>> {
        let api = ClApi::get()?;
        let platforms = platform_ids(api)?;

        for (i, &platform) in platforms.iter().enumerate() {
            let name = info_string("clGetPlatformInfo", |size, value, ret| unsafe {
                (api.clGetPlatformInfo)(platform, CL_PLATFORM_NAME, size, value, ret)
            })?;
            log::info!("found platform '{}' = \"{}\"", i, name);
        }

        let mut records: Vec<DeviceRecord<Self>> = Vec::new();
        if let Err(e) = discover(api, &platforms, filter, &mut records) {
            release_all(
                records.into_iter().map(|r| r.context.0),
                |c| unsafe { (api.clReleaseContext)(c) },
                "clReleaseContext",
            );
            return Err(e);
        }
        Ok(records)
    }

    fn compile(
        source: &KernelSource<'_>,
        config: &BuildConfig,
        devices: &[DeviceRecord<Self>],
    ) -> Result<Vec<Self::Program>> {
        let api = ClApi::get()?;
        let options = CString::new(config.opencl_options())
            .map_err(|_| Error::invalid_argument("build options contain a NUL byte"))?;
        let text: *const c_char = source.text.as_ptr().cast();
        let length = source.text.len();

        let mut programs: Vec<cl_program> = Vec::with_capacity(devices.len());
        let result = devices.iter().enumerate().try_for_each(|(i, record)| {
            let mut err = CL_SUCCESS;
            let program = unsafe { (api.clCreateProgramWithSource)(record.context.0, 1, &text, &length, &mut err) };
            check(err, "clCreateProgramWithSource", ErrorKind::CompileFailed)?;
            programs.push(program);

            let device = record.device.0;
            let status = unsafe { (api.clBuildProgram)(program, 1, &device, options.as_ptr(), ptr::null(), ptr::null_mut()) };
            if status != CL_SUCCESS {
                let log = build_log(api, program, device);
                log::error!("clBuildProgram returned status {} for device {}", status, record.info.name);
                return Err(Error::compile(source.name, log));
            }
            log::info!("program {} compiled successfully", i);
            Ok(())
        });

        match result {
            Ok(()) => Ok(programs.into_iter().map(ClProgram).collect()),
            Err(e) => {
                release_all(programs, |p| unsafe { (api.clReleaseProgram)(p) }, "clReleaseProgram");
                Err(e)
            }
        }
    }

    fn release_program(_context: &Self::Context, program: Self::Program) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clReleaseProgram)(program.0) }, "clReleaseProgram", ErrorKind::InvalidArgument)
    }

    fn release_context(context: Self::Context) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clReleaseContext)(context.0) }, "clReleaseContext", ErrorKind::InvalidArgument)
    }

    fn create_queue(device: &Self::DeviceId, context: &Self::Context) -> Result<Self::Queue> {
        let api = ClApi::get()?;
        let mut err = CL_SUCCESS;
        let queue = unsafe { (api.clCreateCommandQueue)(context.0, device.0, 0, &mut err) };
        check(err, "clCreateCommandQueue", ErrorKind::DeviceLost)?;
        Ok(ClQueue(queue))
    }

    fn release_queue(queue: Self::Queue) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clReleaseCommandQueue)(queue.0) }, "clReleaseCommandQueue", ErrorKind::InvalidArgument)
    }

    fn allocate(_queue: &Self::Queue, context: &Self::Context, num_bytes: usize) -> Result<Self::Memory> {
        let api = ClApi::get()?;
        let mut err = CL_SUCCESS;
        let mem = unsafe { (api.clCreateBuffer)(context.0, CL_MEM_READ_WRITE, num_bytes, ptr::null_mut(), &mut err) };
        check(err, "clCreateBuffer", ErrorKind::OutOfMemory)?;
        Ok(ClMemory(mem))
    }

    fn upload(queue: &Self::Queue, _context: &Self::Context, memory: &Self::Memory, src: &[u8]) -> Result<()> {
        let api = ClApi::get()?;
        let status = unsafe {
            (api.clEnqueueWriteBuffer)(
                queue.0,
                memory.0,
                CL_TRUE,
                0,
                src.len(),
                src.as_ptr().cast(),
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        };
        check(status, "clEnqueueWriteBuffer", ErrorKind::InvalidArgument)
    }

    fn download(queue: &Self::Queue, _context: &Self::Context, memory: &Self::Memory, dst: &mut [u8]) -> Result<()> {
        let api = ClApi::get()?;
        let status = unsafe {
            (api.clEnqueueReadBuffer)(
                queue.0,
                memory.0,
                CL_TRUE,
                0,
                dst.len(),
                dst.as_mut_ptr().cast(),
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        };
        check(status, "clEnqueueReadBuffer", ErrorKind::InvalidArgument)
    }

    fn free(_context: &Self::Context, memory: Self::Memory) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clReleaseMemObject)(memory.0) }, "clReleaseMemObject", ErrorKind::InvalidArgument)
    }

    fn bind(_context: &Self::Context, program: &Self::Program, name: &str) -> Result<Self::Kernel> {
        let api = ClApi::get()?;
        let c_name = CString::new(name).map_err(|_| Error::invalid_argument(format!("kernel name {:?} contains NUL", name)))?;
        let mut err = CL_SUCCESS;
        let kernel = unsafe { (api.clCreateKernel)(program.0, c_name.as_ptr(), &mut err) };
        check(err, "clCreateKernel", ErrorKind::InvalidArgument)?;
        Ok(ClKernel(kernel))
    }

    fn unbind(_context: &Self::Context, kernel: Self::Kernel) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clReleaseKernel)(kernel.0) }, "clReleaseKernel", ErrorKind::InvalidArgument)
    }

    fn push_arg(args: &mut Self::Args, kernel: &Self::Kernel, arg: KernelArg<'_, Self>) -> Result<()> {
        let api = ClApi::get()?;
        let index = args.next_index;
        let status = unsafe {
            match arg {
                KernelArg::Buffer(memory) => (api.clSetKernelArg)(
                    kernel.0,
                    index,
                    std::mem::size_of::<cl_mem>(),
                    (&memory.0 as *const cl_mem).cast(),
                ),
                KernelArg::Int(v) => (api.clSetKernelArg)(kernel.0, index, 4, (&v as *const i32).cast()),
                KernelArg::Float(v) => (api.clSetKernelArg)(kernel.0, index, 4, (&v as *const f32).cast()),
            }
        };
        check(status, "clSetKernelArg", ErrorKind::InvalidArgument)?;
        args.next_index += 1;
        Ok(())
    }

    fn dispatch(
        queue: &Self::Queue,
        _context: &Self::Context,
        kernel: &Self::Kernel,
        _args: &Self::Args,
        global_size: usize,
        local_size: usize,
    ) -> Result<()> {
        let api = ClApi::get()?;
        log::debug!("clEnqueueNDRangeKernel global={} local={}", global_size, local_size);
        let status = unsafe {
            (api.clEnqueueNDRangeKernel)(
                queue.0,
                kernel.0,
                1,
                ptr::null(),
                &global_size,
                &local_size,
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        };
        check(status, "clEnqueueNDRangeKernel", ErrorKind::LaunchFailed)
    }

    fn synchronize(queue: &Self::Queue, _context: &Self::Context) -> Result<()> {
        let api = ClApi::get()?;
        check(unsafe { (api.clFinish)(queue.0) }, "clFinish", ErrorKind::LaunchFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(kind_of(-4, ErrorKind::LaunchFailed), ErrorKind::OutOfMemory);
        assert_eq!(kind_of(-6, ErrorKind::LaunchFailed), ErrorKind::OutOfMemory);
        assert_eq!(kind_of(-11, ErrorKind::LaunchFailed), ErrorKind::CompileFailed);
        assert_eq!(kind_of(-36, ErrorKind::LaunchFailed), ErrorKind::InvalidArgument);
        assert_eq!(kind_of(-54, ErrorKind::LaunchFailed), ErrorKind::InvalidArgument);
        assert_eq!(kind_of(-9999, ErrorKind::LaunchFailed), ErrorKind::LaunchFailed);
    }

    #[test]
    fn test_check_keeps_call_name() {
        assert!(check(CL_SUCCESS, "clFinish", ErrorKind::LaunchFailed).is_ok());
        match check(-5, "clFinish", ErrorKind::LaunchFailed).unwrap_err() {
            Error::Status { call, code, kind, .. } => {
                assert_eq!(call, "clFinish");
                assert_eq!(code, -5);
                assert_eq!(kind, ErrorKind::OutOfMemory);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nul_terminated_strings() {
        assert_eq!(to_string(b"GeForce GTX 780\0\0".to_vec()), "GeForce GTX 780");
        assert_eq!(to_string(Vec::new()), "");
    }
}
