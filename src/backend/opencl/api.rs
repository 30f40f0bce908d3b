//! OpenCL ICD entry points resolved at runtime.

#![allow(non_snake_case, non_camel_case_types)]

use std::ffi::{c_char, c_void};
use std::sync::OnceLock;

use libloading::Library;

use crate::error::{Error, Result};

pub type cl_platform_id = *mut c_void;
pub type cl_device_id = *mut c_void;
pub type cl_context = *mut c_void;
pub type cl_program = *mut c_void;
pub type cl_command_queue = *mut c_void;
pub type cl_mem = *mut c_void;
pub type cl_kernel = *mut c_void;
pub type cl_event = *mut c_void;

pub const CL_SUCCESS: i32 = 0;
pub const CL_DEVICE_NOT_FOUND: i32 = -1;

pub const CL_PLATFORM_NAME: u32 = 0x0902;
pub const CL_DEVICE_TYPE_ALL: u64 = 0xFFFF_FFFF;
pub const CL_DEVICE_MAX_WORK_GROUP_SIZE: u32 = 0x1004;
pub const CL_DEVICE_LOCAL_MEM_SIZE: u32 = 0x1023;
pub const CL_DEVICE_NAME: u32 = 0x102B;
pub const CL_CONTEXT_PLATFORM: isize = 0x1084;
pub const CL_PROGRAM_BUILD_LOG: u32 = 0x1183;
pub const CL_MEM_READ_WRITE: u64 = 1 << 0;
pub const CL_TRUE: u32 = 1;

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

macro_rules! opencl_api {
    ($($name:ident: fn($($arg:ty),* $(,)?) -> $ret:ty;)*) => {
        pub struct ClApi {
            $(pub $name: unsafe extern "system" fn($($arg),*) -> $ret,)*
            _lib: Library,
        }

        impl ClApi {
            unsafe fn load(lib: Library) -> std::result::Result<Self, libloading::Error> {
                Ok(Self {
                    $($name: *lib.get(concat!(stringify!($name), "\0").as_bytes())?,)*
                    _lib: lib,
                })
            }
        }
    };
}

opencl_api! {
    clGetPlatformIDs: fn(u32, *mut cl_platform_id, *mut u32) -> i32;
    clGetPlatformInfo: fn(cl_platform_id, u32, usize, *mut c_void, *mut usize) -> i32;
    clGetDeviceIDs: fn(cl_platform_id, u64, u32, *mut cl_device_id, *mut u32) -> i32;
    clGetDeviceInfo: fn(cl_device_id, u32, usize, *mut c_void, *mut usize) -> i32;
    clCreateContext: fn(*const isize, u32, *const cl_device_id, *const c_void, *mut c_void, *mut i32) -> cl_context;
    clReleaseContext: fn(cl_context) -> i32;
    clCreateProgramWithSource: fn(cl_context, u32, *const *const c_char, *const usize, *mut i32) -> cl_program;
    clBuildProgram: fn(cl_program, u32, *const cl_device_id, *const c_char, *const c_void, *mut c_void) -> i32;
    clGetProgramBuildInfo: fn(cl_program, cl_device_id, u32, usize, *mut c_void, *mut usize) -> i32;
    clReleaseProgram: fn(cl_program) -> i32;
    clCreateCommandQueue: fn(cl_context, cl_device_id, u64, *mut i32) -> cl_command_queue;
    clReleaseCommandQueue: fn(cl_command_queue) -> i32;
    clCreateBuffer: fn(cl_context, u64, usize, *mut c_void, *mut i32) -> cl_mem;
    clEnqueueWriteBuffer: fn(cl_command_queue, cl_mem, u32, usize, usize, *const c_void, u32, *const cl_event, *mut cl_event) -> i32;
    clEnqueueReadBuffer: fn(cl_command_queue, cl_mem, u32, usize, usize, *mut c_void, u32, *const cl_event, *mut cl_event) -> i32;
    clReleaseMemObject: fn(cl_mem) -> i32;
    clCreateKernel: fn(cl_program, *const c_char, *mut i32) -> cl_kernel;
    clReleaseKernel: fn(cl_kernel) -> i32;
    clSetKernelArg: fn(cl_kernel, u32, usize, *const c_void) -> i32;
    clEnqueueNDRangeKernel: fn(cl_command_queue, cl_kernel, u32, *const usize, *const usize, *const usize, u32, *const cl_event, *mut cl_event) -> i32;
    clFinish: fn(cl_command_queue) -> i32;
}

static CL_API: OnceLock<std::result::Result<ClApi, String>> = OnceLock::new();

impl ClApi {
    /// The process-wide symbol table, loaded on first use.
    pub fn get() -> Result<&'static ClApi> {
        CL_API
            .get_or_init(Self::open)
            .as_ref()
            .map_err(|msg| Error::unavailable(msg.clone()))
    }

    fn open() -> std::result::Result<ClApi, String> {
        let mut last_error = String::from("no OpenCL library candidates for this platform");
        for name in LIBRARY_NAMES {
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    log::debug!("loaded OpenCL ICD from {}", name);
                    return unsafe { ClApi::load(lib) }
                        .map_err(|e| format!("{}: missing entry point: {}", name, e));
                }
                Err(e) => last_error = format!("{}: {}", name, e),
            }
        }
        Err(last_error)
    }
}
