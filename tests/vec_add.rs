use std::thread;

use gpapi::{
    free, global_id, init, register_kernel, round_up_global, Backend, BufferId, BuildConfig, Device, DeviceBinding,
    ErrorKind, KernelSource, NativeArgs, NativeBackend, VendorFilter,
};

const LOCAL_SIZE: usize = 64;

fn devices() -> Vec<Device<NativeBackend>> {
    let source = KernelSource::new("vec_add.cl", include_str!("../demos/kernels/vec_add.cl"));
    init::<NativeBackend>(&source, &VendorFilter::default()).unwrap()
}

fn run_vec_add(device: &mut Device<NativeBackend>, n: usize) -> Vec<i32> {
    let a: Vec<i32> = (0..n as i32).collect();
    let b: Vec<i32> = (0..n as i32).map(|i| i * 2).collect();

    device.set_kernel("vecAdd").unwrap();
    device.add_param_slice(&a).unwrap();
    device.add_param_slice(&b).unwrap();
    let c = device.add_param_output::<i32>(n).unwrap();
    device.add_param_int(n as i32).unwrap();

    device.launch_kernel(round_up_global(n, LOCAL_SIZE), LOCAL_SIZE).unwrap();
    device.wait().unwrap();

    let mut out = vec![0i32; n];
    device.download_slice(c, &mut out).unwrap();
    out
}

#[test]
fn test_vec_add_exact_multiple() {
    let mut devices = devices();
    for device in devices.iter_mut() {
        let out = run_vec_add(device, 1024);
        assert!(out.iter().enumerate().all(|(i, &v)| v == 3 * i as i32));
    }
    free(&mut devices).unwrap();
}

#[test]
fn test_vec_add_rounded_global_size() {
    assert_eq!(round_up_global(1000, LOCAL_SIZE), 1024);

    let mut devices = devices();
    for device in devices.iter_mut() {
        let out = run_vec_add(device, 1000);
        assert_eq!(out.len(), 1000);
        assert!(out.iter().enumerate().all(|(i, &v)| v == 3 * i as i32));
    }
    free(&mut devices).unwrap();
}

fn scaled_sum(args: &NativeArgs) -> gpapi::Result<()> {
    // (a, b, scale, n, out)
    let i = global_id();
    let n = args.int(3)? as usize;
    if i < n {
        let a = args.load::<f32>(0, i)?;
        let b = args.load::<f32>(1, i)?;
        args.store::<f32>(4, i, a * args.float(2)? + b)?;
    }
    Ok(())
}

#[test]
fn test_arguments_arrive_in_declared_order() {
    register_kernel("scaledSum", scaled_sum);

    let mut devices = devices();
    let device = &mut devices[0];
    device.set_kernel("scaledSum").unwrap();
    device.add_param_slice(&[1.0f32, 2.0, 3.0]).unwrap();
    device.add_param_slice(&[10.0f32, 20.0, 30.0]).unwrap();
    device.add_param_float(0.5).unwrap();
    device.add_param_int(3).unwrap();
    let out = device.add_param_output::<f32>(3).unwrap();

    device.launch_kernel(4, 1).unwrap();
    device.wait().unwrap();

    let mut result = [0f32; 3];
    device.download_slice(out, &mut result).unwrap();
    assert_eq!(result, [10.5, 21.0, 31.5]);

    // rebinding clears pending arguments: the kernel now sees no arguments at all
    device.set_kernel("scaledSum").unwrap();
    let err = device.launch_kernel(1, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_launch_misuse_is_reported() {
    let mut devices = devices();
    let device = &mut devices[0];

    let err = device.add_param_int(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = device.set_kernel("doesNotExist").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(device.kernel().is_none());
    let err = device.add_param_int(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    device.set_kernel("vecAdd").unwrap();
    let err = device.launch_kernel(64, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_failed_rebind_unbinds_previous_kernel() {
    let mut devices = devices();
    let device = &mut devices[0];

    device.set_kernel("vecAdd").unwrap();
    device.add_param_slice(&[1i32, 2]).unwrap();
    device.add_param_slice(&[1i32, 2]).unwrap();
    let c = device.add_param_output::<i32>(2).unwrap();
    device.add_param_int(2).unwrap();
    assert_eq!(device.num_args(), 4);

    let err = device.set_kernel("noSuchKernel").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(device.kernel().is_none());
    assert_eq!(device.num_args(), 0);

    let err = device.add_param_int(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = device.add_param_slice(&[1i32]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = device.launch_kernel(64, 64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // the output buffer was never written by the old kernel
    let mut out = [7i32; 2];
    device.download_slice(c, &mut out).unwrap();
    assert_eq!(out, [0, 0]);
}

#[test]
fn test_failed_buffer_argument_allocates_nothing() {
    let mut devices = devices();
    let device = &mut devices[0];

    // no kernel bound yet
    let err = device.add_param_slice(&[1i32, 2, 3]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(device.buffer(BufferId(0)).is_none());
    assert_eq!(device.num_buffers(), 0);

    device.set_kernel("vecAdd").unwrap();
    let err = device.add_param_buffer(None, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(device.buffer(BufferId(0)).is_none());
    assert_eq!(device.num_args(), 0);

    let err = device.add_param_buffer(Some(&[1u8, 2]), 8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(device.num_buffers(), 0);

    // ids start from zero once a call succeeds
    let a = device.add_param_slice(&[5i32, 6]).unwrap();
    assert_eq!(a, BufferId(0));
    assert_eq!(device.num_args(), 1);
}

#[test]
fn test_reinit_releases_previous_resources() {
    let mut devices = devices();
    let device = &mut devices[0];
    run_vec_add(device, 64);
    assert_eq!(device.num_buffers(), 3);
    assert!(device.kernel().is_some());

    let source = KernelSource::new("rebound", "");
    let mut records = NativeBackend::enumerate(&VendorFilter::default()).unwrap();
    let programs = NativeBackend::compile(&source, &BuildConfig::default(), &records).unwrap();
    let record = records.remove(0);
    let program = programs[0];

    device.init(DeviceBinding { record, program }).unwrap();
    assert_eq!(device.num_buffers(), 0);
    assert!(device.buffer(BufferId(0)).is_none());
    assert!(device.kernel().is_none());
    assert_eq!(device.num_args(), 0);
    assert!(device.queue().is_some());
    assert!(device.context().is_some());

    let err = device.add_param_int(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let out = run_vec_add(device, 100);
    assert!(out.iter().enumerate().all(|(i, &v)| v == 3 * i as i32));
    free(&mut devices).unwrap();
}

#[test]
fn test_one_thread_per_device() {
    let mut devices = devices();
    devices.extend(init::<NativeBackend>(&KernelSource::new("second", ""), &VendorFilter::default()).unwrap());
    assert_eq!(devices.len(), 2);

    let handles: Vec<_> = devices
        .into_iter()
        .enumerate()
        .map(|(k, mut device)| {
            thread::spawn(move || {
                let n = 512 + 256 * k;
                let out = run_vec_add(&mut device, n);
                assert!(out.iter().enumerate().all(|(i, &v)| v == 3 * i as i32));
                device
            })
        })
        .collect();

    let mut devices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    free(&mut devices).unwrap();
}

#[test]
fn test_free_twice_is_harmless() {
    let mut devices = devices();
    run_vec_add(&mut devices[0], 128);

    free(&mut devices).unwrap();
    assert!(devices.is_empty());
    free(&mut devices).unwrap();
}
