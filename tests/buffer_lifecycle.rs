use gpapi::{init, Buffer, ErrorKind, KernelSource, NativeBackend, VendorFilter};

fn native_device() -> gpapi::Device<NativeBackend> {
    let source = KernelSource::new("buffer_tests", "");
    let mut devices = init::<NativeBackend>(&source, &VendorFilter::default()).unwrap();
    assert_eq!(devices.len(), 1);
    devices.pop().unwrap()
}

#[test]
fn test_round_trip_identity() {
    let device = native_device();
    let queue = device.queue().unwrap();
    let context = device.context().unwrap();

    for size in [0usize, 1, 4096, 1 << 20] {
        let src: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
        let mut buffer = Buffer::<NativeBackend>::new();
        buffer.init(queue, context, Some(&src), size).unwrap();

        let mut dst = vec![0u8; size];
        buffer.download(queue, context, &mut dst, size).unwrap();
        assert_eq!(dst, src, "size {}", size);

        if size == 0 {
            assert!(buffer.get().is_none());
        }
    }
}

#[test]
fn test_free_twice_and_never_initialized() {
    let device = native_device();
    let queue = device.queue().unwrap();
    let context = device.context().unwrap();

    let mut fresh = Buffer::<NativeBackend>::new();
    fresh.free_mem().unwrap();
    assert!(fresh.get().is_none());

    let mut buffer = Buffer::<NativeBackend>::new();
    buffer.init(queue, context, None, 128).unwrap();
    assert!(buffer.get().is_some());
    buffer.free_mem().unwrap();
    buffer.free_mem().unwrap();
    assert!(buffer.get().is_none());

    // downloading zero bytes from an empty buffer stays a no-op
    buffer.download(queue, context, &mut [], 0).unwrap();
    let err = buffer.download(queue, context, &mut [0u8; 4], 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_device_owned_buffers() {
    let mut device = native_device();
    device.set_kernel("vecAdd").unwrap();

    let data: Vec<i32> = (0..256).collect();
    let id = device.add_param_slice(&data).unwrap();
    assert_eq!(device.buffer(id).unwrap().size(), 1024);

    let mut back = vec![0i32; 256];
    device.download_slice(id, &mut back).unwrap();
    assert_eq!(back, data);

    device.free_mem().unwrap();
    assert!(device.buffer(id).is_none());
    device.free_mem().unwrap();
}
